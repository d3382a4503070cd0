// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for mtmap.

use thiserror::Error;

/// Top-level error type for all mtmap operations.
///
/// Every variant maps onto one wire error code via [`MtMapError::code`], so a
/// failure anywhere in the bridge can be turned into a structured reply.
#[derive(Debug, Error)]
pub enum MtMapError {
    // -- Protocol errors --
    #[error("{0}")]
    InvalidArgument(String),

    #[error("Map not initialized. Call initialize() first.")]
    NotInitialized,

    #[error("{0} not found")]
    NotFound(String),

    #[error("method not implemented: {0}")]
    NotImplemented(String),

    // -- External service errors --
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// A handler failure that is not otherwise classified, tagged with the
    /// operation-specific code (e.g. `ADD_MARKER_ERROR`).
    #[error("{message}")]
    Operation { code: &'static str, message: String },

    // -- Platform bridge --
    #[error("platform bridge error: {0}")]
    Bridge(String),

    #[error("feature not available on this platform")]
    PlatformUnavailable,

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MtMapError {
    /// Wire error code carried in `{errorCode, errorMessage}` replies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::NotImplemented(_) => "NOT_IMPLEMENTED",
            Self::PermissionDenied(_) => "PERMISSION_DENIED",
            Self::ServiceUnavailable(_) | Self::PlatformUnavailable => "SERVICE_UNAVAILABLE",
            Self::Operation { code, .. } => *code,
            Self::Bridge(_) => "BRIDGE_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Whether this error already belongs to the protocol taxonomy.
    ///
    /// Classified errors keep their code when they cross a handler boundary;
    /// everything else is re-tagged with the operation's own code.
    pub fn is_classified(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_)
                | Self::NotInitialized
                | Self::NotFound(_)
                | Self::NotImplemented(_)
                | Self::PermissionDenied(_)
                | Self::ServiceUnavailable(_)
                | Self::PlatformUnavailable
                | Self::Operation { .. }
        )
    }

    /// Wrap an unclassified failure into an operation-specific error.
    ///
    /// `what` completes the sentence "Failed to ..." in the reply message.
    pub fn in_operation(self, code: &'static str, what: &str) -> Self {
        if self.is_classified() {
            return self;
        }
        Self::Operation {
            code,
            message: format!("Failed to {what}: {self}"),
        }
    }

    /// Shorthand for an `InvalidArgument` naming the offending field(s).
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MtMapError>;
