// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// mtmap core: domain types, error taxonomy and configuration shared across all crates.

pub mod config;
pub mod error;
pub mod types;

pub use config::{BridgeConfig, LocationAccuracy, LocationPolicy};
pub use error::MtMapError;
pub use types::*;
