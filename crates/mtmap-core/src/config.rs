// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bridge configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::ViewId;

/// Accuracy tier requested from the location service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LocationAccuracy {
    High,
    Balanced,
    Low,
    Passive,
}

/// How the continuous location subscription is requested.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocationPolicy {
    pub accuracy: LocationAccuracy,
    /// Preferred interval between fixes.
    pub interval_ms: u64,
    /// Fastest rate the bridge accepts fixes at.
    pub fastest_interval_ms: u64,
    /// How long a one-shot fix may take before it is reported unavailable.
    pub one_shot_timeout_ms: u64,
}

impl Default for LocationPolicy {
    fn default() -> Self {
        Self {
            accuracy: LocationAccuracy::High,
            interval_ms: 10_000,
            fastest_interval_ms: 5_000,
            one_shot_timeout_ms: 15_000,
        }
    }
}

/// Process-wide bridge settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    /// Name of the session-global command channel.
    pub channel_name: String,
    /// Type name registered with the host for embedded map views.
    pub view_type: String,
    /// Per-view channels are named `<prefix><viewId>`.
    pub view_channel_prefix: String,
    /// Zoom used by `showMap` when the host sends none.
    pub default_zoom: f64,
    /// Duration used by `animateCamera` when the host sends none.
    pub animation_duration_ms: u64,
    pub location: LocationPolicy,
    /// Commands buffered per channel before senders wait.
    pub command_queue_depth: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            channel_name: "mt_map".into(),
            view_type: "mt_map_view".into(),
            view_channel_prefix: "mt_map_widget_".into(),
            default_zoom: 15.0,
            animation_duration_ms: 1000,
            location: LocationPolicy::default(),
            command_queue_depth: 64,
        }
    }
}

impl BridgeConfig {
    /// Channel name for one embedded view.
    pub fn view_channel_name(&self, view_id: ViewId) -> String {
        format!("{}{}", self.view_channel_prefix, view_id)
    }

    /// Inverse of [`view_channel_name`](Self::view_channel_name). Only the
    /// canonical spelling matches: no sign, no leading zeros.
    pub fn parse_view_channel(&self, channel: &str) -> Option<ViewId> {
        let id = channel
            .strip_prefix(&self.view_channel_prefix)?
            .parse::<i64>()
            .ok()
            .map(ViewId)?;
        (self.view_channel_name(id) == channel).then_some(id)
    }

    /// Load the config from a JSON file, falling back to defaults when the
    /// file is missing or malformed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                if path.exists() {
                    warn!(path = %path.display(), error = %e, "bridge config unreadable, using defaults");
                } else {
                    debug!(path = %path.display(), "no bridge config file, using defaults");
                }
                Self::default()
            }
        }
    }

    /// Load the config from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Persist the config as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
