// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// JSON-lines framing between the harness and whatever drives it.
//
// In:  {"type":"call","id":1,"channel":"mt_map","method":"addMarker","arguments":{...}}
//      {"type":"createView","id":2,"viewId":7,"params":{"apiKey":"..."}}
//      {"type":"resizeView","id":3,"viewId":7,"width":320,"height":240}
//      {"type":"disposeView","id":4,"viewId":7}
//      {"type":"detach","id":5}
// Out: {"type":"attached",...}, {"type":"reply","id":1,"reply":{...}},
//      {"type":"event","channel":"mt_map","event":{"method":...,"arguments":...}}

use serde::{Deserialize, Serialize};
use serde_json::Value;

use mtmap_core::types::{CreationParams, ViewId};
use mtmap_engine::{Event, Reply};

/// One line read from stdin. `id` is echoed back verbatim on the reply.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Inbound {
    Call {
        #[serde(default)]
        id: Value,
        /// Defaults to the global channel.
        #[serde(default)]
        channel: Option<String>,
        method: String,
        #[serde(default)]
        arguments: Value,
    },
    CreateView {
        #[serde(default)]
        id: Value,
        view_id: ViewId,
        #[serde(default)]
        params: CreationParams,
    },
    ResizeView {
        #[serde(default)]
        id: Value,
        view_id: ViewId,
        width: f64,
        height: f64,
    },
    DisposeView {
        #[serde(default)]
        id: Value,
        view_id: ViewId,
    },
    Detach {
        #[serde(default)]
        id: Value,
    },
}

/// One line written to stdout.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Outbound {
    Attached {
        session: String,
        platform: String,
        channel: String,
        view_type: String,
    },
    Reply {
        id: Value,
        reply: Reply,
    },
    Event {
        channel: String,
        event: Event,
    },
}
