// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Routes inbound protocol lines onto the bridge session.
//
// Calls are forwarded through one lane per channel name: a lane is a task
// that submits its channel's calls one after another, so a channel sees calls
// in the order they were read while different channels make progress side by
// side. View lifecycle messages are handled inline, after the affected lane
// has drained.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use mtmap_core::error::Result;
use mtmap_engine::{BridgeSession, MethodCall, Reply};

use super::wire::{Inbound, Outbound};

struct Lane {
    tx: mpsc::UnboundedSender<(Value, MethodCall)>,
    task: JoinHandle<()>,
}

impl Lane {
    async fn drain(self) {
        drop(self.tx);
        if let Err(e) = self.task.await {
            warn!(error = %e, "lane task failed");
        }
    }
}

pub struct Router {
    session: Arc<BridgeSession>,
    out: mpsc::UnboundedSender<Outbound>,
    lanes: HashMap<String, Lane>,
}

impl Router {
    pub fn new(session: Arc<BridgeSession>, out: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            session,
            out,
            lanes: HashMap::new(),
        }
    }

    /// Handle one inbound message. Returns `false` once the session has been
    /// detached and no further input should be read.
    pub async fn handle(&mut self, message: Inbound) -> bool {
        match message {
            Inbound::Call {
                id,
                channel,
                method,
                arguments,
            } => {
                let channel = channel.unwrap_or_else(|| self.session.config().channel_name.clone());
                self.submit(channel, id, MethodCall::new(method, arguments));
            }
            Inbound::CreateView { id, view_id, params } => {
                let result = self.session.create_view(view_id, params).await;
                self.reply(id, result.map(Value::from));
            }
            Inbound::ResizeView {
                id,
                view_id,
                width,
                height,
            } => {
                let channel = self.session.config().view_channel_name(view_id);
                self.drain_lane(&channel).await;
                let result = self.session.resize_view(view_id, width, height).await;
                self.reply(id, result.map(|()| Value::Bool(true)));
            }
            Inbound::DisposeView { id, view_id } => {
                let channel = self.session.config().view_channel_name(view_id);
                self.drain_lane(&channel).await;
                let result = self.session.dispose_view(view_id).await;
                self.reply(id, result.map(|()| Value::Bool(true)));
            }
            Inbound::Detach { id } => {
                self.shutdown().await;
                self.reply(id, Ok(Value::Bool(true)));
                return false;
            }
        }
        true
    }

    /// Let every queued call finish, then detach the session.
    pub async fn shutdown(&mut self) {
        for (_, lane) in self.lanes.drain() {
            lane.drain().await;
        }
        self.session.detach().await;
    }

    /// Answer a message that could not be decoded.
    pub fn reject(&self, error: &mtmap_core::MtMapError) {
        let _ = self.out.send(Outbound::Reply {
            id: Value::Null,
            reply: Reply::from_error(error),
        });
    }

    fn submit(&mut self, channel: String, id: Value, call: MethodCall) {
        let lane = self.lanes.entry(channel).or_insert_with_key(|name| {
            debug!(channel = %name, "opening lane");
            spawn_lane(name.clone(), Arc::clone(&self.session), self.out.clone())
        });
        if lane.tx.send((id, call)).is_err() {
            warn!("lane closed; call dropped");
        }
    }

    async fn drain_lane(&mut self, channel: &str) {
        if let Some(lane) = self.lanes.remove(channel) {
            lane.drain().await;
        }
    }

    fn reply(&self, id: Value, result: Result<Value>) {
        let _ = self.out.send(Outbound::Reply {
            id,
            reply: Reply::from(result),
        });
    }
}

fn spawn_lane(
    channel: String,
    session: Arc<BridgeSession>,
    out: mpsc::UnboundedSender<Outbound>,
) -> Lane {
    let (tx, mut rx) = mpsc::unbounded_channel::<(Value, MethodCall)>();
    let task = tokio::spawn(async move {
        while let Some((id, call)) = rx.recv().await {
            let reply = session.call_channel(&channel, call).await;
            if out.send(Outbound::Reply { id, reply }).is_err() {
                break;
            }
        }
    });
    Lane { tx, task }
}
