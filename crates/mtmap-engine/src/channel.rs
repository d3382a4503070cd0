// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// One command processor per channel.
//
// Each channel is a spawned task that owns its `Dispatcher` outright and
// drains a bounded queue one request at a time, so handlers on the same
// channel never interleave and replies leave in arrival order. Different
// channels run as different tasks and proceed independently.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use mtmap_core::error::{MtMapError, Result};
use mtmap_core::types::ViewSize;

use crate::dispatcher::Dispatcher;
use crate::protocol::{MethodCall, Reply};

enum Request {
    Call(MethodCall, oneshot::Sender<Reply>),
    Resize(ViewSize, oneshot::Sender<Result<()>>),
    Close(oneshot::Sender<()>),
}

/// Cheap, cloneable address of a running channel.
#[derive(Clone, Debug)]
pub struct ChannelHandle {
    name: String,
    tx: mpsc::Sender<Request>,
}

impl ChannelHandle {
    /// Start the processor task for `dispatcher`.
    pub fn spawn(name: String, dispatcher: Dispatcher, depth: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        let task = tokio::spawn(run(name.clone(), dispatcher, rx));
        (Self { name, tx }, task)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Queue a call and wait for its reply.
    ///
    /// A closed channel still answers: with `SERVICE_UNAVAILABLE`.
    pub async fn call(&self, call: MethodCall) -> Reply {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(Request::Call(call, reply_tx)).await.is_err() {
            return Reply::from_error(&self.closed());
        }
        reply_rx
            .await
            .unwrap_or_else(|_| Reply::from_error(&self.closed()))
    }

    /// Resize the channel's surface, in order with its queued calls.
    pub async fn resize(&self, size: ViewSize) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Request::Resize(size, done_tx))
            .await
            .map_err(|_| self.closed())?;
        done_rx.await.map_err(|_| self.closed())?
    }

    /// Ask the processor to release its surface and exit once the calls
    /// queued ahead of this have been answered. Returns when it has.
    pub async fn close(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Request::Close(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    fn closed(&self) -> MtMapError {
        MtMapError::ServiceUnavailable(format!("channel {} closed", self.name))
    }
}

async fn run(name: String, mut dispatcher: Dispatcher, mut rx: mpsc::Receiver<Request>) {
    debug!(channel = %name, "channel processor started");
    let mut ack = None;
    while let Some(request) = rx.recv().await {
        match request {
            Request::Call(call, reply) => {
                let answer = dispatcher.dispatch(call).await;
                if reply.send(answer).is_err() {
                    debug!(channel = %name, "caller went away before the reply");
                }
            }
            Request::Resize(size, done) => {
                let _ = done.send(dispatcher.resize(size));
            }
            Request::Close(done) => {
                ack = Some(done);
                break;
            }
        }
    }
    // Anything still queued behind Close is answered by the dropped senders.
    rx.close();
    dispatcher.shutdown().await;
    info!(channel = %name, "channel closed");
    if let Some(done) = ack {
        let _ = done.send(());
    }
}
