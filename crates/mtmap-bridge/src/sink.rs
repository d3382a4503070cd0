// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Closable delivery endpoint handed to the location service on subscribe.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use mtmap_core::types::{LocationEvent, LocationFix};

/// Where a location subscription pushes its fixes and errors.
///
/// Clones share one gate: once [`close`](Self::close) returns, no clone can
/// deliver again, even if the platform keeps invoking its callback for a
/// while after unsubscribe.
#[derive(Debug, Clone)]
pub struct LocationSink {
    gate: Arc<Mutex<Option<mpsc::UnboundedSender<LocationEvent>>>>,
}

impl LocationSink {
    pub fn new(tx: mpsc::UnboundedSender<LocationEvent>) -> Self {
        Self {
            gate: Arc::new(Mutex::new(Some(tx))),
        }
    }

    /// Push a fix. Returns false if the sink is closed or nobody listens.
    pub fn deliver_fix(&self, fix: LocationFix) -> bool {
        self.deliver(LocationEvent::Fix(fix))
    }

    /// Push a delivery failure. Returns false if the sink is closed.
    pub fn deliver_error(&self, description: impl Into<String>) -> bool {
        self.deliver(LocationEvent::Error(description.into()))
    }

    fn deliver(&self, event: LocationEvent) -> bool {
        let gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        match gate.as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Stop all further delivery through this sink and its clones.
    pub fn close(&self) {
        self.gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_open(&self) -> bool {
        self.gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_sink_drops_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = LocationSink::new(tx);
        let platform_side = sink.clone();

        assert!(platform_side.deliver_fix(LocationFix::new(39.9, 116.4, 8.0)));
        sink.close();
        assert!(!platform_side.is_open());
        assert!(!platform_side.deliver_error("gps lost"));

        assert!(matches!(rx.try_recv(), Ok(LocationEvent::Fix(_))));
        assert!(rx.try_recv().is_err());
    }
}
