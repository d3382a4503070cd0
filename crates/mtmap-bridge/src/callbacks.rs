// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Callback bookkeeping shared by the native adapters.
//
// The Android and iOS location APIs report back through callbacks on threads
// the bridge does not own. Each adapter hands the platform a plain integer
// token and keeps the Rust-side endpoint here, so an `extern` callback only
// needs the token to route the result home.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::oneshot;
use tracing::debug;

use mtmap_core::error::{MtMapError, Result};
use mtmap_core::types::{LocationFix, SubscriptionHandle};

use crate::sink::LocationSink;
use crate::traits::BoxFuture;

/// Outstanding request/response pairs keyed by token.
pub struct PendingRequests<T> {
    next: AtomicU64,
    waiting: Mutex<HashMap<u64, oneshot::Sender<Result<T>>>>,
}

impl<T: Send + 'static> PendingRequests<T> {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            waiting: Mutex::new(HashMap::new()),
        }
    }

    /// Reserve a token and the future that resolves when it completes.
    ///
    /// If the platform drops the request without answering, the future
    /// resolves to `ServiceUnavailable`.
    pub fn begin(&self, what: &'static str) -> (u64, BoxFuture<'static, Result<T>>) {
        let token = self.next.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.lock().insert(token, tx);
        let fut = Box::pin(async move {
            rx.await.unwrap_or_else(|_| {
                Err(MtMapError::ServiceUnavailable(format!("{what} request abandoned")))
            })
        });
        (token, fut)
    }

    /// Resolve a token. Unknown tokens (late or duplicate callbacks) are
    /// ignored.
    pub fn complete(&self, token: u64, result: Result<T>) -> bool {
        match self.lock().remove(&token) {
            Some(tx) => tx.send(result).is_ok(),
            None => {
                debug!(token, "callback for unknown request token");
                false
            }
        }
    }

    /// Drop a token without answering, e.g. when dispatching the native
    /// request itself failed.
    pub fn cancel(&self, token: u64) {
        self.lock().remove(&token);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<Result<T>>>> {
        self.waiting.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Send + 'static> Default for PendingRequests<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Every callback endpoint a native adapter needs.
pub struct CallbackRegistry {
    next_subscription: AtomicU64,
    subscriptions: Mutex<HashMap<u64, LocationSink>>,
    /// One-shot location fixes.
    pub fixes: PendingRequests<LocationFix>,
    /// Search/routing results, as JSON text produced by the platform side.
    pub payloads: PendingRequests<String>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self {
            next_subscription: AtomicU64::new(1),
            subscriptions: Mutex::new(HashMap::new()),
            fixes: PendingRequests::new(),
            payloads: PendingRequests::new(),
        }
    }

    /// Keep `sink` reachable from native callbacks under a fresh handle.
    pub fn register_subscription(&self, sink: LocationSink) -> SubscriptionHandle {
        let token = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.subscriptions().insert(token, sink);
        SubscriptionHandle(token)
    }

    /// Forget a subscription and close its sink.
    pub fn remove_subscription(&self, handle: SubscriptionHandle) -> bool {
        match self.subscriptions().remove(&handle.0) {
            Some(sink) => {
                sink.close();
                true
            }
            None => false,
        }
    }

    pub fn on_fix(&self, handle: u64, fix: LocationFix) -> bool {
        self.sink(handle).is_some_and(|s| s.deliver_fix(fix))
    }

    pub fn on_error(&self, handle: u64, description: String) -> bool {
        self.sink(handle).is_some_and(|s| s.deliver_error(description))
    }

    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions().len()
    }

    fn sink(&self, handle: u64) -> Option<LocationSink> {
        self.subscriptions().get(&handle).cloned()
    }

    fn subscriptions(&self) -> std::sync::MutexGuard<'_, HashMap<u64, LocationSink>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtmap_core::types::LocationEvent;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn one_shot_resolves_through_token() {
        let registry = CallbackRegistry::new();
        let (token, fut) = registry.fixes.begin("location");
        assert_eq!(registry.fixes.len(), 1);
        assert!(registry.fixes.complete(token, Ok(LocationFix::new(39.9, 116.4, 5.0))));
        let fix = fut.await.unwrap();
        assert_eq!(fix.latitude, 39.9);
        assert!(registry.fixes.is_empty());
        // A late duplicate callback is harmless.
        assert!(!registry.fixes.complete(token, Ok(LocationFix::new(0.0, 0.0, 1.0))));
    }

    #[tokio::test]
    async fn cancelled_request_reports_unavailable() {
        let registry = CallbackRegistry::new();
        let (token, fut) = registry.payloads.begin("search");
        registry.payloads.cancel(token);
        let err = fut.await.unwrap_err();
        assert_eq!(err.code(), "SERVICE_UNAVAILABLE");
    }

    #[test]
    fn removed_subscription_stops_routing() {
        let registry = CallbackRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = registry.register_subscription(LocationSink::new(tx));
        assert!(registry.on_fix(handle.0, LocationFix::new(1.0, 2.0, 3.0)));
        assert!(registry.remove_subscription(handle));
        assert!(!registry.on_error(handle.0, "late".into()));
        assert_eq!(registry.active_subscriptions(), 0);
        assert!(matches!(rx.try_recv(), Ok(LocationEvent::Fix(_))));
        assert!(rx.try_recv().is_err());
    }
}
