// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Location stream adapter.
//
// Wraps the platform's push-based location service as a two-state machine
// (Inactive / Active) feeding one unbounded event queue. The queue's single
// consumer is whoever attached the session; fixes and errors land there as
// they arrive, independent of command replies.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use mtmap_bridge::{LocationService, LocationSink};
use mtmap_core::LocationPolicy;
use mtmap_core::error::{MtMapError, Result};
use mtmap_core::types::{Authorization, LocationEvent, LocationFix, SubscriptionHandle};

enum State {
    Inactive,
    Active {
        handle: SubscriptionHandle,
        sink: LocationSink,
    },
}

/// The session's one continuous location subscription.
pub struct LocationStream {
    service: Arc<dyn LocationService>,
    policy: LocationPolicy,
    events: mpsc::UnboundedSender<LocationEvent>,
    state: State,
    /// Subscriptions whose unsubscribe failed. Their sinks are closed, but
    /// the platform may still hold them until a retry succeeds.
    orphaned: Vec<SubscriptionHandle>,
}

impl LocationStream {
    pub fn new(
        service: Arc<dyn LocationService>,
        policy: LocationPolicy,
        events: mpsc::UnboundedSender<LocationEvent>,
    ) -> Self {
        Self {
            service,
            policy,
            events,
            state: State::Inactive,
            orphaned: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, State::Active { .. })
    }

    /// Subscribe to continuous fixes.
    ///
    /// Starting while already active succeeds without a second underlying
    /// subscription.
    #[instrument(skip(self))]
    pub fn start(&mut self) -> Result<()> {
        if self.is_active() {
            debug!("location updates already active");
            return Ok(());
        }
        self.release_orphans()?;
        self.ensure_access()?;

        let sink = LocationSink::new(self.events.clone());
        let handle = self.service.subscribe(&self.policy, sink.clone())?;
        self.state = State::Active { handle, sink };
        info!(
            handle = handle.0,
            accuracy = ?self.policy.accuracy,
            interval_ms = self.policy.interval_ms,
            "location updates started"
        );
        Ok(())
    }

    /// Unsubscribe. Stopping while inactive only retries earlier failed
    /// unsubscribes.
    ///
    /// The sink is closed before the platform is told to unsubscribe, so a
    /// callback racing with the unsubscribe cannot emit another event. If the
    /// platform refuses, the handle is kept and retried before the next
    /// subscribe.
    #[instrument(skip(self))]
    pub fn stop(&mut self) -> Result<()> {
        let State::Active { handle, sink } = std::mem::replace(&mut self.state, State::Inactive)
        else {
            return self.release_orphans();
        };
        sink.close();
        if let Err(e) = self.service.unsubscribe(handle) {
            warn!(handle = handle.0, error = %e, "location unsubscribe failed; will retry");
            self.orphaned.push(handle);
            return Err(e);
        }
        info!(handle = handle.0, "location updates stopped");
        Ok(())
    }

    fn release_orphans(&mut self) -> Result<()> {
        while let Some(&handle) = self.orphaned.last() {
            self.service.unsubscribe(handle)?;
            self.orphaned.pop();
            info!(handle = handle.0, "stale location subscription released");
        }
        Ok(())
    }

    /// Stop on session detach. Failures are logged, never returned.
    pub fn force_stop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "best-effort location unsubscribe failed");
        }
    }

    /// Prepare a single on-demand fix, independent of the subscription.
    ///
    /// Access is checked now; the returned future resolves to the fix, or to
    /// `ServiceUnavailable` if the platform gives up or the configured
    /// timeout passes first. It never substitutes a made-up position.
    pub fn one_shot(&self) -> Result<impl Future<Output = Result<LocationFix>> + Send + 'static> {
        self.ensure_access()?;
        let request = self.service.request_one_shot();
        let timeout = Duration::from_millis(self.policy.one_shot_timeout_ms);
        Ok(async move {
            match tokio::time::timeout(timeout, request).await {
                Ok(result) => result,
                Err(_) => Err(MtMapError::ServiceUnavailable(format!(
                    "no location fix within {} ms",
                    timeout.as_millis()
                ))),
            }
        })
    }

    fn ensure_access(&self) -> Result<()> {
        if !self.service.is_enabled() {
            return Err(MtMapError::ServiceUnavailable(
                "location services are disabled".into(),
            ));
        }
        match self.service.authorization() {
            Authorization::Granted => Ok(()),
            Authorization::Denied => Err(MtMapError::PermissionDenied(
                "location access is not authorized".into(),
            )),
            Authorization::NotDetermined => {
                debug!("requesting location authorization");
                self.service.request_authorization()?;
                if self.service.authorization() == Authorization::Denied {
                    return Err(MtMapError::PermissionDenied(
                        "location access was refused".into(),
                    ));
                }
                Ok(())
            }
        }
    }
}

impl Drop for LocationStream {
    fn drop(&mut self) {
        if self.is_active() || !self.orphaned.is_empty() {
            self.force_stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeLocation;

    fn stream(location: &Arc<FakeLocation>) -> (LocationStream, mpsc::UnboundedReceiver<LocationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let policy = LocationPolicy {
            one_shot_timeout_ms: 20,
            ..LocationPolicy::default()
        };
        let service = Arc::clone(location) as Arc<dyn LocationService>;
        (LocationStream::new(service, policy, tx), rx)
    }

    #[test]
    fn double_start_subscribes_once() {
        let location = Arc::new(FakeLocation::new());
        let (mut stream, _rx) = stream(&location);
        stream.start().unwrap();
        stream.start().unwrap();
        assert!(stream.is_active());
        assert_eq!(location.subscribe_calls(), 1);
    }

    #[test]
    fn stop_is_idempotent() {
        let location = Arc::new(FakeLocation::new());
        let (mut stream, _rx) = stream(&location);
        stream.stop().unwrap();
        stream.start().unwrap();
        stream.stop().unwrap();
        stream.stop().unwrap();
        assert!(!stream.is_active());
        assert_eq!(location.unsubscribe_calls(), 1);
    }

    #[test]
    fn failed_unsubscribe_is_retried_before_resubscribing() {
        let location = Arc::new(FakeLocation::new());
        let (mut stream, _rx) = stream(&location);
        stream.start().unwrap();

        location.fail_next_unsubscribe();
        assert_eq!(stream.stop().unwrap_err().code(), "BRIDGE_ERROR");
        assert!(!stream.is_active());
        assert_eq!(location.live_subscriptions(), 1);

        stream.start().unwrap();
        assert_eq!(location.live_subscriptions(), 1);
        stream.stop().unwrap();
        assert_eq!(location.live_subscriptions(), 0);
    }

    #[test]
    fn stop_while_inactive_retries_a_failed_unsubscribe() {
        let location = Arc::new(FakeLocation::new());
        let (mut stream, _rx) = stream(&location);
        stream.start().unwrap();
        location.fail_next_unsubscribe();
        assert!(stream.stop().is_err());

        location.fail_next_unsubscribe();
        assert!(stream.start().is_err());
        assert_eq!(location.subscribe_calls(), 1);

        stream.stop().unwrap();
        assert_eq!(location.live_subscriptions(), 0);
    }

    #[test]
    fn fixes_flow_until_stop() {
        let location = Arc::new(FakeLocation::new());
        let (mut stream, mut rx) = stream(&location);
        stream.start().unwrap();

        assert!(location.push_fix(LocationFix::new(39.90, 116.40, 8.0)));
        assert!(location.push_error("gps signal lost"));
        // An error does not end the subscription.
        assert!(stream.is_active());

        stream.stop().unwrap();
        assert!(!location.push_fix(LocationFix::new(39.91, 116.41, 8.0)));

        match rx.try_recv().unwrap() {
            LocationEvent::Fix(fix) => {
                assert_eq!((fix.latitude, fix.longitude, fix.accuracy), (39.90, 116.40, 8.0));
            }
            other => panic!("expected a fix, got {other:?}"),
        }
        assert_eq!(rx.try_recv().unwrap(), LocationEvent::Error("gps signal lost".into()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn access_failures_are_classified() {
        let location = Arc::new(FakeLocation::new());
        let (mut stream, _rx) = stream(&location);

        location.set_enabled(false);
        assert_eq!(stream.start().unwrap_err().code(), "SERVICE_UNAVAILABLE");

        location.set_enabled(true);
        location.set_authorization(Authorization::Denied);
        assert_eq!(stream.start().unwrap_err().code(), "PERMISSION_DENIED");
        assert_eq!(location.subscribe_calls(), 0);
    }

    #[test]
    fn undetermined_access_is_requested_first() {
        let location = Arc::new(FakeLocation::new());
        let (mut stream, _rx) = stream(&location);
        location.set_authorization(Authorization::NotDetermined);
        stream.start().unwrap();
        assert_eq!(location.authorization_requests(), 1);
        assert_eq!(location.subscribe_calls(), 1);
    }

    #[tokio::test]
    async fn one_shot_times_out_instead_of_inventing_a_fix() {
        let location = Arc::new(FakeLocation::new());
        let (stream, _rx) = stream(&location);
        location.set_one_shot(None);
        let err = stream.one_shot().unwrap().await.unwrap_err();
        assert_eq!(err.code(), "SERVICE_UNAVAILABLE");

        location.set_one_shot(Some(LocationFix::new(31.23, 121.47, 12.0)));
        let fix = stream.one_shot().unwrap().await.unwrap();
        assert_eq!(fix.latitude, 31.23);
    }
}
