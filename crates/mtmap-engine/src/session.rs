// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bridge session: everything one plugin attachment owns.
//
// `attach` builds a fresh session (global channel, global overlay registry,
// no views, inactive location stream) and hands back the single consumer of
// its location events. `detach` tears all of it down; nothing carries over
// into the next attach.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use mtmap_bridge::PlatformBridge;
use mtmap_core::BridgeConfig;
use mtmap_core::error::{MtMapError, Result};
use mtmap_core::types::{CreationParams, LocationEvent, SessionId, ViewId};

use crate::channel::ChannelHandle;
use crate::controller::MapController;
use crate::dispatcher::{Dispatcher, GlobalServices};
use crate::location::LocationStream;
use crate::protocol::{MethodCall, Reply};
use crate::view::ViewManager;

pub struct BridgeSession {
    id: SessionId,
    config: Arc<BridgeConfig>,
    platform_name: String,
    global: ChannelHandle,
    global_task: Mutex<Option<JoinHandle<()>>>,
    location: Arc<Mutex<LocationStream>>,
    views: Mutex<ViewManager>,
    detached: AtomicBool,
}

impl BridgeSession {
    /// Start a session on `platform`. Must be called inside a tokio runtime.
    ///
    /// The receiver yields every location fix and error the session's
    /// subscription produces; convert with [`crate::protocol::Event::from`]
    /// to put them on the wire.
    #[instrument(skip_all, fields(platform = platform.platform_name()))]
    pub fn attach(
        platform: Arc<dyn PlatformBridge>,
        config: BridgeConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<LocationEvent>)> {
        let id = SessionId::new();
        let config = Arc::new(config);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let location = Arc::new(Mutex::new(LocationStream::new(
            platform.location(),
            config.location,
            events_tx,
        )));
        let surfaces = platform.surfaces();
        let map = MapController::new(
            config.channel_name.clone(),
            surfaces.global_surface()?,
            config.default_zoom,
        );
        let dispatcher = Dispatcher::global(
            map,
            GlobalServices {
                platform_name: platform.platform_name().to_string(),
                location: Arc::clone(&location),
                search: platform.search(),
            },
            Arc::clone(&config),
        );
        let (global, global_task) = ChannelHandle::spawn(
            config.channel_name.clone(),
            dispatcher,
            config.command_queue_depth,
        );

        info!(session = %id, channel = global.name(), view_type = %config.view_type, "bridge session attached");
        let session = Self {
            id,
            platform_name: platform.platform_name().to_string(),
            views: Mutex::new(ViewManager::new(surfaces, Arc::clone(&config))),
            config,
            global,
            global_task: Mutex::new(Some(global_task)),
            location,
            detached: AtomicBool::new(false),
        };
        Ok((session, events_rx))
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn platform_name(&self) -> &str {
        &self.platform_name
    }

    /// Type name to register with the host's view factory registry.
    pub fn view_type(&self) -> &str {
        &self.config.view_type
    }

    pub fn global_channel(&self) -> &ChannelHandle {
        &self.global
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    pub async fn location_active(&self) -> bool {
        self.location.lock().await.is_active()
    }

    // -- Commands -----------------------------------------------------------

    /// Send a command on the session-global channel.
    pub async fn call(&self, call: MethodCall) -> Reply {
        if self.is_detached() {
            return Reply::from_error(&Self::closed());
        }
        self.global.call(call).await
    }

    /// Send a command on one view's channel.
    pub async fn call_view(&self, id: ViewId, call: MethodCall) -> Reply {
        if self.is_detached() {
            return Reply::from_error(&Self::closed());
        }
        // The manager lock is not held while the view works on the call.
        let channel = match self.views.lock().await.channel(id) {
            Ok(channel) => channel,
            Err(e) => return Reply::from_error(&e),
        };
        channel.call(call).await
    }

    /// Route by channel name: the global name or `<prefix><viewId>`.
    pub async fn call_channel(&self, channel: &str, call: MethodCall) -> Reply {
        if channel == self.config.channel_name {
            return self.call(call).await;
        }
        match self.config.parse_view_channel(channel) {
            Some(id) => self.call_view(id, call).await,
            None => Reply::from_error(&MtMapError::NotFound(format!("channel {channel}"))),
        }
    }

    // -- View lifecycle (host UI callbacks) --------------------------------

    /// `onCreate`: mount a view. Returns its channel name.
    pub async fn create_view(&self, id: ViewId, params: CreationParams) -> Result<String> {
        self.ensure_attached()?;
        let channel = self.views.lock().await.create(id, params)?;
        Ok(channel.name().to_string())
    }

    /// `onResize`. The manager lock is released before the view applies it.
    pub async fn resize_view(&self, id: ViewId, width: f64, height: f64) -> Result<()> {
        self.ensure_attached()?;
        let (channel, size) = self.views.lock().await.resize_target(id, width, height)?;
        channel.resize(size).await
    }

    /// `onDispose`. The view leaves the live set at once; other views keep
    /// answering while it drains its queue and releases its surface.
    pub async fn dispose_view(&self, id: ViewId) -> Result<()> {
        self.ensure_attached()?;
        let view = self.views.lock().await.remove(id)?;
        view.shut_down().await;
        Ok(())
    }

    pub async fn live_views(&self) -> Vec<ViewId> {
        self.views.lock().await.ids()
    }

    // -- Detach -------------------------------------------------------------

    /// Tear the session down: stop location updates (best effort), dispose
    /// every view, close the global channel. Idempotent.
    #[instrument(skip(self), fields(session = %self.id))]
    pub async fn detach(&self) {
        if self.detached.swap(true, Ordering::AcqRel) {
            return;
        }
        self.location.lock().await.force_stop();
        self.views.lock().await.dispose_all().await;
        self.global.close().await;
        if let Some(task) = self.global_task.lock().await.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "global channel task failed");
            }
        }
        info!("bridge session detached");
    }

    fn ensure_attached(&self) -> Result<()> {
        if self.is_detached() {
            return Err(Self::closed());
        }
        Ok(())
    }

    fn closed() -> MtMapError {
        MtMapError::ServiceUnavailable("channel closed".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Event;
    use crate::testing::{FakePlatform, RenderOp};
    use mtmap_core::types::{LocationFix, OverlayId};
    use serde_json::json;

    async fn attach() -> (
        Arc<FakePlatform>,
        BridgeSession,
        mpsc::UnboundedReceiver<LocationEvent>,
    ) {
        let platform = FakePlatform::new();
        let (session, events) =
            BridgeSession::attach(Arc::clone(&platform) as Arc<dyn PlatformBridge>, BridgeConfig::default())
                .unwrap();
        (platform, session, events)
    }

    fn marker() -> MethodCall {
        MethodCall::new("addMarker", json!({"latitude": 39.9, "longitude": 116.4}))
    }

    #[tokio::test]
    async fn view_and_global_registries_are_disjoint() {
        let (platform, session, _events) = attach().await;
        session.create_view(ViewId(7), CreationParams::default()).await.unwrap();

        assert_eq!(session.call(marker()).await, Reply::success(1));
        assert_eq!(session.call_view(ViewId(7), marker()).await, Reply::success(1));
        assert_eq!(session.call_view(ViewId(7), marker()).await, Reply::success(2));

        // Handle 2 exists only on the view, so the global channel has nothing
        // to remove.
        let remove = |id: i64| MethodCall::new("removeMarker", json!({"markerId": id}));
        assert_eq!(session.call(remove(2)).await, Reply::success(true));
        assert!(!platform.surfaces.journal().contains(&RenderOp::Remove("global".into(), OverlayId(2))));

        // Removing global handle 1 leaves the view's handle 1 in place.
        session.call(remove(1)).await;
        assert!(!platform.surfaces.journal().contains(&RenderOp::Remove("view 7".into(), OverlayId(1))));

        session.call_channel("mt_map_widget_7", remove(1)).await;
        let journal = platform.surfaces.journal();
        assert!(journal.contains(&RenderOp::Remove("global".into(), OverlayId(1))));
        assert!(journal.contains(&RenderOp::Remove("view 7".into(), OverlayId(1))));
        session.detach().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn disposing_a_busy_view_does_not_stall_other_views() {
        let (platform, session, _events) = attach().await;
        let session = Arc::new(session);
        session.create_view(ViewId(1), CreationParams::default()).await.unwrap();
        session.create_view(ViewId(2), CreationParams::default()).await.unwrap();

        // View 1's channel gets stuck inside the renderer with a call in hand.
        let (entered, release) = platform.surfaces.hold_next_render_call();
        let busy = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.call_view(ViewId(1), marker()).await })
        };
        entered.recv().unwrap();

        let disposing = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.dispose_view(ViewId(1)).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!disposing.is_finished());

        let reply = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            session.call_view(ViewId(2), marker()),
        )
        .await
        .expect("view 2 stalled behind the dispose of view 1");
        assert_eq!(reply, Reply::success(1));
        assert_eq!(session.live_views().await, vec![ViewId(2)]);

        release.send(()).unwrap();
        assert_eq!(busy.await.unwrap(), Reply::success(1));
        disposing.await.unwrap().unwrap();
        assert!(platform.surfaces.journal().contains(&RenderOp::Release("view 1".into())));
        session.detach().await;
    }

    #[tokio::test]
    async fn location_events_reach_the_consumer_once() {
        let (platform, session, mut events) = attach().await;
        let start = MethodCall::bare("startLocationUpdates");
        assert_eq!(session.call(start.clone()).await, Reply::success(true));
        assert_eq!(session.call(start).await, Reply::success(true));
        assert_eq!(platform.location.subscribe_calls(), 1);

        platform.location.push_fix(LocationFix::new(39.90, 116.40, 8.0));
        let event = Event::from(events.recv().await.unwrap());
        assert_eq!(
            event,
            Event::OnLocationUpdate {
                latitude: 39.90,
                longitude: 116.40,
                accuracy: 8.0
            }
        );

        assert_eq!(
            session.call(MethodCall::bare("stopLocationUpdates")).await,
            Reply::success(true)
        );
        assert!(!platform.location.push_fix(LocationFix::new(39.91, 116.41, 8.0)));
        assert!(events.try_recv().is_err());
        session.detach().await;
    }

    #[tokio::test]
    async fn unknown_view_is_not_found() {
        let (_platform, session, _events) = attach().await;
        let reply = session.call_view(ViewId(99), marker()).await;
        assert_eq!(reply.error_code(), Some("NOT_FOUND"));
        let reply = session.call_channel("somewhere_else", marker()).await;
        assert_eq!(reply.error_code(), Some("NOT_FOUND"));
        session.detach().await;
    }

    #[tokio::test]
    async fn detach_releases_everything() {
        let (platform, session, _events) = attach().await;
        session.create_view(ViewId(1), CreationParams::default()).await.unwrap();
        session.create_view(ViewId(2), CreationParams::default()).await.unwrap();
        session.call(MethodCall::bare("startLocationUpdates")).await;

        session.detach().await;
        session.detach().await;

        assert!(session.is_detached());
        assert!(!session.location_active().await);
        assert_eq!(platform.location.unsubscribe_calls(), 1);
        assert!(session.live_views().await.is_empty());
        let journal = platform.surfaces.journal();
        for label in ["view 1", "view 2", "global"] {
            assert!(journal.contains(&RenderOp::Release(label.into())), "{label} not released");
        }

        let reply = session.call(MethodCall::bare("getPlatformVersion")).await;
        assert_eq!(reply.error_code(), Some("SERVICE_UNAVAILABLE"));
        let err = session
            .create_view(ViewId(3), CreationParams::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SERVICE_UNAVAILABLE");
    }

    #[tokio::test]
    async fn reattach_starts_empty() {
        let platform = FakePlatform::new();
        let bridge = Arc::clone(&platform) as Arc<dyn PlatformBridge>;

        let (first, _events) = BridgeSession::attach(Arc::clone(&bridge), BridgeConfig::default()).unwrap();
        first.call(marker()).await;
        first.call(marker()).await;
        first.detach().await;

        let (second, _events) = BridgeSession::attach(bridge, BridgeConfig::default()).unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(second.call(marker()).await, Reply::success(1));
        assert_eq!(
            second.call(MethodCall::bare("getPlatformVersion")).await,
            Reply::success("Fake")
        );
        second.detach().await;
    }

    #[tokio::test]
    async fn global_and_view_channels_run_concurrently() {
        let platform = FakePlatform::new();
        let mut config = BridgeConfig::default();
        config.location.one_shot_timeout_ms = 500;
        let (session, _events) =
            BridgeSession::attach(Arc::clone(&platform) as Arc<dyn PlatformBridge>, config).unwrap();
        session.create_view(ViewId(5), CreationParams::default()).await.unwrap();
        // A one-shot that never resolves parks the global channel until its
        // timeout; the view channel must keep answering meanwhile.
        let session = Arc::new(session);
        let parked = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.call(MethodCall::bare("getCurrentLocation")).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(session.call_view(ViewId(5), marker()).await, Reply::success(1));
        assert!(!parked.is_finished());
        let reply = parked.await.unwrap();
        assert_eq!(reply.error_code(), Some("SERVICE_UNAVAILABLE"));
        session.detach().await;
    }
}
