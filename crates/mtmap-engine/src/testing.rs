// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-crate fakes for the platform collaborators, used by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use mtmap_bridge::{
    BoxFuture, LocationService, LocationSink, MapRenderer, MapSurfaceFactory, PlatformBridge,
    SearchService,
};
use mtmap_core::LocationPolicy;
use mtmap_core::error::{MtMapError, Result};
use mtmap_core::types::{
    Authorization, LatLng, LocationFix, MapControl, MapStyle, Overlay, OverlayId, Place,
    PlaceQuery, Route, RouteRequest, SubscriptionHandle, ViewId, ViewSize,
};

/// One call a fake renderer received, tagged with its surface label.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOp {
    Init(String),
    Show(String),
    Hide(String),
    Center(String, LatLng),
    Zoom(String, f64),
    Add(String, OverlayId),
    Remove(String, OverlayId),
    Animate(String, LatLng, Option<f64>, Duration),
    Style(String),
    Control(String, MapControl, bool),
    Resize(String, ViewSize),
    Release(String),
}

/// A renderer call parked until the test lets it go.
struct Hold {
    entered: mpsc::Sender<()>,
    release: mpsc::Receiver<()>,
}

#[derive(Clone, Default)]
pub struct FakeSurfaces {
    journal: Arc<Mutex<Vec<RenderOp>>>,
    fail_next: Arc<AtomicBool>,
    hold_next: Arc<Mutex<Option<Hold>>>,
}

impl FakeSurfaces {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn journal(&self) -> Vec<RenderOp> {
        self.journal.lock().unwrap().clone()
    }

    /// Make the next renderer call (on any surface) fail with a bridge error.
    pub fn fail_next_render_call(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Block the next renderer call (on any surface) on its worker thread.
    /// The first receiver fires once the call is parked; sending on the
    /// returned sender lets it finish.
    pub fn hold_next_render_call(&self) -> (mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        *self.hold_next.lock().unwrap() = Some(Hold {
            entered: entered_tx,
            release: release_rx,
        });
        (entered_rx, release_tx)
    }

    fn renderer(&self, label: String) -> Box<dyn MapRenderer> {
        Box::new(FakeRenderer {
            label,
            journal: Arc::clone(&self.journal),
            fail_next: Arc::clone(&self.fail_next),
            hold_next: Arc::clone(&self.hold_next),
        })
    }
}

impl MapSurfaceFactory for FakeSurfaces {
    fn global_surface(&self) -> Result<Box<dyn MapRenderer>> {
        Ok(self.renderer("global".into()))
    }

    fn create_surface(&self, view_id: ViewId) -> Result<Box<dyn MapRenderer>> {
        Ok(self.renderer(format!("view {view_id}")))
    }
}

struct FakeRenderer {
    label: String,
    journal: Arc<Mutex<Vec<RenderOp>>>,
    fail_next: Arc<AtomicBool>,
    hold_next: Arc<Mutex<Option<Hold>>>,
}

impl FakeRenderer {
    fn record(&self, op: impl FnOnce(String) -> RenderOp) -> Result<()> {
        let hold = self.hold_next.lock().unwrap().take();
        if let Some(hold) = hold {
            let _ = hold.entered.send(());
            let _ = hold.release.recv();
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(MtMapError::Bridge(format!("{} detached", self.label)));
        }
        self.journal.lock().unwrap().push(op(self.label.clone()));
        Ok(())
    }
}

impl MapRenderer for FakeRenderer {
    fn render_init(&mut self, _api_key: &str) -> Result<()> {
        self.record(RenderOp::Init)
    }

    fn show(&mut self) -> Result<()> {
        self.record(RenderOp::Show)
    }

    fn hide(&mut self) -> Result<()> {
        self.record(RenderOp::Hide)
    }

    fn set_center(&mut self, center: LatLng) -> Result<()> {
        self.record(|l| RenderOp::Center(l, center))
    }

    fn set_zoom(&mut self, level: f64) -> Result<()> {
        self.record(|l| RenderOp::Zoom(l, level))
    }

    fn add_overlay(&mut self, id: OverlayId, _overlay: &Overlay) -> Result<()> {
        self.record(|l| RenderOp::Add(l, id))
    }

    fn remove_overlay(&mut self, id: OverlayId) -> Result<()> {
        self.record(|l| RenderOp::Remove(l, id))
    }

    fn animate_to(&mut self, target: LatLng, zoom: Option<f64>, duration: Duration) -> Result<()> {
        self.record(|l| RenderOp::Animate(l, target, zoom, duration))
    }

    fn apply_style(&mut self, _style: &MapStyle) -> Result<()> {
        self.record(RenderOp::Style)
    }

    fn set_control(&mut self, control: MapControl, enabled: bool) -> Result<()> {
        self.record(|l| RenderOp::Control(l, control, enabled))
    }

    fn resize(&mut self, size: ViewSize) -> Result<()> {
        self.record(|l| RenderOp::Resize(l, size))
    }

    fn release(&mut self) {
        self.journal
            .lock()
            .unwrap()
            .push(RenderOp::Release(self.label.clone()));
    }
}

/// Scriptable location service.
pub struct FakeLocation {
    enabled: AtomicBool,
    authorization: Mutex<Authorization>,
    grant_on_request: AtomicBool,
    authorization_requests: AtomicUsize,
    subscribes: AtomicUsize,
    unsubscribes: AtomicUsize,
    live: AtomicUsize,
    fail_unsubscribe: AtomicBool,
    next_handle: AtomicU64,
    active: Mutex<Option<(SubscriptionHandle, LocationSink)>>,
    one_shot: Mutex<Option<LocationFix>>,
}

impl FakeLocation {
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            authorization: Mutex::new(Authorization::Granted),
            grant_on_request: AtomicBool::new(true),
            authorization_requests: AtomicUsize::new(0),
            subscribes: AtomicUsize::new(0),
            unsubscribes: AtomicUsize::new(0),
            live: AtomicUsize::new(0),
            fail_unsubscribe: AtomicBool::new(false),
            next_handle: AtomicU64::new(1),
            active: Mutex::new(None),
            one_shot: Mutex::new(None),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn set_authorization(&self, state: Authorization) {
        *self.authorization.lock().unwrap() = state;
    }

    /// Whether `request_authorization` flips the state to `Granted`.
    pub fn set_grant_on_request(&self, grant: bool) {
        self.grant_on_request.store(grant, Ordering::SeqCst);
    }

    /// The fix the next one-shot request answers with. `None` never answers.
    pub fn set_one_shot(&self, fix: Option<LocationFix>) {
        *self.one_shot.lock().unwrap() = fix;
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }

    /// Subscriptions the platform still considers live.
    pub fn live_subscriptions(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Make the next `unsubscribe` fail, leaving its subscription live.
    pub fn fail_next_unsubscribe(&self) {
        self.fail_unsubscribe.store(true, Ordering::SeqCst);
    }

    pub fn authorization_requests(&self) -> usize {
        self.authorization_requests.load(Ordering::SeqCst)
    }

    /// Simulate the hardware reporting a fix. Also fires after unsubscribe,
    /// like a platform callback racing with `removeLocationUpdates`.
    pub fn push_fix(&self, fix: LocationFix) -> bool {
        self.sink().is_some_and(|sink| sink.deliver_fix(fix))
    }

    pub fn push_error(&self, description: &str) -> bool {
        self.sink().is_some_and(|sink| sink.deliver_error(description))
    }

    fn sink(&self) -> Option<LocationSink> {
        self.active.lock().unwrap().as_ref().map(|(_, sink)| sink.clone())
    }
}

impl LocationService for FakeLocation {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn authorization(&self) -> Authorization {
        *self.authorization.lock().unwrap()
    }

    fn request_authorization(&self) -> Result<()> {
        self.authorization_requests.fetch_add(1, Ordering::SeqCst);
        if self.grant_on_request.load(Ordering::SeqCst) {
            self.set_authorization(Authorization::Granted);
        }
        Ok(())
    }

    fn request_one_shot(&self) -> BoxFuture<'static, Result<LocationFix>> {
        match *self.one_shot.lock().unwrap() {
            Some(fix) => Box::pin(async move { Ok(fix) }),
            None => Box::pin(std::future::pending()),
        }
    }

    fn subscribe(&self, _policy: &LocationPolicy, sink: LocationSink) -> Result<SubscriptionHandle> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        // Keep the sink around after unsubscribe so late pushes can be tested.
        *self.active.lock().unwrap() = Some((handle, sink));
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()> {
        if self.fail_unsubscribe.swap(false, Ordering::SeqCst) {
            return Err(MtMapError::Bridge(format!("unsubscribe {} refused", handle.0)));
        }
        self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Search backend answering with canned results.
#[derive(Default)]
pub struct FakeSearch {
    pub places: Vec<Place>,
}

impl SearchService for FakeSearch {
    fn calculate_route(&self, request: RouteRequest) -> BoxFuture<'static, Result<Route>> {
        Box::pin(async move {
            Ok(Route {
                start: request.start,
                end: request.end,
                transport_mode: request.mode,
                distance: 1200.0,
                duration: 300.0,
                points: vec![request.start, request.end],
            })
        })
    }

    fn search_nearby(&self, query: PlaceQuery) -> BoxFuture<'static, Result<Vec<Place>>> {
        let places: Vec<Place> = self
            .places
            .iter()
            .filter(|p| match &query.keyword {
                Some(k) => p.name.contains(k.as_str()),
                None => true,
            })
            .cloned()
            .collect();
        Box::pin(async move { Ok(places) })
    }
}

/// A whole platform built from the fakes above.
pub struct FakePlatform {
    pub surfaces: FakeSurfaces,
    pub location: Arc<FakeLocation>,
    pub search: Arc<FakeSearch>,
}

impl FakePlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            surfaces: FakeSurfaces::new(),
            location: Arc::new(FakeLocation::new()),
            search: Arc::new(FakeSearch {
                places: vec![Place {
                    name: "Wangfujing Bookstore".into(),
                    position: LatLng::new(39.912, 116.411),
                    address: Some("218 Wangfujing St".into()),
                    distance: Some(640.0),
                }],
            }),
        })
    }
}

impl PlatformBridge for FakePlatform {
    fn platform_name(&self) -> &str {
        "Fake"
    }

    fn surfaces(&self) -> Arc<dyn MapSurfaceFactory> {
        Arc::new(self.surfaces.clone())
    }

    fn location(&self) -> Arc<dyn LocationService> {
        Arc::clone(&self.location) as Arc<dyn LocationService>
    }

    fn search(&self) -> Arc<dyn SearchService> {
        Arc::clone(&self.search) as Arc<dyn SearchService>
    }
}
