// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command dispatcher: method call in, exactly one reply out.
//
// Order of checks for every call:
//   1. resolve the method name           (unknown       -> notImplemented)
//   2. channel scope                     (global-only on a view -> notImplemented)
//   3. lifecycle precondition            (showMap before initialize -> NOT_INITIALIZED)
//   4. argument schema                   (-> INVALID_ARGUMENT naming the fields)
//   5. the handler                       (unclassified failures -> <METHOD>_ERROR)

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, error};

use mtmap_bridge::SearchService;
use mtmap_core::BridgeConfig;
use mtmap_core::error::{MtMapError, Result};
use mtmap_core::types::{
    Argb, MapControl, MapStyle, Marker, Overlay, OverlayId, OverlayKind, PlaceQuery, Polygon,
    Polyline, RouteRequest, TransportMode, ViewId, ViewSize,
};

use crate::controller::MapController;
use crate::location::LocationStream;
use crate::protocol::{Args, Method, MethodCall, Reply};

/// Services only the session-global channel can reach.
pub struct GlobalServices {
    pub platform_name: String,
    pub location: Arc<Mutex<LocationStream>>,
    pub search: Arc<dyn SearchService>,
}

enum Scope {
    Global(GlobalServices),
    View(ViewId),
}

/// Routes commands for one channel against that channel's map surface.
pub struct Dispatcher {
    scope: Scope,
    map: MapController,
    config: Arc<BridgeConfig>,
}

impl Dispatcher {
    pub fn global(map: MapController, services: GlobalServices, config: Arc<BridgeConfig>) -> Self {
        Self {
            scope: Scope::Global(services),
            map,
            config,
        }
    }

    pub fn view(view_id: ViewId, map: MapController, config: Arc<BridgeConfig>) -> Self {
        Self {
            scope: Scope::View(view_id),
            map,
            config,
        }
    }

    pub fn map(&self) -> &MapController {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut MapController {
        &mut self.map
    }

    fn channel_label(&self) -> String {
        match &self.scope {
            Scope::Global(_) => self.config.channel_name.clone(),
            Scope::View(id) => self.config.view_channel_name(*id),
        }
    }

    /// Handle one call. Never fails; every outcome is a [`Reply`].
    pub async fn dispatch(&mut self, call: MethodCall) -> Reply {
        let Some(method) = Method::from_name(&call.method) else {
            debug!(channel = %self.channel_label(), method = %call.method, "unknown method");
            return Reply::not_implemented();
        };
        if method.is_global_only() && matches!(self.scope, Scope::View(_)) {
            debug!(channel = %self.channel_label(), method = method.name(), "method not offered on view channels");
            return Reply::not_implemented();
        }
        if method == Method::ShowMap && !self.map.is_initialized() {
            return Reply::from_error(&MtMapError::NotInitialized);
        }
        if let Err(e) = method.validate(&call.arguments) {
            debug!(channel = %self.channel_label(), method = method.name(), error = %e, "rejected arguments");
            return Reply::from_error(&e);
        }

        debug!(channel = %self.channel_label(), method = method.name(), "dispatch");
        let args = Args(&call.arguments);
        match self.handle(method, args).await {
            Ok(value) => Reply::success(value),
            Err(e) => {
                let (code, what) = method.failure();
                let e = e.in_operation(code, what);
                if e.is_classified() && !matches!(e, MtMapError::Operation { .. }) {
                    debug!(channel = %self.channel_label(), method = method.name(), error = %e, "command refused");
                } else {
                    error!(channel = %self.channel_label(), method = method.name(), error = %e, "command failed");
                }
                Reply::from_error(&e)
            }
        }
    }

    async fn handle(&mut self, method: Method, args: Args<'_>) -> Result<Value> {
        match method {
            Method::GetPlatformVersion => Ok(json!(self.global_services()?.platform_name)),
            Method::Initialize => {
                self.map.initialize(args.str("apiKey")?)?;
                Ok(json!(true))
            }
            Method::ShowMap => {
                let target = args.lat_lng("latitude", "longitude")?;
                let zoom = args.opt_f64("zoom")?.or(Some(self.config.default_zoom));
                let title = args.opt_str("title")?;
                let snippet = args.opt_str("snippet")?;
                if title.is_some() || snippet.is_some() {
                    debug!(?title, ?snippet, "showMap caption");
                }
                self.map.show(target, zoom)?;
                Ok(json!(true))
            }
            Method::HideMap => {
                self.map.hide()?;
                Ok(json!(true))
            }

            Method::AddMarker => {
                let marker = Marker {
                    position: args.lat_lng("latitude", "longitude")?,
                    title: args.opt_str("title")?.map(str::to_owned),
                    snippet: args.opt_str("snippet")?.map(str::to_owned),
                    icon: args.opt_str("iconPath")?.map(str::to_owned),
                };
                self.add(Overlay::Marker(marker))
            }
            Method::AddPolyline => {
                let line = Polyline {
                    points: args.points("points")?,
                    color: Argb::from_wire(args.i64("color")?)?,
                    width: args.f64("width")?,
                    geodesic: args.opt_bool("geodesic")?.unwrap_or(true),
                };
                self.add(Overlay::Polyline(line))
            }
            Method::AddPolygon => {
                let ring = Polygon {
                    points: args.points("points")?,
                    fill_color: Argb::from_wire(args.i64("fillColor")?)?,
                    stroke_color: Argb::from_wire(args.i64("strokeColor")?)?,
                    stroke_width: args.f64("strokeWidth")?,
                };
                self.add(Overlay::Polygon(ring))
            }
            Method::RemoveMarker => self.remove(args.i64("markerId")?, OverlayKind::Marker),
            Method::RemovePolyline => self.remove(args.i64("polylineId")?, OverlayKind::Polyline),
            Method::RemovePolygon => self.remove(args.i64("polygonId")?, OverlayKind::Polygon),

            Method::SetMapCenter => {
                let target = args.lat_lng("latitude", "longitude")?;
                self.map.set_center(target, args.opt_f64("zoom")?)?;
                Ok(json!(true))
            }
            Method::AnimateCamera => {
                let target = args.lat_lng("latitude", "longitude")?;
                let millis = match args.opt_i64("duration")? {
                    Some(ms) => u64::try_from(ms)
                        .map_err(|_| MtMapError::invalid("duration must not be negative"))?,
                    None => self.config.animation_duration_ms,
                };
                self.map
                    .animate_to(target, args.opt_f64("zoom")?, Duration::from_millis(millis))?;
                Ok(json!(true))
            }
            Method::SetMapStyle => {
                let style: MapStyle = args.decode("style")?;
                self.map.apply_style(style)?;
                Ok(json!(true))
            }
            Method::EnableMyLocation => self.toggle(MapControl::MyLocation, args),
            Method::EnableMyLocationButton => self.toggle(MapControl::MyLocationButton, args),
            Method::EnableZoomControls => self.toggle(MapControl::ZoomControls, args),
            Method::EnableCompass => self.toggle(MapControl::Compass, args),
            Method::EnableScaleBar => self.toggle(MapControl::ScaleBar, args),

            Method::GetCurrentLocation => {
                let location = self.location()?;
                // The lock is released before the fix is awaited.
                let pending = location.lock().await.one_shot()?;
                let fix = pending.await?;
                Ok(json!({
                    "latitude": fix.latitude,
                    "longitude": fix.longitude,
                    "accuracy": fix.accuracy,
                }))
            }
            Method::StartLocationUpdates => {
                let location = self.location()?;
                location.lock().await.start()?;
                Ok(json!(true))
            }
            Method::StopLocationUpdates => {
                let location = self.location()?;
                location.lock().await.stop()?;
                Ok(json!(true))
            }

            Method::CalculateRoute => {
                let request = RouteRequest {
                    start: args.lat_lng("startLatitude", "startLongitude")?,
                    end: args.lat_lng("endLatitude", "endLongitude")?,
                    mode: match args.opt_str("transportMode")? {
                        Some(mode) => mode.parse::<TransportMode>()?,
                        None => TransportMode::Driving,
                    },
                };
                let pending = self.global_services()?.search.calculate_route(request);
                let route = pending.await?;
                Ok(serde_json::to_value(route)?)
            }
            Method::SearchNearby => {
                let radius = args.f64("radius")?;
                if !radius.is_finite() || radius <= 0.0 {
                    return Err(MtMapError::invalid("radius must be a positive number"));
                }
                let query = PlaceQuery {
                    center: args.lat_lng("latitude", "longitude")?,
                    radius,
                    keyword: args.opt_str("keyword")?.map(str::to_owned),
                    category: args.opt_str("category")?.map(str::to_owned),
                };
                let pending = self.global_services()?.search.search_nearby(query);
                let places = pending.await?;
                Ok(serde_json::to_value(places)?)
            }
        }
    }

    fn global_services(&self) -> Result<&GlobalServices> {
        match &self.scope {
            Scope::Global(services) => Ok(services),
            Scope::View(id) => Err(MtMapError::NotImplemented(format!(
                "global command on view {id}"
            ))),
        }
    }

    fn location(&self) -> Result<Arc<Mutex<LocationStream>>> {
        Ok(Arc::clone(&self.global_services()?.location))
    }

    fn add(&mut self, overlay: Overlay) -> Result<Value> {
        let id = self.map.add_overlay(overlay)?;
        Ok(json!(id.0))
    }

    /// Removal replies `true` whether or not the handle was live.
    fn remove(&mut self, raw: i64, kind: OverlayKind) -> Result<Value> {
        let removed = self.map.remove_overlay(OverlayId(raw), kind)?;
        debug!(overlay_id = raw, kind = kind.label(), removed, "overlay remove");
        Ok(json!(true))
    }

    fn toggle(&mut self, control: MapControl, args: Args<'_>) -> Result<Value> {
        self.map.set_control(control, args.bool("enabled")?)?;
        Ok(json!(true))
    }

    /// Apply a host-driven resize of this channel's surface.
    pub fn resize(&mut self, size: ViewSize) -> Result<()> {
        self.map.resize(size)
    }

    /// Release everything this channel owns. The global channel also stops
    /// the location subscription.
    pub async fn shutdown(&mut self) {
        if let Ok(location) = self.location() {
            location.lock().await.force_stop();
        }
        self.map.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePlatform, RenderOp};
    use mtmap_bridge::PlatformBridge;
    use mtmap_core::types::LocationEvent;
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Harness {
        platform: Arc<FakePlatform>,
        global: Dispatcher,
        events: mpsc::UnboundedReceiver<LocationEvent>,
    }

    fn harness() -> Harness {
        let platform = FakePlatform::new();
        let config = Arc::new(BridgeConfig::default());
        let (tx, events) = mpsc::unbounded_channel();
        let location = LocationStream::new(platform.location(), config.location, tx);
        let map = MapController::new("global", platform.surfaces().global_surface().unwrap(), 15.0);
        let global = Dispatcher::global(
            map,
            GlobalServices {
                platform_name: platform.platform_name().to_string(),
                location: Arc::new(Mutex::new(location)),
                search: platform.search(),
            },
            config,
        );
        Harness {
            platform,
            global,
            events,
        }
    }

    async fn call(d: &mut Dispatcher, method: &str, args: Value) -> Reply {
        d.dispatch(MethodCall::new(method, args)).await
    }

    #[tokio::test]
    async fn example_session() {
        let mut h = harness();
        let d = &mut h.global;
        assert_eq!(call(d, "initialize", json!({"apiKey": "k"})).await, Reply::success(true));
        assert_eq!(
            call(d, "showMap", json!({"latitude": 39.9, "longitude": 116.4})).await,
            Reply::success(true)
        );
        let here = json!({"latitude": 39.9, "longitude": 116.4});
        assert_eq!(call(d, "addMarker", here.clone()).await, Reply::success(1));
        assert_eq!(call(d, "addMarker", here).await, Reply::success(2));
        assert_eq!(call(d, "removeMarker", json!({"markerId": 1})).await, Reply::success(true));
        assert_eq!(call(d, "removeMarker", json!({"markerId": 1})).await, Reply::success(true));
        assert_eq!(d.map().registry().len(), 1);
    }

    #[tokio::test]
    async fn show_before_initialize_wins_over_bad_arguments() {
        let mut h = harness();
        for args in [json!({"latitude": 39.9, "longitude": 116.4}), json!({}), json!({"latitude": "x"})] {
            let reply = call(&mut h.global, "showMap", args).await;
            assert_eq!(reply.error_code(), Some("NOT_INITIALIZED"));
        }
    }

    #[tokio::test]
    async fn unknown_method_is_not_implemented() {
        let mut h = harness();
        let reply = call(&mut h.global, "frobnicate", json!({"x": 1})).await;
        assert_eq!(reply, Reply::not_implemented());
    }

    #[tokio::test]
    async fn empty_points_are_invalid() {
        let mut h = harness();
        let reply = call(
            &mut h.global,
            "addPolyline",
            json!({"points": [], "color": -16776961, "width": 4.0}),
        )
        .await;
        assert_eq!(reply.error_code(), Some("INVALID_ARGUMENT"));
        let reply = call(
            &mut h.global,
            "addPolygon",
            json!({"points": [], "fillColor": 0x5500FF00u32, "strokeColor": -1, "strokeWidth": 1}),
        )
        .await;
        assert_eq!(reply.error_code(), Some("INVALID_ARGUMENT"));
    }

    #[tokio::test]
    async fn lines_and_rings_get_fresh_handles() {
        let mut h = harness();
        let line = json!({
            "points": [{"latitude": 39.9, "longitude": 116.4}, {"latitude": 39.95, "longitude": 116.45}],
            "color": -16776961,
            "width": 4.0
        });
        let ring = json!({
            "points": [
                {"latitude": 39.9, "longitude": 116.4},
                {"latitude": 39.95, "longitude": 116.4},
                {"latitude": 39.95, "longitude": 116.45}
            ],
            "fillColor": 0x5500FF00u32,
            "strokeColor": -1,
            "strokeWidth": 2
        });
        assert_eq!(call(&mut h.global, "addPolyline", line).await, Reply::success(1));
        assert_eq!(call(&mut h.global, "addPolygon", ring).await, Reply::success(2));
        // A polyline handle is not a polygon.
        call(&mut h.global, "removePolygon", json!({"polygonId": 1})).await;
        assert_eq!(h.global.map().registry().len(), 2);
    }

    #[tokio::test]
    async fn missing_fields_are_named() {
        let mut h = harness();
        let reply = call(&mut h.global, "calculateRoute", json!({"startLatitude": 39.9})).await;
        match reply {
            Reply::Error { code, message } => {
                assert_eq!(code, "INVALID_ARGUMENT");
                for field in ["startLongitude", "endLatitude", "endLongitude"] {
                    assert!(message.contains(field), "{message}");
                }
            }
            other => panic!("expected an error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn renderer_failures_carry_the_operation_code() {
        let mut h = harness();
        h.platform.surfaces.fail_next_render_call();
        let reply = call(&mut h.global, "addMarker", json!({"latitude": 1.0, "longitude": 2.0})).await;
        match reply {
            Reply::Error { code, message } => {
                assert_eq!(code, "ADD_MARKER_ERROR");
                assert!(message.starts_with("Failed to add marker:"), "{message}");
            }
            other => panic!("expected an error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn camera_style_and_controls() {
        let mut h = harness();
        let d = &mut h.global;
        let reply = call(d, "animateCamera", json!({"latitude": 31.23, "longitude": 121.47, "zoom": 11})).await;
        assert!(reply.is_success());
        let reply = call(d, "setMapStyle", json!({"style": {"mapType": "satellite", "poi": false}})).await;
        assert!(reply.is_success());
        assert!(d.map().style().extra.contains_key("poi"));
        assert!(call(d, "enableCompass", json!({"enabled": false})).await.is_success());
        assert!(!d.map().controls().compass);
        assert_eq!(
            call(d, "enableScaleBar", json!({})).await.error_code(),
            Some("INVALID_ARGUMENT")
        );

        let journal = h.platform.surfaces.journal();
        assert!(journal.iter().any(|op| matches!(
            op,
            RenderOp::Animate(_, _, Some(z), dur) if *z == 11.0 && *dur == Duration::from_millis(1000)
        )));
    }

    #[tokio::test]
    async fn location_round_trip() {
        let mut h = harness();
        assert_eq!(call(&mut h.global, "startLocationUpdates", json!(null)).await, Reply::success(true));
        assert_eq!(call(&mut h.global, "startLocationUpdates", json!(null)).await, Reply::success(true));
        assert_eq!(h.platform.location.subscribe_calls(), 1);

        h.platform
            .location
            .push_fix(mtmap_core::types::LocationFix::new(39.90, 116.40, 8.0));
        assert_eq!(call(&mut h.global, "stopLocationUpdates", json!(null)).await, Reply::success(true));
        h.platform
            .location
            .push_fix(mtmap_core::types::LocationFix::new(39.91, 116.41, 8.0));

        assert!(matches!(h.events.try_recv(), Ok(LocationEvent::Fix(f)) if f.latitude == 39.90));
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn denied_location_is_permission_denied() {
        let mut h = harness();
        h.platform
            .location
            .set_authorization(mtmap_core::types::Authorization::Denied);
        let reply = call(&mut h.global, "getCurrentLocation", json!(null)).await;
        assert_eq!(reply.error_code(), Some("PERMISSION_DENIED"));
    }

    #[tokio::test]
    async fn search_and_route() {
        let mut h = harness();
        let reply = call(
            &mut h.global,
            "calculateRoute",
            json!({
                "startLatitude": 39.9, "startLongitude": 116.4,
                "endLatitude": 39.95, "endLongitude": 116.45,
                "transportMode": "walking"
            }),
        )
        .await;
        let route = reply.value().cloned().unwrap();
        assert_eq!(route["transportMode"], "walking");
        assert_eq!(route["start"]["latitude"], 39.9);

        let reply = call(
            &mut h.global,
            "searchNearby",
            json!({"latitude": 39.91, "longitude": 116.41, "radius": 1000, "keyword": "Book"}),
        )
        .await;
        let places = reply.value().cloned().unwrap();
        assert_eq!(places[0]["name"], "Wangfujing Bookstore");
        assert_eq!(places[0]["latitude"], 39.912);

        let reply = call(
            &mut h.global,
            "calculateRoute",
            json!({
                "startLatitude": 39.9, "startLongitude": 116.4,
                "endLatitude": 39.95, "endLongitude": 116.45,
                "transportMode": "teleport"
            }),
        )
        .await;
        assert_eq!(reply.error_code(), Some("INVALID_ARGUMENT"));
    }

    #[tokio::test]
    async fn view_channels_refuse_global_commands() {
        let platform = FakePlatform::new();
        let config = Arc::new(BridgeConfig::default());
        let map = MapController::for_view(
            "view 7",
            platform.surfaces().create_surface(ViewId(7)).unwrap(),
            15.0,
        );
        let mut view = Dispatcher::view(ViewId(7), map, config);
        for method in ["initialize", "showMap", "getCurrentLocation", "searchNearby"] {
            assert_eq!(call(&mut view, method, json!({})).await, Reply::not_implemented());
        }
        let reply = call(&mut view, "addMarker", json!({"latitude": 1.0, "longitude": 2.0})).await;
        assert_eq!(reply, Reply::success(1));
        view.shutdown().await;
    }
}
