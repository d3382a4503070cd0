// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// iOS platform bridge via objc2.
//
// Requires compilation with the iOS SDK (Xcode). The map views, the
// `CLLocationManager` and the search backend live in the Objective-C class
// `MTMapHost`, which the embedding app links in. Every trait method is one
// class-method message send; `MTMapHost` hops to the main thread itself, so
// calls here are safe from any thread.
//
// Results that arrive later (location fixes, one-shot requests, route and
// POI searches) come back through the `mtmap_ios_*` C exports at the bottom
// of this file, keyed by the token handed over with the request.

#![cfg(target_os = "ios")]

use std::ffi::{CStr, c_char};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use objc2::msg_send;
use objc2::rc::Retained;
use objc2::runtime::{AnyClass, Bool};
use objc2_foundation::NSString;

use mtmap_core::error::{MtMapError, Result};
use mtmap_core::types::{
    Authorization, LatLng, LocationFix, MapControl, MapStyle, Overlay, OverlayId, Place,
    PlaceQuery, Route, RouteRequest, SubscriptionHandle, ViewId, ViewSize,
};
use mtmap_core::{LocationAccuracy, LocationPolicy};

use crate::callbacks::CallbackRegistry;
use crate::sink::LocationSink;
use crate::traits::*;

/// Surface id `MTMapHost` uses for the session-global map container.
const GLOBAL_SURFACE: i64 = -1;

/// `CLAuthorizationStatus` values.
const CL_NOT_DETERMINED: i32 = 0;
const CL_RESTRICTED: i32 = 1;
const CL_DENIED: i32 = 2;

static CALLBACKS: LazyLock<CallbackRegistry> = LazyLock::new(CallbackRegistry::new);

/// Look up the host class, failing cleanly if the app did not link it.
fn host() -> Result<&'static AnyClass> {
    AnyClass::get(c"MTMapHost")
        .ok_or_else(|| MtMapError::Bridge("MTMapHost class is not linked into the app".into()))
}

fn ns_string(value: &str) -> Retained<NSString> {
    NSString::from_str(value)
}

fn ns_optional(value: Option<&str>) -> Option<Retained<NSString>> {
    value.map(NSString::from_str)
}

/// Read a NUL-terminated UTF-8 message handed over by `MTMapHost`.
///
/// # Safety
///
/// `ptr` must be null or point to a valid C string for the duration of the
/// call.
unsafe fn c_message(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::from("unknown error");
    }
    // SAFETY: caller guarantees a valid NUL-terminated string.
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

fn desired_accuracy_meters(accuracy: LocationAccuracy) -> f64 {
    // kCLLocationAccuracyBest is -1; the others are plain distances.
    match accuracy {
        LocationAccuracy::High => -1.0,
        LocationAccuracy::Balanced => 100.0,
        LocationAccuracy::Low => 1000.0,
        LocationAccuracy::Passive => 3000.0,
    }
}

fn control_name(control: MapControl) -> &'static str {
    match control {
        MapControl::MyLocation => "myLocation",
        MapControl::MyLocationButton => "myLocationButton",
        MapControl::ZoomControls => "zoomControls",
        MapControl::Compass => "compass",
        MapControl::ScaleBar => "scaleBar",
    }
}

/// Flatten points into an `NSString` of `lat,lng;lat,lng;...` pairs.
fn encode_points(points: &[LatLng]) -> Retained<NSString> {
    let joined = points
        .iter()
        .map(|p| format!("{},{}", p.latitude, p.longitude))
        .collect::<Vec<_>>()
        .join(";");
    NSString::from_str(&joined)
}

// ---------------------------------------------------------------------------
// Bridge struct
// ---------------------------------------------------------------------------

/// iOS implementation of the mtmap platform bridge.
pub struct IosBridge;

impl IosBridge {
    pub fn new() -> Self {
        Self
    }
}

impl PlatformBridge for IosBridge {
    fn platform_name(&self) -> &str {
        "iOS"
    }

    fn surfaces(&self) -> Arc<dyn MapSurfaceFactory> {
        Arc::new(IosSurfaces)
    }

    fn location(&self) -> Arc<dyn LocationService> {
        Arc::new(CoreLocation)
    }

    fn search(&self) -> Arc<dyn SearchService> {
        Arc::new(HostSearch)
    }
}

// ---------------------------------------------------------------------------
// Map surfaces
// ---------------------------------------------------------------------------

struct IosSurfaces;

impl IosSurfaces {
    fn open(surface: i64) -> Result<Box<dyn MapRenderer>> {
        let cls = host()?;
        // SAFETY: +[MTMapHost createSurface:] takes an NSInteger, returns BOOL.
        let ok: Bool = unsafe { msg_send![cls, createSurface: surface] };
        if !ok.as_bool() {
            return Err(MtMapError::Bridge(format!(
                "MTMapHost refused to create surface {surface}"
            )));
        }
        Ok(Box::new(IosSurface { surface }))
    }
}

impl MapSurfaceFactory for IosSurfaces {
    fn global_surface(&self) -> Result<Box<dyn MapRenderer>> {
        Self::open(GLOBAL_SURFACE)
    }

    fn create_surface(&self, view_id: ViewId) -> Result<Box<dyn MapRenderer>> {
        Self::open(view_id.0)
    }
}

struct IosSurface {
    surface: i64,
}

// SAFETY (all msg_send! below): selectors are class methods declared in
// MTMapHost.h with exactly these argument types and a void return.
impl MapRenderer for IosSurface {
    fn render_init(&mut self, api_key: &str) -> Result<()> {
        let cls = host()?;
        let key = ns_string(api_key);
        let _: () = unsafe { msg_send![cls, renderInit: self.surface, apiKey: &*key] };
        Ok(())
    }

    fn show(&mut self) -> Result<()> {
        let cls = host()?;
        let _: () = unsafe { msg_send![cls, show: self.surface] };
        Ok(())
    }

    fn hide(&mut self) -> Result<()> {
        let cls = host()?;
        let _: () = unsafe { msg_send![cls, hide: self.surface] };
        Ok(())
    }

    fn set_center(&mut self, center: LatLng) -> Result<()> {
        let cls = host()?;
        let _: () = unsafe {
            msg_send![
                cls,
                setCenter: self.surface,
                latitude: center.latitude,
                longitude: center.longitude
            ]
        };
        Ok(())
    }

    fn set_zoom(&mut self, level: f64) -> Result<()> {
        let cls = host()?;
        let _: () = unsafe { msg_send![cls, setZoom: self.surface, level: level] };
        Ok(())
    }

    fn add_overlay(&mut self, id: OverlayId, overlay: &Overlay) -> Result<()> {
        let cls = host()?;
        match overlay {
            Overlay::Marker(m) => {
                let title = ns_optional(m.title.as_deref());
                let snippet = ns_optional(m.snippet.as_deref());
                let icon = ns_optional(m.icon.as_deref());
                let _: () = unsafe {
                    msg_send![
                        cls,
                        addMarker: self.surface,
                        overlayId: id.0,
                        latitude: m.position.latitude,
                        longitude: m.position.longitude,
                        title: title.as_deref(),
                        snippet: snippet.as_deref(),
                        icon: icon.as_deref()
                    ]
                };
            }
            Overlay::Polyline(p) => {
                let points = encode_points(&p.points);
                let _: () = unsafe {
                    msg_send![
                        cls,
                        addPolyline: self.surface,
                        overlayId: id.0,
                        points: &*points,
                        color: p.color.0,
                        width: p.width,
                        geodesic: Bool::new(p.geodesic)
                    ]
                };
            }
            Overlay::Polygon(p) => {
                let points = encode_points(&p.points);
                let _: () = unsafe {
                    msg_send![
                        cls,
                        addPolygon: self.surface,
                        overlayId: id.0,
                        points: &*points,
                        fillColor: p.fill_color.0,
                        strokeColor: p.stroke_color.0,
                        strokeWidth: p.stroke_width
                    ]
                };
            }
        }
        Ok(())
    }

    fn remove_overlay(&mut self, id: OverlayId) -> Result<()> {
        let cls = host()?;
        let _: () = unsafe { msg_send![cls, removeOverlay: self.surface, overlayId: id.0] };
        Ok(())
    }

    fn animate_to(&mut self, target: LatLng, zoom: Option<f64>, duration: Duration) -> Result<()> {
        let cls = host()?;
        // NaN keeps the current zoom on the Objective-C side.
        let _: () = unsafe {
            msg_send![
                cls,
                animateTo: self.surface,
                latitude: target.latitude,
                longitude: target.longitude,
                zoom: zoom.unwrap_or(f64::NAN),
                seconds: duration.as_secs_f64()
            ]
        };
        Ok(())
    }

    fn apply_style(&mut self, style: &MapStyle) -> Result<()> {
        let cls = host()?;
        let json = ns_string(&serde_json::to_string(style)?);
        let _: () = unsafe { msg_send![cls, applyStyle: self.surface, json: &*json] };
        Ok(())
    }

    fn set_control(&mut self, control: MapControl, enabled: bool) -> Result<()> {
        let cls = host()?;
        let name = ns_string(control_name(control));
        let _: () = unsafe {
            msg_send![
                cls,
                setControl: self.surface,
                name: &*name,
                enabled: Bool::new(enabled)
            ]
        };
        Ok(())
    }

    fn resize(&mut self, size: ViewSize) -> Result<()> {
        let cls = host()?;
        let _: () = unsafe {
            msg_send![cls, resize: self.surface, width: size.width, height: size.height]
        };
        Ok(())
    }

    fn release(&mut self) {
        match host() {
            Ok(cls) => {
                let _: () = unsafe { msg_send![cls, releaseSurface: self.surface] };
            }
            Err(e) => tracing::warn!(surface = self.surface, error = %e, "map view release skipped"),
        }
    }
}

// ---------------------------------------------------------------------------
// Location: CLLocationManager behind MTMapHost
// ---------------------------------------------------------------------------

struct CoreLocation;

impl LocationService for CoreLocation {
    fn is_enabled(&self) -> bool {
        let Ok(cls) = host() else { return false };
        // SAFETY: +locationServicesEnabled returns BOOL.
        let enabled: Bool = unsafe { msg_send![cls, locationServicesEnabled] };
        enabled.as_bool()
    }

    fn authorization(&self) -> Authorization {
        let Ok(cls) = host() else {
            return Authorization::NotDetermined;
        };
        // SAFETY: +authorizationStatus returns CLAuthorizationStatus (int).
        let status: i32 = unsafe { msg_send![cls, authorizationStatus] };
        match status {
            CL_NOT_DETERMINED => Authorization::NotDetermined,
            CL_RESTRICTED | CL_DENIED => Authorization::Denied,
            _ => Authorization::Granted,
        }
    }

    fn request_authorization(&self) -> Result<()> {
        let cls = host()?;
        let _: () = unsafe { msg_send![cls, requestWhenInUseAuthorization] };
        Ok(())
    }

    fn request_one_shot(&self) -> BoxFuture<'static, Result<LocationFix>> {
        let cls = match host() {
            Ok(cls) => cls,
            Err(e) => return Box::pin(async move { Err(e) }),
        };
        let (token, fut) = CALLBACKS.fixes.begin("location");
        let _: () = unsafe { msg_send![cls, requestSingleFix: token as i64] };
        fut
    }

    fn subscribe(&self, policy: &LocationPolicy, sink: LocationSink) -> Result<SubscriptionHandle> {
        let cls = host()?;
        let handle = CALLBACKS.register_subscription(sink);
        // CoreLocation has no fixed interval; the distance filter is the
        // closest knob, so the interval only feeds the log line.
        tracing::debug!(handle = handle.0, interval_ms = policy.interval_ms, "starting CLLocationManager updates");
        let _: () = unsafe {
            msg_send![
                cls,
                startUpdates: handle.0 as i64,
                desiredAccuracy: desired_accuracy_meters(policy.accuracy)
            ]
        };
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()> {
        CALLBACKS.remove_subscription(handle);
        let cls = host()?;
        let _: () = unsafe { msg_send![cls, stopUpdates: handle.0 as i64] };
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Search: MKDirections / MKLocalSearch behind MTMapHost
// ---------------------------------------------------------------------------

struct HostSearch;

impl SearchService for HostSearch {
    fn calculate_route(&self, request: RouteRequest) -> BoxFuture<'static, Result<Route>> {
        let cls = match host() {
            Ok(cls) => cls,
            Err(e) => return Box::pin(async move { Err(e) }),
        };
        let (token, pending) = CALLBACKS.payloads.begin("route");
        let mode = ns_string(request.mode.as_str());
        let _: () = unsafe {
            msg_send![
                cls,
                calculateRoute: token as i64,
                startLatitude: request.start.latitude,
                startLongitude: request.start.longitude,
                endLatitude: request.end.latitude,
                endLongitude: request.end.longitude,
                mode: &*mode
            ]
        };
        Box::pin(async move { Ok(serde_json::from_str(&pending.await?)?) })
    }

    fn search_nearby(&self, query: PlaceQuery) -> BoxFuture<'static, Result<Vec<Place>>> {
        let cls = match host() {
            Ok(cls) => cls,
            Err(e) => return Box::pin(async move { Err(e) }),
        };
        let (token, pending) = CALLBACKS.payloads.begin("search");
        let keyword = ns_optional(query.keyword.as_deref());
        let category = ns_optional(query.category.as_deref());
        let _: () = unsafe {
            msg_send![
                cls,
                searchNearby: token as i64,
                latitude: query.center.latitude,
                longitude: query.center.longitude,
                radius: query.radius,
                keyword: keyword.as_deref(),
                category: category.as_deref()
            ]
        };
        Box::pin(async move { Ok(serde_json::from_str(&pending.await?)?) })
    }
}

// ---------------------------------------------------------------------------
// C exports called from MTMapHost
// ---------------------------------------------------------------------------

#[unsafe(no_mangle)]
pub extern "C" fn mtmap_ios_on_location(handle: i64, latitude: f64, longitude: f64, accuracy: f64) {
    if !CALLBACKS.on_fix(handle as u64, LocationFix::new(latitude, longitude, accuracy)) {
        tracing::debug!(handle, "location fix after stopUpdates dropped");
    }
}

/// # Safety
///
/// `message` must be null or a valid NUL-terminated UTF-8 string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mtmap_ios_on_location_error(handle: i64, message: *const c_char) {
    let message = unsafe { c_message(message) };
    CALLBACKS.on_error(handle as u64, message);
}

#[unsafe(no_mangle)]
pub extern "C" fn mtmap_ios_on_single_fix(request: i64, latitude: f64, longitude: f64, accuracy: f64) {
    CALLBACKS
        .fixes
        .complete(request as u64, Ok(LocationFix::new(latitude, longitude, accuracy)));
}

/// # Safety
///
/// `message` must be null or a valid NUL-terminated UTF-8 string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mtmap_ios_on_single_fix_failed(request: i64, message: *const c_char) {
    let message = unsafe { c_message(message) };
    CALLBACKS
        .fixes
        .complete(request as u64, Err(MtMapError::ServiceUnavailable(message)));
}

/// # Safety
///
/// `json` must be a valid NUL-terminated UTF-8 string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mtmap_ios_on_search_result(request: i64, json: *const c_char) {
    let json = unsafe { c_message(json) };
    CALLBACKS.payloads.complete(request as u64, Ok(json));
}

/// # Safety
///
/// `message` must be null or a valid NUL-terminated UTF-8 string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mtmap_ios_on_search_failed(request: i64, message: *const c_char) {
    let message = unsafe { c_message(message) };
    CALLBACKS
        .payloads
        .complete(request as u64, Err(MtMapError::ServiceUnavailable(message)));
}
