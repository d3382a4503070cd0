// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Android platform bridge via JNI.
//
// Requires the Android NDK and targets `aarch64-linux-android` or
// `armv7-linux-androideabi`. The map SDK, the fused location provider and
// the search backend are reached through static methods on the Kotlin host
// class `com.example.mt_map.MtMapHost`, which owns the `MapView`s and the
// `FusedLocationProviderClient`.
//
// ## Callback routing
//
// Location fixes, one-shot results and search results come back through the
// `Java_com_example_mt_1map_MtMapHost_native*` exports at the bottom of this
// file. Each carries the integer token the bridge handed to Kotlin when the
// request was made; [`CALLBACKS`] maps the token back to its Rust endpoint.

#![cfg(target_os = "android")]

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use jni::objects::{JClass, JObject, JString, JValue};
use jni::sys::{jdouble, jfloat, jlong};
use jni::{JNIEnv, JavaVM};

use mtmap_core::error::{MtMapError, Result};
use mtmap_core::types::{
    Authorization, LatLng, LocationFix, MapControl, MapStyle, Overlay, OverlayId, Place,
    PlaceQuery, Route, RouteRequest, SubscriptionHandle, ViewId, ViewSize,
};
use mtmap_core::{LocationAccuracy, LocationPolicy};

use crate::callbacks::CallbackRegistry;
use crate::sink::LocationSink;
use crate::traits::*;

/// Kotlin class that hosts the native map views and location client.
const HOST_CLASS: &str = "com/example/mt_map/MtMapHost";

/// Surface id Kotlin uses for the session-global map container.
const GLOBAL_SURFACE: jlong = -1;

/// `com.google.android.gms.location.Priority` constants.
const PRIORITY_HIGH_ACCURACY: i32 = 100;
const PRIORITY_BALANCED_POWER_ACCURACY: i32 = 102;
const PRIORITY_LOW_POWER: i32 = 104;
const PRIORITY_PASSIVE: i32 = 105;

/// Return codes of `MtMapHost.locationPermission()`.
const PERMISSION_GRANTED: i32 = 0;
const PERMISSION_DENIED: i32 = 1;

/// Tokens for in-flight native requests, shared with the JNI exports.
static CALLBACKS: LazyLock<CallbackRegistry> = LazyLock::new(CallbackRegistry::new);

// ---------------------------------------------------------------------------
// JNI helpers
// ---------------------------------------------------------------------------

/// Run `f` with a [`JNIEnv`] attached to the current thread.
///
/// The `JavaVM*` comes from `ndk_context`, set by the NDK glue before any
/// bridge call can happen.
fn with_env<T>(f: impl FnOnce(&mut JNIEnv<'_>) -> Result<T>) -> Result<T> {
    let ctx = ndk_context::android_context();
    // SAFETY: `ctx.vm()` returns the `JavaVM*` set by the NDK glue code.
    // The pointer is guaranteed valid for the lifetime of the process.
    let vm = unsafe { JavaVM::from_raw(ctx.vm().cast()) }
        .map_err(|e| MtMapError::Bridge(format!("failed to obtain JavaVM: {e}")))?;
    let mut env = vm
        .attach_current_thread()
        .map_err(|e| MtMapError::Bridge(format!("failed to attach JNI thread: {e}")))?;
    f(&mut env)
}

/// Map any `jni::errors::Error` into `MtMapError::Bridge`.
fn jni_err(context: &str, e: jni::errors::Error) -> MtMapError {
    MtMapError::Bridge(format!("{context}: {e}"))
}

/// Call a `void` static method on the host class.
fn call_void(name: &str, sig: &str, args: &[JValue<'_, '_>]) -> Result<()> {
    with_env(|env| {
        env.call_static_method(HOST_CLASS, name, sig, args)
            .map_err(|e| jni_err(name, e))?;
        Ok(())
    })
}

/// Call a `boolean` static method on the host class.
fn call_bool(name: &str, sig: &str, args: &[JValue<'_, '_>]) -> Result<bool> {
    with_env(|env| {
        env.call_static_method(HOST_CLASS, name, sig, args)
            .map_err(|e| jni_err(name, e))?
            .z()
            .map_err(|e| jni_err(name, e))
    })
}

fn java_string(env: &mut JNIEnv<'_>, value: &JString<'_>) -> String {
    env.get_string(value)
        .map(String::from)
        .unwrap_or_else(|e| format!("<unreadable string: {e}>"))
}

/// Flatten points into `[lat0, lng0, lat1, lng1, ...]` for a `double[]`.
fn flatten_points(points: &[LatLng]) -> Vec<f64> {
    points
        .iter()
        .flat_map(|p| [p.latitude, p.longitude])
        .collect()
}

fn priority(accuracy: LocationAccuracy) -> i32 {
    match accuracy {
        LocationAccuracy::High => PRIORITY_HIGH_ACCURACY,
        LocationAccuracy::Balanced => PRIORITY_BALANCED_POWER_ACCURACY,
        LocationAccuracy::Low => PRIORITY_LOW_POWER,
        LocationAccuracy::Passive => PRIORITY_PASSIVE,
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

// ---------------------------------------------------------------------------
// Bridge struct
// ---------------------------------------------------------------------------

/// Android implementation of the mtmap platform bridge.
///
/// Zero-sized; all native state lives on the Kotlin side.
pub struct AndroidBridge;

impl AndroidBridge {
    /// Create a new Android bridge.
    ///
    /// This does **not** touch JNI; the first JNI call happens lazily.
    pub fn new() -> Self {
        Self
    }
}

impl PlatformBridge for AndroidBridge {
    fn platform_name(&self) -> &str {
        "Android"
    }

    fn surfaces(&self) -> Arc<dyn MapSurfaceFactory> {
        Arc::new(AndroidSurfaces)
    }

    fn location(&self) -> Arc<dyn LocationService> {
        Arc::new(FusedLocation)
    }

    fn search(&self) -> Arc<dyn SearchService> {
        Arc::new(HostSearch)
    }
}

// ---------------------------------------------------------------------------
// Map surfaces: MapView instances owned by MtMapHost
// ---------------------------------------------------------------------------

struct AndroidSurfaces;

impl AndroidSurfaces {
    fn open(surface: jlong) -> Result<Box<dyn MapRenderer>> {
        if !call_bool("createSurface", "(J)Z", &[JValue::Long(surface)])? {
            return Err(MtMapError::Bridge(format!(
                "MtMapHost refused to create surface {surface}"
            )));
        }
        Ok(Box::new(AndroidSurface { surface }))
    }
}

impl MapSurfaceFactory for AndroidSurfaces {
    fn global_surface(&self) -> Result<Box<dyn MapRenderer>> {
        Self::open(GLOBAL_SURFACE)
    }

    fn create_surface(&self, view_id: ViewId) -> Result<Box<dyn MapRenderer>> {
        Self::open(view_id.0)
    }
}

/// One `MapView`, addressed by its surface id.
struct AndroidSurface {
    surface: jlong,
}

impl MapRenderer for AndroidSurface {
    fn render_init(&mut self, api_key: &str) -> Result<()> {
        with_env(|env| {
            let key = env
                .new_string(api_key)
                .map_err(|e| jni_err("new_string(apiKey)", e))?;
            env.call_static_method(
                HOST_CLASS,
                "renderInit",
                "(JLjava/lang/String;)V",
                &[JValue::Long(self.surface), JValue::Object(&key)],
            )
            .map_err(|e| jni_err("renderInit", e))?;
            Ok(())
        })
    }

    fn show(&mut self) -> Result<()> {
        call_void("show", "(J)V", &[JValue::Long(self.surface)])
    }

    fn hide(&mut self) -> Result<()> {
        call_void("hide", "(J)V", &[JValue::Long(self.surface)])
    }

    fn set_center(&mut self, center: LatLng) -> Result<()> {
        call_void(
            "setCenter",
            "(JDD)V",
            &[
                JValue::Long(self.surface),
                JValue::Double(center.latitude),
                JValue::Double(center.longitude),
            ],
        )
    }

    fn set_zoom(&mut self, level: f64) -> Result<()> {
        call_void(
            "setZoom",
            "(JD)V",
            &[JValue::Long(self.surface), JValue::Double(level)],
        )
    }

    fn add_overlay(&mut self, id: OverlayId, overlay: &Overlay) -> Result<()> {
        with_env(|env| {
            match overlay {
                Overlay::Marker(m) => {
                    let title = optional_string(env, m.title.as_deref())?;
                    let snippet = optional_string(env, m.snippet.as_deref())?;
                    let icon = optional_string(env, m.icon.as_deref())?;
                    env.call_static_method(
                        HOST_CLASS,
                        "addMarker",
                        "(JJDDLjava/lang/String;Ljava/lang/String;Ljava/lang/String;)V",
                        &[
                            JValue::Long(self.surface),
                            JValue::Long(id.0),
                            JValue::Double(m.position.latitude),
                            JValue::Double(m.position.longitude),
                            JValue::Object(&title),
                            JValue::Object(&snippet),
                            JValue::Object(&icon),
                        ],
                    )
                    .map_err(|e| jni_err("addMarker", e))?;
                }
                Overlay::Polyline(p) => {
                    let coords = double_array(env, &flatten_points(&p.points))?;
                    env.call_static_method(
                        HOST_CLASS,
                        "addPolyline",
                        "(JJ[DIFZ)V",
                        &[
                            JValue::Long(self.surface),
                            JValue::Long(id.0),
                            JValue::Object(&coords),
                            JValue::Int(p.color.0 as i32),
                            JValue::Float(p.width as f32),
                            JValue::Bool(p.geodesic.into()),
                        ],
                    )
                    .map_err(|e| jni_err("addPolyline", e))?;
                }
                Overlay::Polygon(p) => {
                    let coords = double_array(env, &flatten_points(&p.points))?;
                    env.call_static_method(
                        HOST_CLASS,
                        "addPolygon",
                        "(JJ[DIIF)V",
                        &[
                            JValue::Long(self.surface),
                            JValue::Long(id.0),
                            JValue::Object(&coords),
                            JValue::Int(p.fill_color.0 as i32),
                            JValue::Int(p.stroke_color.0 as i32),
                            JValue::Float(p.stroke_width as f32),
                        ],
                    )
                    .map_err(|e| jni_err("addPolygon", e))?;
                }
            }
            Ok(())
        })
    }

    fn remove_overlay(&mut self, id: OverlayId) -> Result<()> {
        call_void(
            "removeOverlay",
            "(JJ)V",
            &[JValue::Long(self.surface), JValue::Long(id.0)],
        )
    }

    fn animate_to(&mut self, target: LatLng, zoom: Option<f64>, duration: Duration) -> Result<()> {
        // Kotlin reads NaN as "keep the current zoom".
        call_void(
            "animateTo",
            "(JDDDJ)V",
            &[
                JValue::Long(self.surface),
                JValue::Double(target.latitude),
                JValue::Double(target.longitude),
                JValue::Double(zoom.unwrap_or(f64::NAN)),
                JValue::Long(duration.as_millis() as jlong),
            ],
        )
    }

    fn apply_style(&mut self, style: &MapStyle) -> Result<()> {
        let json = serde_json::to_string(style)?;
        with_env(|env| {
            let j_style = env
                .new_string(&json)
                .map_err(|e| jni_err("new_string(style)", e))?;
            env.call_static_method(
                HOST_CLASS,
                "applyStyle",
                "(JLjava/lang/String;)V",
                &[JValue::Long(self.surface), JValue::Object(&j_style)],
            )
            .map_err(|e| jni_err("applyStyle", e))?;
            Ok(())
        })
    }

    fn set_control(&mut self, control: MapControl, enabled: bool) -> Result<()> {
        with_env(|env| {
            let name = env
                .new_string(control_name(control))
                .map_err(|e| jni_err("new_string(control)", e))?;
            env.call_static_method(
                HOST_CLASS,
                "setControl",
                "(JLjava/lang/String;Z)V",
                &[
                    JValue::Long(self.surface),
                    JValue::Object(&name),
                    JValue::Bool(enabled.into()),
                ],
            )
            .map_err(|e| jni_err("setControl", e))?;
            Ok(())
        })
    }

    fn resize(&mut self, size: ViewSize) -> Result<()> {
        call_void(
            "resize",
            "(JDD)V",
            &[
                JValue::Long(self.surface),
                JValue::Double(size.width),
                JValue::Double(size.height),
            ],
        )
    }

    fn release(&mut self) {
        if let Err(e) = call_void("release", "(J)V", &[JValue::Long(self.surface)]) {
            tracing::warn!(surface = self.surface, error = %e, "MapView release failed");
        }
    }
}

fn optional_string<'a>(env: &mut JNIEnv<'a>, value: Option<&str>) -> Result<JObject<'a>> {
    match value {
        Some(s) => Ok(env
            .new_string(s)
            .map_err(|e| jni_err("new_string", e))?
            .into()),
        None => Ok(JObject::null()),
    }
}

fn double_array<'a>(env: &mut JNIEnv<'a>, values: &[f64]) -> Result<JObject<'a>> {
    let array = env
        .new_double_array(values.len() as i32)
        .map_err(|e| jni_err("new_double_array", e))?;
    env.set_double_array_region(&array, 0, values)
        .map_err(|e| jni_err("set_double_array_region", e))?;
    Ok(array.into())
}

// ---------------------------------------------------------------------------
// Location: FusedLocationProviderClient behind MtMapHost
// ---------------------------------------------------------------------------

struct FusedLocation;

impl LocationService for FusedLocation {
    fn is_enabled(&self) -> bool {
        call_bool("isLocationEnabled", "()Z", &[]).unwrap_or(false)
    }

    fn authorization(&self) -> Authorization {
        let code = with_env(|env| {
            env.call_static_method(HOST_CLASS, "locationPermission", "()I", &[])
                .map_err(|e| jni_err("locationPermission", e))?
                .i()
                .map_err(|e| jni_err("locationPermission", e))
        });
        match code {
            Ok(PERMISSION_GRANTED) => Authorization::Granted,
            Ok(PERMISSION_DENIED) => Authorization::Denied,
            _ => Authorization::NotDetermined,
        }
    }

    fn request_authorization(&self) -> Result<()> {
        call_void("requestLocationPermission", "()V", &[])
    }

    fn request_one_shot(&self) -> BoxFuture<'static, Result<LocationFix>> {
        let (token, fut) = CALLBACKS.fixes.begin("location");
        if let Err(e) = call_void("requestSingleFix", "(J)V", &[JValue::Long(token as jlong)]) {
            CALLBACKS.fixes.cancel(token);
            return Box::pin(async move { Err(e) });
        }
        fut
    }

    fn subscribe(&self, policy: &LocationPolicy, sink: LocationSink) -> Result<SubscriptionHandle> {
        let handle = CALLBACKS.register_subscription(sink);
        let started = call_void(
            "requestLocationUpdates",
            "(JIJJ)V",
            &[
                JValue::Long(handle.0 as jlong),
                JValue::Int(priority(policy.accuracy)),
                JValue::Long(policy.interval_ms as jlong),
                JValue::Long(policy.fastest_interval_ms as jlong),
            ],
        );
        if let Err(e) = started {
            CALLBACKS.remove_subscription(handle);
            return Err(e);
        }
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()> {
        CALLBACKS.remove_subscription(handle);
        call_void(
            "removeLocationUpdates",
            "(J)V",
            &[JValue::Long(handle.0 as jlong)],
        )
    }
}

// ---------------------------------------------------------------------------
// Search: the map SDK's route planner and POI search behind MtMapHost
// ---------------------------------------------------------------------------

struct HostSearch;

impl HostSearch {
    /// Issue a request whose JSON answer arrives via `nativeOnSearchResult`.
    fn request(
        start: impl FnOnce(&mut JNIEnv<'_>, jlong) -> Result<()>,
    ) -> BoxFuture<'static, Result<String>> {
        let (token, fut) = CALLBACKS.payloads.begin("search");
        if let Err(e) = with_env(|env| start(env, token as jlong)) {
            CALLBACKS.payloads.cancel(token);
            return Box::pin(async move { Err(e) });
        }
        fut
    }
}

impl SearchService for HostSearch {
    fn calculate_route(&self, request: RouteRequest) -> BoxFuture<'static, Result<Route>> {
        let pending = Self::request(|env, token| {
            let mode = env
                .new_string(request.mode.as_str())
                .map_err(|e| jni_err("new_string(mode)", e))?;
            env.call_static_method(
                HOST_CLASS,
                "calculateRoute",
                "(JDDDDLjava/lang/String;)V",
                &[
                    JValue::Long(token),
                    JValue::Double(request.start.latitude),
                    JValue::Double(request.start.longitude),
                    JValue::Double(request.end.latitude),
                    JValue::Double(request.end.longitude),
                    JValue::Object(&mode),
                ],
            )
            .map_err(|e| jni_err("calculateRoute", e))?;
            Ok(())
        });
        Box::pin(async move { Ok(serde_json::from_str(&pending.await?)?) })
    }

    fn search_nearby(&self, query: PlaceQuery) -> BoxFuture<'static, Result<Vec<Place>>> {
        let pending = Self::request(|env, token| {
            let keyword = optional_string(env, query.keyword.as_deref())?;
            let category = optional_string(env, query.category.as_deref())?;
            env.call_static_method(
                HOST_CLASS,
                "searchNearby",
                "(JDDDLjava/lang/String;Ljava/lang/String;)V",
                &[
                    JValue::Long(token),
                    JValue::Double(query.center.latitude),
                    JValue::Double(query.center.longitude),
                    JValue::Double(query.radius),
                    JValue::Object(&keyword),
                    JValue::Object(&category),
                ],
            )
            .map_err(|e| jni_err("searchNearby", e))?;
            Ok(())
        });
        Box::pin(async move { Ok(serde_json::from_str(&pending.await?)?) })
    }
}

// ---------------------------------------------------------------------------
// JNI exports called from MtMapHost
// ---------------------------------------------------------------------------

#[unsafe(no_mangle)]
pub extern "system" fn Java_com_example_mt_1map_MtMapHost_nativeOnLocation(
    _env: JNIEnv<'_>,
    _class: JClass<'_>,
    handle: jlong,
    latitude: jdouble,
    longitude: jdouble,
    accuracy: jfloat,
) {
    let fix = LocationFix::new(latitude, longitude, f64::from(accuracy));
    if !CALLBACKS.on_fix(handle as u64, fix) {
        tracing::debug!(handle, "location fix after unsubscribe dropped");
    }
}

#[unsafe(no_mangle)]
pub extern "system" fn Java_com_example_mt_1map_MtMapHost_nativeOnLocationError(
    mut env: JNIEnv<'_>,
    _class: JClass<'_>,
    handle: jlong,
    message: JString<'_>,
) {
    let message = java_string(&mut env, &message);
    CALLBACKS.on_error(handle as u64, message);
}

#[unsafe(no_mangle)]
pub extern "system" fn Java_com_example_mt_1map_MtMapHost_nativeOnSingleFix(
    _env: JNIEnv<'_>,
    _class: JClass<'_>,
    request: jlong,
    latitude: jdouble,
    longitude: jdouble,
    accuracy: jfloat,
) {
    let fix = LocationFix::new(latitude, longitude, f64::from(accuracy));
    CALLBACKS.fixes.complete(request as u64, Ok(fix));
}

/// Kotlin calls this when `lastLocation` is null or the task failed.
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_example_mt_1map_MtMapHost_nativeOnSingleFixFailed(
    mut env: JNIEnv<'_>,
    _class: JClass<'_>,
    request: jlong,
    message: JString<'_>,
) {
    let message = java_string(&mut env, &message);
    CALLBACKS
        .fixes
        .complete(request as u64, Err(MtMapError::ServiceUnavailable(message)));
}

#[unsafe(no_mangle)]
pub extern "system" fn Java_com_example_mt_1map_MtMapHost_nativeOnSearchResult(
    mut env: JNIEnv<'_>,
    _class: JClass<'_>,
    request: jlong,
    json: JString<'_>,
) {
    let json = java_string(&mut env, &json);
    CALLBACKS.payloads.complete(request as u64, Ok(json));
}

#[unsafe(no_mangle)]
pub extern "system" fn Java_com_example_mt_1map_MtMapHost_nativeOnSearchFailed(
    mut env: JNIEnv<'_>,
    _class: JClass<'_>,
    request: jlong,
    message: JString<'_>,
) {
    let message = java_string(&mut env, &message);
    CALLBACKS
        .payloads
        .complete(request as u64, Err(MtMapError::ServiceUnavailable(message)));
}
