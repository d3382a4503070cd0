// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-agnostic trait definitions for the external collaborators the
// bridge consumes: the map rendering SDK, the device location service and the
// search/routing backend.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use mtmap_core::LocationPolicy;
use mtmap_core::error::Result;
use mtmap_core::types::{
    Authorization, LatLng, LocationFix, MapControl, MapStyle, Overlay, OverlayId, Place,
    PlaceQuery, Route, RouteRequest, SubscriptionHandle, ViewId, ViewSize,
};

use crate::sink::LocationSink;

/// A boxed future that can cross the dispatcher's task boundary.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Unified bridge that groups every native collaborator.
///
/// Each collaborator is handed out as a shared trait object so the session
/// can give the location service to the global dispatcher and the surface
/// factory to the view manager independently.
pub trait PlatformBridge: Send + Sync {
    /// Human-readable platform name (e.g. "iOS", "Android").
    fn platform_name(&self) -> &str;

    fn surfaces(&self) -> Arc<dyn MapSurfaceFactory>;

    fn location(&self) -> Arc<dyn LocationService>;

    fn search(&self) -> Arc<dyn SearchService>;
}

/// Creates native map surfaces.
pub trait MapSurfaceFactory: Send + Sync {
    /// The surface driven by the session-global channel.
    fn global_surface(&self) -> Result<Box<dyn MapRenderer>>;

    /// A surface for an embedded view the host has just mounted.
    fn create_surface(&self, view_id: ViewId) -> Result<Box<dyn MapRenderer>>;
}

/// One native map surface.
///
/// A renderer is owned by exactly one channel dispatcher, hence `&mut self`
/// and `Send` without `Sync`.
pub trait MapRenderer: Send {
    /// Initialise the rendering SDK with the vendor API key.
    fn render_init(&mut self, api_key: &str) -> Result<()>;

    /// Attach the map to its container so it becomes visible.
    fn show(&mut self) -> Result<()>;

    /// Detach the map from its container. Overlays are kept.
    fn hide(&mut self) -> Result<()>;

    fn set_center(&mut self, center: LatLng) -> Result<()>;

    fn set_zoom(&mut self, level: f64) -> Result<()>;

    fn add_overlay(&mut self, id: OverlayId, overlay: &Overlay) -> Result<()>;

    fn remove_overlay(&mut self, id: OverlayId) -> Result<()>;

    fn animate_to(&mut self, target: LatLng, zoom: Option<f64>, duration: Duration) -> Result<()>;

    fn apply_style(&mut self, style: &MapStyle) -> Result<()>;

    fn set_control(&mut self, control: MapControl, enabled: bool) -> Result<()>;

    fn resize(&mut self, size: ViewSize) -> Result<()>;

    /// Release native resources. Called exactly once, when the owning
    /// channel shuts down.
    fn release(&mut self);
}

/// The device location service (GPS / fused provider).
pub trait LocationService: Send + Sync {
    /// Whether location services are switched on at the OS level.
    fn is_enabled(&self) -> bool;

    fn authorization(&self) -> Authorization;

    /// Prompt the user for location access. The outcome arrives later; the
    /// bridge does not wait for it.
    fn request_authorization(&self) -> Result<()>;

    /// A single on-demand fix. Resolves to an error when no real fix can be
    /// produced; implementations must never substitute placeholder data.
    fn request_one_shot(&self) -> BoxFuture<'static, Result<LocationFix>>;

    /// Start continuous delivery of fixes into `sink`.
    fn subscribe(&self, policy: &LocationPolicy, sink: LocationSink) -> Result<SubscriptionHandle>;

    fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()>;
}

/// Geocoding / routing backend.
pub trait SearchService: Send + Sync {
    fn calculate_route(&self, request: RouteRequest) -> BoxFuture<'static, Result<Route>>;

    fn search_nearby(&self, query: PlaceQuery) -> BoxFuture<'static, Result<Vec<Place>>>;
}
