// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stub bridge for desktop/CI builds where the native map SDK and location
// hardware are unavailable.
//
// Map surfaces are headless: they accept every call and keep just enough
// state to log what a real renderer would show. Location and search report
// `PlatformUnavailable`; real implementations live in the `ios` and
// `android` modules.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use mtmap_core::LocationPolicy;
use mtmap_core::error::{MtMapError, Result};
use mtmap_core::types::{
    Authorization, LatLng, LocationFix, MapControl, MapStyle, Overlay, OverlayId, Place,
    PlaceQuery, Route, RouteRequest, SubscriptionHandle, ViewId, ViewSize,
};

use crate::sink::LocationSink;
use crate::traits::*;

/// Bridge returned on non-mobile platforms.
pub struct StubBridge;

impl PlatformBridge for StubBridge {
    fn platform_name(&self) -> &str {
        "Desktop (stub)"
    }

    fn surfaces(&self) -> Arc<dyn MapSurfaceFactory> {
        Arc::new(HeadlessSurfaces)
    }

    fn location(&self) -> Arc<dyn LocationService> {
        Arc::new(NoLocation)
    }

    fn search(&self) -> Arc<dyn SearchService> {
        Arc::new(NoSearch)
    }
}

/// Creates [`HeadlessSurface`]s.
pub struct HeadlessSurfaces;

impl MapSurfaceFactory for HeadlessSurfaces {
    fn global_surface(&self) -> Result<Box<dyn MapRenderer>> {
        Ok(Box::new(HeadlessSurface::new("global")))
    }

    fn create_surface(&self, view_id: ViewId) -> Result<Box<dyn MapRenderer>> {
        Ok(Box::new(HeadlessSurface::new(format!("view {view_id}"))))
    }
}

/// A map surface with no pixels behind it.
#[derive(Debug)]
pub struct HeadlessSurface {
    label: String,
    visible: bool,
    center: Option<LatLng>,
    zoom: Option<f64>,
    size: Option<ViewSize>,
    overlays: BTreeSet<OverlayId>,
}

impl HeadlessSurface {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            visible: false,
            center: None,
            zoom: None,
            size: None,
            overlays: BTreeSet::new(),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn center(&self) -> Option<LatLng> {
        self.center
    }

    pub fn zoom(&self) -> Option<f64> {
        self.zoom
    }

    pub fn size(&self) -> Option<ViewSize> {
        self.size
    }

    pub fn overlay_count(&self) -> usize {
        self.overlays.len()
    }
}

impl MapRenderer for HeadlessSurface {
    fn render_init(&mut self, _api_key: &str) -> Result<()> {
        debug!(surface = %self.label, "headless render_init");
        Ok(())
    }

    fn show(&mut self) -> Result<()> {
        self.visible = true;
        Ok(())
    }

    fn hide(&mut self) -> Result<()> {
        self.visible = false;
        Ok(())
    }

    fn set_center(&mut self, center: LatLng) -> Result<()> {
        self.center = Some(center);
        Ok(())
    }

    fn set_zoom(&mut self, level: f64) -> Result<()> {
        self.zoom = Some(level);
        Ok(())
    }

    fn add_overlay(&mut self, id: OverlayId, overlay: &Overlay) -> Result<()> {
        debug!(surface = %self.label, %id, kind = overlay.kind().label(), "headless add_overlay");
        self.overlays.insert(id);
        Ok(())
    }

    fn remove_overlay(&mut self, id: OverlayId) -> Result<()> {
        self.overlays.remove(&id);
        Ok(())
    }

    fn animate_to(&mut self, target: LatLng, zoom: Option<f64>, _duration: Duration) -> Result<()> {
        // No frames to interpolate; jump straight to the end state.
        self.center = Some(target);
        if zoom.is_some() {
            self.zoom = zoom;
        }
        Ok(())
    }

    fn apply_style(&mut self, _style: &MapStyle) -> Result<()> {
        Ok(())
    }

    fn set_control(&mut self, control: MapControl, enabled: bool) -> Result<()> {
        debug!(surface = %self.label, ?control, enabled, "headless set_control");
        Ok(())
    }

    fn resize(&mut self, size: ViewSize) -> Result<()> {
        self.size = Some(size);
        Ok(())
    }

    fn release(&mut self) {
        debug!(surface = %self.label, overlays = self.overlays.len(), "headless surface released");
        self.overlays.clear();
        self.visible = false;
    }
}

/// No location hardware on this platform.
pub struct NoLocation;

impl LocationService for NoLocation {
    fn is_enabled(&self) -> bool {
        false
    }

    fn authorization(&self) -> Authorization {
        Authorization::NotDetermined
    }

    fn request_authorization(&self) -> Result<()> {
        Err(MtMapError::PlatformUnavailable)
    }

    fn request_one_shot(&self) -> BoxFuture<'static, Result<LocationFix>> {
        warn!("LocationService::request_one_shot called on stub bridge");
        Box::pin(async { Err(MtMapError::PlatformUnavailable) })
    }

    fn subscribe(&self, _policy: &LocationPolicy, _sink: LocationSink) -> Result<SubscriptionHandle> {
        warn!("LocationService::subscribe called on stub bridge");
        Err(MtMapError::PlatformUnavailable)
    }

    fn unsubscribe(&self, _handle: SubscriptionHandle) -> Result<()> {
        Ok(())
    }
}

/// No search/routing backend on this platform.
pub struct NoSearch;

impl SearchService for NoSearch {
    fn calculate_route(&self, _request: RouteRequest) -> BoxFuture<'static, Result<Route>> {
        warn!("SearchService::calculate_route called on stub bridge");
        Box::pin(async { Err(MtMapError::PlatformUnavailable) })
    }

    fn search_nearby(&self, _query: PlaceQuery) -> BoxFuture<'static, Result<Vec<Place>>> {
        warn!("SearchService::search_nearby called on stub bridge");
        Box::pin(async { Err(MtMapError::PlatformUnavailable) })
    }
}
