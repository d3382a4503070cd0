// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// State of one map surface: its renderer, overlay registry, camera, style
// and control toggles.
//
// The controller keeps the registry and the renderer in step. An overlay is
// only recorded once the renderer has drawn it, and only forgotten once the
// renderer has taken it down.

use std::time::Duration;

use tracing::{debug, info, warn};

use mtmap_bridge::MapRenderer;
use mtmap_core::error::{MtMapError, Result};
use mtmap_core::types::{
    ControlState, LatLng, MapControl, MapStyle, Overlay, OverlayId, OverlayKind, ViewSize,
};

use crate::registry::OverlayRegistry;

/// Camera position as last commanded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub target: Option<LatLng>,
    pub zoom: f64,
}

pub struct MapController {
    label: String,
    renderer: Box<dyn MapRenderer>,
    registry: OverlayRegistry,
    initialized: bool,
    visible: bool,
    camera: Camera,
    style: MapStyle,
    controls: ControlState,
    size: Option<ViewSize>,
}

impl MapController {
    /// A controller for the session-global surface. `initialize` must run
    /// before the map can be shown.
    pub fn new(label: impl Into<String>, renderer: Box<dyn MapRenderer>, default_zoom: f64) -> Self {
        Self {
            label: label.into(),
            renderer,
            registry: OverlayRegistry::new(),
            initialized: false,
            visible: false,
            camera: Camera {
                target: None,
                zoom: default_zoom,
            },
            style: MapStyle::default(),
            controls: ControlState::default(),
            size: None,
        }
    }

    /// A controller for an embedded view; the host already mounted it, so it
    /// starts out initialized and visible.
    pub fn for_view(label: impl Into<String>, renderer: Box<dyn MapRenderer>, default_zoom: f64) -> Self {
        let mut controller = Self::new(label, renderer, default_zoom);
        controller.initialized = true;
        controller.visible = true;
        controller
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn camera(&self) -> Camera {
        self.camera
    }

    pub fn style(&self) -> &MapStyle {
        &self.style
    }

    pub fn controls(&self) -> ControlState {
        self.controls
    }

    pub fn size(&self) -> Option<ViewSize> {
        self.size
    }

    pub fn registry(&self) -> &OverlayRegistry {
        &self.registry
    }

    // -- Lifecycle ----------------------------------------------------------

    pub fn initialize(&mut self, api_key: &str) -> Result<()> {
        self.renderer.render_init(api_key)?;
        if !self.initialized {
            info!(surface = %self.label, "map initialized");
        }
        self.initialized = true;
        Ok(())
    }

    /// Make the map visible centred on `target`.
    pub fn show(&mut self, target: LatLng, zoom: Option<f64>) -> Result<()> {
        if !self.initialized {
            return Err(MtMapError::NotInitialized);
        }
        target.validate()?;
        let zoom = zoom.unwrap_or(self.camera.zoom);
        self.renderer.set_center(target)?;
        self.renderer.set_zoom(zoom)?;
        self.renderer.show()?;
        self.camera = Camera {
            target: Some(target),
            zoom,
        };
        self.visible = true;
        debug!(surface = %self.label, lat = target.latitude, lng = target.longitude, zoom, "map shown");
        Ok(())
    }

    /// Hide the surface. Overlays and camera state are kept for the next
    /// `show`.
    pub fn hide(&mut self) -> Result<()> {
        self.renderer.hide()?;
        self.visible = false;
        Ok(())
    }

    // -- Overlays -----------------------------------------------------------

    pub fn add_overlay(&mut self, overlay: Overlay) -> Result<OverlayId> {
        let id = self.registry.add(overlay)?;
        let drawn = match self.registry.get(id) {
            Some(overlay) => self.renderer.add_overlay(id, overlay),
            None => Ok(()),
        };
        if let Err(e) = drawn {
            // Never drawn, so never exposed. The handle stays burned.
            self.registry.remove(id);
            return Err(e);
        }
        Ok(id)
    }

    /// Remove an overlay of `kind`. Returns false when the handle is unknown
    /// to this surface or names a different kind of overlay.
    pub fn remove_overlay(&mut self, id: OverlayId, kind: OverlayKind) -> Result<bool> {
        if !self.registry.contains_kind(id, kind) {
            debug!(surface = %self.label, overlay_id = %id, kind = kind.label(), "remove of absent overlay");
            return Ok(false);
        }
        self.renderer.remove_overlay(id)?;
        Ok(self.registry.remove_kind(id, kind))
    }

    // -- Camera -------------------------------------------------------------

    pub fn set_center(&mut self, target: LatLng, zoom: Option<f64>) -> Result<()> {
        target.validate()?;
        self.renderer.set_center(target)?;
        if let Some(level) = zoom {
            self.renderer.set_zoom(level)?;
            self.camera.zoom = level;
        }
        self.camera.target = Some(target);
        Ok(())
    }

    pub fn animate_to(&mut self, target: LatLng, zoom: Option<f64>, duration: Duration) -> Result<()> {
        target.validate()?;
        self.renderer.animate_to(target, zoom, duration)?;
        self.camera.target = Some(target);
        if let Some(level) = zoom {
            self.camera.zoom = level;
        }
        Ok(())
    }

    // -- Style & controls ---------------------------------------------------

    pub fn apply_style(&mut self, style: MapStyle) -> Result<()> {
        self.renderer.apply_style(&style)?;
        self.style = style;
        Ok(())
    }

    pub fn set_control(&mut self, control: MapControl, enabled: bool) -> Result<()> {
        self.renderer.set_control(control, enabled)?;
        self.controls.set(control, enabled);
        Ok(())
    }

    pub fn resize(&mut self, size: ViewSize) -> Result<()> {
        self.renderer.resize(size)?;
        self.size = Some(size);
        Ok(())
    }

    /// Tear down the native surface. Overlays go with it.
    pub fn release(&mut self) {
        if !self.registry.is_empty() {
            debug!(surface = %self.label, overlays = self.registry.len(), "releasing surface with live overlays");
        }
        self.renderer.release();
        self.registry.clear();
        self.visible = false;
        self.initialized = false;
    }
}

impl std::fmt::Debug for MapController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapController")
            .field("label", &self.label)
            .field("initialized", &self.initialized)
            .field("visible", &self.visible)
            .field("overlays", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl Drop for MapController {
    fn drop(&mut self) {
        if self.initialized {
            warn!(surface = %self.label, "map controller dropped without release");
            self.renderer.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeSurfaces, RenderOp};
    use mtmap_bridge::MapSurfaceFactory;
    use mtmap_core::types::{Argb, Marker, Polyline};

    fn controller(surfaces: &FakeSurfaces) -> MapController {
        MapController::new("global", surfaces.global_surface().unwrap(), 15.0)
    }

    fn marker() -> Overlay {
        Overlay::Marker(Marker {
            position: LatLng::new(39.9, 116.4),
            title: None,
            snippet: None,
            icon: None,
        })
    }

    #[test]
    fn show_requires_initialize() {
        let surfaces = FakeSurfaces::new();
        let mut map = controller(&surfaces);
        let err = map.show(LatLng::new(39.9, 116.4), None).unwrap_err();
        assert_eq!(err.code(), "NOT_INITIALIZED");

        map.initialize("key").unwrap();
        map.show(LatLng::new(39.9, 116.4), None).unwrap();
        assert!(map.is_visible());
        assert_eq!(map.camera().zoom, 15.0);
        map.release();
    }

    #[test]
    fn renderer_failure_leaves_no_registry_entry() {
        let surfaces = FakeSurfaces::new();
        let mut map = controller(&surfaces);
        surfaces.fail_next_render_call();
        assert!(map.add_overlay(marker()).is_err());
        assert!(map.registry().is_empty());

        // The failed attempt burned handle 1.
        assert_eq!(map.add_overlay(marker()).unwrap(), OverlayId(2));
        map.release();
    }

    #[test]
    fn failed_native_remove_keeps_the_overlay() {
        let surfaces = FakeSurfaces::new();
        let mut map = controller(&surfaces);
        let id = map.add_overlay(marker()).unwrap();
        surfaces.fail_next_render_call();
        assert!(map.remove_overlay(id, OverlayKind::Marker).is_err());
        assert_eq!(map.registry().len(), 1);
        assert!(map.remove_overlay(id, OverlayKind::Marker).unwrap());
        map.release();
    }

    #[test]
    fn overlays_survive_hide() {
        let surfaces = FakeSurfaces::new();
        let mut map = controller(&surfaces);
        map.initialize("key").unwrap();
        let line = Overlay::Polyline(Polyline {
            points: vec![LatLng::new(39.9, 116.4), LatLng::new(39.91, 116.41)],
            color: Argb(0xFFFF_0000),
            width: 3.0,
            geodesic: true,
        });
        let id = map.add_overlay(line).unwrap();
        map.hide().unwrap();
        map.show(LatLng::new(39.9, 116.4), Some(12.0)).unwrap();
        assert!(map.registry().contains_kind(id, OverlayKind::Polyline));
        assert!(surfaces.journal().contains(&RenderOp::Hide("global".into())));
        map.release();
    }
}
