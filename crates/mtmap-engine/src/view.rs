// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Embedded map view instances.
//
// The host UI framework mounts and unmounts map views on its own schedule;
// each mount becomes a `ViewInstance` with a private surface, overlay
// registry and command channel named after the view id.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use mtmap_bridge::MapSurfaceFactory;
use mtmap_core::BridgeConfig;
use mtmap_core::error::{MtMapError, Result};
use mtmap_core::types::{CreationParams, ViewId, ViewSize};

use crate::channel::ChannelHandle;
use crate::controller::MapController;
use crate::dispatcher::Dispatcher;

/// A live embedded map view.
#[derive(Debug)]
pub struct ViewInstance {
    pub id: ViewId,
    /// Creation parameters as received; camera and style may have moved on
    /// since through commands.
    pub params: CreationParams,
    channel: ChannelHandle,
    task: JoinHandle<()>,
}

impl ViewInstance {
    pub fn channel(&self) -> &ChannelHandle {
        &self.channel
    }

    /// Close the view's channel once its queued calls are answered, which
    /// releases the native surface.
    #[instrument(skip(self), fields(view_id = %self.id))]
    pub async fn shut_down(self) {
        self.channel.close().await;
        if let Err(e) = self.task.await {
            warn!(view_id = %self.id, error = %e, "view channel task failed");
        }
        info!(view_id = %self.id, "map view disposed");
    }
}

/// Owns every live [`ViewInstance`], keyed by view id.
pub struct ViewManager {
    surfaces: Arc<dyn MapSurfaceFactory>,
    config: Arc<BridgeConfig>,
    views: BTreeMap<ViewId, ViewInstance>,
}

impl ViewManager {
    pub fn new(surfaces: Arc<dyn MapSurfaceFactory>, config: Arc<BridgeConfig>) -> Self {
        Self {
            surfaces,
            config,
            views: BTreeMap::new(),
        }
    }

    /// Mount a view and start its command channel.
    ///
    /// A missing API key is logged and tolerated; the surface renders with
    /// whatever the SDK allows without one. Initial center, zoom and style
    /// from `params` are applied once, here.
    #[instrument(skip(self, params), fields(view_id = %id))]
    pub fn create(&mut self, id: ViewId, params: CreationParams) -> Result<ChannelHandle> {
        if id.0 < 0 {
            return Err(MtMapError::invalid(format!("viewId must not be negative, got {id}")));
        }
        if self.views.contains_key(&id) {
            return Err(MtMapError::invalid(format!("view {id} already exists")));
        }
        if let Some(center) = params.initial_center() {
            center.validate()?;
        }

        let renderer = self.surfaces.create_surface(id)?;
        let mut map = MapController::for_view(format!("view {id}"), renderer, self.config.default_zoom);
        match params.api_key.as_deref() {
            Some(key) if !key.is_empty() => map.initialize(key)?,
            _ => warn!(view_id = %id, "no apiKey in creation params; map capabilities may be limited"),
        }
        if let Some(center) = params.initial_center() {
            map.set_center(center, params.zoom.or(Some(self.config.default_zoom)))?;
        }
        if let Some(style) = params.style.clone() {
            map.apply_style(style)?;
        }

        let name = self.config.view_channel_name(id);
        let dispatcher = Dispatcher::view(id, map, Arc::clone(&self.config));
        let (channel, task) =
            ChannelHandle::spawn(name, dispatcher, self.config.command_queue_depth);
        info!(view_id = %id, channel = channel.name(), "map view created");
        self.views.insert(
            id,
            ViewInstance {
                id,
                params,
                channel: channel.clone(),
                task,
            },
        );
        Ok(channel)
    }

    /// Check a resize request against the live set. Unknown ids are
    /// `NotFound`; non-positive or non-finite dimensions are
    /// `InvalidArgument` and never reach the renderer. The caller sends the
    /// size through the returned channel.
    pub fn resize_target(&self, id: ViewId, width: f64, height: f64) -> Result<(ChannelHandle, ViewSize)> {
        let channel = self.channel(id)?;
        let size = ViewSize::new(width, height)?;
        Ok((channel, size))
    }

    /// Unmount a view: it leaves the live set now, so later commands against
    /// the id are `NotFound`. The caller finishes with
    /// [`ViewInstance::shut_down`].
    pub fn remove(&mut self, id: ViewId) -> Result<ViewInstance> {
        self.views
            .remove(&id)
            .ok_or_else(|| MtMapError::NotFound(format!("view {id}")))
    }

    /// Dispose every live view.
    pub async fn dispose_all(&mut self) {
        let views = std::mem::take(&mut self.views);
        for (_, view) in views {
            view.shut_down().await;
        }
    }

    pub fn channel(&self, id: ViewId) -> Result<ChannelHandle> {
        self.views
            .get(&id)
            .map(|v| v.channel.clone())
            .ok_or_else(|| MtMapError::NotFound(format!("view {id}")))
    }

    pub fn get(&self, id: ViewId) -> Option<&ViewInstance> {
        self.views.get(&id)
    }

    pub fn ids(&self) -> Vec<ViewId> {
        self.views.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}
