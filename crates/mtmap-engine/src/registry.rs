// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Authoritative overlay bookkeeping for one channel.
//
// Every channel (the session-global one and each embedded view) owns its own
// registry, so handles from one are meaningless to another.

use std::collections::BTreeMap;

use tracing::debug;

use mtmap_core::error::Result;
use mtmap_core::types::{Overlay, OverlayId, OverlayKind};

use crate::allocator::IdAllocator;

/// Handle → overlay descriptor map backed by a private [`IdAllocator`].
#[derive(Debug, Default)]
pub struct OverlayRegistry {
    ids: IdAllocator,
    overlays: BTreeMap<OverlayId, Overlay>,
}

impl OverlayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `overlay`, store it under a fresh handle and return the
    /// handle.
    ///
    /// Fails with `InvalidArgument` for malformed geometry; no handle is
    /// consumed in that case.
    pub fn add(&mut self, overlay: Overlay) -> Result<OverlayId> {
        overlay.validate()?;
        let id = self.ids.next();
        debug!(overlay_id = %id, kind = overlay.kind().label(), "overlay registered");
        self.overlays.insert(id, overlay);
        Ok(id)
    }

    /// Remove `id`. Unknown handles are not an error: returns false.
    pub fn remove(&mut self, id: OverlayId) -> bool {
        self.overlays.remove(&id).is_some()
    }

    /// Remove `id` only if it is an overlay of `kind`.
    ///
    /// A marker handle passed to `removePolyline` is treated as absent and
    /// left in place.
    pub fn remove_kind(&mut self, id: OverlayId, kind: OverlayKind) -> bool {
        if !self.contains_kind(id, kind) {
            return false;
        }
        self.remove(id)
    }

    pub fn get(&self, id: OverlayId) -> Option<&Overlay> {
        self.overlays.get(&id)
    }

    pub fn contains_kind(&self, id: OverlayId, kind: OverlayKind) -> bool {
        self.get(id).is_some_and(|o| o.kind() == kind)
    }

    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    /// Live handles in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = OverlayId> + '_ {
        self.overlays.keys().copied()
    }

    /// Drop every entry. Handles keep counting from where they were.
    pub fn clear(&mut self) {
        self.overlays.clear();
    }
}
