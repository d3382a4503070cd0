// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Overlay handle allocation.

use std::sync::atomic::{AtomicI64, Ordering};

use mtmap_core::types::OverlayId;

/// Issues overlay handles: 1, 2, 3, ... with no reuse.
///
/// Removing an overlay never returns its handle to the pool, so a stale
/// handle still held by the host can only ever miss; it cannot alias a newer
/// overlay.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicI64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(1),
        }
    }

    /// Take the next handle. Safe to call from any thread.
    pub fn next(&self) -> OverlayId {
        OverlayId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Number of handles issued so far.
    pub fn issued(&self) -> i64 {
        self.next.load(Ordering::Relaxed) - 1
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
