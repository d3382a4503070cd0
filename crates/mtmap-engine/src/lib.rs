// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// mtmap engine: the control bridge proper.  Decodes host commands, keeps the
// per-channel overlay registries, drives native map surfaces through the
// `mtmap-bridge` traits, manages embedded view lifecycles and streams device
// location back to the host.

pub mod allocator;
pub mod channel;
pub mod controller;
pub mod dispatcher;
pub mod location;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod view;

#[cfg(test)]
mod testing;

pub use allocator::IdAllocator;
pub use channel::ChannelHandle;
pub use controller::MapController;
pub use dispatcher::Dispatcher;
pub use location::LocationStream;
pub use protocol::{Event, Method, MethodCall, Reply};
pub use registry::OverlayRegistry;
pub use session::BridgeSession;
pub use view::ViewManager;
