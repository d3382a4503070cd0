// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// mtmap bridge: native platform bridge abstractions.
//
// Defines the collaborator traits the control bridge consumes (map surfaces,
// location service, search backend) and picks the implementation for the
// target operating system. Android goes through JNI, iOS through objc2;
// everything else gets the headless stub.

pub mod callbacks;
pub mod sink;
pub mod traits;

#[cfg(target_os = "ios")]
pub mod ios;

#[cfg(target_os = "android")]
pub mod android;

#[cfg(not(any(target_os = "ios", target_os = "android")))]
pub mod stub;

pub use sink::LocationSink;
pub use traits::{
    BoxFuture, LocationService, MapRenderer, MapSurfaceFactory, PlatformBridge, SearchService,
};

/// Retrieves the bridge implementation for the target operating system.
pub fn platform_bridge() -> std::sync::Arc<dyn PlatformBridge> {
    #[cfg(target_os = "ios")]
    {
        std::sync::Arc::new(ios::IosBridge::new())
    }
    #[cfg(target_os = "android")]
    {
        std::sync::Arc::new(android::AndroidBridge::new())
    }
    #[cfg(not(any(target_os = "ios", target_os = "android")))]
    {
        // DESKTOP/CI: headless surfaces, no location hardware.
        std::sync::Arc::new(stub::StubBridge)
    }
}
