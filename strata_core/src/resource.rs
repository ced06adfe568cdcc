// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Handles to GPU resources owned outside the layer tree.

use core::fmt;

use crate::image::Image;

/// An opaque GPU semaphore handle (a raw `VkSemaphore` on Vulkan targets).
///
/// Core never interprets the value; render targets translate it back into
/// their native handle when a frame is submitted.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GpuSemaphore(pub u64);

impl fmt::Debug for GpuSemaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GpuSemaphore({:#x})", self.0)
    }
}

/// Lookup of resources imported into a content aggregator by id.
///
/// `GpuSurfaceView` layers reference imported surfaces and semaphores by the
/// integer ids the aggregator handed out at import time.
pub trait ImportedResources {
    /// Returns the imported surface with the given id as a drawable image.
    fn imported_surface(&self, id: i64) -> Option<Image>;

    /// Returns the imported semaphore with the given id.
    fn imported_semaphore(&self, id: i64) -> Option<GpuSemaphore>;
}
