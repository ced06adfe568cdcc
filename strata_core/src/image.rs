// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Immutable images drawn by canvases and held by caches.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tiny_skia::Pixmap;

use crate::geometry::ISize;
use crate::paint::Color;

static NEXT_IMAGE_ID: AtomicU64 = AtomicU64::new(1);

struct ImageInner {
    unique_id: u64,
    pixmap: Pixmap,
    texture_backed: bool,
}

/// A shared, immutable premultiplied RGBA image.
///
/// Cloning is cheap. `texture_backed` marks images whose pixels live in (or
/// mirror) GPU memory; drawing one makes the frame hold retained GPU
/// resources.
#[derive(Clone)]
pub struct Image {
    inner: Arc<ImageInner>,
}

impl Image {
    /// Wraps a CPU pixmap.
    #[must_use]
    pub fn from_pixmap(pixmap: Pixmap) -> Self {
        Self::new(pixmap, false)
    }

    /// Wraps a pixmap that mirrors a GPU texture.
    #[must_use]
    pub fn texture_backed(pixmap: Pixmap) -> Self {
        Self::new(pixmap, true)
    }

    fn new(pixmap: Pixmap, texture_backed: bool) -> Self {
        Self {
            inner: Arc::new(ImageInner {
                unique_id: NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed),
                pixmap,
                texture_backed,
            }),
        }
    }

    /// Process-unique identifier.
    #[must_use]
    pub fn unique_id(&self) -> u64 {
        self.inner.unique_id
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.inner.pixmap.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.inner.pixmap.height()
    }

    /// Dimensions in pixels.
    #[must_use]
    pub fn size(&self) -> ISize {
        ISize::new(self.width(), self.height())
    }

    /// Returns `true` if the image is backed by a GPU texture.
    #[must_use]
    pub fn is_texture_backed(&self) -> bool {
        self.inner.texture_backed
    }

    /// Size of the pixel storage in bytes.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.inner.pixmap.data().len()
    }

    /// Underlying pixels.
    #[must_use]
    pub fn pixmap(&self) -> &Pixmap {
        &self.inner.pixmap
    }

    /// Unpremultiplied color of one pixel.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        let c = self.inner.pixmap.pixel(x, y)?.demultiply();
        Some(Color::from_rgba8(c.red(), c.green(), c.blue(), c.alpha()))
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("unique_id", &self.inner.unique_id)
            .field("width", &self.width())
            .field("height", &self.height())
            .field("texture_backed", &self.inner.texture_backed)
            .finish()
    }
}

impl PartialEq for Image {
    fn eq(&self, other: &Self) -> bool {
        self.inner.unique_id == other.inner.unique_id
    }
}
