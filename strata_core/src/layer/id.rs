// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layer identity and type tags.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

static NEXT_LAYER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a layer.
///
/// Ids are never reused. A cloned layer keeps the id of its original, which is
/// what lets caches recognize the same layer across frames.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerId(pub u64);

impl LayerId {
    pub(crate) fn next() -> Self {
        Self(NEXT_LAYER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LayerId({})", self.0)
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type tag of a layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerType {
    /// Plain container without an effect.
    Container,
    /// Container applying an affine transform.
    Transform,
    /// Container composited with an alpha.
    Opacity,
    /// Container whose content is filtered.
    ImageFilter,
    /// Container filtering the content behind it.
    BackdropFilter,
    /// Container clipped by a rectangle.
    RectClip,
    /// Container clipped by a rounded rectangle.
    RRectClip,
    /// Container clipped by a path.
    PathClip,
    /// Recorded picture.
    Picture,
    /// Texture from the texture manager.
    Texture,
    /// Texture produced by an external accessor.
    ExternalTexture,
    /// Imported GPU surface.
    GpuSurfaceView,
}

impl LayerType {
    /// Name used in logs and cache statistics.
    #[must_use]
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Container => "ContainerLayer",
            Self::Transform => "TransformLayer",
            Self::Opacity => "OpacityLayer",
            Self::ImageFilter => "ImageFilterLayer",
            Self::BackdropFilter => "BackdropFilterLayer",
            Self::RectClip => "RectClipLayer",
            Self::RRectClip => "RRectClipLayer",
            Self::PathClip => "PathClipLayer",
            Self::Picture => "PictureLayer",
            Self::Texture => "TextureLayer",
            Self::ExternalTexture => "ExternalTextureLayer",
            Self::GpuSurfaceView => "GpuSurfaceViewLayer",
        }
    }

    /// Returns `true` for layers that can hold children.
    #[must_use]
    pub const fn is_container(self) -> bool {
        matches!(
            self,
            Self::Container
                | Self::Transform
                | Self::Opacity
                | Self::ImageFilter
                | Self::BackdropFilter
                | Self::RectClip
                | Self::RRectClip
                | Self::PathClip
        )
    }
}
