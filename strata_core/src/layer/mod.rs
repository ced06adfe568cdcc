// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The layer tree.
//!
//! A frame is described by a tree of [`Layer`]s owned by a [`LayerTree`].
//! Containers apply an effect ([`ContainerEffect`]) to their children; leaves
//! draw pictures, textures or imported GPU surfaces.
//!
//! Rendering a tree takes two passes:
//!
//! 1. **Preroll** ([`Layer::preroll`]) computes every layer's paint bounds
//!    and accumulates the cull rectangle.
//! 2. **Paint** ([`Layer::paint`]) walks the tree again, skipping layers
//!    whose bounds are empty or rejected by the canvas, and draws into the
//!    [`PaintContext`] canvas. Picture, opacity and image-filter layers may
//!    be served from the generation cache instead.
//!
//! Layers carry a generation counter bumped by their setters. Caches compare
//! generations between frames instead of diffing trees.

mod clip;
mod id;
mod node;
mod paint;
mod preroll;
mod traverse;
mod tree;

pub use clip::ClipShape;
pub use id::{LayerId, LayerType};
pub use node::{ContainerEffect, ExternalTextureAccessor, Layer, LayerKind};
pub use paint::PaintContext;
pub use preroll::PrerollContext;
pub use traverse::Descendants;
pub use tree::{FrameObserver, LayerTree, SharedFrameObserver};
