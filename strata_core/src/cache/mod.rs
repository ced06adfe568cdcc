// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame-to-frame caches used by the paint traversal.
//!
//! Two caches cooperate:
//!
//! - [`LayerGenerationCache`] tracks how many consecutive frames a layer kept
//!   its generation. Once a picture, opacity or image-filter layer has been
//!   stable long enough, its subtree is rendered into an image snapshot and
//!   later frames draw the snapshot instead of walking the subtree.
//! - [`RasterCache`] counts how often a picture is drawn and rasterizes it
//!   once it is used often enough, keyed by picture id and the scale/skew
//!   part of the drawing matrix.

mod generation;
mod key;
mod raster;

pub use generation::{
    CacheState, IMAGE_FILTER_STABLE_THRESHOLD, LayerGenerationCache, OPACITY_STABLE_THRESHOLD,
    PICTURE_STABLE_THRESHOLD, stable_count_threshold,
};
pub use key::{RasterCacheKey, RasterCacheLayerId};
pub use raster::{PICTURE_CACHE_THRESHOLD, PICTURE_TRACE_OVERDUE, RasterCache, RasterCacheItem};
