// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Use-count driven picture rasterization cache.

use hashbrown::HashMap;
use hashbrown::hash_map::Entry;
use kurbo::{Affine, Rect};

use super::key::{RasterCacheKey, RasterCacheLayerId};
use crate::canvas::{Canvas, Picture, RasterSurface};
use crate::geometry::{GIANT_RECT, is_empty, round_out};
use crate::image::Image;
use crate::paint::ClipOp;
use crate::trace::{
    ResourceTracer, Trackable, TracedResource, TrackableDevice, TrackableOwnership, TrackableType,
};

/// Number of uses after which a picture is worth rasterizing.
pub const PICTURE_CACHE_THRESHOLD: u64 = 15;

/// Frames after its last use at which a picture's usage record is dropped.
pub const PICTURE_TRACE_OVERDUE: u64 = 40;

/// A cached rasterization.
#[derive(Clone, Debug)]
pub enum RasterCacheItem {
    /// Placeholder with no pixels.
    Empty,
    /// Rasterized content.
    Image(Image),
}

#[derive(Clone, Copy, Debug)]
struct PictureUsage {
    first_frame: u64,
    last_frame: u64,
    use_count: u64,
}

/// Rasterizes frequently drawn pictures.
#[derive(Debug, Default)]
pub struct RasterCache {
    has_gpu_context: bool,
    entries: HashMap<RasterCacheKey, RasterCacheItem>,
    frame_counter: u64,
    picture_usage: HashMap<u64, PictureUsage>,
}

impl RasterCache {
    /// Creates an empty cache. `has_gpu_context` only affects how entries
    /// are reported to resource tracers.
    #[must_use]
    pub fn new(has_gpu_context: bool) -> Self {
        Self {
            has_gpu_context,
            ..Self::default()
        }
    }

    /// Advances the frame counter used to age usage records.
    pub fn increase_frame_count(&mut self) {
        self.frame_counter += 1;
    }

    /// Current frame counter.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_counter
    }

    /// Drops every cached image and usage record.
    pub fn purge_all(&mut self) {
        self.picture_usage.clear();
        self.entries.clear();
    }

    /// Records that `picture` is drawn in the current frame.
    ///
    /// Returns `true` once the picture has been used often enough to be
    /// cached. Usage records not touched for [`PICTURE_TRACE_OVERDUE`] frames
    /// are dropped.
    pub fn mark_picture_used(&mut self, picture: &Picture) -> bool {
        let frame = self.frame_counter;
        let usage = self
            .picture_usage
            .entry(picture.unique_id())
            .and_modify(|usage| {
                usage.last_frame = frame;
                usage.use_count += 1;
            })
            .or_insert(PictureUsage {
                first_frame: frame,
                last_frame: frame,
                use_count: 1,
            });
        let promoted = usage.use_count >= PICTURE_CACHE_THRESHOLD;
        log::trace!(
            "Picture #{} used {} times since frame {}",
            picture.unique_id(),
            usage.use_count,
            usage.first_frame
        );
        self.purge_overdue_usage();
        promoted
    }

    /// Number of recorded uses of a picture.
    #[must_use]
    pub fn use_count(&self, picture_id: u64) -> Option<u64> {
        self.picture_usage.get(&picture_id).map(|u| u.use_count)
    }

    /// Looks up a cached item.
    #[must_use]
    pub fn find(&self, key: &RasterCacheKey) -> Option<&RasterCacheItem> {
        self.entries.get(key)
    }

    /// Number of cached items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rasterizes `picture` and stores it under the key derived from
    /// `matrix`.
    ///
    /// Caches of pictures whose usage record has been dropped are purged
    /// first. Returns `false` when the picture has unbounded or empty
    /// bounds, when allocation fails, or when an entry already exists.
    pub fn generate_picture_cache(&mut self, picture: &Picture, matrix: Affine) -> bool {
        self.purge_overdue_caches();

        let cull = picture.cull_rect();
        if cull == GIANT_RECT || is_empty(cull) {
            return false;
        }
        let bounds = round_out(cull);
        let Some(mut surface) = RasterSurface::new(bounds.width(), bounds.height()) else {
            log::error!("Failed to allocate a {}x{} raster cache surface", bounds.width(), bounds.height());
            return false;
        };
        {
            let mut canvas = surface.canvas();
            canvas.clip_rect(
                Rect::new(0.0, 0.0, cull.width(), cull.height()),
                ClipOp::Intersect,
                false,
            );
            canvas.translate(-cull.x0, -cull.y0);
            canvas.draw_picture(picture, None, None);
        }

        let key = RasterCacheKey::new(RasterCacheLayerId::picture(picture.unique_id()), matrix);
        match self.entries.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(RasterCacheItem::Image(surface.snapshot()));
                true
            }
        }
    }

    fn purge_overdue_usage(&mut self) {
        let frame = self.frame_counter;
        self.picture_usage
            .retain(|_, usage| frame.saturating_sub(usage.last_frame) < PICTURE_TRACE_OVERDUE);
    }

    fn purge_overdue_caches(&mut self) {
        let usage = &self.picture_usage;
        self.entries.retain(|key, _| match key.layer_id().picture_unique_id() {
            Some(id) => usage.contains_key(&id),
            None => true,
        });
    }
}

impl Trackable for RasterCache {
    fn trace(&self, tracer: &mut dyn ResourceTracer) {
        let device = if self.has_gpu_context {
            TrackableDevice::Gpu
        } else {
            TrackableDevice::Cpu
        };
        for (key, item) in &self.entries {
            let layer_id = key.layer_id();
            let annotation = match layer_id {
                RasterCacheLayerId::Picture(id) => format!("RasterCache[Picture#{id}]"),
                RasterCacheLayerId::Container(hash) => format!("RasterCache[Container#{hash}]"),
            };
            let size = match item {
                RasterCacheItem::Image(image) => Some(image.byte_size()),
                RasterCacheItem::Empty => None,
            };
            tracer.trace_resource(TracedResource {
                annotation: &annotation,
                kind: TrackableType::Texture,
                device,
                ownership: TrackableOwnership::StrictOwned,
                id: layer_id.hash_value(),
                size,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paint::{Color, Paint};

    fn picture() -> Picture {
        let cull = Rect::new(10.0, 10.0, 30.0, 30.0);
        Picture::record(cull, |c| c.draw_rect(cull, &Paint::fill(Color::RED)))
    }

    #[test]
    fn picture_is_promoted_after_threshold_uses() {
        let mut cache = RasterCache::new(false);
        let pic = picture();
        for _ in 1..PICTURE_CACHE_THRESHOLD {
            assert!(!cache.mark_picture_used(&pic), "promoted too early");
            cache.increase_frame_count();
        }
        assert!(cache.mark_picture_used(&pic), "promoted at the threshold");
    }

    #[test]
    fn generated_cache_holds_the_picture_pixels() {
        let mut cache = RasterCache::new(false);
        let pic = picture();
        cache.mark_picture_used(&pic);
        assert!(cache.generate_picture_cache(&pic, Affine::translate((3.0, 4.0))));
        assert!(
            !cache.generate_picture_cache(&pic, Affine::IDENTITY),
            "same key ignoring translation"
        );
        let key = RasterCacheKey::new(RasterCacheLayerId::picture(pic.unique_id()), Affine::IDENTITY);
        let Some(RasterCacheItem::Image(image)) = cache.find(&key) else {
            panic!("cache entry missing");
        };
        assert_eq!((image.width(), image.height()), (20, 20));
        let px = image.pixmap().pixel(5, 5).unwrap();
        assert_eq!((px.red(), px.alpha()), (255, 255));
    }

    #[test]
    fn stale_usage_is_purged_with_its_cache() {
        let mut cache = RasterCache::new(false);
        let stale = picture();
        let fresh = picture();
        cache.mark_picture_used(&stale);
        assert!(cache.generate_picture_cache(&stale, Affine::IDENTITY));
        for _ in 0..PICTURE_TRACE_OVERDUE {
            cache.increase_frame_count();
        }
        cache.mark_picture_used(&fresh);
        assert_eq!(cache.use_count(stale.unique_id()), None);
        assert!(cache.generate_picture_cache(&fresh, Affine::IDENTITY));
        assert_eq!(cache.len(), 1, "overdue picture cache dropped");
    }

    #[test]
    fn unbounded_pictures_are_not_cached() {
        let mut cache = RasterCache::new(false);
        let pic = Picture::record(GIANT_RECT, |_| {});
        cache.mark_picture_used(&pic);
        assert!(!cache.generate_picture_cache(&pic, Affine::IDENTITY));
        assert!(cache.is_empty());
    }
}
