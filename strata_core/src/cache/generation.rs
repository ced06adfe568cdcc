// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Stability-count driven snapshot cache.

use core::fmt::Write as _;

use hashbrown::HashMap;
use kurbo::Affine;

use crate::canvas::{Canvas, RasterSurface};
use crate::geometry::round_out;
use crate::image::Image;
use crate::layer::{ContainerEffect, Layer, LayerId, LayerKind, LayerType, PaintContext};
use crate::paint::SamplingOptions;
use crate::trace::{
    ResourceTracer, Trackable, TracedResource, TrackableDevice, TrackableOwnership, TrackableType,
};

/// Stable frames before a picture layer is snapshotted.
pub const PICTURE_STABLE_THRESHOLD: u32 = 32;
/// Stable frames before an opacity layer is snapshotted.
pub const OPACITY_STABLE_THRESHOLD: u32 = 24;
/// Stable frames before an image-filter layer is snapshotted.
pub const IMAGE_FILTER_STABLE_THRESHOLD: u32 = 16;

/// Outcome of visiting a layer during paint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheState {
    /// The layer kind is never cached, or a snapshot is being generated.
    NotCachable,
    /// The layer is tracked but not stable long enough.
    Recording,
    /// A snapshot from an earlier frame is available.
    HasCached,
    /// A snapshot was taken during this visit.
    JustCached,
    /// Taking a snapshot failed.
    RenderError,
}

/// Number of stable frames after which `layer` is snapshotted, or `None` if
/// the layer is never cached.
#[must_use]
pub fn stable_count_threshold(layer: &Layer) -> Option<u32> {
    match layer.kind() {
        LayerKind::Picture(_) => Some(PICTURE_STABLE_THRESHOLD),
        LayerKind::Container {
            effect: ContainerEffect::Opacity(_),
            ..
        } => Some(OPACITY_STABLE_THRESHOLD),
        LayerKind::Container {
            effect: ContainerEffect::ImageFilter(_),
            ..
        } => Some(IMAGE_FILTER_STABLE_THRESHOLD),
        _ => None,
    }
}

#[derive(Clone, Debug)]
struct CacheRecord {
    layer_type: LayerType,
    generation: u64,
    stable_count: u32,
    evicted: bool,
    snapshot: Option<Image>,
}

/// Per-layer generation tracking and image snapshots.
///
/// Between [`begin_frame`](Self::begin_frame) and
/// [`end_frame`](Self::end_frame) every cacheable layer that is painted
/// updates its record; records of layers that were not painted are dropped
/// at the end of the frame.
#[derive(Debug, Default)]
pub struct LayerGenerationCache {
    records: HashMap<LayerId, CacheRecord>,
}

impl LayerGenerationCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks every record evicted; painting a layer clears the mark.
    pub fn begin_frame(&mut self) {
        for record in self.records.values_mut() {
            record.evicted = true;
        }
    }

    /// Drops the records of layers not painted since
    /// [`begin_frame`](Self::begin_frame).
    pub fn end_frame(&mut self) {
        self.records.retain(|_, record| !record.evicted);
    }

    /// Drops all snapshots; with `reset_recordings` also forgets stability
    /// counts.
    pub fn purge_cache_resources(&mut self, reset_recordings: bool) {
        for record in self.records.values_mut() {
            record.snapshot = None;
        }
        if reset_recordings {
            self.records.clear();
        }
    }

    /// Number of tracked layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no layer is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns `true` if `id` is tracked.
    #[must_use]
    pub fn contains(&self, id: LayerId) -> bool {
        self.records.contains_key(&id)
    }

    /// Consecutive stable frames recorded for `id`.
    #[must_use]
    pub fn stable_count(&self, id: LayerId) -> Option<u32> {
        self.records.get(&id).map(|r| r.stable_count)
    }

    /// Snapshot taken for `id`, if any.
    #[must_use]
    pub fn snapshot(&self, id: LayerId) -> Option<&Image> {
        self.records.get(&id).and_then(|r| r.snapshot.as_ref())
    }

    /// Updates the record of `layer` and snapshots it once stable.
    pub fn update_cache_recording(
        &mut self,
        layer: &Layer,
        context: &mut PaintContext<'_>,
    ) -> CacheState {
        if context.is_generating_cache {
            return CacheState::NotCachable;
        }
        let Some(threshold) = stable_count_threshold(layer) else {
            return CacheState::NotCachable;
        };

        let Some(record) = self.records.get_mut(&layer.id()) else {
            self.records.insert(
                layer.id(),
                CacheRecord {
                    layer_type: layer.layer_type(),
                    generation: layer.generation(),
                    stable_count: 1,
                    evicted: false,
                    snapshot: None,
                },
            );
            return CacheState::Recording;
        };

        record.evicted = false;
        if record.generation != layer.generation() {
            record.snapshot = None;
            record.stable_count = 0;
            record.generation = layer.generation();
            return CacheState::Recording;
        }
        record.stable_count += 1;
        if record.stable_count < threshold {
            return CacheState::Recording;
        }
        if record.snapshot.is_some() {
            return CacheState::HasCached;
        }

        match take_layer_snapshot(layer, context) {
            Some(image) => {
                log::debug!(
                    "Cached {} #{}:{} after {} stable frames",
                    layer.type_name(),
                    layer.id(),
                    layer.generation(),
                    record.stable_count
                );
                record.snapshot = Some(image);
                CacheState::JustCached
            }
            None => CacheState::RenderError,
        }
    }

    /// Draws the snapshot of `layer` at its paint bounds if one exists after
    /// updating its record. Returns `true` if the layer was drawn.
    pub fn try_draw_cache_image_snapshot(
        &mut self,
        layer: &Layer,
        context: &mut PaintContext<'_>,
    ) -> bool {
        let state = self.update_cache_recording(layer, context);
        if !matches!(state, CacheState::HasCached | CacheState::JustCached) {
            return false;
        }
        let Some(image) = self.snapshot(layer.id()) else {
            return false;
        };
        let bounds = layer.paint_bounds();
        context
            .canvas
            .draw_image(image, bounds.x0, bounds.y0, SamplingOptions::Linear, None);
        if image.is_texture_backed() {
            context.has_gpu_retained_resource = true;
        }
        true
    }

    /// Writes one line per tracked layer to `line_printer`.
    pub fn print_cache_stat(&self, mut line_printer: impl FnMut(String)) {
        for (id, record) in &self.records {
            let mut line = format!(
                "Layer #{id}:{} [typename: {}, stable_count: {}] ",
                record.generation,
                record.layer_type.type_name(),
                record.stable_count
            );
            match &record.snapshot {
                Some(image) => {
                    let kind = if image.is_texture_backed() {
                        "GPU texture"
                    } else {
                        "Raster bitmap"
                    };
                    let kib = image.byte_size() as f64 / 1024.0;
                    let _ = write!(line, "<Image> #{} [{kind} {kib:.2}KiB]", image.unique_id());
                }
                None => line.push_str("<Recording>"),
            }
            line_printer(line);
        }
    }
}

/// Renders `layer` into an image the size of its paint bounds.
fn take_layer_snapshot(layer: &Layer, context: &mut PaintContext<'_>) -> Option<Image> {
    let bounds = layer.paint_bounds();
    let device_bounds = round_out(bounds);
    if device_bounds.is_empty() {
        return None;
    }
    let Some(mut surface) = RasterSurface::new(device_bounds.width(), device_bounds.height())
    else {
        log::error!(
            "Failed to allocate a {}x{} snapshot surface",
            device_bounds.width(),
            device_bounds.height()
        );
        return None;
    };

    {
        let mut canvas = surface.canvas();
        canvas.translate(-bounds.x0, -bounds.y0);
        let mut sub_context = PaintContext {
            is_generating_cache: true,
            root_surface_transformation: Affine::IDENTITY,
            canvas: &mut canvas,
            cull_rect: context.cull_rect,
            has_gpu_context: context.has_gpu_context,
            texture_manager: context.texture_manager,
            imported_resources: context.imported_resources,
            cache: None,
            raster_cache: None,
            has_gpu_retained_resource: false,
            gpu_finished_semaphores: Vec::new(),
            gpu_wait_semaphores: Vec::new(),
        };
        layer.paint(&mut sub_context);

        // The frame submit signals and waits on behalf of the snapshot.
        context
            .gpu_finished_semaphores
            .append(&mut sub_context.gpu_finished_semaphores);
        context
            .gpu_wait_semaphores
            .append(&mut sub_context.gpu_wait_semaphores);
        context.has_gpu_retained_resource |= sub_context.has_gpu_retained_resource;
    }

    let image = if context.has_gpu_context {
        Image::texture_backed(surface.pixmap().clone())
    } else {
        surface.snapshot()
    };
    Some(image)
}

impl Trackable for LayerGenerationCache {
    fn trace(&self, tracer: &mut dyn ResourceTracer) {
        for (id, record) in &self.records {
            let Some(image) = &record.snapshot else {
                continue;
            };
            let device = if image.is_texture_backed() {
                TrackableDevice::Gpu
            } else {
                TrackableDevice::Cpu
            };
            tracer.trace_resource(TracedResource {
                annotation: &format!("Cache[Layer#{id}:{}]", record.generation),
                kind: TrackableType::Texture,
                device,
                ownership: TrackableOwnership::Shared,
                id: image.unique_id(),
                size: Some(image.byte_size()),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Picture;
    use crate::layer::PrerollContext;
    use crate::paint::{Color, Paint};
    use kurbo::Rect;

    fn opacity_tree() -> Layer {
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        let picture = Picture::record(rect, |c| c.draw_rect(rect, &Paint::fill(Color::RED)));
        let mut root = Layer::opacity(0.5).with_child(Layer::picture(picture));
        root.preroll(&mut PrerollContext::default(), Affine::IDENTITY);
        root
    }

    fn paint_frame(cache: &mut LayerGenerationCache, root: &Layer) -> RasterSurface {
        let mut surface = RasterSurface::new(10, 10).unwrap();
        cache.begin_frame();
        {
            let mut canvas = surface.canvas();
            let mut ctx = PaintContext::new(&mut canvas, root.paint_bounds());
            ctx.cache = Some(&mut *cache);
            root.paint(&mut ctx);
        }
        cache.end_frame();
        surface
    }

    #[test]
    fn snapshot_taken_on_threshold_visit() {
        let root = opacity_tree();
        let mut cache = LayerGenerationCache::new();
        for frame in 1..OPACITY_STABLE_THRESHOLD {
            paint_frame(&mut cache, &root);
            assert!(cache.snapshot(root.id()).is_none(), "no snapshot at frame {frame}");
        }
        let surface = paint_frame(&mut cache, &root);
        assert!(cache.snapshot(root.id()).is_some(), "snapshot at the threshold frame");
        let px = surface.pixel(5, 5).unwrap();
        assert!((127..=129).contains(&px.a), "cached draw keeps the alpha");

        let surface = paint_frame(&mut cache, &root);
        assert_eq!(surface.pixel(5, 5).map(|p| p.r), Some(255));
    }

    #[test]
    fn generation_change_drops_snapshot() {
        let mut root = opacity_tree();
        let mut cache = LayerGenerationCache::new();
        for _ in 0..OPACITY_STABLE_THRESHOLD {
            paint_frame(&mut cache, &root);
        }
        assert!(cache.snapshot(root.id()).is_some(), "snapshot present");
        root.set_effect(ContainerEffect::Opacity(0.25));
        paint_frame(&mut cache, &root);
        assert!(cache.snapshot(root.id()).is_none(), "snapshot released");
        assert_eq!(cache.stable_count(root.id()), Some(0));
    }

    #[test]
    fn unvisited_layers_are_swept() {
        let root = opacity_tree();
        let mut cache = LayerGenerationCache::new();
        paint_frame(&mut cache, &root);
        assert!(cache.contains(root.id()), "opacity layer tracked");
        cache.begin_frame();
        cache.end_frame();
        assert!(cache.is_empty(), "unvisited layer removed");
    }

    #[test]
    fn containers_without_cacheable_effect_are_not_tracked() {
        let root = Layer::transform(Affine::scale(2.0));
        assert_eq!(stable_count_threshold(&root), None);
        let mut cache = LayerGenerationCache::new();
        paint_frame(&mut cache, &root);
        assert!(cache.is_empty(), "transform layers are not cached");
    }

    #[test]
    fn stat_lines_and_purge() {
        let root = opacity_tree();
        let mut cache = LayerGenerationCache::new();
        for _ in 0..OPACITY_STABLE_THRESHOLD {
            paint_frame(&mut cache, &root);
        }
        let mut lines = Vec::new();
        cache.print_cache_stat(|line| lines.push(line));
        assert!(
            lines.iter().any(|l| l.contains("OpacityLayer") && l.contains("Raster bitmap")),
            "stat lines: {lines:?}"
        );
        cache.purge_cache_resources(false);
        assert!(cache.snapshot(root.id()).is_none(), "snapshot purged");
        assert!(cache.contains(root.id()), "recording kept");
        cache.purge_cache_resources(true);
        assert!(cache.is_empty(), "recordings reset");
    }
}
