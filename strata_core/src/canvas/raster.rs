// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! CPU rasterization through tiny-skia.

use std::sync::Arc;

use kurbo::{Affine, BezPath, Rect, RoundedRect};
use tiny_skia::{FillRule, Mask, Pixmap, PixmapMut, PixmapPaint, Transform};

use super::{Canvas, SaveLayerRec};
use crate::filter::ImageFilter;
use crate::geometry::{
    IRect, ISize, intersect, is_empty, map_rect, overlaps, round_out, rrect_to_path,
    to_skia_path, to_skia_rect, to_skia_transform,
};
use crate::image::Image;
use crate::paint::{BlendMode, ClipOp, Color, Paint, PaintStyle, SamplingOptions};

/// A CPU render target.
#[derive(Clone, Debug)]
pub struct RasterSurface {
    pixmap: Pixmap,
}

impl RasterSurface {
    /// Creates a transparent surface. Returns `None` for a zero-sized surface.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Option<Self> {
        Pixmap::new(width, height).map(|pixmap| Self { pixmap })
    }

    /// Wraps existing pixels.
    #[must_use]
    pub fn from_pixmap(pixmap: Pixmap) -> Self {
        Self { pixmap }
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Dimensions in pixels.
    #[must_use]
    pub fn size(&self) -> ISize {
        ISize::new(self.width(), self.height())
    }

    /// Starts drawing into the surface.
    pub fn canvas(&mut self) -> RasterCanvas<'_> {
        RasterCanvas::new(&mut self.pixmap)
    }

    /// Copies the current contents into an immutable image.
    #[must_use]
    pub fn snapshot(&self) -> Image {
        Image::from_pixmap(self.pixmap.clone())
    }

    /// Current pixels.
    #[must_use]
    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    /// Current pixels, mutably.
    pub fn pixmap_mut(&mut self) -> &mut Pixmap {
        &mut self.pixmap
    }

    /// Unpremultiplied color of one pixel.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        let c = self.pixmap.pixel(x, y)?.demultiply();
        Some(Color::from_rgba8(c.red(), c.green(), c.blue(), c.alpha()))
    }
}

#[derive(Clone)]
struct CanvasState {
    matrix: Affine,
    clip: Option<Arc<Mask>>,
    /// Device-space bounds of the clip.
    clip_bounds: Rect,
    /// This state was pushed by `save_layer`.
    opens_layer: bool,
}

struct SavedLayer {
    pixmap: Pixmap,
    bounds: IRect,
    opacity: f32,
    blend_mode: BlendMode,
    filter: Option<ImageFilter>,
    matrix: Affine,
    clip: Option<Arc<Mask>>,
}

/// A [`Canvas`] drawing into a pixmap.
///
/// Layers are device-sized pixmaps composited on restore. Dropping the canvas
/// restores any layers still open.
pub struct RasterCanvas<'a> {
    base: &'a mut Pixmap,
    width: u32,
    height: u32,
    current: CanvasState,
    saved: Vec<CanvasState>,
    layers: Vec<SavedLayer>,
}

impl core::fmt::Debug for RasterCanvas<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RasterCanvas")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("save_count", &self.save_count())
            .field("layers", &self.layers.len())
            .finish_non_exhaustive()
    }
}

impl<'a> RasterCanvas<'a> {
    /// Creates a canvas over `pixmap` with an identity matrix and no clip.
    pub fn new(pixmap: &'a mut Pixmap) -> Self {
        let width = pixmap.width();
        let height = pixmap.height();
        Self {
            base: pixmap,
            width,
            height,
            current: CanvasState {
                matrix: Affine::IDENTITY,
                clip: None,
                clip_bounds: ISize::new(width, height).to_rect(),
                opens_layer: false,
            },
            saved: Vec::new(),
            layers: Vec::new(),
        }
    }

    fn device_rect(&self) -> Rect {
        ISize::new(self.width, self.height).to_rect()
    }

    fn current_pixels(&self) -> Pixmap {
        match self.layers.last() {
            Some(layer) => layer.pixmap.clone(),
            None => self.base.clone(),
        }
    }

    fn with_target(&mut self, draw: impl FnOnce(&mut PixmapMut<'_>, Transform, Option<&Mask>)) {
        let transform = to_skia_transform(self.current.matrix);
        let mask = self.current.clip.as_deref();
        let mut target = match self.layers.last_mut() {
            Some(layer) => layer.pixmap.as_mut(),
            None => self.base.as_mut(),
        };
        draw(&mut target, transform, mask);
    }

    /// Draws through an intermediate layer when the paint carries a filter.
    fn with_filtered_paint(&mut self, paint: &Paint, bounds: Rect, draw: impl FnOnce(&mut Self, &Paint)) {
        let Some(filter) = &paint.image_filter else {
            draw(self, paint);
            return;
        };
        let layer_paint = Paint {
            image_filter: Some(filter.clone()),
            ..Paint::default()
        };
        let count = self.save_layer(&SaveLayerRec {
            bounds: Some(filter.filter_bounds(bounds)),
            paint: Some(&layer_paint),
            ..SaveLayerRec::default()
        });
        let plain = Paint {
            image_filter: None,
            ..paint.clone()
        };
        draw(self, &plain);
        self.restore_to_count(count);
    }

    fn combine_clip(&mut self, path: Option<tiny_skia::Path>, local_bounds: Rect, op: ClipOp, anti_alias: bool) {
        let Some(mut shape) = Mask::new(self.width, self.height) else {
            return;
        };
        if let Some(path) = path {
            let transform = to_skia_transform(self.current.matrix);
            shape.fill_path(&path, FillRule::Winding, anti_alias, transform);
        }
        if op == ClipOp::Difference {
            for v in shape.data_mut() {
                *v = 255 - *v;
            }
        }
        if let Some(old) = &self.current.clip {
            multiply_coverage(shape.data_mut(), old.data());
        }
        self.current.clip = Some(Arc::new(shape));
        if op == ClipOp::Intersect {
            self.current.clip_bounds = intersect(
                self.current.clip_bounds,
                map_rect(self.current.matrix, local_bounds),
            );
        }
    }

    fn composite(&mut self, mut layer: SavedLayer) {
        if let Some(filter) = &layer.filter {
            filter.apply(&mut layer.pixmap, layer.matrix);
        }
        if layer.bounds.is_empty() {
            return;
        }
        let full = round_out(self.device_rect());
        let mask = if layer.bounds == full && layer.clip.is_none() {
            None
        } else {
            let Some(mut mask) = Mask::new(self.width, self.height) else {
                return;
            };
            if let Some(rect) = to_skia_rect(layer.bounds.to_rect()) {
                let path = tiny_skia::PathBuilder::from_rect(rect);
                mask.fill_path(&path, FillRule::Winding, false, Transform::identity());
            }
            if let Some(clip) = &layer.clip {
                multiply_coverage(mask.data_mut(), clip.data());
            }
            Some(mask)
        };
        let paint = PixmapPaint {
            opacity: layer.opacity,
            blend_mode: layer.blend_mode.to_skia(),
            quality: tiny_skia::FilterQuality::Nearest,
        };
        let mut target = match self.layers.last_mut() {
            Some(parent) => parent.pixmap.as_mut(),
            None => self.base.as_mut(),
        };
        target.draw_pixmap(
            0,
            0,
            layer.pixmap.as_ref(),
            &paint,
            Transform::identity(),
            mask.as_ref(),
        );
    }

    fn fill_or_stroke(&mut self, path: &tiny_skia::Path, paint: &Paint) {
        let sk_paint = paint.to_skia();
        let style = paint.style;
        self.with_target(|target, transform, mask| match style {
            PaintStyle::Fill => {
                target.fill_path(path, &sk_paint, FillRule::Winding, transform, mask);
            }
            PaintStyle::Stroke(width) => {
                let stroke = tiny_skia::Stroke {
                    width,
                    ..tiny_skia::Stroke::default()
                };
                target.stroke_path(path, &sk_paint, &stroke, transform, mask);
            }
        });
    }

    fn blit(&mut self, image: &Image, matrix: Affine, sampling: SamplingOptions, paint: Option<&Paint>) {
        let pixmap_paint = PixmapPaint {
            opacity: paint.map_or(1.0, Paint::alpha_f),
            blend_mode: paint.map_or(BlendMode::SourceOver, |p| p.blend_mode).to_skia(),
            quality: sampling.to_skia(),
        };
        let transform = to_skia_transform(self.current.matrix * matrix);
        let mask = self.current.clip.as_deref();
        let mut target = match self.layers.last_mut() {
            Some(layer) => layer.pixmap.as_mut(),
            None => self.base.as_mut(),
        };
        target.draw_pixmap(0, 0, image.pixmap().as_ref(), &pixmap_paint, transform, mask);
    }
}

fn multiply_coverage(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        let v = (u16::from(*d) * u16::from(*s) + 127) / 255;
        *d = u8::try_from(v).unwrap_or(u8::MAX);
    }
}

impl Canvas for RasterCanvas<'_> {
    fn save(&mut self) -> usize {
        let count = self.save_count();
        self.saved.push(self.current.clone());
        self.current.opens_layer = false;
        count
    }

    fn save_layer(&mut self, rec: &SaveLayerRec<'_>) -> usize {
        let matrix = self.current.matrix;
        let device_bounds = match rec.bounds {
            Some(bounds) => intersect(map_rect(matrix, bounds), self.current.clip_bounds),
            None => self.current.clip_bounds,
        };
        let pixmap = if rec.init_with_previous || rec.backdrop.is_some() {
            let mut pixels = self.current_pixels();
            if let Some(filter) = rec.backdrop {
                filter.apply(&mut pixels, matrix);
            }
            Some(pixels)
        } else {
            Pixmap::new(self.width, self.height)
        };
        let layer = pixmap.map(|pixmap| SavedLayer {
            pixmap,
            bounds: round_out(device_bounds),
            opacity: rec.paint.map_or(1.0, Paint::alpha_f),
            blend_mode: rec.paint.map_or(BlendMode::SourceOver, |p| p.blend_mode),
            filter: rec.paint.and_then(|p| p.image_filter.clone()),
            matrix,
            clip: self.current.clip.clone(),
        });

        let count = self.save();
        if let Some(layer) = layer {
            self.layers.push(layer);
            self.current.opens_layer = true;
        }
        count
    }

    fn restore(&mut self) {
        let Some(previous) = self.saved.pop() else {
            return;
        };
        let closes_layer = self.current.opens_layer;
        self.current = previous;
        if closes_layer && let Some(layer) = self.layers.pop() {
            self.composite(layer);
        }
    }

    fn save_count(&self) -> usize {
        self.saved.len() + 1
    }

    fn concat(&mut self, matrix: Affine) {
        self.current.matrix *= matrix;
    }

    fn total_matrix(&self) -> Affine {
        self.current.matrix
    }

    fn clip_rect(&mut self, rect: Rect, op: ClipOp, anti_alias: bool) {
        let path = to_skia_rect(rect).map(tiny_skia::PathBuilder::from_rect);
        self.combine_clip(path, rect, op, anti_alias);
    }

    fn clip_rrect(&mut self, rrect: RoundedRect, op: ClipOp, anti_alias: bool) {
        let path = to_skia_path(&rrect_to_path(&rrect));
        self.combine_clip(path, rrect.rect(), op, anti_alias);
    }

    fn clip_path(&mut self, path: &BezPath, op: ClipOp, anti_alias: bool) {
        let bounds = kurbo::Shape::bounding_box(path);
        self.combine_clip(to_skia_path(path), bounds, op, anti_alias);
    }

    fn quick_reject(&self, rect: Rect) -> bool {
        !overlaps(map_rect(self.current.matrix, rect), self.current.clip_bounds)
    }

    fn clear(&mut self, color: Color) {
        let Some(rect) = to_skia_rect(self.device_rect()) else {
            return;
        };
        let mut paint = tiny_skia::Paint::default();
        paint.set_color(color.to_skia());
        paint.blend_mode = tiny_skia::BlendMode::Source;
        let mask = self.current.clip.as_deref();
        let mut target = match self.layers.last_mut() {
            Some(layer) => layer.pixmap.as_mut(),
            None => self.base.as_mut(),
        };
        target.fill_rect(rect, &paint, Transform::identity(), mask);
    }

    fn draw_rect(&mut self, rect: Rect, paint: &Paint) {
        if is_empty(rect) {
            return;
        }
        self.with_filtered_paint(paint, rect, |canvas, paint| {
            if let Some(r) = to_skia_rect(rect) {
                canvas.fill_or_stroke(&tiny_skia::PathBuilder::from_rect(r), paint);
            }
        });
    }

    fn draw_path(&mut self, path: &BezPath, paint: &Paint) {
        let bounds = kurbo::Shape::bounding_box(path);
        self.with_filtered_paint(paint, bounds, |canvas, paint| {
            if let Some(p) = to_skia_path(path) {
                canvas.fill_or_stroke(&p, paint);
            }
        });
    }

    fn draw_image(
        &mut self,
        image: &Image,
        x: f64,
        y: f64,
        sampling: SamplingOptions,
        paint: Option<&Paint>,
    ) {
        self.blit(image, Affine::translate((x, y)), sampling, paint);
    }

    fn draw_image_rect(
        &mut self,
        image: &Image,
        dst: Rect,
        sampling: SamplingOptions,
        paint: Option<&Paint>,
    ) {
        if is_empty(dst) || image.width() == 0 || image.height() == 0 {
            return;
        }
        let sx = dst.width() / f64::from(image.width());
        let sy = dst.height() / f64::from(image.height());
        let matrix = Affine::translate((dst.x0, dst.y0)) * Affine::scale_non_uniform(sx, sy);
        self.blit(image, matrix, sampling, paint);
    }
}

impl Drop for RasterCanvas<'_> {
    fn drop(&mut self) {
        self.restore_to_count(1);
    }
}
