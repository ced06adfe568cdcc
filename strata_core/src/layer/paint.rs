// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Paint traversal.

use core::fmt;

use kurbo::{Affine, Point, Rect};

use super::node::{ContainerEffect, ExternalTextureAccessor, Layer, LayerKind};
use crate::cache::{LayerGenerationCache, RasterCache, RasterCacheItem, RasterCacheKey, RasterCacheLayerId};
use crate::canvas::{Canvas, Picture, SaveLayerRec};
use crate::geometry::{ISize, is_empty, rect_from_origin_size};
use crate::image::Image;
use crate::paint::{ClipOp, Paint, SamplingOptions};
use crate::resource::{GpuSemaphore, ImportedResources};
use crate::texture::{TextureId, TextureManager};

/// State threaded through a paint traversal.
pub struct PaintContext<'a> {
    /// Set while rendering a cache snapshot; nested caching is disabled.
    pub is_generating_cache: bool,
    /// Transform from the root layer to the frame surface.
    pub root_surface_transformation: Affine,
    /// Canvas every layer draws into. The aggregator passes a multiplexer
    /// whose first target is the frame surface.
    pub canvas: &'a mut dyn Canvas,
    /// Cull rectangle computed by preroll.
    pub cull_rect: Rect,
    /// Whether a GPU context backs the frame.
    pub has_gpu_context: bool,
    /// Textures referenced by texture layers.
    pub texture_manager: Option<&'a TextureManager>,
    /// Surfaces and semaphores referenced by GPU surface views.
    pub imported_resources: Option<&'a dyn ImportedResources>,
    /// Generation cache, absent while generating a snapshot.
    pub cache: Option<&'a mut LayerGenerationCache>,
    /// Picture raster cache.
    pub raster_cache: Option<&'a mut RasterCache>,
    /// Set by layers that drew GPU-retained resources.
    pub has_gpu_retained_resource: bool,
    /// Semaphores to signal once the frame's GPU work completes.
    pub gpu_finished_semaphores: Vec<GpuSemaphore>,
    /// Semaphores the frame's GPU work must wait on.
    pub gpu_wait_semaphores: Vec<GpuSemaphore>,
}

impl fmt::Debug for PaintContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaintContext")
            .field("is_generating_cache", &self.is_generating_cache)
            .field("cull_rect", &self.cull_rect)
            .field("has_gpu_context", &self.has_gpu_context)
            .field("has_gpu_retained_resource", &self.has_gpu_retained_resource)
            .field("gpu_finished_semaphores", &self.gpu_finished_semaphores)
            .field("gpu_wait_semaphores", &self.gpu_wait_semaphores)
            .finish_non_exhaustive()
    }
}

impl<'a> PaintContext<'a> {
    /// Creates a context painting into `canvas` with no caches or resources.
    pub fn new(canvas: &'a mut dyn Canvas, cull_rect: Rect) -> Self {
        Self {
            is_generating_cache: false,
            root_surface_transformation: Affine::IDENTITY,
            canvas,
            cull_rect,
            has_gpu_context: false,
            texture_manager: None,
            imported_resources: None,
            cache: None,
            raster_cache: None,
            has_gpu_retained_resource: false,
            gpu_finished_semaphores: Vec::new(),
            gpu_wait_semaphores: Vec::new(),
        }
    }

    /// Draws the generation-cache snapshot of `layer` if one is usable.
    fn try_draw_from_cache(&mut self, layer: &Layer) -> bool {
        let Some(cache) = self.cache.take() else {
            return false;
        };
        let drawn = cache.try_draw_cache_image_snapshot(layer, self);
        self.cache = Some(cache);
        drawn
    }

    /// Draws `picture` from the raster cache once it is used often enough.
    fn try_draw_from_raster_cache(&mut self, picture: &Picture) -> bool {
        if self.is_generating_cache {
            return false;
        }
        let Some(raster_cache) = self.raster_cache.as_deref_mut() else {
            return false;
        };
        if !raster_cache.mark_picture_used(picture) {
            return false;
        }
        let matrix = self.canvas.total_matrix();
        let key = RasterCacheKey::new(RasterCacheLayerId::picture(picture.unique_id()), matrix);
        if raster_cache.find(&key).is_none() {
            raster_cache.generate_picture_cache(picture, matrix);
        }
        let Some(RasterCacheItem::Image(image)) = raster_cache.find(&key) else {
            return false;
        };
        let cull = picture.cull_rect();
        self.canvas
            .draw_image(image, cull.x0, cull.y0, SamplingOptions::Linear, None);
        true
    }
}

impl Layer {
    /// Returns `false` for layers with empty bounds or bounds the frame
    /// canvas rejects.
    #[must_use]
    pub fn needs_painting(&self, context: &PaintContext<'_>) -> bool {
        let bounds = self.paint_bounds();
        !is_empty(bounds) && !context.canvas.quick_reject(bounds)
    }

    /// Paints this layer and its subtree.
    pub fn paint(&self, context: &mut PaintContext<'_>) {
        match self.kind() {
            LayerKind::Container { effect, children } => {
                paint_container(self, effect, children, context);
            }
            LayerKind::Picture(picture) => paint_picture(self, picture, context),
            LayerKind::Texture {
                texture_id,
                offset,
                size,
                sampling,
            } => paint_texture(*texture_id, *offset, *size, *sampling, context),
            LayerKind::ExternalTexture {
                accessor,
                offset,
                size,
                sampling,
            } => paint_external_texture(&**accessor, *offset, *size, *sampling, context),
            LayerKind::GpuSurfaceView {
                surface_id,
                dst_rect,
                wait_semaphore_id,
                signal_semaphore_id,
            } => paint_gpu_surface_view(
                *surface_id,
                *dst_rect,
                *wait_semaphore_id,
                *signal_semaphore_id,
                context,
            ),
        }
    }
}

fn paint_children(children: &[Layer], context: &mut PaintContext<'_>) {
    for child in children {
        if child.needs_painting(context) {
            child.paint(context);
        }
    }
}

fn paint_container(
    layer: &Layer,
    effect: &ContainerEffect,
    children: &[Layer],
    context: &mut PaintContext<'_>,
) {
    let bounds = layer.paint_bounds();
    let count = match effect {
        ContainerEffect::None => {
            paint_children(children, context);
            return;
        }
        ContainerEffect::Transform(matrix) => {
            let count = context.canvas.save();
            context.canvas.concat(*matrix);
            count
        }
        ContainerEffect::Opacity(alpha) => {
            if context.try_draw_from_cache(layer) {
                return;
            }
            let mut paint = Paint::default();
            paint.set_alpha_f(*alpha);
            context.canvas.save_layer(&SaveLayerRec {
                bounds: Some(bounds),
                paint: Some(&paint),
                ..SaveLayerRec::default()
            })
        }
        ContainerEffect::ImageFilter(filter) => {
            if context.try_draw_from_cache(layer) {
                return;
            }
            let paint = Paint {
                image_filter: Some(filter.clone()),
                ..Paint::default()
            };
            context.canvas.save_layer(&SaveLayerRec {
                bounds: Some(bounds),
                paint: Some(&paint),
                ..SaveLayerRec::default()
            })
        }
        ContainerEffect::BackdropFilter {
            filter,
            blend_mode,
            auto_child_clip,
        } => {
            let count = context.canvas.save();
            if *auto_child_clip {
                context.canvas.clip_rect(bounds, ClipOp::Intersect, false);
            }
            let paint = Paint {
                blend_mode: *blend_mode,
                ..Paint::default()
            };
            context.canvas.save_layer(&SaveLayerRec {
                bounds: Some(bounds),
                paint: Some(&paint),
                backdrop: Some(filter),
                init_with_previous: true,
            });
            count
        }
        ContainerEffect::Clip {
            shape,
            op,
            anti_alias,
        } => {
            let count = context.canvas.save();
            shape.apply(&mut *context.canvas, *op, *anti_alias);
            count
        }
    };
    paint_children(children, context);
    context.canvas.restore_to_count(count);
}

fn paint_picture(layer: &Layer, picture: &Picture, context: &mut PaintContext<'_>) {
    if context.try_draw_from_cache(layer) || context.try_draw_from_raster_cache(picture) {
        return;
    }
    let count = context.canvas.save();
    context
        .canvas
        .clip_rect(picture.cull_rect(), ClipOp::Intersect, false);
    context.canvas.draw_picture(picture, None, None);
    context.canvas.restore_to_count(count);
    if picture.has_texture_backed_images() {
        context.has_gpu_retained_resource = true;
    }
}

fn draw_sized_image(
    canvas: &mut dyn Canvas,
    image: &Image,
    offset: Point,
    size: ISize,
    sampling: SamplingOptions,
) {
    if image.size() == size {
        canvas.draw_image(image, offset.x, offset.y, sampling, None);
    } else {
        canvas.draw_image_rect(image, rect_from_origin_size(offset, size), sampling, None);
    }
}

fn paint_texture(
    texture_id: TextureId,
    offset: Point,
    size: ISize,
    sampling: SamplingOptions,
    context: &mut PaintContext<'_>,
) {
    let Some(manager) = context.texture_manager else {
        log::warn!("Texture layer painted without a texture manager");
        return;
    };
    let Some(texture) = manager.acquire(texture_id) else {
        return;
    };
    draw_sized_image(&mut *context.canvas, texture.image(), offset, size, sampling);
    context.has_gpu_retained_resource = true;
}

fn paint_external_texture(
    accessor: &dyn ExternalTextureAccessor,
    offset: Point,
    size: ISize,
    sampling: SamplingOptions,
    context: &mut PaintContext<'_>,
) {
    let image = accessor.acquire(context.has_gpu_context);
    if let Some(image) = &image {
        draw_sized_image(&mut *context.canvas, image, offset, size, sampling);
    }
    accessor.release();
    if image.is_some() && accessor.is_gpu_backed(context.has_gpu_context) {
        context.has_gpu_retained_resource = true;
    }
}

fn paint_gpu_surface_view(
    surface_id: i64,
    dst_rect: Rect,
    wait_semaphore_id: i64,
    signal_semaphore_id: i64,
    context: &mut PaintContext<'_>,
) {
    // Without a GPU context the semaphores cannot be waited or signaled.
    if !context.has_gpu_context {
        return;
    }
    let Some(resources) = context.imported_resources else {
        return;
    };
    let Some(surface) = resources.imported_surface(surface_id) else {
        log::warn!("Failed to find the view surface according to the resource ID");
        return;
    };
    let (Some(wait), Some(signal)) = (
        resources.imported_semaphore(wait_semaphore_id),
        resources.imported_semaphore(signal_semaphore_id),
    ) else {
        log::warn!("Failed to find the semaphores according to the resource ID");
        return;
    };
    context.gpu_wait_semaphores.push(wait);

    let count = context.canvas.save();
    context.canvas.clip_rect(dst_rect, ClipOp::Intersect, false);
    context
        .canvas
        .draw_image(&surface, dst_rect.x0, dst_rect.y0, SamplingOptions::Linear, None);
    context.canvas.restore_to_count(count);

    context.gpu_finished_semaphores.push(signal);
    context.has_gpu_retained_resource = true;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{CountingCanvas, OpCounts, RasterSurface};
    use crate::filter::ImageFilter;
    use crate::layer::{ClipShape, LayerTree, PrerollContext};
    use crate::paint::{BlendMode, Color};
    use crate::texture::{TextureFactory, TextureManager};
    use hashbrown::HashMap;
    use tiny_skia::Pixmap;

    fn red_square(rect: Rect) -> Layer {
        Layer::picture(Picture::record(rect, |c| c.draw_rect(rect, &Paint::fill(Color::RED))))
    }

    fn render(root: &mut Layer, width: u32, height: u32) -> RasterSurface {
        let mut preroll = PrerollContext::default();
        root.preroll(&mut preroll, Affine::IDENTITY);
        let mut surface = RasterSurface::new(width, height).unwrap();
        {
            let mut canvas = surface.canvas();
            let mut ctx = PaintContext::new(&mut canvas, preroll.cull_rect);
            if root.needs_painting(&ctx) {
                root.paint(&mut ctx);
            }
        }
        surface
    }

    #[test]
    fn picture_is_painted() {
        let mut root = Layer::container().with_child(red_square(Rect::new(0.0, 0.0, 10.0, 10.0)));
        let s = render(&mut root, 20, 20);
        assert_eq!(s.pixel(5, 5), Some(Color::RED));
        assert_eq!(s.pixel(15, 15), Some(Color::TRANSPARENT));
    }

    #[test]
    fn transform_moves_content() {
        let mut root = Layer::transform(Affine::translate((10.0, 0.0)))
            .with_child(red_square(Rect::new(0.0, 0.0, 5.0, 5.0)));
        let s = render(&mut root, 20, 20);
        assert_eq!(s.pixel(2, 2), Some(Color::TRANSPARENT));
        assert_eq!(s.pixel(12, 2), Some(Color::RED));
    }

    fn two_tone_picture() -> Picture {
        Picture::record(Rect::new(0.0, 0.0, 40.0, 30.0), |c| {
            c.draw_rect(Rect::new(0.0, 0.0, 40.0, 15.0), &Paint::fill(Color::RED));
            c.draw_rect(Rect::new(0.0, 15.0, 25.0, 30.0), &Paint::fill(Color::BLUE));
        })
    }

    fn render_tree(tree: &mut LayerTree, canvas: &mut dyn Canvas) {
        let mut preroll = PrerollContext::default();
        tree.preroll(&mut preroll);
        let mut ctx = PaintContext::new(canvas, preroll.cull_rect);
        tree.paint(&mut ctx);
    }

    #[test]
    fn transform_paints_like_its_subtree_under_concat() {
        let matrix = Affine::translate((30.0, 12.0)) * Affine::rotate(0.3) * Affine::scale(1.5);
        let picture = two_tone_picture();

        let mut tree = LayerTree::new(
            Layer::transform(matrix).with_child(Layer::picture(picture.clone())),
            ISize::new(96, 96),
        );
        let mut through_layer = RasterSurface::new(96, 96).unwrap();
        render_tree(&mut tree, &mut through_layer.canvas());

        let mut subtree = Layer::picture(picture);
        subtree.preroll(&mut PrerollContext::default(), matrix);
        let mut through_concat = RasterSurface::new(96, 96).unwrap();
        {
            let mut canvas = through_concat.canvas();
            canvas.concat(matrix);
            let mut ctx = PaintContext::new(&mut canvas, subtree.paint_bounds());
            if subtree.needs_painting(&ctx) {
                subtree.paint(&mut ctx);
            }
        }

        let pixels = through_layer.pixmap().data();
        assert!(pixels.iter().any(|b| *b != 0), "nothing was painted");
        assert!(
            pixels == through_concat.pixmap().data(),
            "transform layer output differs from the concatenated subtree"
        );
    }

    #[test]
    fn singular_transform_paints_nothing() {
        let matrix = Affine::translate((10.0, 10.0)) * Affine::scale_non_uniform(0.0, 1.5);
        let layer = || Layer::transform(matrix).with_child(Layer::picture(two_tone_picture()));

        let mut canvas = CountingCanvas::new();
        render_tree(&mut LayerTree::new(layer(), ISize::new(64, 64)), &mut canvas);
        assert_eq!(canvas.counts(), OpCounts::default());

        let mut surface = RasterSurface::new(64, 64).unwrap();
        render_tree(&mut LayerTree::new(layer(), ISize::new(64, 64)), &mut surface.canvas());
        assert!(surface.pixmap().data().iter().all(|b| *b == 0));
    }

    #[test]
    fn empty_bounds_child_issues_no_calls() {
        let visible = || red_square(Rect::new(0.0, 0.0, 10.0, 10.0));
        let empty = Layer::picture(Picture::record(Rect::new(5.0, 5.0, 5.0, 20.0), |c| {
            c.draw_rect(Rect::new(0.0, 0.0, 20.0, 20.0), &Paint::fill(Color::BLUE));
        }));

        let mut alone = CountingCanvas::new();
        render_tree(
            &mut LayerTree::new(Layer::container().with_child(visible()), ISize::new(20, 20)),
            &mut alone,
        );
        let mut with_empty = CountingCanvas::new();
        let mut tree = LayerTree::new(
            Layer::container().with_child(visible()).with_child(empty),
            ISize::new(20, 20),
        );
        render_tree(&mut tree, &mut with_empty);

        assert!(is_empty(tree.root().children()[1].paint_bounds()));
        assert!(alone.counts().draws > 0);
        assert_eq!(with_empty.counts(), alone.counts());
    }

    #[test]
    fn opacity_halves_alpha() {
        let mut root = Layer::opacity(0.5).with_child(red_square(Rect::new(0.0, 0.0, 10.0, 10.0)));
        let s = render(&mut root, 10, 10);
        let px = s.pixel(5, 5).unwrap();
        assert!((127..=129).contains(&px.a), "alpha was {}", px.a);
    }

    #[test]
    fn clip_limits_children() {
        let mut root = Layer::clip(ClipShape::Rect(Rect::new(0.0, 0.0, 4.0, 10.0)), ClipOp::Intersect, false)
            .with_child(red_square(Rect::new(0.0, 0.0, 10.0, 10.0)));
        let s = render(&mut root, 10, 10);
        assert_eq!(s.pixel(2, 2), Some(Color::RED));
        assert_eq!(s.pixel(6, 2), Some(Color::TRANSPARENT));
    }

    #[test]
    fn offscreen_layers_are_skipped() {
        let mut root = Layer::container().with_child(red_square(Rect::new(100.0, 100.0, 110.0, 110.0)));
        let mut preroll = PrerollContext::default();
        root.preroll(&mut preroll, Affine::IDENTITY);
        let mut surface = RasterSurface::new(10, 10).unwrap();
        let mut canvas = surface.canvas();
        let ctx = PaintContext::new(&mut canvas, preroll.cull_rect);
        assert!(!root.children()[0].needs_painting(&ctx));
    }

    #[test]
    fn backdrop_filter_saves_two_levels() {
        let mut root = Layer::container()
            .with_child(red_square(Rect::new(0.0, 0.0, 10.0, 10.0)))
            .with_child(Layer::backdrop_filter(ImageFilter::blur(1.0, 1.0), BlendMode::SourceOver, true));
        let mut preroll = PrerollContext::default();
        root.preroll(&mut preroll, Affine::IDENTITY);
        let mut canvas = CountingCanvas::new();
        let mut ctx = PaintContext::new(&mut canvas, preroll.cull_rect);
        root.paint(&mut ctx);
        drop(ctx);
        let counts = canvas.counts();
        assert_eq!(counts.save_layers, 1);
        assert_eq!(counts.clips, 2, "picture cull clip and auto child clip");
        assert_eq!(canvas.save_count(), 1);
    }

    #[test]
    fn texture_layer_marks_gpu_retained() {
        let manager = TextureManager::new(TextureFactory::new(false));
        let mut pixmap = Pixmap::new(4, 4).unwrap();
        pixmap.fill(tiny_skia::Color::from_rgba8(0, 0, 255, 255));
        let id = manager.create(|f| Some(f.make_from_pixmap(pixmap)), "blue").unwrap();
        let mut root = Layer::texture(id, Point::new(2.0, 2.0), ISize::new(8, 8), SamplingOptions::Nearest);
        let mut preroll = PrerollContext::default();
        root.preroll(&mut preroll, Affine::IDENTITY);
        let mut surface = RasterSurface::new(12, 12).unwrap();
        let retained = {
            let mut canvas = surface.canvas();
            let mut ctx = PaintContext::new(&mut canvas, preroll.cull_rect);
            ctx.texture_manager = Some(&manager);
            root.paint(&mut ctx);
            ctx.has_gpu_retained_resource
        };
        assert!(retained);
        assert_eq!(surface.pixel(9, 9), Some(Color::BLUE));
        assert_eq!(surface.pixel(1, 1), Some(Color::TRANSPARENT));
        assert!(manager.delete(id), "texture released after paint");
    }

    #[derive(Default)]
    struct Imported {
        surfaces: HashMap<i64, Image>,
        semaphores: HashMap<i64, GpuSemaphore>,
    }

    impl ImportedResources for Imported {
        fn imported_surface(&self, id: i64) -> Option<Image> {
            self.surfaces.get(&id).cloned()
        }

        fn imported_semaphore(&self, id: i64) -> Option<GpuSemaphore> {
            self.semaphores.get(&id).copied()
        }
    }

    #[test]
    fn gpu_surface_view_collects_semaphores() {
        let mut src = RasterSurface::new(4, 4).unwrap();
        src.canvas().clear(Color::GREEN);
        let mut imported = Imported::default();
        imported.surfaces.insert(0, src.snapshot());
        imported.semaphores.insert(1, GpuSemaphore(0x10));
        imported.semaphores.insert(2, GpuSemaphore(0x20));

        let mut root = Layer::gpu_surface_view(0, Rect::new(0.0, 0.0, 4.0, 4.0), 1, 2);
        let mut preroll = PrerollContext::default();
        root.preroll(&mut preroll, Affine::IDENTITY);
        let mut surface = RasterSurface::new(4, 4).unwrap();
        let (wait, signal) = {
            let mut canvas = surface.canvas();
            let mut ctx = PaintContext::new(&mut canvas, preroll.cull_rect);
            ctx.has_gpu_context = true;
            ctx.imported_resources = Some(&imported);
            root.paint(&mut ctx);
            (ctx.gpu_wait_semaphores.clone(), ctx.gpu_finished_semaphores.clone())
        };
        assert_eq!(wait, vec![GpuSemaphore(0x10)]);
        assert_eq!(signal, vec![GpuSemaphore(0x20)]);
        assert_eq!(surface.pixel(1, 1), Some(Color::GREEN));
    }
}
