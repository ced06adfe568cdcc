// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bounds computation ahead of painting.

use kurbo::{Affine, Rect};

use super::node::{ContainerEffect, Layer, LayerKind};
use crate::geometry::{
    GIANT_RECT, intersect, invert, is_empty, join, map_rect, rect_from_origin_size, round_out,
};

/// State threaded through a preroll traversal.
///
/// `cull_rect` accumulates, in the coordinates of the layer being visited,
/// the union of the paint bounds prerolled so far. Transform and clip
/// containers rebase it for their children and restore it afterwards.
#[derive(Clone, Copy, Debug)]
pub struct PrerollContext {
    /// Transform from the root layer to the frame surface.
    pub root_surface_transformation: Affine,
    /// Accumulated cull rectangle; starts empty.
    pub cull_rect: Rect,
    /// Whether a GPU context backs the frame.
    pub has_gpu_context: bool,
}

impl Default for PrerollContext {
    fn default() -> Self {
        Self {
            root_surface_transformation: Affine::IDENTITY,
            cull_rect: Rect::ZERO,
            has_gpu_context: false,
        }
    }
}

impl Layer {
    /// Computes paint bounds for this layer and its subtree.
    ///
    /// `matrix` is the accumulated transform from this layer to the root.
    pub fn preroll(&mut self, context: &mut PrerollContext, matrix: Affine) {
        let bounds = match self.kind_mut() {
            LayerKind::Container { effect, children } => {
                preroll_container(effect, children, context, matrix)
            }
            LayerKind::Picture(picture) => picture.cull_rect(),
            LayerKind::Texture { offset, size, .. } => rect_from_origin_size(*offset, *size),
            LayerKind::ExternalTexture {
                accessor,
                offset,
                size,
                ..
            } => {
                accessor.prefetch();
                rect_from_origin_size(*offset, *size)
            }
            LayerKind::GpuSurfaceView { dst_rect, .. } => *dst_rect,
        };
        self.set_paint_bounds(bounds);
    }
}

/// Prerolls children in order, growing the cull rectangle as it goes.
fn preroll_children(children: &mut [Layer], context: &mut PrerollContext, matrix: Affine) -> Rect {
    let mut bounds = Rect::ZERO;
    for child in children {
        child.preroll(context, matrix);
        let child_bounds = child.paint_bounds();
        bounds = join(bounds, child_bounds);
        context.cull_rect = join(context.cull_rect, child_bounds);
    }
    bounds
}

fn preroll_container(
    effect: &ContainerEffect,
    children: &mut [Layer],
    context: &mut PrerollContext,
    matrix: Affine,
) -> Rect {
    match effect {
        ContainerEffect::None | ContainerEffect::Opacity(_) => {
            preroll_children(children, context, matrix)
        }
        ContainerEffect::Transform(transform) => {
            let outer_cull = context.cull_rect;
            context.cull_rect = match invert(*transform) {
                Some(inverse) => map_rect(inverse, outer_cull),
                None => GIANT_RECT,
            };
            let child_bounds = preroll_children(children, context, matrix * *transform);
            context.cull_rect = outer_cull;
            map_rect(*transform, child_bounds)
        }
        ContainerEffect::ImageFilter(filter) => {
            let child_bounds = preroll_children(children, context, matrix);
            if is_empty(child_bounds) {
                Rect::ZERO
            } else {
                filter.filter_bounds(round_out(child_bounds).to_rect())
            }
        }
        ContainerEffect::BackdropFilter { .. } => {
            let child_bounds = preroll_children(children, context, matrix);
            join(child_bounds, context.cull_rect)
        }
        ContainerEffect::Clip { shape, .. } => {
            let clip_bounds = shape.bounds();
            let outer_cull = context.cull_rect;
            context.cull_rect = intersect(outer_cull, clip_bounds);
            let child_bounds = preroll_children(children, context, matrix);
            context.cull_rect = outer_cull;
            intersect(child_bounds, clip_bounds)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Picture;
    use crate::filter::ImageFilter;
    use crate::geometry::ISize;
    use crate::layer::ClipShape;
    use crate::paint::{BlendMode, ClipOp, SamplingOptions};
    use kurbo::Point;

    fn picture_layer(rect: Rect) -> Layer {
        Layer::picture(Picture::record(rect, |_| {}))
    }

    fn preroll(layer: &mut Layer) -> Rect {
        let mut ctx = PrerollContext::default();
        layer.preroll(&mut ctx, Affine::IDENTITY);
        layer.paint_bounds()
    }

    #[test]
    fn container_bounds_are_the_union_of_children() {
        let mut root = Layer::container()
            .with_child(picture_layer(Rect::new(0.0, 0.0, 10.0, 10.0)))
            .with_child(picture_layer(Rect::new(20.0, 5.0, 30.0, 40.0)));
        assert_eq!(preroll(&mut root), Rect::new(0.0, 0.0, 30.0, 40.0));
    }

    #[test]
    fn transform_maps_child_bounds() {
        let mut root = Layer::transform(Affine::translate((5.0, 5.0)) * Affine::scale(2.0))
            .with_child(picture_layer(Rect::new(0.0, 0.0, 10.0, 10.0)));
        assert_eq!(preroll(&mut root), Rect::new(5.0, 5.0, 25.0, 25.0));
    }

    #[test]
    fn singular_transform_prerolls_children_with_giant_cull() {
        let mut root = Layer::transform(Affine::scale(0.0))
            .with_child(Layer::backdrop_filter(ImageFilter::blur(1.0, 1.0), BlendMode::SourceOver, false));
        let mut ctx = PrerollContext {
            cull_rect: Rect::new(0.0, 0.0, 10.0, 10.0),
            ..PrerollContext::default()
        };
        root.preroll(&mut ctx, Affine::IDENTITY);
        assert_eq!(root.children()[0].paint_bounds(), GIANT_RECT);
        assert_eq!(ctx.cull_rect, Rect::new(0.0, 0.0, 10.0, 10.0), "outer cull restored");
    }

    #[test]
    fn clip_intersects_child_bounds() {
        let mut root = Layer::clip(ClipShape::Rect(Rect::new(0.0, 0.0, 5.0, 5.0)), ClipOp::Intersect, false)
            .with_child(picture_layer(Rect::new(2.0, 2.0, 10.0, 10.0)));
        assert_eq!(preroll(&mut root), Rect::new(2.0, 2.0, 5.0, 5.0));
    }

    #[test]
    fn image_filter_expands_rounded_child_bounds() {
        let mut root = Layer::image_filter(ImageFilter::blur(1.0, 1.0))
            .with_child(picture_layer(Rect::new(0.5, 0.5, 9.5, 9.5)));
        assert_eq!(preroll(&mut root), Rect::new(-3.0, -3.0, 13.0, 13.0));
    }

    #[test]
    fn backdrop_bounds_include_prior_content() {
        let mut root = Layer::container()
            .with_child(picture_layer(Rect::new(0.0, 0.0, 50.0, 50.0)))
            .with_child(
                Layer::backdrop_filter(ImageFilter::blur(2.0, 2.0), BlendMode::SourceOver, true)
                    .with_child(picture_layer(Rect::new(40.0, 40.0, 60.0, 60.0))),
            );
        preroll(&mut root);
        assert_eq!(root.children()[1].paint_bounds(), Rect::new(0.0, 0.0, 60.0, 60.0));
    }

    #[test]
    fn texture_bounds_are_offset_size() {
        let mut layer = Layer::texture(7, Point::new(3.0, 4.0), ISize::new(10, 20), SamplingOptions::Linear);
        assert_eq!(preroll(&mut layer), Rect::new(3.0, 4.0, 13.0, 24.0));
    }

    #[test]
    fn preroll_is_repeatable() {
        let mut root = Layer::container()
            .with_child(
                Layer::clip(ClipShape::Rect(Rect::new(0.0, 0.0, 60.0, 60.0)), ClipOp::Intersect, true)
                    .with_child(
                        Layer::opacity(0.5).with_child(picture_layer(Rect::new(5.0, 5.0, 80.0, 20.0))),
                    ),
            )
            .with_child(
                Layer::image_filter(ImageFilter::blur(2.0, 2.0))
                    .with_child(picture_layer(Rect::new(10.5, 30.5, 25.0, 40.0))),
            )
            .with_child(Layer::backdrop_filter(ImageFilter::blur(1.0, 1.0), BlendMode::SourceOver, true))
            .with_child(
                Layer::transform(Affine::translate((40.0, 0.0)) * Affine::rotate(0.5))
                    .with_child(picture_layer(Rect::new(0.0, 0.0, 12.0, 12.0))),
            );
        let bounds = |root: &Layer| root.descendants().map(Layer::paint_bounds).collect::<Vec<_>>();

        preroll(&mut root);
        let first = bounds(&root);
        preroll(&mut root);
        assert_eq!(bounds(&root), first);
        assert!(first.iter().all(|b| !is_empty(*b)), "{first:?}");
    }
}
