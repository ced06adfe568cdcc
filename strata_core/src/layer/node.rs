// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The layer node type and its mutation API.

use core::fmt;
use std::sync::Arc;

use kurbo::{Affine, Point, Rect};

use super::clip::ClipShape;
use super::id::{LayerId, LayerType};
use crate::canvas::Picture;
use crate::filter::ImageFilter;
use crate::geometry::ISize;
use crate::image::Image;
use crate::paint::{BlendMode, ClipOp, SamplingOptions};
use crate::texture::TextureId;

/// Supplies frames for an [`ExternalTexture`](LayerKind::ExternalTexture)
/// layer.
///
/// All methods are called on the present thread while the tree is
/// rasterized.
pub trait ExternalTextureAccessor: Send + Sync + fmt::Debug {
    /// Returns `true` if acquired images live in GPU memory.
    fn is_gpu_backed(&self, has_gpu_context: bool) -> bool;

    /// Hint that [`acquire`](Self::acquire) is about to be called.
    fn prefetch(&self);

    /// Returns the image to draw for this frame.
    fn acquire(&self, has_gpu_context: bool) -> Option<Image>;

    /// Called after every `acquire`, whether or not it produced an image.
    fn release(&self);
}

/// Effect applied by a container to its children.
#[derive(Clone, Debug, PartialEq)]
pub enum ContainerEffect {
    /// Children are painted as they are.
    None,
    /// Children are painted under an extra transform.
    Transform(Affine),
    /// Children are composited with an alpha in `0.0..=1.0`.
    Opacity(f32),
    /// Children are filtered as a group.
    ImageFilter(ImageFilter),
    /// The content behind the container is filtered, then children are
    /// painted over it.
    BackdropFilter {
        /// Filter applied to the backdrop.
        filter: ImageFilter,
        /// Blend mode used to composite the filtered backdrop.
        blend_mode: BlendMode,
        /// Clip to the layer bounds before filtering.
        auto_child_clip: bool,
    },
    /// Children are clipped by a shape.
    Clip {
        /// The clip shape.
        shape: ClipShape,
        /// How the shape combines with the current clip.
        op: ClipOp,
        /// Anti-aliased clip edges.
        anti_alias: bool,
    },
}

/// Type-specific payload of a [`Layer`].
#[derive(Clone, Debug)]
pub enum LayerKind {
    /// A layer with children.
    Container {
        /// Effect applied to the children.
        effect: ContainerEffect,
        /// Children in paint order.
        children: Vec<Layer>,
    },
    /// A recorded picture.
    Picture(Picture),
    /// A texture registered in the texture manager.
    Texture {
        /// Texture id.
        texture_id: TextureId,
        /// Top-left corner.
        offset: Point,
        /// Drawn size; the texture is scaled when it differs.
        size: ISize,
        /// Sampling used when scaling.
        sampling: SamplingOptions,
    },
    /// A texture produced on demand.
    ExternalTexture {
        /// Frame supplier.
        accessor: Arc<dyn ExternalTextureAccessor>,
        /// Top-left corner.
        offset: Point,
        /// Drawn size.
        size: ISize,
        /// Sampling used when scaling.
        sampling: SamplingOptions,
    },
    /// A surface imported into the content aggregator.
    GpuSurfaceView {
        /// Imported surface id.
        surface_id: i64,
        /// Destination rectangle.
        dst_rect: Rect,
        /// Imported semaphore waited before sampling the surface.
        wait_semaphore_id: i64,
        /// Imported semaphore signaled when sampling is done.
        signal_semaphore_id: i64,
    },
}

/// A node of the layer tree.
///
/// Cloning a layer keeps its id and generation, so a host can keep its own
/// tree, mutate it between frames and hand clones to the compositor.
#[derive(Clone, Debug)]
pub struct Layer {
    id: LayerId,
    generation: u64,
    paint_bounds: Rect,
    kind: LayerKind,
}

impl Layer {
    fn new(kind: LayerKind) -> Self {
        Self {
            id: LayerId::next(),
            generation: 1,
            paint_bounds: Rect::ZERO,
            kind,
        }
    }

    fn with_effect(effect: ContainerEffect) -> Self {
        Self::new(LayerKind::Container {
            effect,
            children: Vec::new(),
        })
    }

    /// Creates a plain container.
    #[must_use]
    pub fn container() -> Self {
        Self::with_effect(ContainerEffect::None)
    }

    /// Creates a transform container.
    #[must_use]
    pub fn transform(matrix: Affine) -> Self {
        Self::with_effect(ContainerEffect::Transform(matrix))
    }

    /// Creates an opacity container.
    #[must_use]
    pub fn opacity(alpha: f32) -> Self {
        Self::with_effect(ContainerEffect::Opacity(alpha))
    }

    /// Creates an image filter container.
    #[must_use]
    pub fn image_filter(filter: ImageFilter) -> Self {
        Self::with_effect(ContainerEffect::ImageFilter(filter))
    }

    /// Creates a backdrop filter container.
    #[must_use]
    pub fn backdrop_filter(filter: ImageFilter, blend_mode: BlendMode, auto_child_clip: bool) -> Self {
        Self::with_effect(ContainerEffect::BackdropFilter {
            filter,
            blend_mode,
            auto_child_clip,
        })
    }

    /// Creates a clipping container.
    #[must_use]
    pub fn clip(shape: ClipShape, op: ClipOp, anti_alias: bool) -> Self {
        Self::with_effect(ContainerEffect::Clip {
            shape,
            op,
            anti_alias,
        })
    }

    /// Creates a picture layer.
    #[must_use]
    pub fn picture(picture: Picture) -> Self {
        Self::new(LayerKind::Picture(picture))
    }

    /// Creates a texture layer.
    #[must_use]
    pub fn texture(texture_id: TextureId, offset: Point, size: ISize, sampling: SamplingOptions) -> Self {
        Self::new(LayerKind::Texture {
            texture_id,
            offset,
            size,
            sampling,
        })
    }

    /// Creates an external texture layer.
    #[must_use]
    pub fn external_texture(
        accessor: Arc<dyn ExternalTextureAccessor>,
        offset: Point,
        size: ISize,
        sampling: SamplingOptions,
    ) -> Self {
        Self::new(LayerKind::ExternalTexture {
            accessor,
            offset,
            size,
            sampling,
        })
    }

    /// Creates a view of an imported GPU surface.
    #[must_use]
    pub fn gpu_surface_view(
        surface_id: i64,
        dst_rect: Rect,
        wait_semaphore_id: i64,
        signal_semaphore_id: i64,
    ) -> Self {
        Self::new(LayerKind::GpuSurfaceView {
            surface_id,
            dst_rect,
            wait_semaphore_id,
            signal_semaphore_id,
        })
    }

    /// Adds a child while building a container. Does not bump the
    /// generation; ignored for leaf layers.
    #[must_use]
    pub fn with_child(mut self, child: Self) -> Self {
        if let LayerKind::Container { children, .. } = &mut self.kind {
            children.push(child);
        } else {
            log::warn!("Ignoring child appended to leaf layer #{}", self.id);
        }
        self
    }

    /// Unique id.
    #[must_use]
    pub fn id(&self) -> LayerId {
        self.id
    }

    /// Generation counter, bumped whenever the layer or its subtree changes.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Bounds computed by the last preroll, in the layer's own coordinates.
    #[must_use]
    pub fn paint_bounds(&self) -> Rect {
        self.paint_bounds
    }

    pub(crate) fn set_paint_bounds(&mut self, bounds: Rect) {
        self.paint_bounds = bounds;
    }

    /// Type-specific payload.
    #[must_use]
    pub fn kind(&self) -> &LayerKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut LayerKind {
        &mut self.kind
    }

    /// Type tag.
    #[must_use]
    pub fn layer_type(&self) -> LayerType {
        match &self.kind {
            LayerKind::Container { effect, .. } => match effect {
                ContainerEffect::None => LayerType::Container,
                ContainerEffect::Transform(_) => LayerType::Transform,
                ContainerEffect::Opacity(_) => LayerType::Opacity,
                ContainerEffect::ImageFilter(_) => LayerType::ImageFilter,
                ContainerEffect::BackdropFilter { .. } => LayerType::BackdropFilter,
                ContainerEffect::Clip { shape, .. } => match shape {
                    ClipShape::Rect(_) => LayerType::RectClip,
                    ClipShape::RoundedRect(_) => LayerType::RRectClip,
                    ClipShape::Path(_) => LayerType::PathClip,
                },
            },
            LayerKind::Picture(_) => LayerType::Picture,
            LayerKind::Texture { .. } => LayerType::Texture,
            LayerKind::ExternalTexture { .. } => LayerType::ExternalTexture,
            LayerKind::GpuSurfaceView { .. } => LayerType::GpuSurfaceView,
        }
    }

    /// Type name used in logs.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.layer_type().type_name()
    }

    /// Container effect, or `None` for leaf layers.
    #[must_use]
    pub fn effect(&self) -> Option<&ContainerEffect> {
        match &self.kind {
            LayerKind::Container { effect, .. } => Some(effect),
            _ => None,
        }
    }

    /// Children; empty for leaf layers.
    #[must_use]
    pub fn children(&self) -> &[Self] {
        match &self.kind {
            LayerKind::Container { children, .. } => children,
            _ => &[],
        }
    }

    /// Forces a generation bump, e.g. when external content changed.
    pub fn invalidate(&mut self) {
        self.generation += 1;
    }

    /// Replaces the container effect. Returns `false` for leaf layers.
    ///
    /// The generation only changes when the effect actually differs.
    pub fn set_effect(&mut self, new_effect: ContainerEffect) -> bool {
        let LayerKind::Container { effect, .. } = &mut self.kind else {
            return false;
        };
        if *effect != new_effect {
            *effect = new_effect;
            self.generation += 1;
        }
        true
    }

    /// Replaces the picture of a picture layer. Returns `false` for other
    /// layers.
    pub fn set_picture(&mut self, new_picture: Picture) -> bool {
        let LayerKind::Picture(picture) = &mut self.kind else {
            return false;
        };
        if *picture != new_picture {
            *picture = new_picture;
            self.generation += 1;
        }
        true
    }

    /// Moves a texture or external texture layer. Returns `false` for other
    /// layers.
    pub fn set_offset(&mut self, new_offset: Point) -> bool {
        let (LayerKind::Texture { offset, .. } | LayerKind::ExternalTexture { offset, .. }) =
            &mut self.kind
        else {
            return false;
        };
        if *offset != new_offset {
            *offset = new_offset;
            self.generation += 1;
        }
        true
    }

    /// Appends a child. Returns `false` for leaf layers.
    pub fn append_child(&mut self, child: Self) -> bool {
        self.insert_child(self.children().len(), child)
    }

    /// Inserts a child at `index` (clamped). Returns `false` for leaf layers.
    pub fn insert_child(&mut self, index: usize, child: Self) -> bool {
        let LayerKind::Container { children, .. } = &mut self.kind else {
            return false;
        };
        children.insert(index.min(children.len()), child);
        self.generation += 1;
        true
    }

    /// Removes and returns the child at `index`.
    pub fn remove_child(&mut self, index: usize) -> Option<Self> {
        let LayerKind::Container { children, .. } = &mut self.kind else {
            return None;
        };
        if index >= children.len() {
            return None;
        }
        self.generation += 1;
        Some(children.remove(index))
    }

    /// Mutable access to a child.
    ///
    /// The container's generation is bumped because the child may be
    /// modified through the returned reference.
    pub fn child_mut(&mut self, index: usize) -> Option<&mut Self> {
        let LayerKind::Container { children, .. } = &mut self.kind else {
            return None;
        };
        let child = children.get_mut(index)?;
        self.generation += 1;
        Some(child)
    }

    /// Finds a layer in this subtree by id.
    #[must_use]
    pub fn find(&self, id: LayerId) -> Option<&Self> {
        self.descendants().find(|layer| layer.id == id)
    }

    /// Pre-order iterator over this layer and its descendants.
    #[must_use]
    pub fn descendants(&self) -> super::traverse::Descendants<'_> {
        super::traverse::Descendants::new(self)
    }
}

fn write_children(f: &mut fmt::Formatter<'_>, children: &[Layer]) -> fmt::Result {
    for child in children {
        write!(f, " {child}")?;
    }
    Ok(())
}

/// S-expression dump of the subtree, e.g.
/// `(opacity#3:1 '(alpha 0.5) (picture#4:1 '(picture-id 7)))`.
impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (id, generation) = (self.id, self.generation);
        match &self.kind {
            LayerKind::Container { effect, children } => {
                match effect {
                    ContainerEffect::None => write!(f, "(container#{id}:{generation}")?,
                    ContainerEffect::Transform(m) => {
                        let [a, b, c, d, e, g] = m.as_coeffs();
                        write!(
                            f,
                            "(transform#{id}:{generation} '(matrix {a} {b} {c} {d} {e} {g})"
                        )?;
                    }
                    ContainerEffect::Opacity(alpha) => {
                        write!(f, "(opacity#{id}:{generation} '(alpha {alpha})")?;
                    }
                    ContainerEffect::ImageFilter(filter) => write!(
                        f,
                        "(imagefilter#{id}:{generation} '(typename \"{}\")",
                        filter.type_name()
                    )?,
                    ContainerEffect::BackdropFilter {
                        filter,
                        blend_mode,
                        auto_child_clip,
                    } => write!(
                        f,
                        "(backdrop-filter#{id}:{generation} '(typename \"{}\") '(blend {blend_mode:?}) '(auto-clip {auto_child_clip})",
                        filter.type_name()
                    )?,
                    ContainerEffect::Clip { shape, op, anti_alias } => {
                        let name = match shape {
                            ClipShape::Rect(_) => "rect-clip",
                            ClipShape::RoundedRect(_) => "rrect-clip",
                            ClipShape::Path(_) => "path-clip",
                        };
                        let b = shape.bounds();
                        write!(
                            f,
                            "({name}#{id}:{generation} '(bounds {} {} {} {}) '(op {op:?}) '(aa {anti_alias})",
                            b.x0,
                            b.y0,
                            b.width(),
                            b.height()
                        )?;
                    }
                }
                write_children(f, children)?;
                f.write_str(")")
            }
            LayerKind::Picture(picture) => {
                let r = picture.cull_rect();
                write!(
                    f,
                    "(picture#{id}:{generation} '(picture-id {}) '(cull-rect {} {} {} {}))",
                    picture.unique_id(),
                    r.x0,
                    r.y0,
                    r.width(),
                    r.height()
                )
            }
            LayerKind::Texture {
                texture_id,
                offset,
                size,
                ..
            } => write!(
                f,
                "(texture#{id}:{generation} '(texture-id {texture_id}) '(size {} {}) '(offset {} {}))",
                size.width, size.height, offset.x, offset.y
            ),
            LayerKind::ExternalTexture { offset, size, .. } => write!(
                f,
                "(external-texture#{id}:{generation} '(size {} {}) '(offset {} {}))",
                size.width, size.height, offset.x, offset.y
            ),
            LayerKind::GpuSurfaceView {
                surface_id,
                dst_rect,
                ..
            } => write!(
                f,
                "(gpu-surface-view#{id}:{generation} '(surface-id {surface_id}) '(dst-rect {} {} {} {}))",
                dst_rect.x0,
                dst_rect.y0,
                dst_rect.width(),
                dst_rect.height()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Picture;

    fn picture() -> Picture {
        Picture::record(Rect::new(0.0, 0.0, 10.0, 10.0), |_| {})
    }

    #[test]
    fn new_layers_start_at_generation_one() {
        let a = Layer::container();
        let b = Layer::picture(picture());
        assert_eq!(a.generation(), 1);
        assert_ne!(a.id(), b.id());
        assert_eq!(b.layer_type(), LayerType::Picture);
    }

    #[test]
    fn unchanged_effect_keeps_generation() {
        let mut layer = Layer::opacity(0.5);
        assert!(layer.set_effect(ContainerEffect::Opacity(0.5)));
        assert_eq!(layer.generation(), 1);
        layer.set_effect(ContainerEffect::Opacity(0.25));
        assert_eq!(layer.generation(), 2);
        assert!(!Layer::picture(picture()).set_effect(ContainerEffect::None));
    }

    #[test]
    fn child_mutation_bumps_ancestors() {
        let mut root = Layer::container().with_child(Layer::opacity(1.0).with_child(Layer::picture(picture())));
        let root_gen = root.generation();
        let child = root.child_mut(0).unwrap();
        let child_gen = child.generation();
        child.child_mut(0).unwrap().set_picture(picture());
        assert!(child.generation() > child_gen);
        assert!(root.generation() > root_gen);
    }

    #[test]
    fn clone_keeps_identity() {
        let layer = Layer::transform(Affine::scale(2.0));
        let copy = layer.clone();
        assert_eq!(copy.id(), layer.id());
        assert_eq!(copy.generation(), layer.generation());
    }

    #[test]
    fn dump_is_an_s_expression() {
        let p = picture();
        let pid = p.unique_id();
        let child = Layer::picture(p);
        let root = Layer::opacity(0.5).with_child(child.clone());
        let dump = root.to_string();
        assert_eq!(
            dump,
            format!(
                "(opacity#{}:1 '(alpha 0.5) (picture#{}:1 '(picture-id {pid}) '(cull-rect 0 0 10 10)))",
                root.id(),
                child.id()
            )
        );
    }

    #[test]
    fn leaf_layers_reject_children() {
        let mut leaf = Layer::picture(picture());
        assert!(!leaf.append_child(Layer::container()));
        assert!(leaf.children().is_empty());
        assert!(leaf.remove_child(0).is_none());
    }
}
