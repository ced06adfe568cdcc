// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layer tree root and frame observers.

use core::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::node::Layer;
use super::paint::PaintContext;
use super::preroll::PrerollContext;
use crate::canvas::Canvas;
use crate::geometry::ISize;

/// Receives a copy of every draw operation of a frame.
///
/// Observers are asked for a canvas when a frame begins; the canvas joins the
/// frame's multiplexer so it sees the same operations as the frame surface.
pub trait FrameObserver: Send {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Returns the canvas to mirror the frame into, or `None` to skip this
    /// frame.
    fn begin_frame(&mut self, size: ISize) -> Option<&mut dyn Canvas>;

    /// Called after the frame has been presented.
    fn end_frame(&mut self);
}

/// Observer handle shared between the host and the present thread.
pub type SharedFrameObserver = Arc<Mutex<dyn FrameObserver>>;

/// A root layer plus the frame it is rendered into.
#[derive(Clone)]
pub struct LayerTree {
    root: Layer,
    frame_size: ISize,
    observers: Vec<SharedFrameObserver>,
}

impl fmt::Debug for LayerTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerTree")
            .field("root", &self.root.id())
            .field("frame_size", &self.frame_size)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl LayerTree {
    /// Creates a tree rendering `root` into a frame of `frame_size`.
    #[must_use]
    pub fn new(root: Layer, frame_size: ISize) -> Self {
        Self {
            root,
            frame_size,
            observers: Vec::new(),
        }
    }

    /// Root layer.
    #[must_use]
    pub fn root(&self) -> &Layer {
        &self.root
    }

    /// Mutable root layer.
    pub fn root_mut(&mut self) -> &mut Layer {
        &mut self.root
    }

    /// Frame size in pixels.
    #[must_use]
    pub fn frame_size(&self) -> ISize {
        self.frame_size
    }

    /// Updates the frame size, usually after the surface was resized.
    pub fn set_frame_size(&mut self, size: ISize) {
        self.frame_size = size;
    }

    /// Registers an observer.
    pub fn add_observer(&mut self, observer: SharedFrameObserver) {
        self.observers.push(observer);
    }

    /// Registered observers.
    #[must_use]
    pub fn observers(&self) -> &[SharedFrameObserver] {
        &self.observers
    }

    /// Prerolls the whole tree; afterwards `context.cull_rect` holds the
    /// root's paint bounds.
    pub fn preroll(&mut self, context: &mut PrerollContext) {
        let matrix = context.root_surface_transformation;
        self.root.preroll(context, matrix);
        context.cull_rect = self.root.paint_bounds();
    }

    /// Paints the tree if the root has anything to draw.
    pub fn paint(&self, context: &mut PaintContext<'_>) {
        if self.root.needs_painting(context) {
            self.root.paint(context);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{CountingCanvas, OpCounts, Picture};
    use crate::paint::{Color, Paint};
    use kurbo::Rect;

    struct Recording {
        canvas: CountingCanvas,
        frames: usize,
    }

    impl FrameObserver for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        fn begin_frame(&mut self, _size: ISize) -> Option<&mut dyn Canvas> {
            Some(&mut self.canvas)
        }

        fn end_frame(&mut self) {
            self.frames += 1;
        }
    }

    #[test]
    fn preroll_fills_cull_with_root_bounds() {
        let rect = Rect::new(5.0, 5.0, 15.0, 25.0);
        let picture = Picture::record(rect, |c| c.draw_rect(rect, &Paint::fill(Color::RED)));
        let mut tree = LayerTree::new(
            Layer::container().with_child(Layer::picture(picture)),
            ISize::new(100, 100),
        );
        let mut context = PrerollContext::default();
        tree.preroll(&mut context);
        assert_eq!(context.cull_rect, rect);
    }

    #[test]
    fn empty_tree_paints_nothing() {
        let mut tree = LayerTree::new(Layer::container(), ISize::new(10, 10));
        tree.preroll(&mut PrerollContext::default());
        let mut canvas = CountingCanvas::new();
        let mut context = PaintContext::new(&mut canvas, Rect::ZERO);
        tree.paint(&mut context);
        drop(context);
        assert_eq!(canvas.counts(), OpCounts::default());
    }

    #[test]
    fn observers_are_shared_between_clones() {
        let observer = Arc::new(Mutex::new(Recording {
            canvas: CountingCanvas::new(),
            frames: 0,
        }));
        let mut tree = LayerTree::new(Layer::container(), ISize::new(10, 10));
        tree.add_observer(observer.clone());
        let clone = tree.clone();
        clone.observers()[0].lock().end_frame();
        assert_eq!(observer.lock().frames, 1);
        assert_eq!(clone.observers()[0].lock().name(), "recording");
    }
}
