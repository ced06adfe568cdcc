// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The drawing interface layers paint into.
//!
//! [`Canvas`] is a small immediate-mode 2D API with a save stack, a current
//! transform and a clip. Implementations:
//!
//! - [`RasterCanvas`] draws into a CPU pixmap owned by a [`RasterSurface`].
//! - [`PictureRecorder`] records calls into an immutable [`Picture`].
//! - [`MultiplexerCanvas`] forwards every call to several canvases, so frame
//!   observers receive the same draw stream as the frame surface.
//! - [`CountingCanvas`] only tracks state and counts calls.
//!
//! Save counts follow the usual convention: a fresh canvas reports `1`,
//! [`Canvas::save`] returns the count before saving and
//! [`Canvas::restore_to_count`] with that value undoes everything since.

mod counting;
mod multiplexer;
mod raster;
mod recorder;

pub use counting::{CountingCanvas, OpCounts};
pub use multiplexer::MultiplexerCanvas;
pub use raster::{RasterCanvas, RasterSurface};
pub use recorder::{DrawOp, Picture, PictureRecorder};

use kurbo::{Affine, BezPath, Rect, RoundedRect};

use crate::filter::ImageFilter;
use crate::image::Image;
use crate::paint::{ClipOp, Color, Paint, SamplingOptions};

/// Parameters of [`Canvas::save_layer`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SaveLayerRec<'a> {
    /// Local-space bounds hint; content outside may be discarded.
    pub bounds: Option<Rect>,
    /// Paint applied when the layer is composited back on restore.
    pub paint: Option<&'a Paint>,
    /// Filter applied to a copy of the destination, which becomes the
    /// initial content of the layer.
    pub backdrop: Option<&'a ImageFilter>,
    /// Initialize the layer with a copy of the destination.
    pub init_with_previous: bool,
}

/// An immediate-mode drawing target.
pub trait Canvas {
    /// Pushes the current matrix and clip. Returns the save count before
    /// the push.
    fn save(&mut self) -> usize;

    /// Pushes the current state and starts an offscreen layer that is
    /// composited on the matching [`restore`](Self::restore).
    fn save_layer(&mut self, rec: &SaveLayerRec<'_>) -> usize;

    /// Pops the most recent save. Extra restores are ignored.
    fn restore(&mut self);

    /// Current depth of the save stack; `1` for a fresh canvas.
    fn save_count(&self) -> usize;

    /// Restores until the save count equals `count`.
    fn restore_to_count(&mut self, count: usize) {
        let count = count.max(1);
        while self.save_count() > count {
            self.restore();
        }
    }

    /// Pre-multiplies the current matrix by `matrix`.
    fn concat(&mut self, matrix: Affine);

    /// Pre-translates the current matrix.
    fn translate(&mut self, dx: f64, dy: f64) {
        self.concat(Affine::translate((dx, dy)));
    }

    /// Local-to-device transform.
    fn total_matrix(&self) -> Affine;

    /// Combines the clip with a rectangle.
    fn clip_rect(&mut self, rect: Rect, op: ClipOp, anti_alias: bool);

    /// Combines the clip with a rounded rectangle.
    fn clip_rrect(&mut self, rrect: RoundedRect, op: ClipOp, anti_alias: bool);

    /// Combines the clip with a path.
    fn clip_path(&mut self, path: &BezPath, op: ClipOp, anti_alias: bool);

    /// Returns `true` if drawing inside `rect` (local space) cannot affect
    /// any pixel inside the current clip.
    fn quick_reject(&self, rect: Rect) -> bool;

    /// Replaces every pixel inside the clip with `color`.
    fn clear(&mut self, color: Color);

    /// Draws a rectangle.
    fn draw_rect(&mut self, rect: Rect, paint: &Paint);

    /// Draws a path.
    fn draw_path(&mut self, path: &BezPath, paint: &Paint);

    /// Draws an image with its top-left corner at `(x, y)`.
    fn draw_image(
        &mut self,
        image: &Image,
        x: f64,
        y: f64,
        sampling: SamplingOptions,
        paint: Option<&Paint>,
    );

    /// Draws an image scaled into `dst`.
    fn draw_image_rect(
        &mut self,
        image: &Image,
        dst: Rect,
        sampling: SamplingOptions,
        paint: Option<&Paint>,
    );

    /// Replays a picture, optionally under an extra matrix and inside a
    /// layer composited with `paint`.
    fn draw_picture(&mut self, picture: &Picture, matrix: Option<Affine>, paint: Option<&Paint>) {
        let count = match paint {
            Some(paint) => self.save_layer(&SaveLayerRec {
                bounds: Some(picture.cull_rect()),
                paint: Some(paint),
                ..SaveLayerRec::default()
            }),
            None => self.save(),
        };
        if let Some(matrix) = matrix {
            self.concat(matrix);
        }
        picture.playback(self);
        self.restore_to_count(count);
    }
}
