// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use core::fmt;

use kurbo::{Affine, BezPath, Rect, RoundedRect};

use super::{Canvas, Picture, SaveLayerRec};
use crate::image::Image;
use crate::paint::{ClipOp, Color, Paint, SamplingOptions};

/// Forwards every call to a list of canvases.
///
/// The first canvas is the frame canvas: queries (`save_count`,
/// `total_matrix`, `quick_reject`) are answered by it alone. Observer
/// canvases added afterwards receive the same calls.
#[derive(Default)]
pub struct MultiplexerCanvas<'a> {
    canvases: Vec<&'a mut dyn Canvas>,
}

impl fmt::Debug for MultiplexerCanvas<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiplexerCanvas")
            .field("canvases", &self.canvases.len())
            .finish()
    }
}

impl<'a> MultiplexerCanvas<'a> {
    /// Creates an empty multiplexer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            canvases: Vec::new(),
        }
    }

    /// Appends a target canvas.
    pub fn add_canvas(&mut self, canvas: &'a mut dyn Canvas) {
        self.canvases.push(canvas);
    }

    /// Number of target canvases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.canvases.len()
    }

    /// Returns `true` if there are no targets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.canvases.is_empty()
    }

    fn each(&mut self, mut f: impl FnMut(&mut dyn Canvas)) {
        for canvas in &mut self.canvases {
            f(&mut **canvas);
        }
    }
}

impl Canvas for MultiplexerCanvas<'_> {
    fn save(&mut self) -> usize {
        let count = self.save_count();
        self.each(|c| {
            c.save();
        });
        count
    }

    fn save_layer(&mut self, rec: &SaveLayerRec<'_>) -> usize {
        let count = self.save_count();
        self.each(|c| {
            c.save_layer(rec);
        });
        count
    }

    fn restore(&mut self) {
        self.each(|c| c.restore());
    }

    fn save_count(&self) -> usize {
        self.canvases.first().map_or(1, |c| c.save_count())
    }

    fn restore_to_count(&mut self, count: usize) {
        self.each(|c| c.restore_to_count(count));
    }

    fn concat(&mut self, matrix: Affine) {
        self.each(|c| c.concat(matrix));
    }

    fn total_matrix(&self) -> Affine {
        self.canvases
            .first()
            .map_or(Affine::IDENTITY, |c| c.total_matrix())
    }

    fn clip_rect(&mut self, rect: Rect, op: ClipOp, anti_alias: bool) {
        self.each(|c| c.clip_rect(rect, op, anti_alias));
    }

    fn clip_rrect(&mut self, rrect: RoundedRect, op: ClipOp, anti_alias: bool) {
        self.each(|c| c.clip_rrect(rrect, op, anti_alias));
    }

    fn clip_path(&mut self, path: &BezPath, op: ClipOp, anti_alias: bool) {
        self.each(|c| c.clip_path(path, op, anti_alias));
    }

    fn quick_reject(&self, rect: Rect) -> bool {
        self.canvases.first().is_some_and(|c| c.quick_reject(rect))
    }

    fn clear(&mut self, color: Color) {
        self.each(|c| c.clear(color));
    }

    fn draw_rect(&mut self, rect: Rect, paint: &Paint) {
        self.each(|c| c.draw_rect(rect, paint));
    }

    fn draw_path(&mut self, path: &BezPath, paint: &Paint) {
        self.each(|c| c.draw_path(path, paint));
    }

    fn draw_image(
        &mut self,
        image: &Image,
        x: f64,
        y: f64,
        sampling: SamplingOptions,
        paint: Option<&Paint>,
    ) {
        self.each(|c| c.draw_image(image, x, y, sampling, paint));
    }

    fn draw_image_rect(
        &mut self,
        image: &Image,
        dst: Rect,
        sampling: SamplingOptions,
        paint: Option<&Paint>,
    ) {
        self.each(|c| c.draw_image_rect(image, dst, sampling, paint));
    }

    fn draw_picture(&mut self, picture: &Picture, matrix: Option<Affine>, paint: Option<&Paint>) {
        self.each(|c| c.draw_picture(picture, matrix, paint));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{CountingCanvas, RasterSurface};

    #[test]
    fn calls_reach_every_canvas() {
        let mut surface = RasterSurface::new(8, 8).unwrap();
        let mut frame = surface.canvas();
        let mut observer = CountingCanvas::new();
        {
            let mut mux = MultiplexerCanvas::new();
            mux.add_canvas(&mut frame);
            mux.add_canvas(&mut observer);
            let count = mux.save();
            mux.translate(2.0, 2.0);
            mux.draw_rect(Rect::new(0.0, 0.0, 2.0, 2.0), &Paint::fill(Color::RED));
            assert_eq!(mux.total_matrix(), Affine::translate((2.0, 2.0)));
            mux.restore_to_count(count);
        }
        drop(frame);
        assert_eq!(observer.counts().draws, 1);
        assert_eq!(observer.save_count(), 1);
        assert_eq!(surface.pixel(3, 3), Some(Color::RED));
    }

    #[test]
    fn queries_come_from_the_frame_canvas() {
        let mut surface = RasterSurface::new(8, 8).unwrap();
        let mut frame = surface.canvas();
        let mut observer = CountingCanvas::new();
        let mut mux = MultiplexerCanvas::new();
        mux.add_canvas(&mut frame);
        mux.add_canvas(&mut observer);
        assert!(mux.quick_reject(Rect::new(100.0, 100.0, 110.0, 110.0)));
        assert!(!mux.quick_reject(Rect::new(0.0, 0.0, 1.0, 1.0)));
    }
}
