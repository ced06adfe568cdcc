// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use kurbo::{Affine, BezPath, Rect, RoundedRect};

use super::{Canvas, SaveLayerRec};
use crate::image::Image;
use crate::paint::{ClipOp, Color, Paint, SamplingOptions};

/// Call counts collected by a [`CountingCanvas`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OpCounts {
    /// Calls to `save`.
    pub saves: usize,
    /// Calls to `save_layer`.
    pub save_layers: usize,
    /// Effective calls to `restore`.
    pub restores: usize,
    /// Clip calls of any shape.
    pub clips: usize,
    /// Calls to `clear`.
    pub clears: usize,
    /// Shape and image draws.
    pub draws: usize,
    /// Images among `draws`.
    pub images: usize,
}

/// A canvas that tracks the matrix and save stack and counts calls.
///
/// Useful as a frame observer target and in tests that only care about how
/// often something was painted.
#[derive(Debug, Default)]
pub struct CountingCanvas {
    matrix: Affine,
    saved: Vec<Affine>,
    counts: OpCounts,
}

impl CountingCanvas {
    /// Creates a canvas with an identity matrix.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts collected so far.
    #[must_use]
    pub fn counts(&self) -> OpCounts {
        self.counts
    }

    /// Resets the counts, keeping the matrix state.
    pub fn reset_counts(&mut self) {
        self.counts = OpCounts::default();
    }
}

impl Canvas for CountingCanvas {
    fn save(&mut self) -> usize {
        self.counts.saves += 1;
        let count = self.save_count();
        self.saved.push(self.matrix);
        count
    }

    fn save_layer(&mut self, _rec: &SaveLayerRec<'_>) -> usize {
        self.counts.save_layers += 1;
        let count = self.save_count();
        self.saved.push(self.matrix);
        count
    }

    fn restore(&mut self) {
        if let Some(matrix) = self.saved.pop() {
            self.matrix = matrix;
            self.counts.restores += 1;
        }
    }

    fn save_count(&self) -> usize {
        self.saved.len() + 1
    }

    fn concat(&mut self, matrix: Affine) {
        self.matrix *= matrix;
    }

    fn total_matrix(&self) -> Affine {
        self.matrix
    }

    fn clip_rect(&mut self, _rect: Rect, _op: ClipOp, _anti_alias: bool) {
        self.counts.clips += 1;
    }

    fn clip_rrect(&mut self, _rrect: RoundedRect, _op: ClipOp, _anti_alias: bool) {
        self.counts.clips += 1;
    }

    fn clip_path(&mut self, _path: &BezPath, _op: ClipOp, _anti_alias: bool) {
        self.counts.clips += 1;
    }

    fn quick_reject(&self, _rect: Rect) -> bool {
        false
    }

    fn clear(&mut self, _color: Color) {
        self.counts.clears += 1;
    }

    fn draw_rect(&mut self, _rect: Rect, _paint: &Paint) {
        self.counts.draws += 1;
    }

    fn draw_path(&mut self, _path: &BezPath, _paint: &Paint) {
        self.counts.draws += 1;
    }

    fn draw_image(
        &mut self,
        _image: &Image,
        _x: f64,
        _y: f64,
        _sampling: SamplingOptions,
        _paint: Option<&Paint>,
    ) {
        self.counts.draws += 1;
        self.counts.images += 1;
    }

    fn draw_image_rect(
        &mut self,
        _image: &Image,
        _dst: Rect,
        _sampling: SamplingOptions,
        _paint: Option<&Paint>,
    ) {
        self.counts.draws += 1;
        self.counts.images += 1;
    }
}
