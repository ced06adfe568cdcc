// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Display-list recording.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use kurbo::{Affine, BezPath, Rect, RoundedRect};

use super::{Canvas, SaveLayerRec};
use crate::filter::ImageFilter;
use crate::image::Image;
use crate::paint::{ClipOp, Color, Paint, SamplingOptions};

static NEXT_PICTURE_ID: AtomicU64 = AtomicU64::new(1);

/// One recorded canvas call.
#[derive(Clone, Debug)]
#[expect(missing_docs, reason = "variants mirror the Canvas methods of the same name")]
pub enum DrawOp {
    Save,
    SaveLayer {
        bounds: Option<Rect>,
        paint: Option<Paint>,
        backdrop: Option<ImageFilter>,
        init_with_previous: bool,
    },
    Restore,
    Concat(Affine),
    ClipRect(Rect, ClipOp, bool),
    ClipRRect(RoundedRect, ClipOp, bool),
    ClipPath(BezPath, ClipOp, bool),
    Clear(Color),
    DrawRect(Rect, Paint),
    DrawPath(BezPath, Paint),
    DrawImage {
        image: Image,
        x: f64,
        y: f64,
        sampling: SamplingOptions,
        paint: Option<Paint>,
    },
    DrawImageRect {
        image: Image,
        dst: Rect,
        sampling: SamplingOptions,
        paint: Option<Paint>,
    },
    DrawPicture {
        picture: Picture,
        matrix: Option<Affine>,
        paint: Option<Paint>,
    },
}

struct PictureData {
    unique_id: u64,
    cull_rect: Rect,
    ops: Vec<DrawOp>,
}

/// An immutable recorded display list.
///
/// Cloning shares the recording. Two clones have the same
/// [`unique_id`](Self::unique_id).
#[derive(Clone)]
pub struct Picture {
    data: Arc<PictureData>,
}

impl Picture {
    /// Records a picture by running `draw` against a recorder.
    pub fn record(cull_rect: Rect, draw: impl FnOnce(&mut PictureRecorder)) -> Self {
        let mut recorder = PictureRecorder::new(cull_rect);
        draw(&mut recorder);
        recorder.finish()
    }

    /// Process-unique identifier of this recording.
    #[must_use]
    pub fn unique_id(&self) -> u64 {
        self.data.unique_id
    }

    /// Bounds of everything the picture draws, in its own coordinates.
    #[must_use]
    pub fn cull_rect(&self) -> Rect {
        self.data.cull_rect
    }

    /// Recorded operations.
    #[must_use]
    pub fn ops(&self) -> &[DrawOp] {
        &self.data.ops
    }

    /// Number of recorded operations, counting nested pictures.
    #[must_use]
    pub fn approximate_op_count(&self) -> usize {
        self.data
            .ops
            .iter()
            .map(|op| match op {
                DrawOp::DrawPicture { picture, .. } => picture.approximate_op_count(),
                _ => 1,
            })
            .sum()
    }

    /// Returns `true` if any recorded image is texture backed.
    #[must_use]
    pub fn has_texture_backed_images(&self) -> bool {
        self.data.ops.iter().any(|op| match op {
            DrawOp::DrawImage { image, .. } | DrawOp::DrawImageRect { image, .. } => {
                image.is_texture_backed()
            }
            DrawOp::DrawPicture { picture, .. } => picture.has_texture_backed_images(),
            _ => false,
        })
    }

    /// Replays the recording into `canvas`, leaving its save count unchanged.
    pub fn playback<C: Canvas + ?Sized>(&self, canvas: &mut C) {
        let count = canvas.save_count();
        for op in self.data.ops.iter() {
            match op {
                DrawOp::Save => {
                    canvas.save();
                }
                DrawOp::SaveLayer {
                    bounds,
                    paint,
                    backdrop,
                    init_with_previous,
                } => {
                    canvas.save_layer(&SaveLayerRec {
                        bounds: *bounds,
                        paint: paint.as_ref(),
                        backdrop: backdrop.as_ref(),
                        init_with_previous: *init_with_previous,
                    });
                }
                DrawOp::Restore => {
                    if canvas.save_count() > count {
                        canvas.restore();
                    }
                }
                DrawOp::Concat(m) => canvas.concat(*m),
                DrawOp::ClipRect(r, op, aa) => canvas.clip_rect(*r, *op, *aa),
                DrawOp::ClipRRect(r, op, aa) => canvas.clip_rrect(*r, *op, *aa),
                DrawOp::ClipPath(p, op, aa) => canvas.clip_path(p, *op, *aa),
                DrawOp::Clear(c) => canvas.clear(*c),
                DrawOp::DrawRect(r, p) => canvas.draw_rect(*r, p),
                DrawOp::DrawPath(path, p) => canvas.draw_path(path, p),
                DrawOp::DrawImage {
                    image,
                    x,
                    y,
                    sampling,
                    paint,
                } => canvas.draw_image(image, *x, *y, *sampling, paint.as_ref()),
                DrawOp::DrawImageRect {
                    image,
                    dst,
                    sampling,
                    paint,
                } => canvas.draw_image_rect(image, *dst, *sampling, paint.as_ref()),
                DrawOp::DrawPicture {
                    picture,
                    matrix,
                    paint,
                } => canvas.draw_picture(picture, *matrix, paint.as_ref()),
            }
        }
        canvas.restore_to_count(count);
    }
}

impl fmt::Debug for Picture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Picture")
            .field("unique_id", &self.data.unique_id)
            .field("cull_rect", &self.data.cull_rect)
            .field("ops", &self.data.ops.len())
            .finish()
    }
}

impl PartialEq for Picture {
    fn eq(&self, other: &Self) -> bool {
        self.data.unique_id == other.data.unique_id
    }
}

/// A [`Canvas`] that records calls into a [`Picture`].
#[derive(Debug)]
pub struct PictureRecorder {
    cull_rect: Rect,
    ops: Vec<DrawOp>,
    matrix: Affine,
    saved: Vec<Affine>,
}

impl PictureRecorder {
    /// Starts a recording bounded by `cull_rect`.
    #[must_use]
    pub fn new(cull_rect: Rect) -> Self {
        Self {
            cull_rect,
            ops: Vec::new(),
            matrix: Affine::IDENTITY,
            saved: Vec::new(),
        }
    }

    /// Finishes the recording, closing any saves left open.
    #[must_use]
    pub fn finish(mut self) -> Picture {
        self.restore_to_count(1);
        Picture {
            data: Arc::new(PictureData {
                unique_id: NEXT_PICTURE_ID.fetch_add(1, Ordering::Relaxed),
                cull_rect: self.cull_rect,
                ops: self.ops,
            }),
        }
    }

    fn push_save(&mut self) -> usize {
        let count = self.save_count();
        self.saved.push(self.matrix);
        count
    }
}

impl Canvas for PictureRecorder {
    fn save(&mut self) -> usize {
        self.ops.push(DrawOp::Save);
        self.push_save()
    }

    fn save_layer(&mut self, rec: &SaveLayerRec<'_>) -> usize {
        self.ops.push(DrawOp::SaveLayer {
            bounds: rec.bounds,
            paint: rec.paint.cloned(),
            backdrop: rec.backdrop.cloned(),
            init_with_previous: rec.init_with_previous,
        });
        self.push_save()
    }

    fn restore(&mut self) {
        if let Some(matrix) = self.saved.pop() {
            self.matrix = matrix;
            self.ops.push(DrawOp::Restore);
        }
    }

    fn save_count(&self) -> usize {
        self.saved.len() + 1
    }

    fn concat(&mut self, matrix: Affine) {
        self.matrix *= matrix;
        self.ops.push(DrawOp::Concat(matrix));
    }

    fn total_matrix(&self) -> Affine {
        self.matrix
    }

    fn clip_rect(&mut self, rect: Rect, op: ClipOp, anti_alias: bool) {
        self.ops.push(DrawOp::ClipRect(rect, op, anti_alias));
    }

    fn clip_rrect(&mut self, rrect: RoundedRect, op: ClipOp, anti_alias: bool) {
        self.ops.push(DrawOp::ClipRRect(rrect, op, anti_alias));
    }

    fn clip_path(&mut self, path: &BezPath, op: ClipOp, anti_alias: bool) {
        self.ops.push(DrawOp::ClipPath(path.clone(), op, anti_alias));
    }

    fn quick_reject(&self, _rect: Rect) -> bool {
        false
    }

    fn clear(&mut self, color: Color) {
        self.ops.push(DrawOp::Clear(color));
    }

    fn draw_rect(&mut self, rect: Rect, paint: &Paint) {
        self.ops.push(DrawOp::DrawRect(rect, paint.clone()));
    }

    fn draw_path(&mut self, path: &BezPath, paint: &Paint) {
        self.ops.push(DrawOp::DrawPath(path.clone(), paint.clone()));
    }

    fn draw_image(
        &mut self,
        image: &Image,
        x: f64,
        y: f64,
        sampling: SamplingOptions,
        paint: Option<&Paint>,
    ) {
        self.ops.push(DrawOp::DrawImage {
            image: image.clone(),
            x,
            y,
            sampling,
            paint: paint.cloned(),
        });
    }

    fn draw_image_rect(
        &mut self,
        image: &Image,
        dst: Rect,
        sampling: SamplingOptions,
        paint: Option<&Paint>,
    ) {
        self.ops.push(DrawOp::DrawImageRect {
            image: image.clone(),
            dst,
            sampling,
            paint: paint.cloned(),
        });
    }

    fn draw_picture(&mut self, picture: &Picture, matrix: Option<Affine>, paint: Option<&Paint>) {
        self.ops.push(DrawOp::DrawPicture {
            picture: picture.clone(),
            matrix,
            paint: paint.cloned(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{CountingCanvas, RasterSurface};

    #[test]
    fn pictures_get_distinct_ids() {
        let a = Picture::record(Rect::new(0.0, 0.0, 1.0, 1.0), |_| {});
        let b = Picture::record(Rect::new(0.0, 0.0, 1.0, 1.0), |_| {});
        assert_ne!(a.unique_id(), b.unique_id());
        assert_eq!(a.clone(), a);
    }

    #[test]
    fn finish_closes_open_saves() {
        let picture = Picture::record(Rect::new(0.0, 0.0, 4.0, 4.0), |c| {
            c.save();
            c.translate(1.0, 1.0);
            c.save();
        });
        let restores = picture
            .ops()
            .iter()
            .filter(|op| matches!(op, DrawOp::Restore))
            .count();
        assert_eq!(restores, 2);
    }

    #[test]
    fn playback_keeps_save_count() {
        let picture = Picture::record(Rect::new(0.0, 0.0, 4.0, 4.0), |c| {
            c.save();
            c.translate(1.0, 1.0);
            c.draw_rect(Rect::new(0.0, 0.0, 1.0, 1.0), &Paint::default());
        });
        let mut counting = CountingCanvas::new();
        picture.playback(&mut counting);
        assert_eq!(counting.save_count(), 1);
        assert_eq!(counting.counts().draws, 1);
    }

    #[test]
    fn playback_renders_pixels() {
        let picture = Picture::record(Rect::new(0.0, 0.0, 4.0, 4.0), |c| {
            c.draw_rect(Rect::new(1.0, 1.0, 3.0, 3.0), &Paint::fill(Color::BLUE));
        });
        let mut surface = RasterSurface::new(4, 4).unwrap();
        surface.canvas().draw_picture(&picture, None, None);
        assert_eq!(surface.pixel(2, 2), Some(Color::BLUE));
        assert_eq!(surface.pixel(0, 0), Some(Color::TRANSPARENT));
    }
}
