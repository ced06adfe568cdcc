// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Image filters applied to saved layers and backdrops.

use std::sync::Arc;

use kurbo::{Affine, Rect};
use tiny_skia::Pixmap;

use crate::geometry::is_empty;

/// Number of standard deviations a blur can spread content.
const BLUR_SIGMA_EXTENT: f64 = 3.0;

/// A filter that transforms the pixels of a layer.
#[derive(Clone, Debug, PartialEq)]
pub enum ImageFilter {
    /// Gaussian blur with per-axis standard deviation in local units.
    Blur {
        /// Horizontal sigma.
        sigma_x: f32,
        /// Vertical sigma.
        sigma_y: f32,
    },
    /// Translates the content.
    Offset {
        /// Horizontal offset.
        dx: f32,
        /// Vertical offset.
        dy: f32,
    },
    /// Applies `inner` first, then `outer`.
    Compose {
        /// Filter applied to the output of `inner`.
        outer: Arc<Self>,
        /// Filter applied to the source.
        inner: Arc<Self>,
    },
}

impl ImageFilter {
    /// Gaussian blur.
    #[must_use]
    pub fn blur(sigma_x: f32, sigma_y: f32) -> Self {
        Self::Blur { sigma_x, sigma_y }
    }

    /// Offset filter.
    #[must_use]
    pub fn offset(dx: f32, dy: f32) -> Self {
        Self::Offset { dx, dy }
    }

    /// Composition of two filters.
    #[must_use]
    pub fn compose(outer: Self, inner: Self) -> Self {
        Self::Compose {
            outer: Arc::new(outer),
            inner: Arc::new(inner),
        }
    }

    /// Short name used in layer dumps.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Blur { .. } => "BlurImageFilter",
            Self::Offset { .. } => "OffsetImageFilter",
            Self::Compose { .. } => "ComposeImageFilter",
        }
    }

    /// Maps the bounds of the source content to the bounds the filtered
    /// output may cover, in the same coordinate space.
    #[must_use]
    pub fn filter_bounds(&self, bounds: Rect) -> Rect {
        if is_empty(bounds) {
            return Rect::ZERO;
        }
        match self {
            Self::Blur { sigma_x, sigma_y } => bounds.inflate(
                f64::from(*sigma_x) * BLUR_SIGMA_EXTENT,
                f64::from(*sigma_y) * BLUR_SIGMA_EXTENT,
            ),
            Self::Offset { dx, dy } => bounds + kurbo::Vec2::new(f64::from(*dx), f64::from(*dy)),
            Self::Compose { outer, inner } => outer.filter_bounds(inner.filter_bounds(bounds)),
        }
    }

    /// Filters a device-space pixmap in place.
    ///
    /// `matrix` is the transform from filter space to device space; it scales
    /// the blur radius and offset distance.
    pub(crate) fn apply(&self, pixmap: &mut Pixmap, matrix: Affine) {
        let [a, b, c, d, _, _] = matrix.as_coeffs();
        let scale_x = a.hypot(b);
        let scale_y = c.hypot(d);
        match self {
            Self::Blur { sigma_x, sigma_y } => {
                let sx = f64::from(*sigma_x) * scale_x;
                let sy = f64::from(*sigma_y) * scale_y;
                gaussian_blur(pixmap, sx, sy);
            }
            Self::Offset { dx, dy } => {
                let (dx, dy) = (f64::from(*dx), f64::from(*dy));
                shift(pixmap, (a * dx + c * dy).round(), (b * dx + d * dy).round());
            }
            Self::Compose { outer, inner } => {
                inner.apply(pixmap, matrix);
                outer.apply(pixmap, matrix);
            }
        }
    }
}

/// Box sizes whose threefold convolution approximates a Gaussian.
#[expect(
    clippy::cast_possible_truncation,
    reason = "box widths are small positive integers"
)]
fn box_radii(sigma: f64) -> [usize; 3] {
    if sigma.is_nan() || sigma <= 0.0 {
        return [0; 3];
    }
    let n = 3.0;
    let ideal = (12.0 * sigma * sigma / n + 1.0).sqrt();
    let mut lower = ideal.floor();
    if lower % 2.0 == 0.0 {
        lower -= 1.0;
    }
    let upper = lower + 2.0;
    let m = ((12.0 * sigma * sigma - n * lower * lower - 4.0 * n * lower - 3.0 * n)
        / (-4.0 * lower - 4.0))
        .round();
    let mut radii = [0; 3];
    for (i, r) in radii.iter_mut().enumerate() {
        let width = if (i as f64) < m { lower } else { upper };
        *r = ((width - 1.0) / 2.0).max(0.0) as usize;
    }
    radii
}

fn gaussian_blur(pixmap: &mut Pixmap, sigma_x: f64, sigma_y: f64) {
    let w = pixmap.width() as usize;
    let h = pixmap.height() as usize;
    let mut scratch = vec![0_u8; pixmap.data().len()];
    for r in box_radii(sigma_x) {
        if r == 0 {
            continue;
        }
        let data = pixmap.data_mut();
        for y in 0..h {
            box_blur_line(data, &mut scratch, y * w * 4, 4, w, r);
        }
        data.copy_from_slice(&scratch);
    }
    for r in box_radii(sigma_y) {
        if r == 0 {
            continue;
        }
        let data = pixmap.data_mut();
        for x in 0..w {
            box_blur_line(data, &mut scratch, x * 4, w * 4, h, r);
        }
        data.copy_from_slice(&scratch);
    }
}

/// One box-blur pass over `len` premultiplied pixels starting at `start`,
/// `step` bytes apart. Pixels outside the line are transparent.
fn box_blur_line(src: &[u8], dst: &mut [u8], start: usize, step: usize, len: usize, r: usize) {
    let window = u32::try_from(2 * r + 1).unwrap_or(u32::MAX);
    let at = |i: usize| start + i * step;
    let mut sum = [0_u32; 4];
    for i in 0..r.min(len) {
        for (ch, s) in sum.iter_mut().enumerate() {
            *s += u32::from(src[at(i) + ch]);
        }
    }
    for i in 0..len {
        if i + r < len {
            for (ch, s) in sum.iter_mut().enumerate() {
                *s += u32::from(src[at(i + r) + ch]);
            }
        }
        for (ch, s) in sum.iter().enumerate() {
            dst[at(i) + ch] = u8::try_from(*s / window).unwrap_or(u8::MAX);
        }
        if i >= r {
            for (ch, s) in sum.iter_mut().enumerate() {
                *s -= u32::from(src[at(i - r) + ch]);
            }
        }
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "offsets are rounded and bounded by the pixmap size"
)]
fn shift(pixmap: &mut Pixmap, dx: f64, dy: f64) {
    let w = i64::from(pixmap.width());
    let h = i64::from(pixmap.height());
    let dx = dx.clamp(-(w as f64), w as f64) as i64;
    let dy = dy.clamp(-(h as f64), h as f64) as i64;
    if dx == 0 && dy == 0 {
        return;
    }
    let src = pixmap.data().to_vec();
    let dst = pixmap.data_mut();
    dst.fill(0);
    for y in 0..h {
        let sy = y - dy;
        if !(0..h).contains(&sy) {
            continue;
        }
        for x in 0..w {
            let sx = x - dx;
            if !(0..w).contains(&sx) {
                continue;
            }
            let d = ((y * w + x) * 4) as usize;
            let s = ((sy * w + sx) * 4) as usize;
            dst[d..d + 4].copy_from_slice(&src[s..s + 4]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blur_bounds_outset_by_three_sigma() {
        let f = ImageFilter::blur(2.0, 1.0);
        assert_eq!(
            f.filter_bounds(Rect::new(10.0, 10.0, 20.0, 20.0)),
            Rect::new(4.0, 7.0, 26.0, 23.0)
        );
    }

    #[test]
    fn composed_bounds_apply_inner_first() {
        let f = ImageFilter::compose(ImageFilter::offset(5.0, 0.0), ImageFilter::blur(1.0, 1.0));
        assert_eq!(
            f.filter_bounds(Rect::new(0.0, 0.0, 10.0, 10.0)),
            Rect::new(2.0, -3.0, 18.0, 13.0)
        );
        assert!(is_empty(f.filter_bounds(Rect::ZERO)));
    }

    #[test]
    fn blur_spreads_a_single_pixel() {
        let mut pm = Pixmap::new(9, 9).unwrap();
        let center = (4 * 9 + 4) * 4;
        pm.data_mut()[center..center + 4].copy_from_slice(&[255, 255, 255, 255]);
        ImageFilter::blur(1.0, 1.0).apply(&mut pm, Affine::IDENTITY);
        let data = pm.data();
        assert!(data[center + 3] < 255, "center alpha should drop");
        let neighbour = (4 * 9 + 5) * 4;
        assert!(data[neighbour + 3] > 0, "neighbour should receive coverage");
        for px in data.chunks(4) {
            assert!(px[0] <= px[3], "premultiplied invariant");
        }
    }

    #[test]
    fn offset_moves_pixels() {
        let mut pm = Pixmap::new(4, 4).unwrap();
        pm.data_mut()[0..4].copy_from_slice(&[10, 20, 30, 255]);
        ImageFilter::offset(2.0, 1.0).apply(&mut pm, Affine::IDENTITY);
        let moved = (4 + 2) * 4;
        assert_eq!(&pm.data()[moved..moved + 4], &[10, 20, 30, 255]);
        assert_eq!(&pm.data()[0..4], &[0, 0, 0, 0]);
    }
}
