// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Geometry helpers shared by preroll, paint and the raster backend.
//!
//! Layer geometry is expressed with [`kurbo`] types. An *empty* rectangle is
//! one with no positive area; [`join`] and [`intersect`] treat empty inputs the
//! way Skia's `SkRect::join` and `SkRect::intersect` do, which is what the
//! preroll bounds algebra relies on.

use core::fmt;

use kurbo::{Affine, BezPath, PathEl, Point, Rect, RoundedRect, Shape};

/// Rectangle approximating "infinity".
///
/// Used when a transform is not invertible (the cull rectangle can no longer be
/// mapped into local space) or when "no clip" has to be expressed as a
/// rectangle.
pub const GIANT_RECT: Rect = Rect::new(-1e9, -1e9, 1e9, 1e9);

/// Tolerance used when flattening rounded rectangles into paths.
const PATH_TOLERANCE: f64 = 0.1;

/// An integer size in device pixels.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ISize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl ISize {
    /// Creates a new size.
    #[inline]
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns `true` if either dimension is zero.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Returns the size as a rectangle anchored at the origin.
    #[inline]
    #[must_use]
    pub fn to_rect(self) -> Rect {
        Rect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height))
    }
}

impl fmt::Debug for ISize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ISize({}x{})", self.width, self.height)
    }
}

/// An axis-aligned rectangle with integer edges, in device pixels.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IRect {
    /// Left edge.
    pub x0: i32,
    /// Top edge.
    pub y0: i32,
    /// Right edge (exclusive).
    pub x1: i32,
    /// Bottom edge (exclusive).
    pub y1: i32,
}

impl IRect {
    /// Creates a rectangle from its edges.
    #[inline]
    #[must_use]
    pub const fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Width, or zero when the rectangle is inverted.
    #[inline]
    #[must_use]
    pub fn width(self) -> u32 {
        u32::try_from(self.x1.saturating_sub(self.x0)).unwrap_or(0)
    }

    /// Height, or zero when the rectangle is inverted.
    #[inline]
    #[must_use]
    pub fn height(self) -> u32 {
        u32::try_from(self.y1.saturating_sub(self.y0)).unwrap_or(0)
    }

    /// Returns `true` if the rectangle covers no pixel.
    #[inline]
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Returns the dimensions of this rectangle.
    #[inline]
    #[must_use]
    pub fn size(self) -> ISize {
        ISize::new(self.width(), self.height())
    }

    /// Converts back to a floating point rectangle.
    #[inline]
    #[must_use]
    pub fn to_rect(self) -> Rect {
        Rect::new(
            f64::from(self.x0),
            f64::from(self.y0),
            f64::from(self.x1),
            f64::from(self.y1),
        )
    }
}

impl fmt::Debug for IRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IRect({}, {}, {}, {})",
            self.x0, self.y0, self.x1, self.y1
        )
    }
}

/// Returns `true` if `rect` has no positive area (or is not finite).
#[inline]
#[must_use]
pub fn is_empty(rect: Rect) -> bool {
    !(rect.x1 > rect.x0 && rect.y1 > rect.y0)
}

/// Union of two rectangles, ignoring empty operands.
#[must_use]
pub fn join(a: Rect, b: Rect) -> Rect {
    match (is_empty(a), is_empty(b)) {
        (true, true) => Rect::ZERO,
        (true, false) => b,
        (false, true) => a,
        (false, false) => a.union(b),
    }
}

/// Intersection of two rectangles; empty when they do not overlap.
#[must_use]
pub fn intersect(a: Rect, b: Rect) -> Rect {
    if is_empty(a) || is_empty(b) {
        return Rect::ZERO;
    }
    let r = a.intersect(b);
    if is_empty(r) { Rect::ZERO } else { r }
}

/// Returns `true` if the two rectangles share a region of positive area.
#[inline]
#[must_use]
pub fn overlaps(a: Rect, b: Rect) -> bool {
    !is_empty(intersect(a, b))
}

/// Smallest integer rectangle containing `rect`.
#[must_use]
#[expect(
    clippy::cast_possible_truncation,
    reason = "coordinates are clamped to the giant rectangle before conversion"
)]
pub fn round_out(rect: Rect) -> IRect {
    if is_empty(rect) {
        return IRect::default();
    }
    let clamp = |v: f64| v.clamp(GIANT_RECT.x0, GIANT_RECT.x1);
    IRect::new(
        clamp(rect.x0.floor()) as i32,
        clamp(rect.y0.floor()) as i32,
        clamp(rect.x1.ceil()) as i32,
        clamp(rect.y1.ceil()) as i32,
    )
}

/// Maps `rect` through `matrix` and returns the axis-aligned bounding box.
#[must_use]
pub fn map_rect(matrix: Affine, rect: Rect) -> Rect {
    if is_empty(rect) {
        return Rect::ZERO;
    }
    matrix.transform_rect_bbox(rect)
}

/// Inverse of `matrix`, or `None` if it is singular.
#[must_use]
pub fn invert(matrix: Affine) -> Option<Affine> {
    let det = matrix.determinant();
    if !det.is_finite() || det.abs() <= f64::EPSILON {
        return None;
    }
    Some(matrix.inverse())
}

/// Returns `matrix` with its translation components zeroed.
#[must_use]
pub fn without_translation(matrix: Affine) -> Affine {
    let [a, b, c, d, _, _] = matrix.as_coeffs();
    Affine::new([a, b, c, d, 0.0, 0.0])
}

/// Rectangle with the given origin and integer size.
#[must_use]
pub fn rect_from_origin_size(origin: Point, size: ISize) -> Rect {
    Rect::new(
        origin.x,
        origin.y,
        origin.x + f64::from(size.width),
        origin.y + f64::from(size.height),
    )
}

/// Flattens a rounded rectangle into a path.
#[must_use]
pub fn rrect_to_path(rrect: &RoundedRect) -> BezPath {
    rrect.to_path(PATH_TOLERANCE)
}

// -- tiny-skia conversions --

#[expect(
    clippy::cast_possible_truncation,
    reason = "raster backend works in f32 device space"
)]
pub(crate) fn to_skia_transform(matrix: Affine) -> tiny_skia::Transform {
    let [a, b, c, d, e, f] = matrix.as_coeffs();
    tiny_skia::Transform::from_row(a as f32, b as f32, c as f32, d as f32, e as f32, f as f32)
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "raster backend works in f32 device space"
)]
pub(crate) fn to_skia_rect(rect: Rect) -> Option<tiny_skia::Rect> {
    tiny_skia::Rect::from_ltrb(rect.x0 as f32, rect.y0 as f32, rect.x1 as f32, rect.y1 as f32)
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "raster backend works in f32 device space"
)]
pub(crate) fn to_skia_path(path: &BezPath) -> Option<tiny_skia::Path> {
    let mut pb = tiny_skia::PathBuilder::new();
    for el in path.elements() {
        match *el {
            PathEl::MoveTo(p) => pb.move_to(p.x as f32, p.y as f32),
            PathEl::LineTo(p) => pb.line_to(p.x as f32, p.y as f32),
            PathEl::QuadTo(p1, p2) => {
                pb.quad_to(p1.x as f32, p1.y as f32, p2.x as f32, p2.y as f32);
            }
            PathEl::CurveTo(p1, p2, p3) => pb.cubic_to(
                p1.x as f32,
                p1.y as f32,
                p2.x as f32,
                p2.y as f32,
                p3.x as f32,
                p3.y as f32,
            ),
            PathEl::ClosePath => pb.close(),
        }
    }
    pb.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_ignores_empty_operands() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(join(a, Rect::ZERO), a);
        assert_eq!(join(Rect::ZERO, a), a);
        assert_eq!(
            join(a, Rect::new(5.0, 5.0, 20.0, 30.0)),
            Rect::new(0.0, 0.0, 20.0, 30.0)
        );
        assert!(is_empty(join(Rect::ZERO, Rect::ZERO)));
    }

    #[test]
    fn disjoint_intersection_is_empty() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(20.0, 20.0, 30.0, 30.0);
        assert!(is_empty(intersect(a, b)));
        assert!(!overlaps(a, b));
    }

    #[test]
    fn round_out_covers_fractional_edges() {
        let r = round_out(Rect::new(0.5, 1.2, 10.1, 10.0));
        assert_eq!(r, IRect::new(0, 1, 11, 10));
        assert_eq!(r.size(), ISize::new(11, 9));
    }

    #[test]
    fn singular_matrix_has_no_inverse() {
        assert!(invert(Affine::scale(0.0)).is_none());
        let m = Affine::translate((10.0, 5.0)) * Affine::scale(2.0);
        let inv = invert(m).unwrap();
        let p = (m * inv) * Point::new(3.0, 4.0);
        assert!((p.x - 3.0).abs() < 1e-9 && (p.y - 4.0).abs() < 1e-9);
    }

    #[test]
    fn translation_is_stripped() {
        let m = Affine::translate((7.0, 9.0)) * Affine::scale(3.0);
        assert_eq!(without_translation(m), Affine::scale(3.0));
    }
}
