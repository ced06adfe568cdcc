// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Damage reported to a render target on submission.

use kurbo::Rect;

use crate::geometry::{IRect, round_out};

/// The region of a frame that was repainted.
///
/// Render targets use this to limit uploads and presentation work. The
/// aggregator reports the rounded-out cull rectangle of each frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum DamageRegion {
    /// The entire target needs presenting.
    #[default]
    Full,
    /// Device-space rectangles that changed.
    Rects(Vec<IRect>),
    /// Nothing changed; the previous contents can be reused.
    None,
}

impl DamageRegion {
    /// Damage covering the pixels touched by `rect`.
    #[must_use]
    pub fn from_rect(rect: Rect) -> Self {
        let r = round_out(rect);
        if r.is_empty() {
            Self::None
        } else {
            Self::Rects(vec![r])
        }
    }

    /// Returns `true` if no region needs presenting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Bounding box of the damage clipped to a target of `width` x `height`.
    ///
    /// Returns `None` when nothing inside the target is damaged.
    #[must_use]
    pub fn bounds(&self, width: u32, height: u32) -> Option<IRect> {
        let w = i32::try_from(width).unwrap_or(i32::MAX);
        let h = i32::try_from(height).unwrap_or(i32::MAX);
        let full = IRect::new(0, 0, w, h);
        let r = match self {
            Self::Full => full,
            Self::None => return None,
            Self::Rects(rects) => {
                let mut it = rects.iter().filter(|r| !r.is_empty());
                let first = *it.next()?;
                it.fold(first, |acc, r| {
                    IRect::new(
                        acc.x0.min(r.x0),
                        acc.y0.min(r.y0),
                        acc.x1.max(r.x1),
                        acc.y1.max(r.y1),
                    )
                })
            }
        };
        let clipped = IRect::new(r.x0.max(0), r.y0.max(0), r.x1.min(w), r.y1.min(h));
        (!clipped.is_empty()).then_some(clipped)
    }

    /// Merges another damage region into this one.
    pub fn merge(&mut self, other: &Self) {
        match (&*self, other) {
            (Self::Full, _) | (_, Self::Full) => *self = Self::Full,
            (Self::None, _) => *self = other.clone(),
            (_, Self::None) => {}
            (Self::Rects(a), Self::Rects(b)) => {
                let mut merged = a.clone();
                merged.extend_from_slice(b);
                *self = Self::Rects(merged);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_rect_is_no_damage() {
        assert!(DamageRegion::from_rect(Rect::ZERO).is_empty());
    }

    #[test]
    fn bounds_are_clipped_to_target() {
        let d = DamageRegion::Rects(vec![
            IRect::new(-10, -10, 20, 20),
            IRect::new(50, 50, 200, 60),
        ]);
        assert_eq!(d.bounds(100, 100), Some(IRect::new(0, 0, 100, 60)));
        assert_eq!(DamageRegion::Full.bounds(8, 4), Some(IRect::new(0, 0, 8, 4)));
        assert_eq!(DamageRegion::None.bounds(8, 4), None);
    }

    #[test]
    fn merge_with_full_is_full() {
        let mut d = DamageRegion::from_rect(Rect::new(0.0, 0.0, 1.0, 1.0));
        d.merge(&DamageRegion::Full);
        assert_eq!(d, DamageRegion::Full);
    }

    #[test]
    fn merge_concatenates_rects() {
        let mut d = DamageRegion::None;
        d.merge(&DamageRegion::from_rect(Rect::new(0.0, 0.0, 1.0, 1.0)));
        d.merge(&DamageRegion::from_rect(Rect::new(4.2, 4.0, 5.0, 5.0)));
        assert_eq!(
            d,
            DamageRegion::Rects(vec![IRect::new(0, 0, 1, 1), IRect::new(4, 4, 5, 5)])
        );
    }
}
