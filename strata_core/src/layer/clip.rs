// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Clip shape types for clipping containers.

use kurbo::{BezPath, Rect, RoundedRect, Shape};

use crate::canvas::Canvas;
use crate::paint::ClipOp;

/// A shape used to clip a container's descendants.
#[derive(Clone, Debug, PartialEq)]
pub enum ClipShape {
    /// An axis-aligned rectangle.
    Rect(Rect),
    /// A rectangle with rounded corners.
    RoundedRect(RoundedRect),
    /// An arbitrary path, filled with the non-zero rule.
    Path(BezPath),
}

impl ClipShape {
    /// Bounding box of the shape in local coordinates.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        match self {
            Self::Rect(r) => *r,
            Self::RoundedRect(r) => r.rect(),
            Self::Path(p) => p.bounding_box(),
        }
    }

    pub(crate) fn apply(&self, canvas: &mut dyn Canvas, op: ClipOp, anti_alias: bool) {
        match self {
            Self::Rect(r) => canvas.clip_rect(*r, op, anti_alias),
            Self::RoundedRect(r) => canvas.clip_rrect(*r, op, anti_alias),
            Self::Path(p) => canvas.clip_path(p, op, anti_alias),
        }
    }
}
