// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Paint state applied to draw calls and layer composition.

use crate::filter::ImageFilter;

/// An unpremultiplied 8-bit RGBA color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Color {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel.
    pub a: u8,
}

impl Color {
    /// Fully transparent black.
    pub const TRANSPARENT: Self = Self::from_rgba8(0, 0, 0, 0);
    /// Opaque black.
    pub const BLACK: Self = Self::from_rgba8(0, 0, 0, 255);
    /// Opaque white.
    pub const WHITE: Self = Self::from_rgba8(255, 255, 255, 255);
    /// Opaque red.
    pub const RED: Self = Self::from_rgba8(255, 0, 0, 255);
    /// Opaque green.
    pub const GREEN: Self = Self::from_rgba8(0, 255, 0, 255);
    /// Opaque blue.
    pub const BLUE: Self = Self::from_rgba8(0, 0, 255, 255);

    /// Creates a color from its channels.
    #[inline]
    #[must_use]
    pub const fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Returns the same color with a different alpha.
    #[inline]
    #[must_use]
    pub const fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    pub(crate) fn to_skia(self) -> tiny_skia::Color {
        tiny_skia::Color::from_rgba8(self.r, self.g, self.b, self.a)
    }
}

/// How a source is combined with the destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[expect(missing_docs, reason = "Porter-Duff and separable blend modes are self-describing")]
pub enum BlendMode {
    Clear,
    Source,
    Destination,
    #[default]
    SourceOver,
    DestinationOver,
    SourceIn,
    DestinationIn,
    SourceOut,
    DestinationOut,
    SourceAtop,
    DestinationAtop,
    Xor,
    Plus,
    Modulate,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Multiply,
}

impl BlendMode {
    pub(crate) fn to_skia(self) -> tiny_skia::BlendMode {
        use tiny_skia::BlendMode as B;
        match self {
            Self::Clear => B::Clear,
            Self::Source => B::Source,
            Self::Destination => B::Destination,
            Self::SourceOver => B::SourceOver,
            Self::DestinationOver => B::DestinationOver,
            Self::SourceIn => B::SourceIn,
            Self::DestinationIn => B::DestinationIn,
            Self::SourceOut => B::SourceOut,
            Self::DestinationOut => B::DestinationOut,
            Self::SourceAtop => B::SourceAtop,
            Self::DestinationAtop => B::DestinationAtop,
            Self::Xor => B::Xor,
            Self::Plus => B::Plus,
            Self::Modulate => B::Modulate,
            Self::Screen => B::Screen,
            Self::Overlay => B::Overlay,
            Self::Darken => B::Darken,
            Self::Lighten => B::Lighten,
            Self::ColorDodge => B::ColorDodge,
            Self::ColorBurn => B::ColorBurn,
            Self::HardLight => B::HardLight,
            Self::SoftLight => B::SoftLight,
            Self::Difference => B::Difference,
            Self::Exclusion => B::Exclusion,
            Self::Multiply => B::Multiply,
        }
    }
}

/// Whether shapes are filled or stroked.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum PaintStyle {
    /// Fill the interior.
    #[default]
    Fill,
    /// Stroke the outline with the given width.
    Stroke(f32),
}

/// Image sampling used when drawing images and textures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum SamplingOptions {
    /// Nearest neighbour.
    Nearest,
    /// Bilinear filtering.
    #[default]
    Linear,
}

impl SamplingOptions {
    pub(crate) fn to_skia(self) -> tiny_skia::FilterQuality {
        match self {
            Self::Nearest => tiny_skia::FilterQuality::Nearest,
            Self::Linear => tiny_skia::FilterQuality::Bilinear,
        }
    }
}

/// How a clip shape combines with the current clip.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ClipOp {
    /// Keep only the inside of the shape.
    #[default]
    Intersect,
    /// Remove the inside of the shape.
    Difference,
}

/// Paint state for a draw call or a save-layer.
///
/// When used to composite a layer, only the alpha of [`color`](Self::color),
/// the blend mode and the image filter apply.
#[derive(Clone, Debug, PartialEq)]
pub struct Paint {
    /// Source color (alpha doubles as the layer opacity).
    pub color: Color,
    /// Blend mode.
    pub blend_mode: BlendMode,
    /// Filter applied to the drawn content before blending.
    pub image_filter: Option<ImageFilter>,
    /// Anti-aliasing for shape edges.
    pub anti_alias: bool,
    /// Fill or stroke.
    pub style: PaintStyle,
}

impl Default for Paint {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            blend_mode: BlendMode::SourceOver,
            image_filter: None,
            anti_alias: true,
            style: PaintStyle::Fill,
        }
    }
}

impl Paint {
    /// Fill paint with the given color.
    #[must_use]
    pub fn fill(color: Color) -> Self {
        Self {
            color,
            ..Self::default()
        }
    }

    /// Returns the alpha as a value in `0.0..=1.0`.
    #[must_use]
    pub fn alpha_f(&self) -> f32 {
        f32::from(self.color.a) / 255.0
    }

    /// Sets the alpha from a value in `0.0..=1.0`.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "alpha is clamped to 0..=255 before conversion"
    )]
    pub fn set_alpha_f(&mut self, alpha: f32) {
        self.color.a = (alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
    }

    pub(crate) fn to_skia(&self) -> tiny_skia::Paint<'static> {
        let mut paint = tiny_skia::Paint::default();
        paint.set_color(self.color.to_skia());
        paint.blend_mode = self.blend_mode.to_skia();
        paint.anti_alias = self.anti_alias;
        paint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_round_trips_through_float() {
        let mut p = Paint::default();
        p.set_alpha_f(0.5);
        assert_eq!(p.color.a, 128);
        p.set_alpha_f(7.0);
        assert_eq!(p.color.a, 255);
        assert!((Paint::fill(Color::RED.with_alpha(51)).alpha_f() - 0.2).abs() < 1e-6);
    }
}
