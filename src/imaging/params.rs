//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between callers and the operations in [`operations`](super::operations),
//! [`effects`](crate::effects) and [`codec`](crate::codec).
//!
//! ## Types
//!
//! - [`ContentMode`] / [`FitSpec`]: target box plus content-fit policy.
//! - [`Quality`]: Lossy encoding quality (0.0–1.0, default 0.9). Clamped on construction.
//! - [`Tint`] / [`EffectSpec`]: blur radius, saturation, tint and mask.
//! - [`EncodingOptions`] / [`EncodingSpec`]: target format, quality, animation timing.

use super::calculations::Size;
use crate::bitmap::Bitmap;
use std::time::Duration;

/// How a source rectangle is placed within a target rectangle.
///
/// Only the `Scale*` modes scale; the rest are positional and never change
/// the pixel size of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentMode {
    ScaleToFill,
    ScaleAspectFit,
    ScaleAspectFill,
    Redraw,
    Center,
    Top,
    Bottom,
    Left,
    Right,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl ContentMode {
    pub fn is_scaling(self) -> bool {
        matches!(
            self,
            ContentMode::ScaleToFill | ContentMode::ScaleAspectFit | ContentMode::ScaleAspectFill
        )
    }
}

/// A target size in pixels plus the content mode used to reach it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitSpec {
    pub target: Size,
    pub mode: ContentMode,
}

impl FitSpec {
    pub fn new(target: Size, mode: ContentMode) -> Self {
        Self { target, mode }
    }

    pub fn aspect_fit(width: f64, height: f64) -> Self {
        Self::new(Size::new(width, height), ContentMode::ScaleAspectFit)
    }

    pub fn aspect_fill(width: f64, height: f64) -> Self {
        Self::new(Size::new(width, height), ContentMode::ScaleAspectFill)
    }
}

/// Quality setting for lossy image encoding (0.0-1.0).
///
/// `1.0` requests the best the format can do (lossless where the format allows).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quality(f32);

impl Quality {
    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            return Self::default();
        }
        Self(value.clamp(0.0, 1.0))
    }

    pub fn value(self) -> f32 {
        self.0
    }

    /// Quality on the 1-100 scale most lossy encoders take.
    pub fn percent(self) -> u8 {
        (self.0 * 100.0).round().clamp(1.0, 100.0) as u8
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(0.9)
    }
}

/// A constant color layer composited over an image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tint {
    /// RGB components in `0.0..=1.0`.
    pub color: [f32; 3],
    /// Coverage of the tint layer in `0.0..=1.0`.
    pub alpha: f32,
}

impl Tint {
    pub fn new(color: [f32; 3], alpha: f32) -> Self {
        Self { color, alpha }
    }

    /// Tint from 8-bit RGBA components.
    pub fn from_rgba8(rgba: [u8; 4]) -> Self {
        Self {
            color: [
                rgba[0] as f32 / 255.0,
                rgba[1] as f32 / 255.0,
                rgba[2] as f32 / 255.0,
            ],
            alpha: rgba[3] as f32 / 255.0,
        }
    }
}

/// Effects to apply, in the fixed order blur → saturation → tint → mask.
///
/// The default is a full no-op.
#[derive(Clone)]
pub struct EffectSpec {
    /// Blur radius in pixels, `0.0` for no blur.
    pub blur_radius: f32,
    /// Multiplier on saturation, `1.0` for no change.
    pub saturation_delta_factor: f32,
    pub tint: Option<Tint>,
    /// Resampled to the source size when its dimensions differ.
    pub mask: Option<Bitmap>,
}

impl EffectSpec {
    pub fn blur(radius: f32) -> Self {
        Self {
            blur_radius: radius,
            ..Self::default()
        }
    }

    pub(crate) fn has_blur(&self) -> bool {
        self.blur_radius > f32::EPSILON
    }

    pub(crate) fn has_saturation(&self) -> bool {
        (self.saturation_delta_factor - 1.0).abs() > f32::EPSILON
    }

    pub(crate) fn has_tint(&self) -> bool {
        self.tint.is_some_and(|t| t.alpha > 0.0)
    }

    pub fn is_noop(&self) -> bool {
        !self.has_blur() && !self.has_saturation() && !self.has_tint() && self.mask.is_none()
    }
}

impl Default for EffectSpec {
    fn default() -> Self {
        Self {
            blur_radius: 0.0,
            saturation_delta_factor: 1.0,
            tint: None,
            mask: None,
        }
    }
}

impl std::fmt::Debug for EffectSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectSpec")
            .field("blur_radius", &self.blur_radius)
            .field("saturation_delta_factor", &self.saturation_delta_factor)
            .field("tint", &self.tint)
            .field("mask", &self.mask.as_ref().map(|m| m.pixel_size()))
            .finish()
    }
}

/// Pixel conversions applied before encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncodingOptions {
    /// Encode luminance only.
    pub grayscale: bool,
    /// Drop the alpha channel even when the format could carry it.
    pub no_alpha: bool,
}

/// Everything needed to turn a bitmap into encoded bytes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EncodingSpec {
    /// Format tag such as `public.png`; `None` picks the recommended format.
    pub format: Option<String>,
    pub options: EncodingOptions,
    pub quality: Quality,
    /// Overrides the bitmap's own loop count. `0` loops forever.
    pub loop_count: Option<u32>,
    /// Overrides the bitmap's own frame durations. Ignored unless its length
    /// equals the frame count.
    pub frame_durations: Option<Vec<Duration>>,
}

impl EncodingSpec {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: Some(format.into()),
            ..Self::default()
        }
    }

    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = Quality::new(quality);
        self
    }

    pub fn with_options(mut self, options: EncodingOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_loop_count(mut self, loop_count: u32) -> Self {
        self.loop_count = Some(loop_count);
        self
    }

    pub fn with_frame_durations(mut self, durations: Vec<Duration>) -> Self {
        self.frame_durations = Some(durations);
        self
    }
}
