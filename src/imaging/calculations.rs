//! Pure calculation functions for content-fit geometry.
//!
//! All functions here are pure and testable without any I/O or images.
//! Fractional results are pixel aligned by rounding **up**, so a scaled
//! image never under-covers its target box.

use super::params::{ContentMode, FitSpec};
use serde::Serialize;

/// Relative floating noise tolerated before a value is ceiled to the next pixel.
///
/// `1000.0 * (300.0 / 1000.0)` is `300.00000000000006`, which must stay 300,
/// while a real overshoot such as `300.0000001` still becomes 301.
const PIXEL_RELATIVE_EPSILON: f64 = 1e-12;

/// Integer pixel dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn to_size(self) -> Size {
        Size::new(self.width as f64, self.height as f64)
    }
}

/// Possibly fractional size, in pixels or points depending on context.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    fn is_positive(self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// Round a fractional pixel count up to a whole pixel.
///
/// ```
/// # use pictor::imaging::pixel_ceil;
/// assert_eq!(pixel_ceil(625.75), 626);
/// assert_eq!(pixel_ceil(724.001), 725);
/// assert_eq!(pixel_ceil(300.00000000000006), 300);
/// assert_eq!(pixel_ceil(300.0000001), 301);
/// ```
pub fn pixel_ceil(value: f64) -> u32 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    (value - value * PIXEL_RELATIVE_EPSILON)
        .ceil()
        .clamp(0.0, u32::MAX as f64) as u32
}

fn ceil_size(size: Size) -> Dimensions {
    Dimensions::new(pixel_ceil(size.width), pixel_ceil(size.height))
}

/// Compute the pixel dimensions a source of `source` size takes after fitting.
///
/// - `ScaleAspectFit`: uniform scale `min(tw/sw, th/sh)`
/// - `ScaleAspectFill`: uniform scale `max(tw/sw, th/sh)`
/// - `ScaleToFill`: independent per-axis scale (the result is the target)
/// - positional modes: the source, unscaled
///
/// Degenerate sources or targets (zero, negative, non-finite) never scale.
///
/// # Examples
/// ```
/// # use pictor::imaging::{compute_target_dimensions, ContentMode, Dimensions, FitSpec, Size};
/// let fit = FitSpec::new(Size::new(300.0, 300.0), ContentMode::ScaleAspectFit);
/// assert_eq!(
///     compute_target_dimensions(Size::new(1000.0, 500.0), &fit),
///     Dimensions::new(300, 150)
/// );
/// ```
pub fn compute_target_dimensions(source: Size, fit: &FitSpec) -> Dimensions {
    let target = fit.target;
    if !fit.mode.is_scaling() || !source.is_positive() || !target.is_positive() {
        return ceil_size(source);
    }

    let scale_x = target.width / source.width;
    let scale_y = target.height / source.height;

    match fit.mode {
        ContentMode::ScaleToFill => ceil_size(target),
        ContentMode::ScaleAspectFit => scale_uniform(source, target, scale_x <= scale_y),
        ContentMode::ScaleAspectFill => scale_uniform(source, target, scale_x >= scale_y),
        _ => ceil_size(source),
    }
}

/// Scale uniformly, pinning the chosen axis to the target exactly.
///
/// Pinning keeps the dominant axis free of floating error; only the
/// dependent axis is computed by ratio.
fn scale_uniform(source: Size, target: Size, pin_width: bool) -> Dimensions {
    if pin_width {
        let height = source.height * target.width / source.width;
        ceil_size(Size::new(target.width, height))
    } else {
        let width = source.width * target.height / source.height;
        ceil_size(Size::new(width, target.height))
    }
}

/// Whether a source of `source` size already satisfies `fit`.
///
/// Scaling modes recompute the fitted size with the ceiling rule and require
/// it to equal the source exactly. Positional modes never scale, so they only
/// match when the source already equals the target.
pub fn matches_target(source: Size, fit: &FitSpec) -> bool {
    if !fit.mode.is_scaling() {
        return source == fit.target;
    }
    let expected = compute_target_dimensions(source, fit);
    expected.width as f64 == source.width && expected.height as f64 == source.height
}
