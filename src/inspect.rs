//! Read-only queries over a [`Bitmap`].
//!
//! Nothing here mutates or re-encodes. The only side effect is that a lazily
//! decoded bitmap may materialize when a question can only be answered from
//! its pixels (a pixel-level alpha scan).

use crate::bitmap::{BackingKind, Bitmap, ColorSpace, Orientation, PixelFormat};
use crate::codec::{FormatRegistry, NativeFormats};
use crate::config::DisplayConfig;
use crate::imaging::{Dimensions, Size};
use image::DynamicImage;
use serde::Serialize;

/// Pixel size as displayed: quarter-turn orientations swap the axes.
pub fn dimensions(bitmap: &Bitmap) -> Dimensions {
    let size = bitmap.pixel_size();
    if bitmap.orientation().swaps_axes() {
        Dimensions::new(size.height, size.width)
    } else {
        size
    }
}

/// Displayed size in points for a display of `reference_scale` pixels per point.
///
/// The reference scale is host supplied. Non-positive or non-finite values
/// are treated as `1.0`.
pub fn point_size(bitmap: &Bitmap, reference_scale: f64) -> Size {
    let scale = if reference_scale.is_finite() && reference_scale > 0.0 {
        reference_scale
    } else {
        1.0
    };
    let dims = dimensions(bitmap);
    Size::new(dims.width as f64 / scale, dims.height as f64 / scale)
}

/// [`point_size`] for the configured reference display.
pub fn point_size_for(bitmap: &Bitmap, display: &DisplayConfig) -> Size {
    point_size(bitmap, display.reference_scale)
}

/// Whether the bitmap may carry transparency.
///
/// Without `inspect_pixels` this is the layout flag alone. With it, the first
/// frame is scanned and a layout with an alpha channel but fully opaque
/// pixels reports `false`. Later animation frames are never scanned.
///
/// Render-source backed bitmaps always report `true`.
pub fn has_alpha(bitmap: &Bitmap, inspect_pixels: bool) -> bool {
    if bitmap.backing_kind() == BackingKind::Rendered {
        return true;
    }
    if !bitmap.pixel_format().has_alpha {
        return false;
    }
    if !inspect_pixels {
        return true;
    }
    match bitmap.raster() {
        Some(raster) => any_translucent(&raster),
        None => true,
    }
}

fn any_translucent(image: &DynamicImage) -> bool {
    match image {
        DynamicImage::ImageRgba8(buf) => buf.pixels().any(|p| p[3] != u8::MAX),
        DynamicImage::ImageLumaA8(buf) => buf.pixels().any(|p| p[1] != u8::MAX),
        DynamicImage::ImageRgba16(buf) => buf.pixels().any(|p| p[3] != u16::MAX),
        DynamicImage::ImageLumaA16(buf) => buf.pixels().any(|p| p[1] != u16::MAX),
        DynamicImage::ImageRgba32F(buf) => buf.pixels().any(|p| p[3] < 1.0),
        other if other.color().has_alpha() => other.to_rgba8().pixels().any(|p| p[3] != u8::MAX),
        _ => false,
    }
}

/// Whether the bitmap's colorspace is wider than sRGB.
pub fn uses_wide_gamut(bitmap: &Bitmap) -> bool {
    bitmap.color_space().is_wide_gamut()
}

/// Number of frames, as far as `format_hint` allows introspection.
///
/// - a hint the built-in registry does not know: `0`
/// - a hint for a format that cannot carry animation: `1`
/// - a zero-area bitmap: `0`
/// - otherwise the animation frame count, or `1` for a still
pub fn frame_count(bitmap: &Bitmap, format_hint: Option<&str>) -> usize {
    frame_count_in(&NativeFormats, bitmap, format_hint)
}

/// [`frame_count`] against a caller-supplied registry.
pub fn frame_count_in(
    registry: &impl FormatRegistry,
    bitmap: &Bitmap,
    format_hint: Option<&str>,
) -> usize {
    if let Some(hint) = format_hint {
        let Some(caps) = registry.lookup(hint).and_then(|f| registry.capabilities(f)) else {
            return 0;
        };
        if !caps.decode_animation {
            return 1;
        }
    }
    if bitmap.pixel_size().is_empty() {
        return 0;
    }
    stored_frames(bitmap)
}

fn stored_frames(bitmap: &Bitmap) -> usize {
    bitmap.animation().map_or(1, |a| a.frame_count())
}

/// Best-effort memory footprint: `width * height * bytes_per_pixel * frames`.
///
/// An estimate of the decoded buffers, not a guarantee. Saturates instead of
/// overflowing.
pub fn estimated_memory_bytes(bitmap: &Bitmap) -> u64 {
    bitmap
        .pixel_size()
        .area()
        .saturating_mul(bitmap.pixel_format().bytes_per_pixel())
        .saturating_mul(stored_frames(bitmap) as u64)
}

/// Everything the inspector knows about a bitmap, in one serializable record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BitmapInfo {
    pub dimensions: Dimensions,
    pub pixel_size: Dimensions,
    pub point_size: Size,
    pub scale: f64,
    pub orientation: Orientation,
    pub color_space: ColorSpace,
    pub pixel_format: PixelFormat,
    pub backing: BackingKind,
    /// Layout flag only; no pixel scan.
    pub has_alpha: bool,
    pub wide_gamut: bool,
    pub frame_count: usize,
    pub loop_count: Option<u32>,
    pub estimated_memory_bytes: u64,
}

/// Summarize `bitmap` without touching its pixels.
pub fn describe(bitmap: &Bitmap, reference_scale: f64) -> BitmapInfo {
    BitmapInfo {
        dimensions: dimensions(bitmap),
        pixel_size: bitmap.pixel_size(),
        point_size: point_size(bitmap, reference_scale),
        scale: bitmap.scale(),
        orientation: bitmap.orientation(),
        color_space: bitmap.color_space(),
        pixel_format: bitmap.pixel_format(),
        backing: bitmap.backing_kind(),
        has_alpha: has_alpha(bitmap, false),
        wide_gamut: uses_wide_gamut(bitmap),
        frame_count: frame_count(bitmap, None),
        loop_count: bitmap.animation().map(|a| a.loop_count()),
        estimated_memory_bytes: estimated_memory_bytes(bitmap),
    }
}

/// [`describe`] for the configured reference display.
pub fn describe_for(bitmap: &Bitmap, display: &DisplayConfig) -> BitmapInfo {
    describe(bitmap, display.reference_scale)
}
