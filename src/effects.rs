//! The effects pipeline: blur, saturation, tint, mask.
//!
//! Stages always run in that order and each is skipped when its parameter is
//! neutral. Pixels are processed as straight RGBA `f32`; the blur runs on
//! premultiplied color so transparent neighbours do not darken edges.
//!
//! ## Blur
//!
//! Three successive box blurs approximate a Gaussian. For a radius `r` the
//! box size is
//!
//! ```text
//! d = floor(r * 3 * sqrt(2π) / 4 + 0.5), forced odd
//! ```
//!
//! Box blurs are separable and commute, so all three horizontal passes run
//! first, then the image is transposed and the same row passes run again.
//! Samples outside the image repeat the nearest edge pixel.
//!
//! ## Saturation
//!
//! Rec. 709 luminance-preserving matrix for a factor `s`:
//!
//! ```text
//! | .2126+.7874s   .7152-.7152s   .0722-.0722s |
//! | .2126-.2126s   .7152+.2848s   .0722-.0722s |
//! | .2126-.2126s   .7152-.7152s   .0722+.9278s |
//! ```

use crate::bitmap::Bitmap;
use crate::error::{PictorError, Result};
use crate::imaging::{EffectSpec, normalize_orientation};
use image::imageops::FilterType;
use image::{DynamicImage, Rgba32FImage};
use rayon::prelude::*;

const LUMA: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// Apply `spec` to every frame of `bitmap`.
///
/// A neutral spec still returns a new bitmap with identical pixels. When a
/// mask is present the bitmap is oriented upright first, so the mask lines
/// up with what is displayed.
pub fn apply_effects(bitmap: &Bitmap, spec: &EffectSpec) -> Result<Bitmap> {
    validate(spec)?;

    let source = match spec.mask {
        Some(_) => normalize_orientation(bitmap),
        None => bitmap.clone(),
    };
    let raster = source
        .raster()
        .ok_or_else(|| failed("bitmap has no raster to apply effects to"))?;

    if spec.is_noop() {
        return Ok(source.derive((*raster).clone(), source.animation().cloned()));
    }
    if raster.width() == 0 || raster.height() == 0 {
        return Err(failed("cannot apply effects to an empty bitmap"));
    }

    let mask = match &spec.mask {
        Some(mask) => Some(MaskLayer::new(mask)?),
        None => None,
    };
    let process = |frame: &DynamicImage| process_frame(frame, spec, mask.as_ref());

    let output = match source.animation() {
        Some(animation) => {
            let processed = animation
                .try_map_frames(|frame| process(frame).ok())
                .ok_or_else(|| failed("an animation frame could not be processed"))?;
            let first = (*processed.frames()[0]).clone();
            source.derive(first, Some(processed))
        }
        None => source.derive(process(&raster)?, None),
    };

    tracing::debug!(
        width = raster.width(),
        height = raster.height(),
        blur = spec.blur_radius,
        saturation = spec.saturation_delta_factor,
        tint = spec.tint.is_some(),
        mask = spec.mask.is_some(),
        "Applied effects"
    );
    Ok(output)
}

/// Gaussian-style blur with the given radius. Shorthand for a blur-only
/// [`EffectSpec`].
pub fn blurred(bitmap: &Bitmap, radius: f32) -> Result<Bitmap> {
    apply_effects(bitmap, &EffectSpec::blur(radius))
}

fn failed(message: &str) -> PictorError {
    PictorError::EffectsFailed(message.to_string())
}

fn validate(spec: &EffectSpec) -> Result<()> {
    if !spec.blur_radius.is_finite() || spec.blur_radius < 0.0 {
        return Err(failed("blur radius must be a non-negative number"));
    }
    if !spec.saturation_delta_factor.is_finite() {
        return Err(failed("saturation factor must be finite"));
    }
    let finite_tint = spec
        .tint
        .is_none_or(|t| t.alpha.is_finite() && t.color.iter().all(|c| c.is_finite()));
    if !finite_tint {
        return Err(failed("tint components must be finite"));
    }
    Ok(())
}

/// Box size of each of the three passes for a blur radius.
pub(crate) fn box_size(radius: f32) -> usize {
    let d = (radius as f64 * 3.0 * (2.0 * std::f64::consts::PI).sqrt() / 4.0 + 0.5).floor();
    (d.max(0.0) as usize) | 1
}

/// Per-pixel coverage of a mask, resampled on demand to each frame's size.
struct MaskLayer {
    image: DynamicImage,
    use_alpha: bool,
}

impl MaskLayer {
    fn new(mask: &Bitmap) -> Result<Self> {
        let image = mask
            .upright_raster()
            .ok_or_else(|| failed("mask has no raster"))?;
        if image.width() == 0 || image.height() == 0 {
            return Err(failed("mask is empty"));
        }
        Ok(Self {
            use_alpha: image.color().has_alpha(),
            image,
        })
    }

    fn coverage(&self, width: u32, height: u32) -> Vec<f32> {
        let resampled;
        let image = if (self.image.width(), self.image.height()) == (width, height) {
            &self.image
        } else {
            resampled = self.image.resize_exact(width, height, FilterType::Triangle);
            &resampled
        };
        if self.use_alpha {
            image.to_rgba32f().pixels().map(|p| p[3]).collect()
        } else {
            image.to_luma32f().pixels().map(|p| p[0]).collect()
        }
    }
}

fn process_frame(
    frame: &DynamicImage,
    spec: &EffectSpec,
    mask: Option<&MaskLayer>,
) -> Result<DynamicImage> {
    let (width, height) = (frame.width(), frame.height());
    if width == 0 || height == 0 {
        return Err(failed("cannot apply effects to an empty frame"));
    }
    let mut pixels: Vec<[f32; 4]> = frame
        .to_rgba32f()
        .pixels()
        .map(|p| [p[0], p[1], p[2], p[3]])
        .collect();

    if spec.has_blur() {
        blur(&mut pixels, width as usize, height as usize, box_size(spec.blur_radius));
    }
    if spec.has_saturation() {
        let matrix = saturation_matrix(spec.saturation_delta_factor);
        pixels.par_iter_mut().for_each(|p| saturate(p, &matrix));
    }
    if let Some(tint) = spec.tint.filter(|_| spec.has_tint()) {
        let alpha = tint.alpha.clamp(0.0, 1.0);
        let color = tint.color.map(|c| c.clamp(0.0, 1.0));
        pixels.par_iter_mut().for_each(|p| tint_over(p, color, alpha));
    }
    if let Some(mask) = mask {
        let coverage = mask.coverage(width, height);
        pixels
            .par_iter_mut()
            .zip(coverage.par_iter())
            .for_each(|(p, c)| p[3] *= c.clamp(0.0, 1.0));
    }

    let flat: Vec<f32> = pixels.into_iter().flatten().map(|v| v.clamp(0.0, 1.0)).collect();
    let buffer = Rgba32FImage::from_raw(width, height, flat)
        .ok_or_else(|| failed("pixel buffer size mismatch"))?;
    let output = DynamicImage::ImageRgba32F(buffer);
    if frame.color().bytes_per_pixel() / frame.color().channel_count() >= 2 {
        Ok(DynamicImage::ImageRgba16(output.to_rgba16()))
    } else {
        Ok(DynamicImage::ImageRgba8(output.to_rgba8()))
    }
}

// =========================================================================
// Blur
// =========================================================================

fn blur(pixels: &mut Vec<[f32; 4]>, width: usize, height: usize, size: usize) {
    let half = size / 2;
    if half == 0 {
        return;
    }
    premultiply(pixels);
    for _ in 0..3 {
        box_rows(pixels, width, half);
    }
    *pixels = transpose(pixels, width, height);
    for _ in 0..3 {
        box_rows(pixels, height, half);
    }
    *pixels = transpose(pixels, height, width);
    unpremultiply(pixels);
}

fn box_rows(pixels: &mut Vec<[f32; 4]>, width: usize, half: usize) {
    let mut out = vec![[0.0f32; 4]; pixels.len()];
    out.par_chunks_mut(width)
        .zip(pixels.par_chunks(width))
        .for_each(|(dst, row)| box_row(row, dst, half));
    *pixels = out;
}

/// Sliding-window mean over `2 * half + 1` samples with clamped edges.
///
/// The window is capped at the row length; a wider one only adds more
/// copies of the edge pixels.
fn box_row(row: &[[f32; 4]], dst: &mut [[f32; 4]], half: usize) {
    let last = row.len() as isize - 1;
    let at = |i: isize| row[i.clamp(0, last) as usize];
    let half = half.min(row.len()) as isize;
    let norm = 1.0 / (2 * half + 1) as f32;

    let mut sum = [0.0f32; 4];
    for i in -half..=half {
        add(&mut sum, at(i), 1.0);
    }
    for (x, out) in dst.iter_mut().enumerate() {
        let x = x as isize;
        *out = sum.map(|s| s * norm);
        add(&mut sum, at(x + half + 1), 1.0);
        add(&mut sum, at(x - half), -1.0);
    }
}

fn add(sum: &mut [f32; 4], value: [f32; 4], sign: f32) {
    for (s, v) in sum.iter_mut().zip(value) {
        *s += sign * v;
    }
}

fn transpose(pixels: &[[f32; 4]], width: usize, height: usize) -> Vec<[f32; 4]> {
    let mut out = vec![[0.0f32; 4]; pixels.len()];
    for y in 0..height {
        for x in 0..width {
            out[x * height + y] = pixels[y * width + x];
        }
    }
    out
}

fn premultiply(pixels: &mut [[f32; 4]]) {
    pixels.par_iter_mut().for_each(|p| {
        for c in 0..3 {
            p[c] *= p[3];
        }
    });
}

fn unpremultiply(pixels: &mut [[f32; 4]]) {
    pixels.par_iter_mut().for_each(|p| {
        if p[3] > f32::EPSILON {
            for c in 0..3 {
                p[c] = (p[c] / p[3]).clamp(0.0, 1.0);
            }
        } else {
            *p = [0.0; 4];
        }
    });
}

// =========================================================================
// Color
// =========================================================================

fn saturation_matrix(s: f32) -> [[f32; 3]; 3] {
    let mut m = [[0.0f32; 3]; 3];
    for (row, out) in m.iter_mut().enumerate() {
        for (col, value) in out.iter_mut().enumerate() {
            let identity = if row == col { 1.0 } else { 0.0 };
            *value = LUMA[col] * (1.0 - s) + identity * s;
        }
    }
    m
}

fn saturate(p: &mut [f32; 4], m: &[[f32; 3]; 3]) {
    let [r, g, b, _] = *p;
    for (c, row) in m.iter().enumerate() {
        p[c] = (row[0] * r + row[1] * g + row[2] * b).clamp(0.0, 1.0);
    }
}

/// Source-over of a constant color layer onto a straight-alpha pixel.
fn tint_over(p: &mut [f32; 4], color: [f32; 3], alpha: f32) {
    let dst_alpha = p[3];
    let out_alpha = alpha + dst_alpha * (1.0 - alpha);
    if out_alpha <= f32::EPSILON {
        return;
    }
    for c in 0..3 {
        let premultiplied = color[c] * alpha + p[c] * dst_alpha * (1.0 - alpha);
        p[c] = premultiplied / out_alpha;
    }
    p[3] = out_alpha;
}
