//! Geometric transforms on bitmaps.
//!
//! These functions combine the pure fit calculations with backend execution.
//! Every function returns a new [`Bitmap`] (or the input handle itself when
//! nothing needs to change) and never mutates its input. Animated bitmaps
//! have each frame transformed independently; timing and loop count carry
//! over unchanged.

use super::backend::RasterBackend;
use super::calculations::{Dimensions, compute_target_dimensions, matches_target};
use super::params::FitSpec;
use crate::bitmap::{BackingKind, Bitmap, ColorSpace, Orientation};
use crate::error::{PictorError, Result};
use crate::inspect;
use image::DynamicImage;

/// Scale `bitmap` to satisfy `fit`.
///
/// Returns the input handle when it already matches. Positional content
/// modes never scale.
///
/// This never fails. The resampling primitive has a known defect where it
/// occasionally produces no image; when that happens, when the backend
/// refuses a target too large to allocate, or when the bitmap cannot be
/// rasterized at all, the original unscaled bitmap is returned.
pub fn scale(backend: &impl RasterBackend, bitmap: &Bitmap, fit: &FitSpec) -> Bitmap {
    let displayed = inspect::dimensions(bitmap);
    let source = displayed.to_size();
    if !fit.mode.is_scaling() || matches_target(source, fit) {
        return bitmap.clone();
    }

    let target = compute_target_dimensions(source, fit);
    if target == displayed {
        return bitmap.clone();
    }
    match scale_frames(backend, bitmap, target) {
        Some(scaled) => scaled,
        None => {
            tracing::warn!(
                from_width = source.width,
                from_height = source.height,
                to_width = target.width,
                to_height = target.height,
                "Scaling produced no image; returning the unscaled bitmap"
            );
            bitmap.clone()
        }
    }
}

fn scale_frames(
    backend: &impl RasterBackend,
    bitmap: &Bitmap,
    target: Dimensions,
) -> Option<Bitmap> {
    if target.is_empty() {
        return None;
    }
    let orientation = bitmap.orientation();
    let resize = |frame: &DynamicImage| {
        let upright = apply_orientation(frame, orientation);
        backend.resize(&upright, target.width, target.height)
    };

    let (primary, animation) = match bitmap.animation() {
        Some(animation) => {
            let scaled = animation.try_map_frames(resize)?;
            ((*scaled.frames()[0]).clone(), Some(scaled))
        }
        None => (resize(&*bitmap.raster()?)?, None),
    };
    Some(
        bitmap
            .derive(primary, animation)
            .with_orientation(Orientation::Up),
    )
}

fn apply_orientation(image: &DynamicImage, orientation: Orientation) -> DynamicImage {
    let mut image = image.clone();
    if orientation != Orientation::Up {
        image.apply_orientation(orientation.to_image());
    }
    image
}

/// Return `bitmap` with its stored orientation applied to the pixels.
///
/// The result is oriented [`Orientation::Up`]. An already upright bitmap is
/// returned as the same handle, which makes this idempotent. A bitmap whose
/// pixels cannot be produced is returned unchanged.
pub fn normalize_orientation(bitmap: &Bitmap) -> Bitmap {
    let orientation = bitmap.orientation();
    if orientation == Orientation::Up {
        return bitmap.clone();
    }

    let rotated = match bitmap.animation() {
        Some(animation) => animation
            .try_map_frames(|frame| Some(apply_orientation(frame, orientation)))
            .map(|a| ((*a.frames()[0]).clone(), Some(a))),
        None => bitmap
            .raster()
            .map(|raster| (apply_orientation(&raster, orientation), None)),
    };

    match rotated {
        Some((primary, animation)) => bitmap
            .derive(primary, animation)
            .with_orientation(Orientation::Up),
        None => {
            tracing::warn!(?orientation, "Cannot orient a bitmap with no raster");
            bitmap.clone()
        }
    }
}

/// Return a raster-backed copy of `bitmap`.
///
/// Raster-backed bitmaps are returned as the same handle. Lazy backings are
/// materialized (once) and re-wrapped as a plain raster.
pub fn rasterize(bitmap: &Bitmap) -> Result<Bitmap> {
    if bitmap.backing_kind() == BackingKind::Raster {
        return Ok(bitmap.clone());
    }
    let raster = bitmap.raster().ok_or_else(|| {
        PictorError::TransformFailed(format!(
            "{:?} backing produced no raster",
            bitmap.backing_kind()
        ))
    })?;
    let animation = bitmap.animation().cloned();
    Ok(bitmap.derive((*raster).clone(), animation))
}

/// Return a grayscale copy of `bitmap`.
///
/// Requires raster pixels: a render-source backed bitmap must be
/// [`rasterize`]d first. Alpha is preserved; the colorspace becomes gray.
pub fn to_grayscale(backend: &impl RasterBackend, bitmap: &Bitmap) -> Result<Bitmap> {
    if bitmap.backing_kind() == BackingKind::Rendered {
        return Err(PictorError::TransformFailed(
            "grayscale requires a raster-backed bitmap".to_string(),
        ));
    }

    let failed = || PictorError::TransformFailed("grayscale conversion failed".to_string());
    let (primary, animation) = match bitmap.animation() {
        Some(animation) => {
            let gray = animation
                .try_map_frames(|frame| backend.grayscale(frame))
                .ok_or_else(failed)?;
            ((*gray.frames()[0]).clone(), Some(gray))
        }
        None => {
            let raster = bitmap.raster().ok_or_else(failed)?;
            (backend.grayscale(&raster).ok_or_else(failed)?, None)
        }
    };
    Ok(bitmap
        .derive(primary, animation)
        .with_color_space(ColorSpace::Gray))
}

/// Force any deferred decode or render to happen now.
///
/// Blocking; intended to move decode cost off a latency-sensitive thread.
/// Safe to call concurrently: the work runs at most once per backing.
pub fn decode_immediately(bitmap: &Bitmap) {
    if bitmap.is_materialized() {
        return;
    }
    if bitmap.raster().is_none() {
        tracing::debug!(kind = ?bitmap.backing_kind(), "Deferred decode produced no raster");
    }
}
