//! Encoding bitmaps into bytes.
//!
//! Frames are always written upright: the stored orientation is applied to
//! the pixels first, since none of the writers here record EXIF orientation.
//!
//! | Target | Writer |
//! |---|---|
//! | JPEG | `image::codecs::jpeg::JpegEncoder` with quality |
//! | GIF (still or animated) | `image::codecs::gif::GifEncoder` |
//! | APNG | `png` with `acTL`/`fcTL` |
//! | PNG, WebP, TIFF, BMP | `DynamicImage::write_to` |

use super::formats::{ContainerFormat, FormatCapabilities};
use crate::bitmap::{AnimationData, Bitmap, Orientation};
use crate::config::EncodingConfig;
use crate::error::{PictorError, Result};
use crate::imaging::{EncodingOptions, EncodingSpec};
use image::codecs::gif::{GifEncoder, Repeat};
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, Delay, DynamicImage, Frame, RgbaImage};
use std::io::Cursor;
use std::time::Duration;

/// Per-frame timing resolved for writing.
struct Timing {
    durations: Vec<Duration>,
    loop_count: u32,
}

pub(super) fn encode_bitmap(
    config: &EncodingConfig,
    bitmap: &Bitmap,
    format: ContainerFormat,
    caps: FormatCapabilities,
    spec: &EncodingSpec,
) -> Result<Vec<u8>> {
    let animation = bitmap.animation().filter(|a| a.frame_count() > 1);
    let orientation = bitmap.orientation();
    let bytes = match animation {
        Some(animation) => {
            let incompatible = || PictorError::IncompatibleAnimation {
                format: format.tag().to_string(),
                frames: animation.frame_count(),
            };
            if !caps.encode_animation {
                return Err(incompatible());
            }
            let timing = resolve_timing(animation, spec, caps.default_frame_duration);
            let frames = animation_canvas(animation, orientation, spec.options);
            match format {
                ContainerFormat::Gif => write_gif(config, frames, Some(&timing))?,
                ContainerFormat::Png => write_apng(frames, &timing)?,
                _ => return Err(incompatible()),
            }
        }
        None => {
            let raster = bitmap.raster().ok_or_else(|| {
                PictorError::EncodeFailed("bitmap has no raster to encode".to_string())
            })?;
            let image = upright(&raster, orientation);
            if image.width() == 0 || image.height() == 0 {
                return Err(PictorError::EncodeFailed("cannot encode an empty image".to_string()));
            }
            write_still(config, &image, format, caps, spec)?
        }
    };

    tracing::debug!(
        %format,
        bytes = bytes.len(),
        frames = animation.map_or(1, |a| a.frame_count()),
        "Encoded bitmap"
    );
    Ok(bytes)
}

fn upright(image: &DynamicImage, orientation: Orientation) -> DynamicImage {
    let mut image = image.clone();
    if orientation != Orientation::Up {
        image.apply_orientation(orientation.to_image());
    }
    image
}

/// Durations and loop count to write.
///
/// Explicit durations win over the animation's own; whichever applies must
/// match the frame count or every frame gets the format default.
fn resolve_timing(animation: &AnimationData, spec: &EncodingSpec, default: Duration) -> Timing {
    let frames = animation.frame_count();
    let candidate = spec
        .frame_durations
        .as_deref()
        .unwrap_or(animation.durations());
    let durations = if candidate.len() == frames {
        candidate.to_vec()
    } else {
        tracing::debug!(
            frames,
            durations = candidate.len(),
            "Frame durations do not match frame count; using default"
        );
        vec![default; frames]
    };
    Timing {
        durations,
        loop_count: spec.loop_count.unwrap_or(animation.loop_count()),
    }
}

/// Upright RGBA frames on the first frame's canvas.
fn animation_canvas(
    animation: &AnimationData,
    orientation: Orientation,
    options: EncodingOptions,
) -> Vec<RgbaImage> {
    let mut frames = animation
        .frames()
        .iter()
        .map(|frame| rgba_frame(&upright(frame, orientation), options));
    let Some(first) = frames.next() else {
        return Vec::new();
    };
    let (width, height) = first.dimensions();

    let mut out = vec![first];
    out.extend(frames.map(|frame| {
        if frame.dimensions() == (width, height) {
            frame
        } else {
            let mut canvas = RgbaImage::new(width, height);
            image::imageops::replace(&mut canvas, &frame, 0, 0);
            canvas
        }
    }));
    out
}

fn rgba_frame(image: &DynamicImage, options: EncodingOptions) -> RgbaImage {
    let image = if options.grayscale {
        image.grayscale()
    } else {
        image.clone()
    };
    let mut rgba = image.to_rgba8();
    if options.no_alpha {
        rgba.pixels_mut().for_each(|p| p[3] = u8::MAX);
    }
    rgba
}

// =========================================================================
// Stills
// =========================================================================

fn write_still(
    config: &EncodingConfig,
    image: &DynamicImage,
    format: ContainerFormat,
    caps: FormatCapabilities,
    spec: &EncodingSpec,
) -> Result<Vec<u8>> {
    let options = spec.options;
    if format == ContainerFormat::Gif {
        return write_gif(config, vec![rgba_frame(image, options)], None);
    }

    let mut out = Cursor::new(Vec::new());
    if format == ContainerFormat::Jpeg {
        let pixels = if options.grayscale || !image.color().has_color() {
            DynamicImage::ImageLuma8(image.to_luma8())
        } else {
            DynamicImage::ImageRgb8(image.to_rgb8())
        };
        let encoder = JpegEncoder::new_with_quality(&mut out, spec.quality.percent());
        pixels.write_with_encoder(encoder).map_err(encode_error)?;
        return Ok(out.into_inner());
    }

    let pixels = convert_for(image, format, options.grayscale, options.no_alpha || !caps.alpha);
    pixels
        .write_to(&mut out, format.image_format())
        .map_err(encode_error)?;
    Ok(out.into_inner())
}

/// Convert to a layout the target writer accepts.
///
/// PNG and TIFF keep 16-bit samples; everything else is written at 8 bits.
fn convert_for(
    image: &DynamicImage,
    format: ContainerFormat,
    grayscale: bool,
    drop_alpha: bool,
) -> DynamicImage {
    let deep = matches!(format, ContainerFormat::Png | ContainerFormat::Tiff)
        && image.color().bytes_per_pixel() / image.color().channel_count() >= 2;
    let gray = grayscale || !image.color().has_color();
    let alpha = image.color().has_alpha() && !drop_alpha;
    // The TIFF writer has no gray+alpha layout
    let gray = gray && !(alpha && format == ContainerFormat::Tiff);
    let source = if grayscale { image.grayscale() } else { image.clone() };

    let target = match (gray, alpha, deep) {
        (true, false, false) => ColorType::L8,
        (true, true, false) => ColorType::La8,
        (false, false, false) => ColorType::Rgb8,
        (false, true, false) => ColorType::Rgba8,
        (true, false, true) => ColorType::L16,
        (true, true, true) => ColorType::La16,
        (false, false, true) => ColorType::Rgb16,
        (false, true, true) => ColorType::Rgba16,
    };
    if source.color() == target {
        return source;
    }
    match target {
        ColorType::L8 => DynamicImage::ImageLuma8(source.to_luma8()),
        ColorType::La8 => DynamicImage::ImageLumaA8(source.to_luma_alpha8()),
        ColorType::Rgb8 => DynamicImage::ImageRgb8(source.to_rgb8()),
        ColorType::L16 => DynamicImage::ImageLuma16(source.to_luma16()),
        ColorType::La16 => DynamicImage::ImageLumaA16(source.to_luma_alpha16()),
        ColorType::Rgb16 => DynamicImage::ImageRgb16(source.to_rgb16()),
        ColorType::Rgba16 => DynamicImage::ImageRgba16(source.to_rgba16()),
        _ => DynamicImage::ImageRgba8(source.to_rgba8()),
    }
}

fn encode_error(err: image::ImageError) -> PictorError {
    match err {
        image::ImageError::Unsupported(e) => PictorError::UnsupportedFormat(e.to_string()),
        image::ImageError::IoError(e) => PictorError::Io(e),
        other => PictorError::EncodeFailed(other.to_string()),
    }
}

// =========================================================================
// Animations
// =========================================================================

fn write_gif(
    config: &EncodingConfig,
    frames: Vec<RgbaImage>,
    timing: Option<&Timing>,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    {
        let mut encoder = GifEncoder::new_with_speed(&mut out, config.gif_speed);
        if let Some(timing) = timing {
            let repeat = match timing.loop_count {
                0 => Repeat::Infinite,
                n => Repeat::Finite(n.min(u16::MAX as u32) as u16),
            };
            encoder.set_repeat(repeat).map_err(encode_error)?;
        }
        let delays = timing.map(|t| t.durations.as_slice()).unwrap_or(&[]);
        let frames = frames.into_iter().enumerate().map(|(i, buffer)| {
            let duration = delays.get(i).copied().unwrap_or_default();
            Frame::from_parts(buffer, 0, 0, Delay::from_saturating_duration(duration))
        });
        encoder.encode_frames(frames).map_err(encode_error)?;
    }
    Ok(out)
}

fn write_apng(frames: Vec<RgbaImage>, timing: &Timing) -> Result<Vec<u8>> {
    let Some((width, height)) = frames.first().map(|f| f.dimensions()) else {
        return Err(PictorError::EncodeFailed("animation without frames".to_string()));
    };
    let png_error = |e: png::EncodingError| match e {
        png::EncodingError::IoError(e) => PictorError::Io(e),
        other => PictorError::EncodeFailed(other.to_string()),
    };

    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        encoder
            .set_animated(frames.len() as u32, timing.loop_count)
            .map_err(png_error)?;
        let mut writer = encoder.write_header().map_err(png_error)?;
        for (frame, duration) in frames.iter().zip(&timing.durations) {
            let (numerator, denominator) = apng_delay(*duration);
            writer
                .set_frame_delay(numerator, denominator)
                .map_err(png_error)?;
            writer.write_image_data(frame.as_raw()).map_err(png_error)?;
        }
        writer.finish().map_err(png_error)?;
    }
    Ok(out)
}

/// `fcTL` delay fraction: milliseconds when they fit in 16 bits, then
/// centiseconds, then whole seconds (saturating).
fn apng_delay(duration: Duration) -> (u16, u16) {
    let max = u16::MAX as u128;
    let millis = duration.as_millis();
    if millis <= max {
        return (millis as u16, 1000);
    }
    let centis = millis / 10;
    if centis <= max {
        return (centis as u16, 100);
    }
    (duration.as_secs().min(u16::MAX as u64) as u16, 1)
}
