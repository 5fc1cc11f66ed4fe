//! Decoding bytes into bitmaps.
//!
//! The container is sniffed from magic bytes; a caller hint is consulted only
//! when sniffing fails. Multi-frame containers (GIF, APNG, animated WebP)
//! become an animated [`Bitmap`] carrying per-frame durations and the loop
//! count; a single frame is always a plain still.
//!
//! | Container | Frames | Loop count |
//! |---|---|---|
//! | GIF | `image::codecs::gif::GifDecoder` | `gif` NETSCAPE extension |
//! | APNG | `image::codecs::png::ApngDecoder` | `png` `acTL.num_plays` |
//! | WebP | `image::codecs::webp::WebPDecoder` | `image-webp` `ANIM` chunk |

use super::formats::{ContainerFormat, FormatRegistry};
use crate::bitmap::{AnimationData, Bitmap, ColorSpace, Orientation};
use crate::config::DecodeConfig;
use crate::error::{PictorError, Result};
use image::codecs::gif::GifDecoder;
use image::codecs::png::PngDecoder;
use image::codecs::webp::WebPDecoder;
use image::{AnimationDecoder, DynamicImage, Frame, ImageDecoder, ImageError, ImageReader};
use std::io::Cursor;
use std::time::Duration;

/// A decoded bitmap and the container it came from.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub bitmap: Bitmap,
    pub format: ContainerFormat,
}

impl Decoded {
    pub fn animation(&self) -> Option<&AnimationData> {
        self.bitmap.animation()
    }
}

pub(super) fn decode_bytes(
    registry: &impl FormatRegistry,
    limits: &DecodeConfig,
    bytes: &[u8],
    hint: Option<&str>,
) -> Result<Decoded> {
    let format = resolve_format(registry, bytes, hint)?;
    let caps = registry
        .capabilities(format)
        .filter(|c| c.decode)
        .ok_or_else(|| PictorError::UnsupportedFormat(format!("{format} cannot be decoded")))?;

    let frames = if caps.decode_animation {
        decode_frames(bytes, format, limits)?
    } else {
        Vec::new()
    };

    let bitmap = if frames.len() > 1 {
        let count = frames.len();
        let (orientation, color_space) = header_metadata(bytes, format);
        let (images, durations): (Vec<_>, Vec<_>) = frames
            .into_iter()
            .map(|frame| {
                let duration = Duration::from(frame.delay());
                (DynamicImage::ImageRgba8(frame.into_buffer()), duration)
            })
            .unzip();
        let loop_count = read_loop_count(bytes, format);
        let animation = AnimationData::new(images, durations, loop_count)
            .ok_or_else(|| PictorError::CorruptData("animation without frames".to_string()))?;
        tracing::debug!(%format, frames = count, loop_count, "Decoded animation");
        Bitmap::animated(animation)
            .with_orientation(orientation)
            .with_color_space(color_space.unwrap_or(ColorSpace::Srgb))
    } else {
        decode_still(bytes, format, limits)?
    };

    Ok(Decoded { bitmap, format })
}

fn resolve_format(
    registry: &impl FormatRegistry,
    bytes: &[u8],
    hint: Option<&str>,
) -> Result<ContainerFormat> {
    if let Some(format) = ContainerFormat::detect(bytes) {
        return Ok(format);
    }
    match hint {
        Some(tag) => registry
            .lookup(tag)
            .ok_or_else(|| PictorError::UnsupportedFormat(tag.to_string())),
        None => Err(PictorError::UnsupportedFormat(
            "unrecognized image container".to_string(),
        )),
    }
}

fn decode_error(err: ImageError) -> PictorError {
    match err {
        ImageError::Unsupported(e) => PictorError::UnsupportedFormat(e.to_string()),
        ImageError::Limits(e) => PictorError::CorruptData(format!("decode limits exceeded: {e}")),
        other => PictorError::CorruptData(other.to_string()),
    }
}

fn decode_still(bytes: &[u8], format: ContainerFormat, limits: &DecodeConfig) -> Result<Bitmap> {
    let mut reader = ImageReader::with_format(Cursor::new(bytes), format.image_format());
    reader.limits(limits.limits());
    let mut decoder = reader.into_decoder().map_err(decode_error)?;

    let orientation = decoder
        .orientation()
        .map(Orientation::from_image)
        .unwrap_or_default();
    let icc = decoder.icc_profile().ok().flatten();
    let image = DynamicImage::from_decoder(decoder).map_err(decode_error)?;

    let color_space = icc
        .map(|profile| ColorSpace::from_icc(&profile))
        .unwrap_or_else(|| ColorSpace::for_color_type(image.color()));
    Ok(Bitmap::from_image(image)
        .with_orientation(orientation)
        .with_color_space(color_space))
}

/// All composited frames of a possibly animated container.
///
/// Returns an empty list for containers that turn out to be stills (plain
/// PNG, still WebP).
fn decode_frames(
    bytes: &[u8],
    format: ContainerFormat,
    limits: &DecodeConfig,
) -> Result<Vec<Frame>> {
    let frames = match format {
        ContainerFormat::Gif => {
            let mut decoder = GifDecoder::new(Cursor::new(bytes)).map_err(decode_error)?;
            decoder.set_limits(limits.limits()).map_err(decode_error)?;
            decoder.into_frames().collect_frames()
        }
        ContainerFormat::Png => {
            let decoder = PngDecoder::with_limits(Cursor::new(bytes), limits.limits())
                .map_err(decode_error)?;
            if !decoder.is_apng().map_err(decode_error)? {
                return Ok(Vec::new());
            }
            decoder.apng().map_err(decode_error)?.into_frames().collect_frames()
        }
        ContainerFormat::WebP => {
            let mut decoder = WebPDecoder::new(Cursor::new(bytes)).map_err(decode_error)?;
            if !decoder.has_animation() {
                return Ok(Vec::new());
            }
            decoder.set_limits(limits.limits()).map_err(decode_error)?;
            decoder.into_frames().collect_frames()
        }
        _ => return Ok(Vec::new()),
    };
    frames.map_err(decode_error)
}

/// Orientation and ICC colorspace from the container header.
fn header_metadata(bytes: &[u8], format: ContainerFormat) -> (Orientation, Option<ColorSpace>) {
    let reader = ImageReader::with_format(Cursor::new(bytes), format.image_format());
    let Ok(mut decoder) = reader.into_decoder() else {
        return (Orientation::Up, None);
    };
    let orientation = decoder
        .orientation()
        .map(Orientation::from_image)
        .unwrap_or_default();
    let color_space = decoder
        .icc_profile()
        .ok()
        .flatten()
        .map(|icc| ColorSpace::from_icc(&icc));
    (orientation, color_space)
}

/// Loop count of an animated container; `0` loops forever.
///
/// A GIF without a NETSCAPE extension plays once.
fn read_loop_count(bytes: &[u8], format: ContainerFormat) -> u32 {
    let count = match format {
        ContainerFormat::Gif => gif_loop_count(bytes),
        ContainerFormat::Png => apng_loop_count(bytes),
        ContainerFormat::WebP => webp_loop_count(bytes),
        _ => None,
    };
    count.unwrap_or_else(|| {
        tracing::warn!(%format, "Could not read loop count; assuming infinite");
        0
    })
}

fn gif_loop_count(bytes: &[u8]) -> Option<u32> {
    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::Indexed);
    let mut decoder = options.read_info(bytes).ok()?;
    // The extension may follow any frame, so every frame header is read
    while let Ok(Some(_)) = decoder.next_frame_info() {}
    Some(match decoder.repeat() {
        gif::Repeat::Infinite => 0,
        gif::Repeat::Finite(0) => 1,
        gif::Repeat::Finite(n) => n as u32,
    })
}

fn apng_loop_count(bytes: &[u8]) -> Option<u32> {
    let reader = png::Decoder::new(Cursor::new(bytes)).read_info().ok()?;
    reader.info().animation_control.map(|ac| ac.num_plays)
}

fn webp_loop_count(bytes: &[u8]) -> Option<u32> {
    let decoder = image_webp::WebPDecoder::new(Cursor::new(bytes)).ok()?;
    Some(match decoder.loop_count() {
        image_webp::LoopCount::Forever => 0,
        image_webp::LoopCount::Times(n) => n.get() as u32,
    })
}
