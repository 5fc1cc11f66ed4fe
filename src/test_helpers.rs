//! Shared test utilities for the pictor test suite.
//!
//! Provides synthetic rasters, encoded fixtures, and render sources so unit
//! tests never depend on files on disk.

use crate::bitmap::{PixelFormat, RasterSource};
use crate::imaging::Dimensions;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

// =========================================================================
// Synthetic rasters
// =========================================================================

/// Fully opaque RGBA gradient. The layout carries alpha; the pixels don't use it.
pub fn gradient_rgba(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 7 % 256) as u8, (y * 13 % 256) as u8, 128, 255])
    }))
}

/// RGB gradient with no alpha channel at all.
pub fn gradient_rgb(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 5 % 256) as u8, (y * 3 % 256) as u8, 64])
    }))
}

/// Opaque image with one half-transparent pixel in the bottom-right corner.
pub fn translucent_corner(width: u32, height: u32) -> DynamicImage {
    let mut image = RgbaImage::from_pixel(width, height, Rgba([200, 100, 50, 255]));
    image.put_pixel(width - 1, height - 1, Rgba([200, 100, 50, 128]));
    DynamicImage::ImageRgba8(image)
}

/// Single-color opaque image.
pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(rgba)))
}

/// Black/white checkerboard with `cell`-pixel squares.
pub fn checkerboard(width: u32, height: u32, cell: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
        if ((x / cell) + (y / cell)) % 2 == 0 {
            Rgba([255, 255, 255, 255])
        } else {
            Rgba([0, 0, 0, 255])
        }
    }))
}

/// Image whose top-left pixel is red and everything else is blue.
///
/// Makes rotations and flips observable.
pub fn marked_corner(width: u32, height: u32) -> DynamicImage {
    let mut image = RgbaImage::from_pixel(width, height, Rgba([0, 0, 255, 255]));
    image.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
    DynamicImage::ImageRgba8(image)
}

// =========================================================================
// Encoded fixtures
// =========================================================================

pub fn encode_with(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format).unwrap();
    out.into_inner()
}

pub fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    encode_with(image, ImageFormat::Png)
}

/// Animated WebP with one lossless frame per image, all at the canvas origin.
///
/// `image` can only write still WebP, so each frame is encoded on its own and
/// its `VP8L` chunk is wrapped in an `ANMF` chunk behind `VP8X` and `ANIM`.
pub fn animated_webp(frames: &[DynamicImage], durations_ms: &[u32], loop_count: u16) -> Vec<u8> {
    fn chunk(out: &mut Vec<u8>, fourcc: &[u8; 4], payload: &[u8]) {
        out.extend_from_slice(fourcc);
        out.extend((payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        if payload.len() % 2 == 1 {
            out.push(0);
        }
    }
    fn u24(out: &mut Vec<u8>, value: u32) {
        out.extend_from_slice(&value.to_le_bytes()[..3]);
    }

    let (width, height) = (frames[0].width(), frames[0].height());
    let mut body = b"WEBP".to_vec();

    let mut vp8x = vec![0x02 | 0x10, 0, 0, 0];
    u24(&mut vp8x, width - 1);
    u24(&mut vp8x, height - 1);
    chunk(&mut body, b"VP8X", &vp8x);

    let mut anim = vec![0u8; 4];
    anim.extend(loop_count.to_le_bytes());
    chunk(&mut body, b"ANIM", &anim);

    for (frame, duration) in frames.iter().zip(durations_ms) {
        let still = encode_with(&DynamicImage::ImageRgba8(frame.to_rgba8()), ImageFormat::WebP);
        let bitstream = riff_chunk(&still, b"VP8L");
        let mut anmf = Vec::new();
        u24(&mut anmf, 0);
        u24(&mut anmf, 0);
        u24(&mut anmf, frame.width() - 1);
        u24(&mut anmf, frame.height() - 1);
        u24(&mut anmf, *duration);
        // No blending, no disposal
        anmf.push(0x02);
        chunk(&mut anmf, b"VP8L", bitstream);
        chunk(&mut body, b"ANMF", &anmf);
    }

    let mut out = b"RIFF".to_vec();
    out.extend((body.len() as u32).to_le_bytes());
    out.extend(body);
    out
}

/// Payload of the first top-level `fourcc` chunk in a WebP RIFF file.
fn riff_chunk<'a>(riff: &'a [u8], fourcc: &[u8; 4]) -> &'a [u8] {
    let mut at = 12;
    while at + 8 <= riff.len() {
        let size = u32::from_le_bytes(riff[at + 4..at + 8].try_into().unwrap()) as usize;
        if &riff[at..at + 4] == fourcc {
            return &riff[at + 8..at + 8 + size];
        }
        at += 8 + size + size % 2;
    }
    panic!("no {} chunk", String::from_utf8_lossy(fourcc));
}

/// Mean absolute difference between horizontally adjacent pixels.
///
/// Drops as an image gets smoother.
pub fn roughness(image: &DynamicImage) -> f64 {
    let rgba = image.to_rgba8();
    let (w, h) = rgba.dimensions();
    let mut total = 0u64;
    let mut count = 0u64;
    for y in 0..h {
        for x in 1..w {
            let a = rgba.get_pixel(x - 1, y);
            let b = rgba.get_pixel(x, y);
            for c in 0..3 {
                total += (a[c] as i32 - b[c] as i32).unsigned_abs() as u64;
            }
            count += 3;
        }
    }
    total as f64 / count.max(1) as f64
}

// =========================================================================
// Render sources
// =========================================================================

/// Render source that counts how often it is asked to render.
pub struct CountingSource {
    size: Dimensions,
    calls: Arc<AtomicUsize>,
}

impl CountingSource {
    pub fn new(width: u32, height: u32) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                size: Dimensions::new(width, height),
                calls: calls.clone(),
            },
            calls,
        )
    }
}

impl RasterSource for CountingSource {
    fn dimensions(&self) -> Dimensions {
        self.size
    }

    fn render(&self) -> Option<DynamicImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(std::time::Duration::from_millis(5));
        Some(gradient_rgba(self.size.width, self.size.height))
    }
}

/// Render source that never produces a raster.
pub struct BrokenSource;

impl RasterSource for BrokenSource {
    fn dimensions(&self) -> Dimensions {
        Dimensions::new(8, 8)
    }

    fn pixel_format(&self) -> PixelFormat {
        PixelFormat::RGBA8
    }

    fn render(&self) -> Option<DynamicImage> {
        None
    }
}
