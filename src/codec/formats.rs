//! Container formats and their capabilities.
//!
//! Formats are named by UTI-style tags (`public.png`) on the public surface.
//! [`ContainerFormat`] is the closed set this crate can drive; a
//! [`FormatRegistry`] answers what each one can do. The registry is a
//! read-only table: callers can restrict it (e.g. a host without a WebP
//! encoder) but cannot plug in new codecs.

use image::ImageFormat;
use serde::Serialize;
use std::time::Duration;

/// Frame duration used when an animation carries none (or a mismatched set).
pub const DEFAULT_FRAME_DURATION: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ContainerFormat {
    Jpeg,
    Png,
    Gif,
    WebP,
    Tiff,
    Bmp,
}

impl ContainerFormat {
    pub const ALL: [ContainerFormat; 6] = [
        ContainerFormat::Jpeg,
        ContainerFormat::Png,
        ContainerFormat::Gif,
        ContainerFormat::WebP,
        ContainerFormat::Tiff,
        ContainerFormat::Bmp,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            ContainerFormat::Jpeg => "public.jpeg",
            ContainerFormat::Png => "public.png",
            ContainerFormat::Gif => "com.compuserve.gif",
            ContainerFormat::WebP => "org.webmproject.webp",
            ContainerFormat::Tiff => "public.tiff",
            ContainerFormat::Bmp => "com.microsoft.bmp",
        }
    }

    /// Look up a tag. Matching is ASCII case-insensitive.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.tag().eq_ignore_ascii_case(tag.trim()))
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "jpe" => Some(ContainerFormat::Jpeg),
            "png" | "apng" => Some(ContainerFormat::Png),
            "gif" => Some(ContainerFormat::Gif),
            "webp" => Some(ContainerFormat::WebP),
            "tif" | "tiff" => Some(ContainerFormat::Tiff),
            "bmp" => Some(ContainerFormat::Bmp),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ContainerFormat::Jpeg => "jpg",
            ContainerFormat::Png => "png",
            ContainerFormat::Gif => "gif",
            ContainerFormat::WebP => "webp",
            ContainerFormat::Tiff => "tiff",
            ContainerFormat::Bmp => "bmp",
        }
    }

    /// Sniff the container from leading magic bytes.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        match image::guess_format(bytes).ok()? {
            ImageFormat::Jpeg => Some(ContainerFormat::Jpeg),
            ImageFormat::Png => Some(ContainerFormat::Png),
            ImageFormat::Gif => Some(ContainerFormat::Gif),
            ImageFormat::WebP => Some(ContainerFormat::WebP),
            ImageFormat::Tiff => Some(ContainerFormat::Tiff),
            ImageFormat::Bmp => Some(ContainerFormat::Bmp),
            _ => None,
        }
    }

    pub fn image_format(self) -> ImageFormat {
        match self {
            ContainerFormat::Jpeg => ImageFormat::Jpeg,
            ContainerFormat::Png => ImageFormat::Png,
            ContainerFormat::Gif => ImageFormat::Gif,
            ContainerFormat::WebP => ImageFormat::WebP,
            ContainerFormat::Tiff => ImageFormat::Tiff,
            ContainerFormat::Bmp => ImageFormat::Bmp,
        }
    }

    /// What the built-in codecs support for this format.
    pub fn capabilities(self) -> FormatCapabilities {
        let base = FormatCapabilities {
            decode: true,
            encode: true,
            decode_animation: false,
            encode_animation: false,
            lossy_quality: false,
            alpha: true,
            default_frame_duration: DEFAULT_FRAME_DURATION,
        };
        match self {
            ContainerFormat::Jpeg => FormatCapabilities {
                lossy_quality: true,
                alpha: false,
                ..base
            },
            ContainerFormat::Png | ContainerFormat::Gif => FormatCapabilities {
                decode_animation: true,
                encode_animation: true,
                ..base
            },
            // The WebP encoder is lossless and still-only
            ContainerFormat::WebP => FormatCapabilities {
                decode_animation: true,
                ..base
            },
            ContainerFormat::Tiff | ContainerFormat::Bmp => base,
        }
    }
}

impl std::fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// One row of the capability table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FormatCapabilities {
    pub decode: bool,
    pub encode: bool,
    /// Multi-frame containers are decoded into animations.
    pub decode_animation: bool,
    /// More than one frame can be written.
    pub encode_animation: bool,
    /// Encoding quality is honored.
    pub lossy_quality: bool,
    pub alpha: bool,
    pub default_frame_duration: Duration,
}

/// Read-only capability lookup consulted by the codec and the inspector.
pub trait FormatRegistry: Send + Sync {
    /// `None` when the registry does not know the format at all.
    fn capabilities(&self, format: ContainerFormat) -> Option<FormatCapabilities>;

    /// Resolve a tag to a format this registry knows.
    fn lookup(&self, tag: &str) -> Option<ContainerFormat> {
        ContainerFormat::from_tag(tag).filter(|f| self.capabilities(*f).is_some())
    }

    fn can_decode(&self, format: ContainerFormat) -> bool {
        self.capabilities(format).is_some_and(|c| c.decode)
    }

    fn can_encode(&self, format: ContainerFormat) -> bool {
        self.capabilities(format).is_some_and(|c| c.encode)
    }
}

/// The built-in table: every [`ContainerFormat`] with its native capabilities.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeFormats;

impl FormatRegistry for NativeFormats {
    fn capabilities(&self, format: ContainerFormat) -> Option<FormatCapabilities> {
        Some(format.capabilities())
    }
}
