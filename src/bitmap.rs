//! The bitmap data model.
//!
//! A [`Bitmap`] is an immutable, cheaply clonable handle: clones share the
//! same backing store through an `Arc`. Every transform in this crate returns
//! a new `Bitmap` and never mutates its input.
//!
//! ## Backing stores
//!
//! | Backing | Raster in memory? | Materialized by |
//! |---|---|---|
//! | [`BackingKind::Raster`] | yes | already in memory |
//! | [`BackingKind::Encoded`] | after first touch | decoding the held bytes |
//! | [`BackingKind::Rendered`] | no (until rasterized) | the host's [`RasterSource`] |
//!
//! Lazy backings materialize at most once. The guard is a [`OnceLock`], so
//! concurrent first touches from several threads run the decode exactly once
//! and all observe the same buffer.

use crate::codec::ContainerFormat;
use crate::error::{PictorError, Result};
use crate::imaging::Dimensions;
use image::{ColorType, DynamicImage, ImageDecoder, ImageReader};
use std::io::Cursor;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// The eight EXIF orientations. [`Orientation::Up`] is canonical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
pub enum Orientation {
    #[default]
    Up,
    UpMirrored,
    Down,
    DownMirrored,
    LeftMirrored,
    Right,
    RightMirrored,
    Left,
}

impl Orientation {
    /// Map an EXIF orientation tag (1-8). Out-of-range values are `Up`.
    pub fn from_exif(value: u8) -> Self {
        match value {
            2 => Orientation::UpMirrored,
            3 => Orientation::Down,
            4 => Orientation::DownMirrored,
            5 => Orientation::LeftMirrored,
            6 => Orientation::Right,
            7 => Orientation::RightMirrored,
            8 => Orientation::Left,
            _ => Orientation::Up,
        }
    }

    pub fn to_exif(self) -> u8 {
        match self {
            Orientation::Up => 1,
            Orientation::UpMirrored => 2,
            Orientation::Down => 3,
            Orientation::DownMirrored => 4,
            Orientation::LeftMirrored => 5,
            Orientation::Right => 6,
            Orientation::RightMirrored => 7,
            Orientation::Left => 8,
        }
    }

    /// Whether displaying this orientation swaps width and height.
    pub fn swaps_axes(self) -> bool {
        matches!(
            self,
            Orientation::LeftMirrored
                | Orientation::Right
                | Orientation::RightMirrored
                | Orientation::Left
        )
    }

    pub(crate) fn to_image(self) -> image::metadata::Orientation {
        image::metadata::Orientation::from_exif(self.to_exif())
            .unwrap_or(image::metadata::Orientation::NoTransforms)
    }

    pub(crate) fn from_image(orientation: image::metadata::Orientation) -> Self {
        Self::from_exif(orientation.to_exif())
    }
}

/// Colorspace a bitmap's samples are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
pub enum ColorSpace {
    #[default]
    Srgb,
    DisplayP3,
    Rec2020,
    Gray,
    Unknown,
}

impl ColorSpace {
    pub fn is_wide_gamut(self) -> bool {
        matches!(self, ColorSpace::DisplayP3 | ColorSpace::Rec2020)
    }

    /// Best-effort identification from an ICC profile.
    ///
    /// Looks at the header's data colorspace and the `desc` tag, whose text
    /// is either ASCII (`desc` type, ICC v2) or UTF-16BE (`mluc`, ICC v4).
    /// Curve and LUT data are never searched.
    pub fn from_icc(profile: &[u8]) -> Self {
        if profile.get(16..20) == Some(b"GRAY".as_slice()) {
            return ColorSpace::Gray;
        }
        let Some(description) = icc_tag(profile, b"desc") else {
            return ColorSpace::Unknown;
        };
        let mentions = |needle: &str| {
            let ascii = needle.as_bytes();
            let utf16: Vec<u8> = needle.bytes().flat_map(|b| [0, b]).collect();
            contains(description, ascii) || contains(description, &utf16)
        };
        if mentions("P3") {
            ColorSpace::DisplayP3
        } else if mentions("2020") || mentions("2100") {
            ColorSpace::Rec2020
        } else if mentions("sRGB") || mentions("IEC61966") {
            ColorSpace::Srgb
        } else {
            ColorSpace::Unknown
        }
    }

    pub(crate) fn for_color_type(color: ColorType) -> Self {
        if color.has_color() {
            ColorSpace::Srgb
        } else {
            ColorSpace::Gray
        }
    }
}

/// Payload of the tag `signature` from an ICC profile's tag table.
fn icc_tag<'a>(profile: &'a [u8], signature: &[u8; 4]) -> Option<&'a [u8]> {
    let be32 = |at: usize| -> Option<usize> {
        let bytes = profile.get(at..at + 4)?;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize)
    };
    let count = be32(128)?;
    (0..count.min(1024)).find_map(|i| {
        let entry = 132 + i * 12;
        if profile.get(entry..entry + 4)? != signature {
            return None;
        }
        let offset = be32(entry + 4)?;
        let size = be32(entry + 8)?;
        profile.get(offset..offset.checked_add(size)?)
    })
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

/// Byte layout of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PixelFormat {
    pub channels: u8,
    pub bits_per_channel: u8,
    pub has_alpha: bool,
}

impl PixelFormat {
    pub const RGBA8: Self = Self {
        channels: 4,
        bits_per_channel: 8,
        has_alpha: true,
    };

    pub fn from_color_type(color: ColorType) -> Self {
        let channels = color.channel_count();
        Self {
            channels,
            bits_per_channel: color.bits_per_pixel() as u8 / channels.max(1),
            has_alpha: color.has_alpha(),
        }
    }

    pub fn bytes_per_pixel(self) -> u64 {
        (self.channels as u64 * self.bits_per_channel as u64).div_ceil(8)
    }
}

/// Encoded image bytes plus an optional format tag.
///
/// A missing tag means "infer from the bytes".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBuffer {
    pub bytes: Arc<[u8]>,
    pub format: Option<String>,
}

impl EncodedBuffer {
    pub fn new(bytes: impl Into<Arc<[u8]>>, format: Option<String>) -> Self {
        Self {
            bytes: bytes.into(),
            format,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A host-supplied image that is not a raster yet (filter graph, vector art).
///
/// Rendering may fail; `None` means no raster could be produced.
pub trait RasterSource: Send + Sync {
    fn dimensions(&self) -> Dimensions;

    /// Layout of the raster `render` will produce.
    fn pixel_format(&self) -> PixelFormat {
        PixelFormat::RGBA8
    }

    fn render(&self) -> Option<DynamicImage>;
}

/// Frames, per-frame durations and loop count of an animated image.
#[derive(Debug, Clone)]
pub struct AnimationData {
    frames: Vec<Arc<DynamicImage>>,
    durations: Vec<Duration>,
    loop_count: u32,
}

impl AnimationData {
    /// Returns `None` when `frames` is empty.
    ///
    /// `durations` may have any length; when it does not match the frame
    /// count it is ignored in favour of a per-format default.
    pub fn new(
        frames: Vec<DynamicImage>,
        durations: Vec<Duration>,
        loop_count: u32,
    ) -> Option<Self> {
        Self::from_shared(frames.into_iter().map(Arc::new).collect(), durations, loop_count)
    }

    pub(crate) fn from_shared(
        frames: Vec<Arc<DynamicImage>>,
        durations: Vec<Duration>,
        loop_count: u32,
    ) -> Option<Self> {
        if frames.is_empty() {
            return None;
        }
        Some(Self {
            frames,
            durations,
            loop_count,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[Arc<DynamicImage>] {
        &self.frames
    }

    /// Durations exactly as supplied, which may not match the frame count.
    pub fn durations(&self) -> &[Duration] {
        &self.durations
    }

    /// `0` loops forever.
    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    pub fn has_consistent_durations(&self) -> bool {
        self.durations.len() == self.frames.len()
    }

    /// Per-frame durations, substituting `default` uniformly on mismatch.
    pub fn effective_durations(&self, default: Duration) -> Vec<Duration> {
        if self.has_consistent_durations() {
            self.durations.clone()
        } else {
            vec![default; self.frames.len()]
        }
    }

    /// Rebuild with every frame passed through `f`, keeping timing and loop count.
    pub(crate) fn try_map_frames<F>(&self, f: F) -> Option<Self>
    where
        F: Fn(&DynamicImage) -> Option<DynamicImage> + Sync + Send,
    {
        use rayon::prelude::*;

        let frames = self
            .frames
            .par_iter()
            .map(|frame| f(frame).map(Arc::new))
            .collect::<Option<Vec<_>>>()?;
        Self::from_shared(frames, self.durations.clone(), self.loop_count)
    }
}

/// What holds a bitmap's pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum BackingKind {
    Raster,
    Encoded,
    Rendered,
}

enum LazySource {
    Encoded(EncodedBuffer),
    Rendered(Box<dyn RasterSource>),
}

struct LazyRaster {
    source: LazySource,
    cell: OnceLock<Option<Arc<DynamicImage>>>,
}

impl LazyRaster {
    fn new(source: LazySource) -> Self {
        Self {
            source,
            cell: OnceLock::new(),
        }
    }

    fn materialize(&self) -> Option<Arc<DynamicImage>> {
        self.cell
            .get_or_init(|| {
                let image = match &self.source {
                    LazySource::Encoded(buffer) => decode_lazily(buffer),
                    LazySource::Rendered(source) => source.render(),
                };
                image.filter(|i| i.width() > 0 && i.height() > 0).map(Arc::new)
            })
            .clone()
    }

    fn is_materialized(&self) -> bool {
        self.cell.get().is_some_and(Option::is_some)
    }
}

fn decode_lazily(buffer: &EncodedBuffer) -> Option<DynamicImage> {
    match image::load_from_memory(&buffer.bytes) {
        Ok(image) => Some(image),
        Err(e) => {
            tracing::warn!(error = %e, bytes = buffer.len(), "Deferred decode failed");
            None
        }
    }
}

/// What the container header says, read without decoding pixels.
struct Header {
    size: Dimensions,
    color: ColorType,
    orientation: Orientation,
    color_space: ColorSpace,
}

fn read_header(buffer: &EncodedBuffer) -> Result<Header> {
    let format = ContainerFormat::detect(&buffer.bytes)
        .or_else(|| buffer.format.as_deref().and_then(ContainerFormat::from_tag))
        .ok_or_else(|| {
            PictorError::UnsupportedFormat("unrecognized image container".to_string())
        })?;
    let reader = ImageReader::with_format(Cursor::new(&buffer.bytes[..]), format.image_format());
    let mut decoder = reader
        .into_decoder()
        .map_err(|e| PictorError::CorruptData(format!("Failed to read header: {e}")))?;
    let (width, height) = decoder.dimensions();
    let color = decoder.color_type();
    let orientation = decoder
        .orientation()
        .map(Orientation::from_image)
        .unwrap_or_default();
    let color_space = decoder
        .icc_profile()
        .ok()
        .flatten()
        .map(|icc| ColorSpace::from_icc(&icc))
        .unwrap_or_else(|| ColorSpace::for_color_type(color));
    Ok(Header {
        size: Dimensions::new(width, height),
        color,
        orientation,
        color_space,
    })
}

#[derive(Clone)]
enum Backing {
    Raster(Arc<DynamicImage>),
    Lazy(Arc<LazyRaster>),
}

/// A decoded (or lazily decodable) raster image with display metadata.
#[derive(Clone)]
pub struct Bitmap {
    backing: Backing,
    kind: BackingKind,
    size: Dimensions,
    pixel_format: PixelFormat,
    scale: f64,
    orientation: Orientation,
    color_space: ColorSpace,
    animation: Option<Arc<AnimationData>>,
}

impl Bitmap {
    /// Wrap an in-memory raster. Scale 1, orientation up, sRGB (or gray).
    pub fn from_image(image: DynamicImage) -> Self {
        Self::from_shared(Arc::new(image))
    }

    pub(crate) fn from_shared(image: Arc<DynamicImage>) -> Self {
        let color = image.color();
        Self {
            size: Dimensions::new(image.width(), image.height()),
            pixel_format: PixelFormat::from_color_type(color),
            color_space: ColorSpace::for_color_type(color),
            backing: Backing::Raster(image),
            kind: BackingKind::Raster,
            scale: 1.0,
            orientation: Orientation::Up,
            animation: None,
        }
    }

    /// An animated bitmap whose primary raster is the first frame.
    pub fn animated(animation: AnimationData) -> Self {
        let first = animation.frames[0].clone();
        let mut bitmap = Self::from_shared(first);
        bitmap.animation = Some(Arc::new(animation));
        bitmap
    }

    /// A bitmap that decodes `buffer` on first touch.
    ///
    /// Only the header is read here, so dimensions, layout, orientation and
    /// colorspace are known up front. Animated containers expose their first
    /// frame; decode with [`Codec::decode`](crate::codec::Codec::decode) to
    /// keep the animation.
    pub fn from_encoded(buffer: EncodedBuffer) -> Result<Self> {
        let header = read_header(&buffer)?;
        Ok(Self {
            backing: Backing::Lazy(Arc::new(LazyRaster::new(LazySource::Encoded(buffer)))),
            kind: BackingKind::Encoded,
            size: header.size,
            pixel_format: PixelFormat::from_color_type(header.color),
            scale: 1.0,
            orientation: header.orientation,
            color_space: header.color_space,
            animation: None,
        })
    }

    /// A bitmap backed by a host render source; not a raster until rasterized.
    pub fn from_source(source: impl RasterSource + 'static) -> Self {
        Self {
            size: source.dimensions(),
            pixel_format: source.pixel_format(),
            backing: Backing::Lazy(Arc::new(LazyRaster::new(LazySource::Rendered(Box::new(
                source,
            ))))),
            kind: BackingKind::Rendered,
            scale: 1.0,
            orientation: Orientation::Up,
            color_space: ColorSpace::Srgb,
            animation: None,
        }
    }

    /// Set the display scale. Non-positive or non-finite values become `1.0`.
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = if scale.is_finite() && scale > 0.0 {
            scale
        } else {
            1.0
        };
        self
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_color_space(mut self, color_space: ColorSpace) -> Self {
        self.color_space = color_space;
        self
    }

    /// Stored raster size, before orientation is applied.
    pub fn pixel_size(&self) -> Dimensions {
        self.size
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    pub fn backing_kind(&self) -> BackingKind {
        self.kind
    }

    pub fn animation(&self) -> Option<&AnimationData> {
        self.animation.as_deref()
    }

    pub fn is_animated(&self) -> bool {
        self.animation.as_ref().is_some_and(|a| a.frame_count() > 1)
    }

    /// Whether a lazy backing has already produced its raster.
    pub fn is_materialized(&self) -> bool {
        match &self.backing {
            Backing::Raster(_) => true,
            Backing::Lazy(lazy) => lazy.is_materialized(),
        }
    }

    /// The primary raster, materializing a lazy backing if needed.
    pub fn raster(&self) -> Option<Arc<DynamicImage>> {
        match &self.backing {
            Backing::Raster(image) => Some(image.clone()),
            Backing::Lazy(lazy) => lazy.materialize(),
        }
    }

    /// The primary raster with the stored orientation applied.
    pub(crate) fn upright_raster(&self) -> Option<DynamicImage> {
        let raster = self.raster()?;
        let mut image = (*raster).clone();
        if self.orientation != Orientation::Up {
            image.apply_orientation(self.orientation.to_image());
        }
        Some(image)
    }

    /// Whether both handles share the same backing store.
    pub fn ptr_eq(&self, other: &Bitmap) -> bool {
        match (&self.backing, &other.backing) {
            (Backing::Raster(a), Backing::Raster(b)) => Arc::ptr_eq(a, b),
            (Backing::Lazy(a), Backing::Lazy(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// A raster-backed bitmap with this bitmap's metadata and new pixels.
    pub(crate) fn derive(&self, image: DynamicImage, animation: Option<AnimationData>) -> Self {
        let mut bitmap = match animation {
            Some(animation) => Self::animated(animation),
            None => Self::from_image(image),
        };
        bitmap.scale = self.scale;
        bitmap.orientation = self.orientation;
        bitmap.color_space = self.color_space;
        bitmap
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("kind", &self.kind)
            .field("size", &self.size)
            .field("pixel_format", &self.pixel_format)
            .field("scale", &self.scale)
            .field("orientation", &self.orientation)
            .field("color_space", &self.color_space)
            .field("frames", &self.animation.as_ref().map(|a| a.frame_count()))
            .finish()
    }
}
