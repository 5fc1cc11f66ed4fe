//! Encoding and decoding, single frame and animated.
//!
//! [`Codec`] bundles a [`FormatRegistry`] with the encoding and decode
//! settings from [`EngineConfig`]. It is stateless between calls and can be
//! shared across threads.
//!
//! ```no_run
//! # use pictor::codec::Codec;
//! # use pictor::config::EngineConfig;
//! # use pictor::imaging::EncodingSpec;
//! let codec = Codec::new(&EngineConfig::default());
//! let decoded = codec.decode_file("in.gif".as_ref(), None)?;
//! let bytes = codec.encode(&decoded.bitmap, &EncodingSpec::new("public.png"))?;
//! # Ok::<(), pictor::error::PictorError>(())
//! ```

mod atomic;
mod decode;
mod encode;
mod formats;

pub use atomic::write_atomically;
pub use decode::Decoded;
pub use formats::{
    ContainerFormat, DEFAULT_FRAME_DURATION, FormatCapabilities, FormatRegistry, NativeFormats,
};

use crate::bitmap::Bitmap;
use crate::config::{DecodeConfig, EncodingConfig, EngineConfig};
use crate::error::{PictorError, Result};
use crate::imaging::EncodingSpec;
use crate::inspect;
use std::fs;
use std::path::Path;

/// Trade-off to apply when picking a format for an opaque still.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizePreference {
    /// Photographs (large) as JPEG, graphics (small) as PNG.
    #[default]
    Balanced,
    /// Prefer the smaller lossy encoding.
    Smaller,
    /// Prefer the lossless encoding.
    Fidelity,
}

/// Hints for [`Codec::recommended_format`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecommendOptions {
    /// Treat the bitmap as translucent without scanning it.
    pub assume_alpha: bool,
    /// Treat the bitmap as opaque without scanning it.
    pub assume_opaque: bool,
    pub preference: SizePreference,
}

/// Encoder/decoder over a format registry.
#[derive(Debug, Clone)]
pub struct Codec<R: FormatRegistry = NativeFormats> {
    registry: R,
    encoding: EncodingConfig,
    decode: DecodeConfig,
}

impl Codec<NativeFormats> {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_registry(NativeFormats, config)
    }
}

impl Default for Codec<NativeFormats> {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl<R: FormatRegistry> Codec<R> {
    pub fn with_registry(registry: R, config: &EngineConfig) -> Self {
        Self {
            registry,
            encoding: config.encoding.clone(),
            decode: config.decode.clone(),
        }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Pick a format tag for `bitmap` when the caller has none.
    ///
    /// | Bitmap | Choice |
    /// |---|---|
    /// | animated, translucent | PNG (APNG) |
    /// | animated, opaque | GIF |
    /// | translucent | PNG |
    /// | opaque, `Smaller` | JPEG |
    /// | opaque, `Fidelity` | PNG |
    /// | opaque, `Balanced` | JPEG from `photo_min_pixels` up, else PNG |
    ///
    /// A choice the registry cannot encode falls back to PNG.
    pub fn recommended_format(&self, bitmap: &Bitmap, options: RecommendOptions) -> &'static str {
        let animated = bitmap.is_animated();
        let alpha = if options.assume_alpha {
            true
        } else if options.assume_opaque {
            false
        } else {
            inspect::has_alpha(bitmap, true)
        };

        let choice = match (animated, alpha) {
            (true, true) => ContainerFormat::Png,
            (true, false) => ContainerFormat::Gif,
            (false, true) => ContainerFormat::Png,
            (false, false) => match options.preference {
                SizePreference::Smaller => ContainerFormat::Jpeg,
                SizePreference::Fidelity => ContainerFormat::Png,
                SizePreference::Balanced => {
                    if inspect::dimensions(bitmap).area() >= self.encoding.photo_min_pixels {
                        ContainerFormat::Jpeg
                    } else {
                        ContainerFormat::Png
                    }
                }
            },
        };

        let usable = self
            .registry
            .capabilities(choice)
            .is_some_and(|c| c.encode && (!animated || c.encode_animation));
        if usable {
            choice.tag()
        } else {
            ContainerFormat::Png.tag()
        }
    }

    /// Decode `bytes`. The container is sniffed; `hint` is used only when
    /// sniffing fails.
    pub fn decode(&self, bytes: &[u8], hint: Option<&str>) -> Result<Decoded> {
        decode::decode_bytes(&self.registry, &self.decode, bytes, hint)
    }

    /// Read and decode a whole file. The file extension serves as a hint
    /// when none is given.
    pub fn decode_file(&self, path: &Path, hint: Option<&str>) -> Result<Decoded> {
        let bytes = fs::read(path)?;
        let extension_hint = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ContainerFormat::from_extension)
            .map(ContainerFormat::tag);
        self.decode(&bytes, hint.or(extension_hint))
    }

    /// Encode `bitmap` (every frame, if animated) per `spec`.
    ///
    /// Without a format tag the [recommended](Self::recommended_format)
    /// format is used.
    pub fn encode(&self, bitmap: &Bitmap, spec: &EncodingSpec) -> Result<Vec<u8>> {
        let tag = match spec.format.as_deref() {
            Some(tag) => tag,
            None => self.recommended_format(bitmap, RecommendOptions::default()),
        };
        self.encode_as(bitmap, tag, spec)
    }

    /// Encode to `path`.
    ///
    /// Without a format tag the path's extension decides, then the
    /// recommendation. With `atomic`, the destination is replaced in one
    /// step and left untouched on any failure.
    pub fn encode_file(
        &self,
        bitmap: &Bitmap,
        path: &Path,
        spec: &EncodingSpec,
        atomic: bool,
    ) -> Result<()> {
        let tag = match spec.format.as_deref() {
            Some(tag) => tag,
            None => path
                .extension()
                .and_then(|e| e.to_str())
                .and_then(ContainerFormat::from_extension)
                .map(ContainerFormat::tag)
                .unwrap_or_else(|| self.recommended_format(bitmap, RecommendOptions::default())),
        };

        if atomic {
            write_atomically(path, |w| {
                let bytes = self.encode_as(bitmap, tag, spec)?;
                w.write_all(&bytes)?;
                Ok(())
            })
        } else {
            let bytes = self.encode_as(bitmap, tag, spec)?;
            fs::write(path, bytes)?;
            Ok(())
        }
    }

    fn encode_as(&self, bitmap: &Bitmap, tag: &str, spec: &EncodingSpec) -> Result<Vec<u8>> {
        let format = self
            .registry
            .lookup(tag)
            .ok_or_else(|| PictorError::UnsupportedFormat(tag.to_string()))?;
        let caps = self
            .registry
            .capabilities(format)
            .filter(|c| c.encode)
            .ok_or_else(|| PictorError::UnsupportedFormat(format!("{tag} cannot be encoded")))?;
        encode::encode_bitmap(&self.encoding, bitmap, format, caps, spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::{AnimationData, ColorSpace, Orientation};
    use crate::imaging::{Dimensions, EncodingOptions};
    use crate::test_helpers::{gradient_rgba, solid, translucent_corner};
    use std::time::Duration;
    use tempfile::TempDir;

    fn codec() -> Codec {
        Codec::default()
    }

    fn colored_frames(n: usize) -> Vec<image::DynamicImage> {
        (0..n)
            .map(|i| solid(12, 8, [(i * 60) as u8, 100, 200 - (i * 40) as u8, 255]))
            .collect()
    }

    fn animation(n: usize, durations: Vec<Duration>, loop_count: u32) -> Bitmap {
        Bitmap::animated(AnimationData::new(colored_frames(n), durations, loop_count).unwrap())
    }

    // =========================================================================
    // recommended_format
    // =========================================================================

    #[test]
    fn recommends_by_alpha_and_animation() {
        let codec = codec();
        let opaque_anim = animation(2, Vec::new(), 0);
        let defaults = RecommendOptions::default();
        assert_eq!(codec.recommended_format(&opaque_anim, defaults), "com.compuserve.gif");

        let assume_alpha = RecommendOptions {
            assume_alpha: true,
            ..RecommendOptions::default()
        };
        assert_eq!(codec.recommended_format(&opaque_anim, assume_alpha), "public.png");

        let translucent = Bitmap::from_image(translucent_corner(600, 600));
        assert_eq!(codec.recommended_format(&translucent, defaults), "public.png");
    }

    #[test]
    fn recommends_by_size_for_opaque_stills() {
        let codec = codec();
        let photo = Bitmap::from_image(gradient_rgba(300, 300));
        let icon = Bitmap::from_image(gradient_rgba(32, 32));

        assert_eq!(codec.recommended_format(&photo, RecommendOptions::default()), "public.jpeg");
        assert_eq!(codec.recommended_format(&icon, RecommendOptions::default()), "public.png");

        let smaller = RecommendOptions {
            preference: SizePreference::Smaller,
            ..RecommendOptions::default()
        };
        assert_eq!(codec.recommended_format(&icon, smaller), "public.jpeg");

        let fidelity = RecommendOptions {
            preference: SizePreference::Fidelity,
            assume_opaque: true,
            ..RecommendOptions::default()
        };
        assert_eq!(codec.recommended_format(&photo, fidelity), "public.png");
    }

    struct NoGif;

    impl FormatRegistry for NoGif {
        fn capabilities(&self, format: ContainerFormat) -> Option<FormatCapabilities> {
            (format != ContainerFormat::Gif).then(|| format.capabilities())
        }
    }

    #[test]
    fn recommendation_falls_back_to_png() {
        let codec = Codec::with_registry(NoGif, &EngineConfig::default());
        let anim = animation(2, Vec::new(), 0);
        assert_eq!(codec.recommended_format(&anim, RecommendOptions::default()), "public.png");
    }

    // =========================================================================
    // encode / decode
    // =========================================================================

    #[test]
    fn gif_roundtrip_keeps_timing_and_loops() {
        let codec = codec();
        let durations = vec![
            Duration::from_millis(50),
            Duration::from_millis(120),
            Duration::from_millis(200),
        ];
        let bitmap = animation(3, durations.clone(), 3);

        let bytes = codec.encode(&bitmap, &EncodingSpec::new("com.compuserve.gif")).unwrap();
        let decoded = codec.decode(&bytes, None).unwrap();
        let anim = decoded.animation().unwrap();

        assert_eq!(decoded.format, ContainerFormat::Gif);
        assert_eq!(anim.frame_count(), 3);
        assert_eq!(anim.durations(), &durations[..]);
        assert_eq!(anim.loop_count(), 3);
        assert_eq!(decoded.bitmap.pixel_size(), Dimensions::new(12, 8));
    }

    #[test]
    fn gif_infinite_loop_roundtrips() {
        let codec = codec();
        let bitmap = animation(2, vec![Duration::from_millis(30); 2], 0);
        let bytes = codec.encode(&bitmap, &EncodingSpec::new("com.compuserve.gif")).unwrap();
        assert_eq!(codec.decode(&bytes, None).unwrap().animation().unwrap().loop_count(), 0);
    }

    #[test]
    fn apng_roundtrip_keeps_timing_and_loops() {
        let codec = codec();
        let durations = vec![Duration::from_millis(40), Duration::from_millis(250)];
        let bitmap = animation(2, durations.clone(), 2);

        let bytes = codec.encode(&bitmap, &EncodingSpec::new("public.png")).unwrap();
        let decoded = codec.decode(&bytes, None).unwrap();
        let anim = decoded.animation().unwrap();

        assert_eq!(decoded.format, ContainerFormat::Png);
        assert_eq!(anim.frame_count(), 2);
        assert_eq!(anim.durations(), &durations[..]);
        assert_eq!(anim.loop_count(), 2);
    }

    #[test]
    fn apng_keeps_frame_delays_longer_than_a_minute() {
        let codec = codec();
        let durations = vec![Duration::from_secs(70), Duration::from_millis(20)];
        let bitmap = animation(2, durations.clone(), 0);

        let bytes = codec.encode(&bitmap, &EncodingSpec::new("public.png")).unwrap();
        let decoded = codec.decode(&bytes, None).unwrap();
        assert_eq!(decoded.animation().unwrap().durations(), &durations[..]);
    }

    #[test]
    fn explicit_loop_count_and_durations_override_bitmap() {
        let codec = codec();
        let bitmap = animation(2, vec![Duration::from_millis(40); 2], 1);
        let spec = EncodingSpec::new("public.png")
            .with_loop_count(0)
            .with_frame_durations(vec![Duration::from_millis(90); 2]);

        let bytes = codec.encode(&bitmap, &spec).unwrap();
        let anim = codec.decode(&bytes, None).unwrap().bitmap;
        let anim = anim.animation().unwrap();
        assert_eq!(anim.loop_count(), 0);
        assert_eq!(anim.durations(), &[Duration::from_millis(90); 2]);
    }

    #[test]
    fn mismatched_durations_encode_with_default() {
        let codec = codec();
        let bitmap = animation(3, vec![Duration::from_millis(40)], 0);
        let bytes = codec.encode(&bitmap, &EncodingSpec::new("com.compuserve.gif")).unwrap();
        let decoded = codec.decode(&bytes, None).unwrap();
        assert_eq!(
            decoded.animation().unwrap().durations(),
            &[DEFAULT_FRAME_DURATION; 3]
        );
    }

    #[test]
    fn animation_into_jpeg_is_incompatible() {
        let bitmap = animation(3, Vec::new(), 0);
        let err = codec().encode(&bitmap, &EncodingSpec::new("public.jpeg")).unwrap_err();
        assert!(matches!(
            err,
            PictorError::IncompatibleAnimation { frames: 3, .. }
        ));
    }

    #[test]
    fn animation_into_webp_is_incompatible() {
        let bitmap = animation(2, Vec::new(), 0);
        let err = codec().encode(&bitmap, &EncodingSpec::new("org.webmproject.webp")).unwrap_err();
        assert!(matches!(err, PictorError::IncompatibleAnimation { .. }));
    }

    #[test]
    fn unknown_target_is_unsupported() {
        let bitmap = Bitmap::from_image(gradient_rgba(4, 4));
        let err = codec().encode(&bitmap, &EncodingSpec::new("public.heic")).unwrap_err();
        assert!(matches!(err, PictorError::UnsupportedFormat(_)));
    }

    #[test]
    fn stills_roundtrip_dimensions_in_every_format() {
        let codec = codec();
        let bitmap = Bitmap::from_image(gradient_rgba(23, 17));
        for format in ContainerFormat::ALL {
            let bytes = codec.encode(&bitmap, &EncodingSpec::new(format.tag())).unwrap();
            let decoded = codec.decode(&bytes, None).unwrap();
            assert_eq!(decoded.format, format);
            assert_eq!(decoded.bitmap.pixel_size(), Dimensions::new(23, 17), "{format}");
        }
    }

    #[test]
    fn jpeg_quality_changes_size() {
        let codec = codec();
        let bitmap = Bitmap::from_image(gradient_rgba(128, 128));
        let low = codec
            .encode(&bitmap, &EncodingSpec::new("public.jpeg").with_quality(0.1))
            .unwrap();
        let high = codec
            .encode(&bitmap, &EncodingSpec::new("public.jpeg").with_quality(1.0))
            .unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn quality_is_ignored_for_lossless() {
        let codec = codec();
        let bitmap = Bitmap::from_image(gradient_rgba(16, 16));
        let a = codec.encode(&bitmap, &EncodingSpec::new("public.png").with_quality(0.1)).unwrap();
        let b = codec.encode(&bitmap, &EncodingSpec::new("public.png").with_quality(1.0)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn orientation_is_baked_into_pixels() {
        let codec = codec();
        let bitmap = Bitmap::from_image(gradient_rgba(10, 4)).with_orientation(Orientation::Right);
        let bytes = codec.encode(&bitmap, &EncodingSpec::new("public.png")).unwrap();
        let decoded = codec.decode(&bytes, None).unwrap();
        assert_eq!(decoded.bitmap.pixel_size(), Dimensions::new(4, 10));
        assert_eq!(decoded.bitmap.orientation(), Orientation::Up);
    }

    #[test]
    fn grayscale_option_encodes_gray() {
        let codec = codec();
        let bitmap = Bitmap::from_image(gradient_rgba(8, 8));
        let spec = EncodingSpec::new("public.png").with_options(EncodingOptions {
            grayscale: true,
            no_alpha: true,
        });
        let decoded = codec.decode(&codec.encode(&bitmap, &spec).unwrap(), None).unwrap();
        assert_eq!(decoded.bitmap.color_space(), ColorSpace::Gray);
        assert!(!decoded.bitmap.pixel_format().has_alpha);
    }

    #[test]
    fn encode_without_format_uses_recommendation() {
        let codec = codec();
        let bitmap = Bitmap::from_image(translucent_corner(8, 8));
        let bytes = codec.encode(&bitmap, &EncodingSpec::default()).unwrap();
        assert_eq!(ContainerFormat::detect(&bytes), Some(ContainerFormat::Png));
    }

    // =========================================================================
    // Files
    // =========================================================================

    #[test]
    fn encode_file_then_decode_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("frame.gif");
        let codec = codec();
        let bitmap = animation(2, vec![Duration::from_millis(60); 2], 0);

        codec.encode_file(&bitmap, &path, &EncodingSpec::default(), true).unwrap();
        let decoded = codec.decode_file(&path, None).unwrap();
        assert_eq!(decoded.format, ContainerFormat::Gif);
        assert_eq!(decoded.animation().unwrap().frame_count(), 2);
    }

    #[test]
    fn failed_atomic_encode_keeps_existing_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out.jpg");
        fs::write(&path, b"previous").unwrap();

        let bitmap = animation(3, Vec::new(), 0);
        let result = codec().encode_file(&bitmap, &path, &EncodingSpec::default(), true);

        assert!(matches!(result, Err(PictorError::IncompatibleAnimation { .. })));
        assert_eq!(fs::read(&path).unwrap(), b"previous");
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn decode_file_missing_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let result = codec().decode_file(&tmp.path().join("nope.png"), None);
        assert!(matches!(result, Err(PictorError::Io(_))));
    }
}
