//! Rasterization backend trait.
//!
//! The [`RasterBackend`] trait is the seam around the pixel primitives the
//! transformer depends on: resampling and luminance reduction. Both may fail
//! by returning `None`; callers decide whether that failure is surfaced or
//! absorbed (see [`scale`](super::operations::scale)).
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate. Tests substitute a mock that records calls and can simulate the
//! known resampling defect.

use image::DynamicImage;

/// Trait for rasterization backends.
///
/// Implementations must be `Sync` so animated frames can be processed in
/// parallel against a shared backend.
pub trait RasterBackend: Sync {
    /// Resample `image` to exactly `width` × `height`.
    ///
    /// `None` means the primitive produced no image.
    fn resize(&self, image: &DynamicImage, width: u32, height: u32) -> Option<DynamicImage>;

    /// Reduce `image` to luminance, keeping any alpha channel.
    fn grayscale(&self, image: &DynamicImage) -> Option<DynamicImage>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Mock backend that records operations and can simulate failure.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon's par_iter.
    #[derive(Default)]
    pub struct MockBackend {
        pub operations: Mutex<Vec<RecordedOp>>,
        /// When set, every resize returns `None`, like the platform defect.
        pub fail_resize: AtomicBool,
        pub fail_grayscale: AtomicBool,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Resize {
            from: (u32, u32),
            width: u32,
            height: u32,
        },
        Grayscale {
            width: u32,
            height: u32,
        },
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            let backend = Self::default();
            backend.fail_resize.store(true, Ordering::SeqCst);
            backend.fail_grayscale.store(true, Ordering::SeqCst);
            backend
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }
    }

    impl RasterBackend for MockBackend {
        fn resize(&self, image: &DynamicImage, width: u32, height: u32) -> Option<DynamicImage> {
            self.operations.lock().unwrap().push(RecordedOp::Resize {
                from: (image.width(), image.height()),
                width,
                height,
            });
            if self.fail_resize.load(Ordering::SeqCst) {
                return None;
            }
            Some(image.resize_exact(width, height, image::imageops::FilterType::Nearest))
        }

        fn grayscale(&self, image: &DynamicImage) -> Option<DynamicImage> {
            self.operations.lock().unwrap().push(RecordedOp::Grayscale {
                width: image.width(),
                height: image.height(),
            });
            if self.fail_grayscale.load(Ordering::SeqCst) {
                return None;
            }
            Some(image.grayscale())
        }
    }

    #[test]
    fn mock_records_resize() {
        let backend = MockBackend::new();
        let image = DynamicImage::new_rgba8(40, 20);

        let resized = backend.resize(&image, 20, 10).unwrap();
        assert_eq!((resized.width(), resized.height()), (20, 10));

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 1);
        assert!(matches!(
            &ops[0],
            RecordedOp::Resize {
                from: (40, 20),
                width: 20,
                height: 10,
            }
        ));
    }

    #[test]
    fn failing_mock_returns_none_but_still_records() {
        let backend = MockBackend::failing();
        let image = DynamicImage::new_rgba8(4, 4);

        assert!(backend.resize(&image, 2, 2).is_none());
        assert!(backend.grayscale(&image).is_none());
        assert_eq!(backend.get_operations().len(), 2);
    }
}
