//! # Pictor
//!
//! An image transform and codec engine. Given a decoded bitmap (optionally
//! animated) or encoded bytes, it inspects, fits, filters and re-encodes it.
//!
//! # Architecture
//!
//! Callers hand a [`Bitmap`] to the inspector, the geometric transformer or
//! the effects pipeline for in-memory work, or hand bytes to the [`Codec`] to
//! get a bitmap (and back again):
//!
//! ```text
//! bytes ──decode──▶ Bitmap ──scale / orient / effects──▶ Bitmap ──encode──▶ bytes
//!                     │
//!                     └──inspect──▶ size, alpha, gamut, frames, memory
//! ```
//!
//! Every transform returns a new bitmap; inputs are never mutated. A
//! `Bitmap` is a cheap handle, so "returning the input unchanged" means
//! returning a clone that shares the same pixels.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`bitmap`] | The data model: `Bitmap`, backings, orientation, colorspace, animation |
//! | [`imaging`] | Fit geometry, parameter types, the raster backend seam, geometric transforms |
//! | [`inspect`] | Read-only queries: displayed size, point size, alpha, gamut, frame count, memory |
//! | [`effects`] | Blur, saturation, tint and mask, in that order |
//! | [`codec`] | Format registry, decode, encode, atomic file output |
//! | [`config`] | `config.toml` loading, validation and merging |
//! | [`error`] | The crate error type |
//!
//! # Design Decisions
//!
//! ## Ceiling Pixel Alignment
//!
//! Fitted sizes are rounded **up** (with a small tolerance for floating
//! noise), so an aspect-fill result always covers its target box and a
//! bitmap already at its fitted size is recognized as such.
//!
//! ## A Fallible Resampler, Made Explicit
//!
//! Resampling goes through the [`imaging::RasterBackend`] trait, whose
//! `resize` may return `None`. [`imaging::scale`] is the one place that
//! absorbs that failure: it logs a warning and returns the original bitmap.
//! Everything else reports errors as [`error::PictorError`].
//!
//! ## No Ambient Globals
//!
//! The reference display scale, decode limits and format thresholds come
//! from [`config::EngineConfig`] or explicit arguments, never from process
//! state.
//!
//! ## Lazy Backings
//!
//! Encoded and host-rendered bitmaps materialize on first touch, at most
//! once, even under concurrent access.
//!
//! ## Logging
//!
//! The crate emits `tracing` events (`debug` for normal operation, `warn`
//! for absorbed failures) and installs no subscriber.

pub mod bitmap;
pub mod codec;
pub mod config;
pub mod effects;
pub mod error;
pub mod imaging;
pub mod inspect;

pub use bitmap::{AnimationData, Bitmap, ColorSpace, EncodedBuffer, Orientation};
pub use codec::{Codec, Decoded};
pub use error::{PictorError, Result};

#[cfg(test)]
pub(crate) mod test_helpers;
