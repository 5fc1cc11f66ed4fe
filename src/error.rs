//! Crate-wide error type.
//!
//! Every fallible operation reports one of these kinds synchronously. Nothing
//! is retried internally.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PictorError {
    /// The format tag or container is not decodable/encodable here.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    /// The container was recognized but its contents are malformed or truncated.
    #[error("Corrupt image data: {0}")]
    CorruptData(String),
    /// The target format cannot hold the requested number of frames.
    #[error("Format {format} cannot hold an animation of {frames} frames")]
    IncompatibleAnimation { format: String, frames: usize },
    /// Backing-store allocation or conversion failure during a transform.
    #[error("Transform failed: {0}")]
    TransformFailed(String),
    /// Any failure inside the effects pipeline. No partial result exists.
    #[error("Effects failed: {0}")]
    EffectsFailed(String),
    /// The encoder rejected the pixels it was given.
    #[error("Encode failed: {0}")]
    EncodeFailed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, PictorError>;
