//! Engine configuration.
//!
//! Handles loading, validating, and merging `config.toml` files. Stock
//! defaults are the base layer; a user file only needs the keys it wants to
//! override.
//!
//! The engine never reads ambient state: everything that would otherwise be
//! a platform global (the main display scale, decode limits) is a value
//! here, passed in by the host.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [display]
//! reference_scale = 2.0        # Pixels per point of the reference display
//!
//! [encoding]
//! photo_min_pixels = 65536     # Opaque images at least this large default to JPEG
//! gif_speed = 10               # GIF quantizer speed, 1 (best) to 30 (fastest)
//!
//! [decode]
//! max_alloc_bytes = 536870912  # Refuse decodes needing more memory than this
//! # max_width = 16384          # Refuse images wider than this
//! # max_height = 16384         # Refuse images taller than this
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Engine configuration loaded from `config.toml`.
///
/// All fields have sensible defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Reference display used for point-size conversion.
    pub display: DisplayConfig,
    /// Format selection and encoder tuning.
    pub encoding: EncodingConfig,
    /// Resource limits applied while decoding.
    pub decode: DecodeConfig,
}

impl EngineConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let scale = self.display.reference_scale;
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ConfigError::Validation(
                "display.reference_scale must be a positive number".into(),
            ));
        }
        if !(1..=30).contains(&self.encoding.gif_speed) {
            return Err(ConfigError::Validation(
                "encoding.gif_speed must be 1-30".into(),
            ));
        }
        if self.decode.max_width == Some(0) || self.decode.max_height == Some(0) {
            return Err(ConfigError::Validation(
                "decode.max_width and decode.max_height must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Reference display settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisplayConfig {
    /// Pixels per point of the display sizes are reported for. Read by
    /// [`inspect::point_size_for`](crate::inspect::point_size_for) and
    /// [`inspect::describe_for`](crate::inspect::describe_for).
    pub reference_scale: f64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            reference_scale: 2.0,
        }
    }
}

/// Encoder selection and tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncodingConfig {
    /// Pixel count at which an opaque still is treated as a photograph
    /// (JPEG) rather than a graphic (PNG) when no preference is given.
    pub photo_min_pixels: u64,
    /// GIF palette quantizer speed, 1 (best quality) to 30 (fastest).
    pub gif_speed: i32,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            photo_min_pixels: 256 * 256,
            gif_speed: 10,
        }
    }
}

/// Decode resource limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecodeConfig {
    /// Maximum image width. When absent, any width is accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_width: Option<u32>,
    /// Maximum image height. When absent, any height is accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_height: Option<u32>,
    /// Maximum bytes a single decode may allocate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_alloc_bytes: Option<u64>,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            max_width: None,
            max_height: None,
            max_alloc_bytes: Some(512 * 1024 * 1024),
        }
    }
}

impl DecodeConfig {
    /// The equivalent `image` crate limits.
    pub fn limits(&self) -> image::Limits {
        let mut limits = image::Limits::no_limits();
        limits.max_image_width = self.max_width;
        limits.max_image_height = self.max_height;
        limits.max_alloc = self.max_alloc_bytes;
        limits
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(EngineConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if no `config.toml` exists in the directory.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = path.join("config.toml");
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<EngineConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: EngineConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `config.toml` in the given directory.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(root: &Path) -> Result<EngineConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(root)?;
    resolve_config(base, overlay)
}

/// Parse config from a TOML string, on top of stock defaults.
pub fn parse_config(content: &str) -> Result<EngineConfig, ConfigError> {
    let overlay: toml::Value = toml::from_str(content)?;
    resolve_config(stock_defaults_value(), Some(overlay))
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
pub fn stock_config_toml() -> &'static str {
    r##"# Pictor Configuration
# ====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Reference display
# ---------------------------------------------------------------------------
[display]
# Pixels per point of the display point sizes are reported for.
# 1.0 for standard density, 2.0 or 3.0 for high density screens.
reference_scale = 2.0

# ---------------------------------------------------------------------------
# Encoding
# ---------------------------------------------------------------------------
[encoding]
# When no format is requested and no size/fidelity preference is given,
# opaque images with at least this many pixels are encoded as JPEG,
# smaller ones as PNG.
photo_min_pixels = 65536

# GIF palette quantizer speed: 1 = best quality, 30 = fastest.
gif_speed = 10

# ---------------------------------------------------------------------------
# Decode limits
# ---------------------------------------------------------------------------
[decode]
# Refuse decodes that would allocate more than this many bytes.
max_alloc_bytes = 536870912

# Refuse images larger than these dimensions. Unlimited when omitted.
# max_width = 16384
# max_height = 16384
"##
}
