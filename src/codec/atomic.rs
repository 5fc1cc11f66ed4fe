//! Crash-safe file replacement.
//!
//! Output goes to a temporary file in the destination's directory, is
//! flushed to disk, then renamed over the destination. A rename within one
//! directory is atomic, so readers see either the old file or the complete
//! new one. On any error the temporary file is removed and the destination
//! is untouched.

use crate::error::{PictorError, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Run `write` against a temporary file and move it to `path` on success.
pub fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    write(tmp.as_file_mut())?;
    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| PictorError::Io(e.error))?;
    Ok(())
}
