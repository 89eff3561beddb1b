//! Write-rename helper for output artifacts.
//!
//! Data goes to a temporary file created next to the destination, is flushed
//! to disk, and is then persisted (renamed) over the final path. A failure at
//! any step leaves the destination untouched and removes the temporary file.

use crate::error::{Result, SkylineError};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let write_err = |source| SkylineError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(write_err)?;
            parent
        }
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(data).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    Ok(())
}
