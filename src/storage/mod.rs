//! On-disk profile storage

pub mod paths;
pub mod profiles;

use crate::{LocalshiftError, Result};
use std::io::Write;
use std::path::Path;

/// Replace `path` with `contents` by writing a sibling temp file and renaming it over
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .map_err(LocalshiftError::storage(parent))?;
    tmp.write_all(contents)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(LocalshiftError::storage(tmp.path()))?;
    tmp.persist(path)
        .map_err(|e| LocalshiftError::storage(path)(e.error))?;
    Ok(())
}
