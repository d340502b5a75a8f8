//! Filesystem helpers for replacing a workbook without ever leaving it half-written.
//!
//! The new content goes to a temp file in the destination directory (same device, so the
//! rename is atomic), is flushed and synced, and is then renamed over the destination.

use crate::error::SplitterError;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

fn parent_dir_or_dot(path: &Path) -> &Path {
    // `Path::parent` returns `Some("")` for bare relative file names like `book.xlsx`.
    path.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Atomically replaces `dest` with `bytes`.
///
/// If anything fails before the final rename, `dest` is left untouched and the temp file
/// is removed when it goes out of scope.
pub fn atomic_write_bytes(dest: impl AsRef<Path>, bytes: &[u8]) -> Result<(), SplitterError> {
    let dest = dest.as_ref();
    let dir = parent_dir_or_dot(dest);
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.as_file_mut().write_all(bytes)?;
    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|error| error.error)?;

    // Best-effort: the file is already in place
    let _ = File::open(dir).and_then(|directory| directory.sync_all());
    Ok(())
}
