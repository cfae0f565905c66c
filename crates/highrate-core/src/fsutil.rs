//! Temp-then-rename helpers for the local output tree.
//!
//! Every artifact is written to `<final>.part` first and renamed into place
//! only once complete, so a file at a final path is never a partial write.

use std::ffi::OsString;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Suffix appended to in-progress files
pub const PART_SUFFIX: &str = ".part";

/// Copy buffer size (64KB)
const COPY_BUF_SIZE: usize = 64 * 1024;

/// `<path>.part` for a final artifact path
pub fn part_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(PART_SUFFIX);
    PathBuf::from(name)
}

/// True if `path` is a regular file with non-zero size
pub fn is_nonempty_file(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|m| m.is_file() && m.len() > 0)
}

/// Remove a file, treating "already gone" as success.
pub fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Remove stale `.part` files anywhere under `root`.
///
/// Returns the number of files removed. A missing root is not an error.
pub fn cleanup_part_files(root: &Path) -> io::Result<usize> {
    if !root.exists() {
        return Ok(0);
    }
    let pattern = format!("{}/**/*{PART_SUFFIX}", glob::Pattern::escape(&root.to_string_lossy()));
    let paths = glob::glob(&pattern).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let mut removed = 0;
    for path in paths.flatten() {
        if path.is_file() {
            log::warn!("Removing stale partial file: {}", path.display());
            remove_if_exists(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Copy `reader` into `writer` in chunks, checking `cancelled` between chunks.
///
/// `on_bytes` is called with the size of each chunk written. Returns the
/// total byte count, or `ErrorKind::Interrupted` if cancelled mid-stream.
pub fn copy_cancellable(
    reader: &mut dyn Read,
    writer: &mut dyn Write,
    cancelled: &dyn Fn() -> bool,
    mut on_bytes: impl FnMut(u64),
) -> io::Result<u64> {
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut total = 0u64;
    loop {
        if cancelled() {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "transfer cancelled"));
        }
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buf[..n])?;
        total += n as u64;
        on_bytes(n as u64);
    }
    writer.flush()?;
    Ok(total)
}
