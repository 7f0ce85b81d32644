//! Atomic file operations.
//!
//! State and token files are replaced, never edited in place:
//! write a `.tmp` sibling, fsync it, then rename over the target.

use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
#[cfg(unix)]
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

/// Permissions for directories created for private files.
#[cfg(unix)]
const PRIVATE_DIR_MODE: u32 = 0o700;

/// Permissions for private files.
#[cfg(unix)]
const PRIVATE_FILE_MODE: u32 = 0o600;

/// The temp sibling used while replacing `path`.
#[must_use]
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Create `dir` and its parents, owner-only on unix.
///
/// # Errors
///
/// Returns an error if a directory cannot be created.
pub fn create_private_dir(dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(PRIVATE_DIR_MODE);
    builder.create(dir)
}

/// Write content to a file atomically with owner-only permissions.
///
/// This function:
/// 1. Creates the parent directory if needed
/// 2. Removes any stale `<path>.tmp` left by an earlier crash
/// 3. Writes content to a fresh `<path>.tmp`
/// 4. Calls `fsync` to ensure data is on disk
/// 5. Renames the temp file over the target
///
/// On any failure after the temp file is created it is removed, and the
/// original file (if any) remains untouched.
///
/// # Errors
///
/// Returns an error if any file operation fails.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_private_dir(parent)?;
    }

    let temp = temp_path(path);
    match fs::remove_file(&temp) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let mut opts = OpenOptions::new();
    opts.write(true).create_new(true);
    #[cfg(unix)]
    opts.mode(PRIVATE_FILE_MODE);
    let file = opts.open(&temp)?;

    let result = write_synced(file, content).and_then(|()| fs::rename(&temp, path));
    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

fn write_synced(file: fs::File, content: &[u8]) -> io::Result<()> {
    let mut writer = BufWriter::new(file);
    writer.write_all(content)?;
    writer.flush()?;
    writer.get_ref().sync_all()
}
