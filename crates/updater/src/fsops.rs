use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// A file an update needs is not where it should be.
#[derive(Debug, Error)]
#[error("required file is missing: {}", path.display())]
pub struct MissingFileError {
    pub path: PathBuf,
}

/// Fails with [`MissingFileError`] naming `path` unless it is a regular file.
pub fn require_file(path: &Path) -> Result<(), MissingFileError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(MissingFileError {
            path: path.to_path_buf(),
        })
    }
}

/// Moves every regular file directly inside `src` into `dst`, replacing
/// files of the same name. Subdirectories of `src` are left where they are.
///
/// Returns the new paths in `dst`.
pub fn commit_files(src: &Path, dst: &Path) -> io::Result<Vec<PathBuf>> {
    fs::create_dir_all(dst)?;
    let mut moved = Vec::new();
    let mut entries: Vec<_> = fs::read_dir(src)?.collect::<io::Result<_>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        if !entry.file_type()?.is_file() {
            continue;
        }
        let target = dst.join(entry.file_name());
        fs::rename(entry.path(), &target)?;
        moved.push(target);
    }
    sync_dir(dst);
    debug!(from = %src.display(), to = %dst.display(), files = moved.len(), "files committed");
    Ok(moved)
}

/// Moves `src` to `dst`, falling back to copy and delete when a rename is
/// not possible (different filesystems).
pub fn move_file(src: &Path, dst: &Path) -> io::Result<()> {
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    fs::copy(src, dst)?;
    fs::remove_file(src)
}

/// Removes a directory tree; a missing directory is not an error.
pub fn remove_dir_if_exists(dir: &Path) -> io::Result<bool> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Best-effort fsync of a directory so renames into it are durable.
pub fn sync_dir(dir: &Path) {
    if let Ok(d) = fs::File::open(dir) {
        let _ = d.sync_all();
    }
}
