//! Directory links at the original path.

use std::fs;
use std::io;
use std::path::Path;

/// Create a directory link at `link` pointing at `target`.
#[cfg(unix)]
pub(crate) fn create(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
pub(crate) fn create(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

pub(crate) fn is_link(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink())
}

/// Whether `link` is a link whose stored target is exactly `target`.
pub(crate) fn points_at(link: &Path, target: &Path) -> bool {
    is_link(link) && fs::read_link(link).is_ok_and(|actual| actual == target)
}

/// Anything at all is there, including a dangling link.
pub(crate) fn occupied(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Remove the link at `path`, if there is one. Anything other than a link is
/// left alone and reported as `AlreadyExists`.
pub(crate) fn remove(path: &Path) -> io::Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => return Ok(()),
        Err(e) => return Err(e),
    };
    if !metadata.file_type().is_symlink() {
        return Err(io::Error::new(io::ErrorKind::AlreadyExists, "not a link"));
    }
    remove_symlink(path)
}

#[cfg(unix)]
fn remove_symlink(path: &Path) -> io::Result<()> {
    fs::remove_file(path)
}

#[cfg(windows)]
fn remove_symlink(path: &Path) -> io::Result<()> {
    // Directory symlinks are directories as far as deletion is concerned.
    fs::remove_dir(path).or_else(|_| fs::remove_file(path))
}
