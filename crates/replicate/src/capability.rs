//! Best-effort metadata mirroring.
//!
//! Errors returned from a [`MetadataReplicator`] are never fatal to a
//! transfer; they are recorded in the [`Report`](crate::Report) as
//! [`Metadata`](crate::error::ErrorKind::Metadata) entries.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

/// Platform capability for copying metadata that `fs::copy` doesn't carry.
pub trait MetadataReplicator: Send + Sync {
    /// Used for logging only.
    fn name(&self) -> &str;

    /// Mirror ownership / access-control information from `source` onto
    /// `destination`.
    fn replicate_access_control(&self, source: &Path, destination: &Path) -> io::Result<()>;

    /// Mirror attribute bits (permission mode on Unix, the read-only flag
    /// elsewhere).
    fn replicate_attributes(&self, source: &Path, destination: &Path) -> io::Result<()>;

    /// Mark `path` as hidden. Platforms that hide by naming convention alone
    /// may treat this as a no-op.
    fn hide(&self, path: &Path) -> io::Result<()>;
}

/// Does nothing, successfully.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopReplicator;
impl MetadataReplicator for NoopReplicator {
    fn name(&self) -> &str {
        "noop"
    }

    fn replicate_access_control(&self, _source: &Path, _destination: &Path) -> io::Result<()> {
        Ok(())
    }

    fn replicate_attributes(&self, _source: &Path, _destination: &Path) -> io::Result<()> {
        Ok(())
    }

    fn hide(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }
}

/// Mirrors what the standard library can express on the current platform.
///
/// - Attributes: [`fs::Permissions`] (mode bits on Unix, read-only elsewhere).
/// - Access control: owner and group on Unix; nothing elsewhere.
/// - Hidden: `FILE_ATTRIBUTE_HIDDEN` on Windows. Unix has no hidden
///   attribute (only dot-prefixed names), so this only logs there.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlatformReplicator;
impl MetadataReplicator for PlatformReplicator {
    fn name(&self) -> &str {
        "platform"
    }

    #[cfg(unix)]
    fn replicate_access_control(&self, source: &Path, destination: &Path) -> io::Result<()> {
        use std::os::unix::fs::{MetadataExt, chown};
        let wanted = fs::symlink_metadata(source)?;
        let current = fs::symlink_metadata(destination)?;
        // Unprivileged processes can't chown to themselves for some groups;
        // don't try when nothing would change.
        if wanted.uid() == current.uid() && wanted.gid() == current.gid() {
            return Ok(());
        }
        chown(destination, Some(wanted.uid()), Some(wanted.gid()))
    }

    #[cfg(not(unix))]
    fn replicate_access_control(&self, _source: &Path, destination: &Path) -> io::Result<()> {
        tracing::trace!(path = %destination.display(), "Access control replication unsupported on this platform");
        Ok(())
    }

    fn replicate_attributes(&self, source: &Path, destination: &Path) -> io::Result<()> {
        let permissions = fs::symlink_metadata(source)?.permissions();
        fs::set_permissions(destination, permissions)
    }

    #[cfg(windows)]
    fn hide(&self, path: &Path) -> io::Result<()> {
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::fileapi::{GetFileAttributesW, INVALID_FILE_ATTRIBUTES, SetFileAttributesW};
        use winapi::um::winnt::FILE_ATTRIBUTE_HIDDEN;

        let wide: Vec<u16> = path.as_os_str().encode_wide().chain(std::iter::once(0)).collect();
        // SAFETY: `wide` is NUL-terminated and outlives both calls.
        let attributes = unsafe { GetFileAttributesW(wide.as_ptr()) };
        if attributes == INVALID_FILE_ATTRIBUTES {
            return Err(io::Error::last_os_error());
        }
        if attributes & FILE_ATTRIBUTE_HIDDEN != 0 {
            return Ok(());
        }
        // SAFETY: as above.
        if unsafe { SetFileAttributesW(wide.as_ptr(), attributes | FILE_ATTRIBUTE_HIDDEN) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(not(windows))]
    fn hide(&self, path: &Path) -> io::Result<()> {
        tracing::trace!(path = %path.display(), "Hidden attribute unsupported on this platform");
        Ok(())
    }
}

/// The replicator to use on the current platform.
pub fn default_replicator() -> Arc<dyn MetadataReplicator> {
    if cfg!(any(unix, windows)) { Arc::new(PlatformReplicator) } else { Arc::new(NoopReplicator) }
}
