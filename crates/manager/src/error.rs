//! Cache Manager Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Kinds are also what the manager
//! keeps in its diagnostics log, so they are cheap to clone and compare.

use cachedisk_register::{CacheId, CacheStatus, IntegrityCode};
use derive_more::{Display, Error};
use std::path::{Path, PathBuf};

/// A cache manager error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache manager operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    // Input validation
    /// Every path that couldn't be qualified.
    #[display("{}", describe_unqualified(_0))]
    InvalidPaths(#[error(not(source))] Vec<PathBuf>),
    #[display("malformed cache id: {_0:?}")]
    MalformedId(#[error(not(source))] String),
    #[display("no cache record with id {_0}")]
    UnknownId(#[error(not(source))] String),
    /// Destinations have to be empty targets.
    #[display("destination already exists: {}", _0.display())]
    DestinationExists(#[error(not(source))] PathBuf),

    // Register integrity
    #[display("register: {_0}")]
    Register(#[error(not(source))] IntegrityCode),
    #[display("register store is unavailable")]
    Store,
    #[display("could not persist record {_0}")]
    Persist(#[error(not(source))] CacheId),
    /// The requested destinations were ignored in favour of the stored ones.
    #[display("existing record for {} uses different destinations", _0.display())]
    RecordPathsDiffer(#[error(not(source))] PathBuf),
    #[display("record for {} already has a fixed mode", _0.display())]
    ModeFixed(#[error(not(source))] PathBuf),
    /// Stored status is `Cached` but the filesystem disagrees.
    #[display("{} is not a link to the cache disk", _0.display())]
    StatusMismatch(#[error(not(source))] PathBuf),
    #[display("record {_0} can't be removed while in use")]
    RecordInUse(#[error(not(source))] CacheId),

    // Transfer
    /// A non-fatal entry failure, rendered.
    #[display("transfer: {_0}")]
    Transfer(#[error(not(source))] String),
    #[display("could not transfer {} to {}", source.display(), destination.display())]
    TransferFailed {
        #[error(not(source))]
        source: PathBuf,
        destination: PathBuf,
    },
    #[display("could not remove {}", _0.display())]
    CleanupFailed(#[error(not(source))] PathBuf),

    // Terminal
    #[display("could not cache item {_0}")]
    CacheFailed(#[error(not(source))] CacheId),
    #[display("could not restore item {_0}")]
    RestoreFailed(#[error(not(source))] CacheId),
    #[display("could not revert item {_0}")]
    RevertFailed(#[error(not(source))] CacheId),
    #[display("could not link {}", _0.display())]
    LinkFailed(#[error(not(source))] PathBuf),
    #[display("{} links to {}, expected {}", link.display(), actual.display(), expected.display())]
    LinkMismatch { link: PathBuf, expected: PathBuf, actual: PathBuf },

    // Rejections
    #[display("item {_0} is blocked by its register")]
    Blocked(#[error(not(source))] CacheId),
    #[display("cannot {operation} while {status:?}")]
    IllegalState { operation: &'static str, status: CacheStatus },
    /// Move mode keeps no backup to revert to.
    #[display("no backup available for {}", _0.display())]
    NoBackup(#[error(not(source))] PathBuf),

    #[display("could not prepare application data")]
    Bootstrap,
}

fn describe_unqualified(paths: &[PathBuf]) -> String {
    let listed = paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ");
    match paths {
        [_] => format!("a path is not qualified: {listed}"),
        _ => format!("not all paths are qualified: {listed}"),
    }
}

impl ErrorKind {
    pub(crate) fn invalid_paths<'a>(paths: impl IntoIterator<Item = &'a Path>) -> Self {
        Self::InvalidPaths(paths.into_iter().map(Path::to_path_buf).collect())
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Store
                | Self::Persist(_)
                | Self::Transfer(_)
                | Self::TransferFailed { .. }
                | Self::CleanupFailed(_)
                | Self::LinkFailed(_)
                | Self::Bootstrap
        )
    }
}
