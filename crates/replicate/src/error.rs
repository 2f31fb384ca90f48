//! Replication Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A replication error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for replication operations.
pub type Result<T> = std::result::Result<T, Error>;

/// What went wrong, and where.
///
/// ### Fatal (returned as `Err` from [`transfer`](crate::transfer))
/// - [`ErrorKind::SourceNotFound`]
/// - [`ErrorKind::NotADirectory`]
/// - [`ErrorKind::DestinationRoot`]
///
/// ### Per-entry (collected in the [`Report`](crate::Report))
/// Everything else. See [`ErrorKind::affects_data`].
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("source directory not found: {}", _0.display())]
    SourceNotFound(#[error(not(source))] PathBuf),
    #[display("source is not a directory: {}", _0.display())]
    NotADirectory(#[error(not(source))] PathBuf),
    #[display("could not create destination: {}", _0.display())]
    DestinationRoot(#[error(not(source))] PathBuf),
    /// An entry in the source tree could not be read while enumerating.
    #[display("could not read source entry: {}", _0.display())]
    Walk(#[error(not(source))] PathBuf),
    #[display("could not create directory: {}", _0.display())]
    CreateDirectory(#[error(not(source))] PathBuf),
    #[display("could not copy file: {}", _0.display())]
    CopyFile(#[error(not(source))] PathBuf),
    #[display("could not recreate symbolic link: {}", _0.display())]
    CopyLink(#[error(not(source))] PathBuf),
    /// Attribute or access-control mirroring failed (best effort).
    #[display("could not replicate metadata onto: {}", _0.display())]
    Metadata(#[error(not(source))] PathBuf),
    #[display("could not remove source after move: {}", _0.display())]
    RemoveSource(#[error(not(source))] PathBuf),
    /// Move semantics were requested but the source was kept, because not
    /// every entry was replicated.
    #[display("source kept because the transfer was incomplete: {}", _0.display())]
    SourceRetained(#[error(not(source))] PathBuf),
    #[display("could not hide destination: {}", _0.display())]
    Hide(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if the destination may be missing data because of
    /// this error (or, for moves, the source could not be cleaned up).
    pub fn affects_data(&self) -> bool {
        !matches!(self, Self::Metadata(_) | Self::Hide(_))
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::SourceNotFound(_) | Self::NotADirectory(_))
    }
}
