//! Config Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// No home directory could be determined, so there is nowhere to put the
    /// application data. Configure `data_dir` explicitly.
    #[display("could not determine the application data directory")]
    NoHomeDirectory,
    /// One of the configuration sources could not be parsed or merged.
    #[display("invalid configuration: {_0}")]
    Load(#[error(not(source))] String),
    /// An application-data directory could not be created.
    #[display("could not create application directory: {}", _0.display())]
    Bootstrap(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Bootstrap(_))
    }
}
