//! Register Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use crate::CacheId;
use derive_more::{Display, Error};
use std::path::PathBuf;

/// A register error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for register operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Field-level integrity problems are not errors; they are reported as
/// [`IntegrityCode`](crate::IntegrityCode)s alongside a usable result.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The store directory doesn't exist. Run the application-data bootstrap
    /// first.
    #[display("register store not found: {}", _0.display())]
    StoreMissing(#[error(not(source))] PathBuf),
    #[display("I/O error on: {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
    #[display("no record with id {_0}")]
    RecordNotFound(#[error(not(source))] CacheId),
    /// The string does not have the `NNNN-NNNN-NNNN-NNNN-NNNN` shape.
    #[display("malformed cache id: {_0:?}")]
    MalformedId(#[error(not(source))] String),
    #[display("could not write record: {}", _0.display())]
    Write(#[error(not(source))] PathBuf),
    /// Records can only be removed once their item is no longer cached.
    #[display("record {_0} is still in use")]
    RecordInUse(#[error(not(source))] CacheId),
    #[display("could not find an unused cache id")]
    IdSpaceExhausted,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Write(_) | Self::IdSpaceExhausted)
    }
}
