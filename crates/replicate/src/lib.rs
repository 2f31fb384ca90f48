//! Directory tree replication.
//!
//! [`transfer`] walks a source directory and produces an equivalent tree at a
//! destination, with either copy or move semantics. It is built to be re-run:
//! files that already exist at the destination are left alone, and move
//! semantics only remove the source once every entry made it across.
//!
//! Failures on individual entries never abort the walk. They are collected
//! into the returned [`Report`], and [`Report::is_complete`] tells callers
//! whether any of them affected data (as opposed to best-effort metadata).
//!
//! Attribute and access-control mirroring goes through the
//! [`MetadataReplicator`] capability so that platforms without a meaningful
//! implementation can plug in [`NoopReplicator`].

mod capability;
pub mod error;
mod options;
mod progress;
mod transfer;

pub use crate::capability::{MetadataReplicator, NoopReplicator, PlatformReplicator, default_replicator};
pub use crate::options::{TransferMode, TransferOptions};
pub use crate::progress::Progress;
pub use crate::transfer::{Report, remove_tree, transfer};
