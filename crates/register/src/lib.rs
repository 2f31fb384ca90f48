//! Durable cache records.
//!
//! One record file per managed item lives in a [`Store`] directory, named
//! after the item's [`CacheId`]. The on-disk format is a fixed sequence of
//! `Field=Value` lines:
//!
//! ```text
//! Path=/data/assets
//! Id=0012-9381-0004-7765-0001
//! CacheDiskPath=/fast/cache/assets
//! BackupPath=
//! Type=2
//! Status=1
//! ```
//!
//! The file extension is `.ini` for compatibility with existing stores, even
//! though the format is not really INI.
//!
//! [`Register`] is the handle a cache manager holds for its one record: it
//! finds or creates the record, rewrites it after every state change and
//! re-reads it to verify each field (see [`IntegrityCode`]).

pub mod error;
mod id;
mod integrity;
mod record;
mod register;
mod store;

pub use crate::id::{CacheId, IdAllocator, IdStatus};
pub use crate::integrity::IntegrityCode;
pub use crate::record::{CacheMode, CacheRecord, CacheStatus};
pub use crate::register::{NewRecord, Register};
pub use crate::store::{Loaded, RECORD_EXTENSION, Store};
