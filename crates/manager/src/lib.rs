//! Relocates a directory onto a cache disk and leaves a symbolic link behind.
//!
//! A [`CacheManager`] owns the lifecycle of exactly one item:
//!
//! ```text
//!              cache_item                 restore_cache
//! NotCached ───────────────▶ Cached ───────────────────▶ NotCached
//!     │                        │  │
//!     │ failure                │  │ failure (Copy mode: automatic revert)
//!     ▼                        │  ▼
//! FailToCache                  │ FailToRestore ──▶ NotCached
//!                              │       │
//!                              ▼       ▼ revert failure
//!                            FailToRevert
//! ```
//!
//! Every transition is written to the item's register record before the
//! operation returns. Problems that don't stop an operation are appended to
//! [`CacheManager::diagnostics`].

mod context;
pub mod error;
mod link;
mod manager;
mod paths;

pub use crate::context::{Context, TransferPolicy};
pub use crate::manager::{CacheManager, Outcome};
pub use cachedisk_register::{CacheId, CacheMode, CacheStatus, IdAllocator, IntegrityCode, Store};
