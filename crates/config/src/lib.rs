//! Settings and on-disk layout for cachedisk.
//!
//! [`AppDirs`] locates the per-user application-data directory (register
//! store, logs, settings file) and [`Settings`] layers configuration from
//! defaults, the settings file, an optional explicit file and `CACHEDISK_*`
//! environment variables.

mod dirs;
pub mod error;
mod settings;

pub use crate::dirs::{APP_NAME, AppDirs, ensure_app_data};
pub use crate::settings::{ENV_PREFIX, Settings};
