use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::{OptionExt, ResultExt};
use std::fs;
use std::path::{Path, PathBuf};

/// Application name used for the platform data and config directories.
pub const APP_NAME: &str = "CacheDisk";
const DATA_DIR: &str = "Data";
const LOGS_DIR: &str = "Logs";
const SETTINGS_FILE: &str = "Settings.toml";

/// Filesystem layout of the application data.
///
/// ```text
/// <root>/Data/<id>.ini    register store
/// <root>/Logs/            log output
/// <config>/Settings.toml  settings file
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDirs {
    root: PathBuf,
    config: PathBuf,
}
impl AppDirs {
    /// Resolve the per-user directories for the current platform.
    pub fn discover() -> Result<Self> {
        let project = ProjectDirs::from("", "", APP_NAME).ok_or_raise(|| ErrorKind::NoHomeDirectory)?;
        Ok(Self {
            root: project.data_local_dir().to_path_buf(),
            config: project.config_dir().to_path_buf(),
        })
    }

    /// Put everything (including the settings file) under a single root.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self { config: root.clone(), root }
    }

    /// Keep the settings file where it is but move the application data.
    #[must_use]
    pub fn with_data_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one register file per cached item.
    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    pub fn config_file(&self) -> PathBuf {
        self.config.join(SETTINGS_FILE)
    }
}

/// Make sure the application-data directories exist.
///
/// Must run before any register operation; the register store assumes its
/// directory is already there.
pub fn ensure_app_data(dirs: &AppDirs) -> Result<()> {
    for dir in [dirs.root().to_path_buf(), dirs.logs_dir(), dirs.data_dir()] {
        if dir.is_dir() {
            continue;
        }
        fs::create_dir_all(&dir).or_raise(|| ErrorKind::Bootstrap(dir.clone()))?;
        tracing::debug!(path = %dir.display(), "Created application directory");
    }
    Ok(())
}
