use crate::AppDirs;
use crate::error::{ErrorKind, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix for environment variable overrides, e.g. `CACHEDISK_HIDE_BACKUP=false`.
pub const ENV_PREFIX: &str = "CACHEDISK_";

/// User-facing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Overrides the platform application-data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// Mirror permission/attribute bits onto replicated entries.
    pub replicate_attributes: bool,
    /// Mirror ownership/access control onto replicated entries.
    pub replicate_access_control: bool,
    /// Apply the hidden attribute to backup copies.
    pub hide_backup: bool,
    /// Re-read register files after every write and compare each field.
    pub verify_writes: bool,
}
impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: None,
            replicate_attributes: true,
            replicate_access_control: true,
            hide_backup: true,
            verify_writes: true,
        }
    }
}
impl Settings {
    /// Load settings, later sources overriding earlier ones:
    ///
    /// 1. built-in defaults,
    /// 2. the settings file in `dirs`,
    /// 3. `explicit` (if given),
    /// 4. `CACHEDISK_*` environment variables.
    ///
    /// Missing files are not an error.
    pub fn load(dirs: &AppDirs, explicit: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file(dirs.config_file()));
        if let Some(path) = explicit {
            figment = figment.merge(Toml::file(path));
        }
        let settings: Settings = figment
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .map_err(|e| ErrorKind::Load(e.to_string()))?;
        tracing::debug!(?settings, "Loaded settings");
        Ok(settings)
    }

    /// The directories to use once `data_dir` has been taken into account.
    pub fn resolve_dirs(&self, dirs: AppDirs) -> AppDirs {
        match &self.data_dir {
            Some(root) => dirs.with_data_root(root),
            None => dirs,
        }
    }
}
