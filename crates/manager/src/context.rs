use crate::error::{ErrorKind, Result};
use cachedisk_config::{AppDirs, Settings, ensure_app_data};
use cachedisk_register::{IdAllocator, Store};
use cachedisk_replicate::{MetadataReplicator, TransferMode, TransferOptions, default_replicator};
use exn::ResultExt;
use rand::Rng;
use rand::rngs::StdRng;
use std::sync::Arc;

/// How replication and persistence behave for every manager built from a
/// [`Context`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferPolicy {
    pub replicate_attributes: bool,
    pub replicate_access_control: bool,
    /// Apply the hidden attribute to backup copies. Windows only; Unix has no
    /// such attribute.
    pub hide_backup: bool,
    /// Re-read register files after every write.
    pub verify_writes: bool,
    /// Try a plain rename before walking the tree on moves.
    pub rename_when_possible: bool,
}

impl Default for TransferPolicy {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for TransferPolicy {
    fn from(settings: &Settings) -> Self {
        Self {
            replicate_attributes: settings.replicate_attributes,
            replicate_access_control: settings.replicate_access_control,
            hide_backup: settings.hide_backup,
            verify_writes: settings.verify_writes,
            rename_when_possible: true,
        }
    }
}

impl TransferPolicy {
    pub(crate) fn options(&self, mode: TransferMode, hide: bool) -> TransferOptions {
        TransferOptions {
            mode,
            hide_destination: hide,
            replicate_attributes: self.replicate_attributes,
            replicate_access_control: self.replicate_access_control,
            rename_when_possible: self.rename_when_possible,
        }
    }
}

/// Everything a [`CacheManager`](crate::CacheManager) needs besides its own
/// paths.
pub struct Context<R = StdRng> {
    pub(crate) store: Store,
    pub(crate) allocator: IdAllocator<R>,
    pub(crate) policy: TransferPolicy,
    pub(crate) replicator: Arc<dyn MetadataReplicator>,
}

impl Context<StdRng> {
    /// Bootstraps the platform application-data directories and opens the
    /// register store inside them.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let dirs = AppDirs::discover().or_raise(|| ErrorKind::Bootstrap)?;
        Self::from_dirs(settings, dirs)
    }

    /// Like [`from_settings`](Self::from_settings), with explicit base
    /// directories. `settings.data_dir` still takes precedence.
    pub fn from_dirs(settings: &Settings, dirs: AppDirs) -> Result<Self> {
        let dirs = settings.resolve_dirs(dirs);
        ensure_app_data(&dirs).or_raise(|| ErrorKind::Bootstrap)?;
        let store = Store::open(dirs.data_dir()).or_raise(|| ErrorKind::Store)?;
        tracing::debug!(store = %store.dir().display(), "Opened register store");
        Ok(Self::new(store, IdAllocator::from_entropy()).with_policy(TransferPolicy::from(settings)))
    }
}

impl<R: Rng> Context<R> {
    pub fn new(store: Store, allocator: IdAllocator<R>) -> Self {
        Self { store, allocator, policy: TransferPolicy::default(), replicator: default_replicator() }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: TransferPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_replicator(mut self, replicator: Arc<dyn MetadataReplicator>) -> Self {
        self.replicator = replicator;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn policy(&self) -> &TransferPolicy {
        &self.policy
    }
}
