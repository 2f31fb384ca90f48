use crate::error::{ErrorKind, Result};
use crate::{CacheId, CacheMode, CacheRecord, CacheStatus, IdAllocator, IntegrityCode, Store};
use rand::Rng;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// What to record for an item that has no record yet.
#[derive(Clone, Debug)]
pub struct NewRecord {
    pub original_path: PathBuf,
    pub cache_disk_path: PathBuf,
    /// `Some` selects [`CacheMode::Copy`].
    pub backup_path: Option<PathBuf>,
}

/// The persisted record of a single item, kept in sync with its file.
///
/// Integrity findings accumulate in [`codes`](Self::codes) for the lifetime
/// of the handle. Once any of them is fatal the register is no longer
/// [usable](Self::is_usable).
#[derive(Debug)]
pub struct Register {
    store: Store,
    record: CacheRecord,
    codes: Vec<IntegrityCode>,
    verify: bool,
    created: bool,
    removed: bool,
}

impl Register {
    /// Adopts the record for `request.original_path` if one exists, otherwise
    /// allocates an id and writes a new [`CacheStatus::NotCached`] record.
    ///
    /// Only store-level failures (listing the store, exhausting ids) are
    /// errors. A record that can't be written or read back properly yields a
    /// register with the corresponding codes.
    #[instrument(level = "debug", skip_all, fields(path = %request.original_path.display()))]
    pub fn open_or_create<R: Rng>(
        store: &Store,
        allocator: &mut IdAllocator<R>,
        request: NewRecord,
        verify: bool,
    ) -> Result<Self> {
        if let Some(id) = store.find_by_path(&request.original_path)? {
            tracing::debug!(id = %id, "Found existing record");
            return Ok(Self::attach(store, &id, verify));
        }
        let id = allocator.allocate(store)?;
        let record = CacheRecord::new(id, request.original_path, request.cache_disk_path, request.backup_path);
        let mut register =
            Self { store: store.clone(), record, codes: Vec::new(), verify, created: true, removed: false };
        // Failures are already captured as codes.
        let _ = register.persist();
        tracing::info!(id = %register.record.id, mode = ?register.record.mode, "Created record");
        Ok(register)
    }

    /// Reattaches to a record by id. Never fails: a missing or unreadable
    /// file gives an unusable register.
    pub fn attach(store: &Store, id: &CacheId, verify: bool) -> Self {
        let (record, codes) = match store.read(id) {
            Ok(loaded) => (loaded.record, loaded.codes),
            Err(err) => {
                let code = match &*err {
                    ErrorKind::RecordNotFound(_) => IntegrityCode::FileMissing,
                    _ => IntegrityCode::Unreadable,
                };
                tracing::warn!(id = %id, %code, "Could not load record");
                (CacheRecord::placeholder(id.clone()), vec![code])
            },
        };
        Self { store: store.clone(), record, codes, verify, created: false, removed: false }
    }

    pub fn record(&self) -> &CacheRecord {
        &self.record
    }

    pub fn id(&self) -> &CacheId {
        &self.record.id
    }

    pub fn original_path(&self) -> &Path {
        &self.record.original_path
    }

    pub fn cache_disk_path(&self) -> &Path {
        &self.record.cache_disk_path
    }

    pub fn backup_path(&self) -> Option<&Path> {
        self.record.backup_path.as_deref()
    }

    pub fn mode(&self) -> CacheMode {
        self.record.mode
    }

    pub fn status(&self) -> CacheStatus {
        self.record.status
    }

    pub fn codes(&self) -> &[IntegrityCode] {
        &self.codes
    }

    /// Whether this handle created the record, rather than finding it.
    pub fn is_new(&self) -> bool {
        self.created
    }

    pub fn is_usable(&self) -> bool {
        !self.removed && !self.codes.iter().any(|code| code.is_fatal())
    }

    /// Persists a new status. Returns the codes found by this write's
    /// verification.
    pub fn refresh_status(&mut self, status: CacheStatus) -> Result<Vec<IntegrityCode>> {
        self.record.status = status;
        self.persist()
    }

    /// Persists a new status along with the destination paths. The original
    /// path and mode never change.
    pub fn refresh_paths(
        &mut self,
        status: CacheStatus,
        cache_disk_path: PathBuf,
        backup_path: Option<PathBuf>,
    ) -> Result<Vec<IntegrityCode>> {
        self.record.status = status;
        self.record.cache_disk_path = cache_disk_path;
        self.record.backup_path = backup_path;
        self.persist()
    }

    /// Deletes the record file. Only allowed once the item is no longer
    /// cached; the handle is unusable afterwards.
    pub fn remove(&mut self) -> Result<()> {
        if self.record.status != CacheStatus::NotCached {
            exn::bail!(ErrorKind::RecordInUse(self.record.id.clone()));
        }
        self.store.delete(&self.record.id)?;
        self.removed = true;
        tracing::info!(id = %self.record.id, "Removed record");
        Ok(())
    }

    fn persist(&mut self) -> Result<Vec<IntegrityCode>> {
        match self.store.write(&self.record, self.verify) {
            Ok(codes) => {
                self.codes.extend_from_slice(&codes);
                Ok(codes)
            },
            Err(err) => {
                tracing::warn!(id = %self.record.id, status = ?self.record.status, "Could not persist record");
                self.codes.push(IntegrityCode::Unwritable);
                Err(err)
            },
        }
    }
}
