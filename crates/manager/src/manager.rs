use crate::context::{Context, TransferPolicy};
use crate::error::{Error, ErrorKind, Result};
use crate::{link, paths};
use cachedisk_register::{CacheId, CacheMode, CacheStatus, IdStatus, IntegrityCode, NewRecord, Register};
use cachedisk_replicate::{self as replicate, MetadataReplicator, Progress, TransferMode, transfer};
use exn::{Exn, OptionExt, ResultExt};
use rand::Rng;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;

const REVERTIBLE: &[CacheStatus] = &[CacheStatus::Cached, CacheStatus::FailToRestore, CacheStatus::FailToRevert];

/// What happened to a requested operation that didn't fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// Not attempted, because the register is blocked or the current status
    /// doesn't allow it. The reason is the last diagnostic.
    Rejected,
}

enum Backup {
    None,
    At(PathBuf),
    /// Next to the original, as `<leaf>.cached`.
    BesideOriginal,
}

/// The cache lifecycle of a single item.
///
/// The register record is the source of truth: on construction the stored
/// id, mode, status and paths win over whatever was requested, and every
/// status change is written back before an operation returns.
pub struct CacheManager {
    register: Register,
    policy: TransferPolicy,
    replicator: Arc<dyn MetadataReplicator>,
    progress: Option<Box<dyn Progress + Send>>,
    diagnostics: Vec<ErrorKind>,
}

impl CacheManager {
    /// Manage `path` in [`CacheMode::Move`], relocating it into the
    /// `cache_disk` container.
    pub fn new<R: Rng>(ctx: &mut Context<R>, path: impl AsRef<Path>, cache_disk: impl AsRef<Path>) -> Result<Self> {
        Self::construct(ctx, path.as_ref(), cache_disk.as_ref(), Backup::None)
    }

    /// Manage `path` in [`CacheMode::Copy`], keeping a backup inside the
    /// `backup` container.
    pub fn with_backup<R: Rng>(
        ctx: &mut Context<R>,
        path: impl AsRef<Path>,
        cache_disk: impl AsRef<Path>,
        backup: impl AsRef<Path>,
    ) -> Result<Self> {
        Self::construct(ctx, path.as_ref(), cache_disk.as_ref(), Backup::At(backup.as_ref().to_path_buf()))
    }

    /// [`CacheMode::Copy`] with the backup next to the original when
    /// `make_backup` is set, [`CacheMode::Move`] otherwise.
    pub fn with_backup_flag<R: Rng>(
        ctx: &mut Context<R>,
        path: impl AsRef<Path>,
        cache_disk: impl AsRef<Path>,
        make_backup: bool,
    ) -> Result<Self> {
        let backup = if make_backup { Backup::BesideOriginal } else { Backup::None };
        Self::construct(ctx, path.as_ref(), cache_disk.as_ref(), backup)
    }

    /// Reattach to an existing record.
    ///
    /// A record file that exists but can't be trusted still yields a manager;
    /// it is [blocked](Self::is_blocked).
    #[instrument(skip_all, fields(id = %id))]
    pub fn attach<R>(ctx: &Context<R>, id: &str) -> Result<Self> {
        match ctx.store.id_status(id).or_raise(|| ErrorKind::Store)? {
            IdStatus::Malformed => exn::bail!(ErrorKind::MalformedId(id.to_string())),
            IdStatus::Absent => exn::bail!(ErrorKind::UnknownId(id.to_string())),
            IdStatus::Exists => {},
        }
        let id = CacheId::parse(id).or_raise(|| ErrorKind::MalformedId(id.to_string()))?;
        let register = Register::attach(&ctx.store, &id, ctx.policy.verify_writes);
        let mut manager = Self::assemble(ctx, register);
        manager.inspect();
        Ok(manager)
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    fn construct<R: Rng>(ctx: &mut Context<R>, path: &Path, cache_disk: &Path, backup: Backup) -> Result<Self> {
        let mut unqualified = Vec::new();
        let mut qualify = |p: &Path| {
            let qualified = paths::qualify(p);
            if qualified.is_none() {
                tracing::warn!(path = %p.display(), "Path is not qualified");
                unqualified.push(p.to_path_buf());
            }
            qualified
        };
        let original = qualify(path);
        let cache_container = qualify(cache_disk);
        let backup_container = match backup {
            Backup::None => None,
            Backup::At(container) => Some(qualify(container.as_path())),
            Backup::BesideOriginal => Some(original.as_deref().and_then(Path::parent).map(Path::to_path_buf)),
        };
        let (Some(original), Some(cache_container)) = (original, cache_container) else {
            exn::bail!(ErrorKind::InvalidPaths(unqualified));
        };
        let backup_container = match backup_container {
            Some(None) => exn::bail!(ErrorKind::InvalidPaths(unqualified)),
            Some(Some(container)) => Some(container),
            None => None,
        };

        // Qualified paths always end in a normal component.
        let leaf = original.file_name().ok_or_raise(|| ErrorKind::invalid_paths([path]))?.to_os_string();
        let request = NewRecord {
            cache_disk_path: paths::with_leaf(&cache_container, &leaf),
            backup_path: backup_container.map(|container| paths::with_leaf(&container, &paths::backup_leaf(&leaf))),
            original_path: original,
        };
        let requested_mode = if request.backup_path.is_some() { CacheMode::Copy } else { CacheMode::Move };

        let verify = ctx.policy.verify_writes;
        let register = Register::open_or_create(&ctx.store, &mut ctx.allocator, request.clone(), verify)
            .or_raise(|| ErrorKind::Store)?;
        let mut manager = Self::assemble(ctx, register);
        if !manager.register.is_new() && manager.register.is_usable() {
            if manager.register.cache_disk_path() != request.cache_disk_path
                || manager.register.backup_path() != request.backup_path.as_deref()
            {
                tracing::warn!(id = %manager.id(), "Keeping destinations from the existing record");
                manager.note(ErrorKind::RecordPathsDiffer(request.original_path.clone()));
            }
            if manager.register.mode() != requested_mode {
                manager.note(ErrorKind::ModeFixed(request.original_path.clone()));
            }
        }
        manager.inspect();
        Ok(manager)
    }

    fn assemble<R>(ctx: &Context<R>, register: Register) -> Self {
        let diagnostics = register.codes().iter().copied().map(ErrorKind::Register).collect();
        Self { register, policy: ctx.policy, replicator: Arc::clone(&ctx.replicator), progress: None, diagnostics }
    }

    /// Compare the loaded record against the live filesystem.
    fn inspect(&mut self) {
        if !self.register.is_usable() {
            tracing::warn!(id = %self.id(), "Record is unusable; every operation will be rejected");
            return;
        }
        match self.register.status() {
            CacheStatus::NotCached | CacheStatus::FailToCache => {
                let destinations: Vec<PathBuf> = [Some(self.cache_disk_path()), self.backup_path()]
                    .into_iter()
                    .flatten()
                    .filter(|path| link::occupied(path))
                    .map(Path::to_path_buf)
                    .collect();
                for path in destinations {
                    tracing::warn!(path = %path.display(), "Destination already exists");
                    self.note(ErrorKind::DestinationExists(path));
                }
            },
            CacheStatus::Cached if !link::points_at(self.original_path(), self.cache_disk_path()) => {
                tracing::warn!(id = %self.id(), path = %self.original_path().display(), "Recorded as cached, but no link to the cache disk");
                self.note(ErrorKind::StatusMismatch(self.original_path().to_path_buf()));
            },
            _ => {},
        }
    }

    pub fn id(&self) -> &CacheId {
        self.register.id()
    }

    pub fn original_path(&self) -> &Path {
        self.register.original_path()
    }

    pub fn cache_disk_path(&self) -> &Path {
        self.register.cache_disk_path()
    }

    pub fn backup_path(&self) -> Option<&Path> {
        self.register.backup_path()
    }

    pub fn mode(&self) -> CacheMode {
        self.register.mode()
    }

    pub fn status(&self) -> CacheStatus {
        self.register.status()
    }

    /// An unknown mode or an unusable record stops every operation.
    pub fn is_blocked(&self) -> bool {
        !self.register.is_usable() || self.register.mode() == CacheMode::Unknown
    }

    /// Everything that went wrong so far, oldest first.
    pub fn diagnostics(&self) -> &[ErrorKind] {
        &self.diagnostics
    }

    pub fn clear_diagnostics(&mut self) {
        self.diagnostics.clear();
    }

    /// Receive `(total, processed)` updates from every tree transfer this
    /// manager runs. A transfer done with a single rename reports nothing.
    #[must_use]
    pub fn with_progress(mut self, progress: impl Progress + Send + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    /// Relocate the item onto the cache disk and link it back.
    ///
    /// # Errors
    /// A destination that already exists fails without touching anything.
    /// Any later failure leaves the status at [`CacheStatus::FailToCache`],
    /// with partial destinations in place for inspection.
    #[instrument(skip_all, fields(id = %self.id()))]
    pub fn cache_item(&mut self) -> Result<Outcome> {
        if !self.admit("cache", &[CacheStatus::NotCached, CacheStatus::FailToCache]) {
            return Ok(Outcome::Rejected);
        }
        let cache_disk = self.cache_disk_path().to_path_buf();
        if link::occupied(&cache_disk) {
            return Err(self.fail(ErrorKind::DestinationExists(cache_disk)));
        }
        tracing::info!(mode = ?self.mode(), path = %self.original_path().display(), "Caching item");
        if let Err(err) = self.try_cache(&cache_disk) {
            let context = ErrorKind::CacheFailed(self.id().clone());
            return Err(self.terminal(err, CacheStatus::FailToCache, context));
        }
        self.transition(CacheStatus::Cached)?;
        Ok(Outcome::Done)
    }

    fn try_cache(&mut self, cache_disk: &Path) -> Result<()> {
        let original = self.original_path().to_path_buf();
        match self.mode() {
            CacheMode::Move => self.replicate(&original, cache_disk, TransferMode::Move, false)?,
            CacheMode::Copy => {
                let backup = self.backup_path().map(Path::to_path_buf).ok_or_raise(|| ErrorKind::NoBackup(original.clone()))?;
                if link::occupied(&backup) {
                    exn::bail!(ErrorKind::DestinationExists(backup));
                }
                self.replicate(&original, cache_disk, TransferMode::Copy, false)?;
                self.replicate(&original, &backup, TransferMode::Move, self.policy.hide_backup)?;
            },
            CacheMode::Unknown => exn::bail!(ErrorKind::Blocked(self.id().clone())),
        }
        verified_link(&original, cache_disk)
    }

    /// Move the cached content back to the original path.
    ///
    /// In [`CacheMode::Copy`] a failure triggers
    /// [`revert_cached_item`](Self::revert_cached_item); the restore error is
    /// still returned, and the revert's own result ends up in the status and
    /// diagnostics.
    #[instrument(skip_all, fields(id = %self.id()))]
    pub fn restore_cache(&mut self) -> Result<Outcome> {
        if !self.admit("restore", &[CacheStatus::Cached]) {
            return Ok(Outcome::Rejected);
        }
        let original = self.original_path().to_path_buf();
        if link::occupied(&original) && !link::is_link(&original) {
            self.note(ErrorKind::StatusMismatch(original.clone()));
            return Err(self.fail(ErrorKind::DestinationExists(original)));
        }
        tracing::info!(path = %original.display(), "Restoring item");
        if let Err(err) = self.try_restore(&original) {
            let context = ErrorKind::RestoreFailed(self.id().clone());
            let err = self.terminal(err, CacheStatus::FailToRestore, context);
            if self.mode() == CacheMode::Copy {
                tracing::info!(id = %self.id(), "Reverting from backup after failed restore");
                if let Ok(outcome) = self.revert_cached_item() {
                    tracing::debug!(?outcome, "Automatic revert finished");
                }
            }
            return Err(err);
        }
        if self.mode() == CacheMode::Copy
            && let Some(backup) = self.backup_path().map(Path::to_path_buf)
        {
            self.remove_tree(&backup);
        }
        self.transition(CacheStatus::NotCached)?;
        Ok(Outcome::Done)
    }

    fn try_restore(&mut self, original: &Path) -> Result<()> {
        let cache_disk = self.cache_disk_path().to_path_buf();
        link::remove(original).or_raise(|| ErrorKind::LinkFailed(original.to_path_buf()))?;
        self.replicate(&cache_disk, original, TransferMode::Move, false)
    }

    /// Bring the backup back to the original path and discard the cache disk
    /// copy. [`CacheMode::Copy`] only.
    ///
    /// The cache disk copy is only deleted once the backup is fully back in
    /// place.
    #[instrument(skip_all, fields(id = %self.id()))]
    pub fn revert_cached_item(&mut self) -> Result<Outcome> {
        if self.blocked() {
            return Ok(Outcome::Rejected);
        }
        let original = self.original_path().to_path_buf();
        if self.mode() != CacheMode::Copy {
            self.note(ErrorKind::NoBackup(original));
            return Ok(Outcome::Rejected);
        }
        if !self.permits("revert", REVERTIBLE) {
            return Ok(Outcome::Rejected);
        }
        let Some(backup) = self.backup_path().filter(|path| path.is_dir()).map(Path::to_path_buf) else {
            let missing = self.backup_path().map_or_else(|| original.clone(), Path::to_path_buf);
            tracing::warn!(path = %missing.display(), "Backup is missing; nothing to revert to");
            self.note(ErrorKind::NoBackup(missing));
            return Ok(Outcome::Rejected);
        };
        tracing::info!(path = %original.display(), status = ?self.status(), "Reverting item from backup");
        if let Err(err) = self.try_revert(&original, &backup) {
            let context = ErrorKind::RevertFailed(self.id().clone());
            return Err(self.terminal(err, CacheStatus::FailToRevert, context));
        }
        let cache_disk = self.cache_disk_path().to_path_buf();
        self.remove_tree(&cache_disk);
        self.transition(CacheStatus::NotCached)?;
        Ok(Outcome::Done)
    }

    fn try_revert(&mut self, original: &Path, backup: &Path) -> Result<()> {
        if link::is_link(original) {
            link::remove(original).or_raise(|| ErrorKind::LinkFailed(original.to_path_buf()))?;
        } else if original.is_dir() {
            // Only a failed restore or revert leaves a real directory behind;
            // the cache disk still has everything in that case.
            if !matches!(self.status(), CacheStatus::FailToRestore | CacheStatus::FailToRevert) {
                exn::bail!(ErrorKind::DestinationExists(original.to_path_buf()));
            }
            tracing::info!(path = %original.display(), "Removing partial restore");
            replicate::remove_tree(original).or_raise(|| ErrorKind::CleanupFailed(original.to_path_buf()))?;
        }
        self.replicate(backup, original, TransferMode::Move, false)
    }

    /// Delete the record file. Only allowed while the item is not cached.
    #[instrument(skip_all, fields(id = %self.id()))]
    pub fn remove_record(&mut self) -> Result<()> {
        if self.status() != CacheStatus::NotCached {
            let kind = ErrorKind::RecordInUse(self.id().clone());
            return Err(self.fail(kind));
        }
        self.register.remove().or_raise(|| ErrorKind::Store)
    }

    fn admit(&mut self, operation: &'static str, allowed: &[CacheStatus]) -> bool {
        !self.blocked() && self.permits(operation, allowed)
    }

    fn blocked(&mut self) -> bool {
        if !self.is_blocked() {
            return false;
        }
        tracing::warn!(id = %self.id(), mode = ?self.mode(), "Operation blocked by register");
        self.note(ErrorKind::Blocked(self.id().clone()));
        true
    }

    fn permits(&mut self, operation: &'static str, allowed: &[CacheStatus]) -> bool {
        let status = self.status();
        if allowed.contains(&status) {
            return true;
        }
        tracing::debug!(operation, ?status, "Operation not allowed in current status");
        self.note(ErrorKind::IllegalState { operation, status });
        false
    }

    fn replicate(&mut self, source: &Path, destination: &Path, mode: TransferMode, hide: bool) -> Result<()> {
        let failed = ErrorKind::TransferFailed { source: source.to_path_buf(), destination: destination.to_path_buf() };
        let options = self.policy.options(mode, hide);
        let progress = self.progress.as_deref_mut().map(|p| p as &mut dyn Progress);
        let report =
            transfer(source, destination, &options, self.replicator.as_ref(), progress).or_raise(|| failed.clone())?;
        for error in &report.errors {
            let kind: &cachedisk_replicate::error::ErrorKind = error;
            self.note(ErrorKind::Transfer(kind.to_string()));
        }
        if !report.is_complete() {
            exn::bail!(failed);
        }
        Ok(())
    }

    /// Best effort; a leftover tree only costs space.
    fn remove_tree(&mut self, path: &Path) {
        match replicate::remove_tree(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed tree"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {},
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Could not remove tree");
                self.note(ErrorKind::CleanupFailed(path.to_path_buf()));
            },
        }
    }

    /// Persist a status change.
    fn transition(&mut self, status: CacheStatus) -> Result<()> {
        let from = self.status();
        match self.register.refresh_status(status) {
            Ok(codes) => {
                self.diagnostics.extend(codes.into_iter().map(ErrorKind::Register));
                tracing::info!(id = %self.id(), ?from, to = ?status, "Status changed");
                Ok(())
            },
            Err(err) => {
                tracing::warn!(id = %self.id(), ?status, "Status change could not be persisted");
                self.note(ErrorKind::Register(IntegrityCode::Unwritable));
                Err(err.raise(ErrorKind::Persist(self.id().clone())))
            },
        }
    }

    /// Record a failed operation: the cause and `context` go into the
    /// diagnostics, and `status` is persisted.
    fn terminal(&mut self, err: Error, status: CacheStatus, context: ErrorKind) -> Error {
        let cause: ErrorKind = (*err).clone();
        tracing::warn!(id = %self.id(), error = %cause, ?status, "Operation failed");
        self.note(cause);
        self.note(context.clone());
        // A persistence failure is already in the diagnostics; the operation's
        // own error is the one to return.
        let _ = self.transition(status);
        err.raise(context)
    }

    fn fail(&mut self, kind: ErrorKind) -> Error {
        self.note(kind.clone());
        Exn::from(kind)
    }

    fn note(&mut self, kind: ErrorKind) {
        tracing::debug!(diagnostic = %kind, "Diagnostic recorded");
        self.diagnostics.push(kind);
    }
}

impl fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("record", self.register.record())
            .field("diagnostics", &self.diagnostics)
            .field("progress", &self.progress.is_some())
            .finish_non_exhaustive()
    }
}

/// Link `original` to `cache_disk` and check the link reads back as exactly
/// that target.
fn verified_link(original: &Path, cache_disk: &Path) -> Result<()> {
    link::create(cache_disk, original).or_raise(|| ErrorKind::LinkFailed(original.to_path_buf()))?;
    let actual = fs::read_link(original).or_raise(|| ErrorKind::LinkFailed(original.to_path_buf()))?;
    if actual != cache_disk {
        exn::bail!(ErrorKind::LinkMismatch {
            link: original.to_path_buf(),
            expected: cache_disk.to_path_buf(),
            actual,
        });
    }
    tracing::debug!(link = %original.display(), target = %cache_disk.display(), "Link verified");
    Ok(())
}
