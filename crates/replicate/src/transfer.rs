use crate::capability::MetadataReplicator;
use crate::error::{Error, ErrorKind, Result};
use crate::options::{TransferMode, TransferOptions};
use crate::progress::Progress;
use exn::{Exn, ResultExt};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::instrument;
use walkdir::WalkDir;

/// Summary of a finished [`transfer`].
#[derive(Debug, Default)]
pub struct Report {
    /// Number of directories and files found under the source root.
    pub total: u64,
    /// Number of entries that were handled (created, copied, or already
    /// present at the destination).
    pub processed: u64,
    /// Every non-fatal failure, in the order it happened.
    pub errors: Vec<Error>,
    /// The whole tree was moved with a single `rename`.
    pub renamed: bool,
    /// Move semantics: the source tree no longer exists.
    pub source_removed: bool,
}
impl Report {
    /// `true` unless an error may have left data behind. Metadata-only
    /// failures don't count.
    pub fn is_complete(&self) -> bool {
        !self.errors.iter().any(|e| e.affects_data())
    }

    fn push(&mut self, error: Error) {
        let kind: &ErrorKind = &error;
        tracing::warn!(error = %kind, "Transfer entry failed");
        self.errors.push(error);
    }

    /// Record a failed per-entry operation, returning the success value if
    /// there was one.
    fn note<T>(&mut self, result: io::Result<T>, kind: impl FnOnce() -> ErrorKind) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.push(Exn::from(e).raise(kind()));
                None
            },
        }
    }
}

enum Entry {
    File(PathBuf),
    Link(PathBuf),
}

/// Replicate the tree at `source` into `destination`.
///
/// Order of work:
/// 1. enumerate every directory, then every file;
/// 2. create the destination root (and mirror its access control);
/// 3. create each directory;
/// 4. copy each file that doesn't already exist at the destination and mirror
///    its metadata (symlinks are recreated, not followed);
/// 5. mirror directory metadata, deepest first, once their contents exist;
/// 6. for [`TransferMode::Move`], remove the source, but only if nothing
///    data-affecting failed;
/// 7. hide the destination if asked to.
///
/// # Errors
/// Only problems with the roots themselves are returned as `Err`. Everything
/// else ends up in [`Report::errors`].
#[instrument(level = "debug", skip_all, fields(source = %source.display(), destination = %destination.display(), mode = ?options.mode))]
pub fn transfer(
    source: &Path,
    destination: &Path,
    options: &TransferOptions,
    replicator: &dyn MetadataReplicator,
    mut progress: Option<&mut dyn Progress>,
) -> Result<Report> {
    let metadata = match fs::symlink_metadata(source) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => exn::bail!(ErrorKind::SourceNotFound(source.to_path_buf())),
        Err(e) => return Err(e).or_raise(|| ErrorKind::Walk(source.to_path_buf())),
    };
    if !metadata.is_dir() {
        exn::bail!(ErrorKind::NotADirectory(source.to_path_buf()));
    }

    let mut report = Report::default();
    if options.mode == TransferMode::Move
        && options.rename_when_possible
        && try_rename(source, destination).or_raise(|| ErrorKind::DestinationRoot(destination.to_path_buf()))?
    {
        report.renamed = true;
        report.source_removed = true;
        hide(&mut report, destination, options, replicator);
        tracing::debug!("Moved tree with a single rename");
        return Ok(report);
    }

    let (directories, files) = enumerate(source, &mut report);
    report.total = u64::try_from(directories.len() + files.len()).unwrap_or(u64::MAX);

    fs::create_dir_all(destination).or_raise(|| ErrorKind::DestinationRoot(destination.to_path_buf()))?;
    if options.replicate_access_control {
        let result = replicator.replicate_access_control(source, destination);
        report.note(result, || ErrorKind::Metadata(destination.to_path_buf()));
    }
    if let Some(p) = progress.as_deref_mut() {
        p.report(report.total, report.processed);
    }

    let mut created = Vec::with_capacity(directories.len());
    for directory in &directories {
        let target = mirror(source, destination, directory);
        if target.is_dir() {
            created.push((directory.as_path(), target));
            report.processed += 1;
        } else if report.note(fs::create_dir_all(&target), || ErrorKind::CreateDirectory(target.clone())).is_some() {
            created.push((directory.as_path(), target));
            report.processed += 1;
        }
        if let Some(p) = progress.as_deref_mut() {
            p.report(report.total, report.processed);
        }
    }

    for file in &files {
        let handled = match file {
            Entry::File(path) => copy_file(&mut report, path, &mirror(source, destination, path), options, replicator),
            Entry::Link(path) => copy_link(&mut report, path, &mirror(source, destination, path)),
        };
        if handled {
            report.processed += 1;
        }
        if let Some(p) = progress.as_deref_mut() {
            p.report(report.total, report.processed);
        }
    }

    // Deferred so a read-only source directory doesn't stop its own
    // contents from being copied.
    for (directory, target) in created.iter().rev().map(|(d, t)| (*d, t.as_path())).chain([(source, destination)]) {
        mirror_metadata(&mut report, directory, target, options, replicator, target != destination);
    }

    if options.mode == TransferMode::Move {
        if report.is_complete() {
            let removed = remove_tree(source);
            report.source_removed = report.note(removed, || ErrorKind::RemoveSource(source.to_path_buf())).is_some();
        } else {
            report.push(Exn::from(ErrorKind::SourceRetained(source.to_path_buf())));
        }
    }

    hide(&mut report, destination, options, replicator);
    tracing::debug!(total = report.total, processed = report.processed, errors = report.errors.len(), "Transfer finished");
    Ok(report)
}

/// Delete the tree at `path`, including the contents of directories its
/// owner can't write to.
///
/// Every real directory under `path` is given owner `rwx` first (on Windows,
/// read-only entries are cleared instead), then the tree goes through
/// [`fs::remove_dir_all`]. A link at `path` is removed without touching what
/// it points at.
pub fn remove_tree(path: &Path) -> io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        unlock(path);
    }
    fs::remove_dir_all(path)
}

fn walk_all(root: &Path) -> impl Iterator<Item = walkdir::DirEntry> {
    WalkDir::new(root).follow_links(false).follow_root_links(false).into_iter().filter_map(std::result::Result::ok)
}

#[cfg(unix)]
fn unlock(root: &Path) {
    use std::os::unix::fs::PermissionsExt;
    for entry in walk_all(root).filter(|entry| entry.file_type().is_dir()) {
        let Ok(metadata) = entry.metadata() else { continue };
        let mut permissions = metadata.permissions();
        let mode = permissions.mode();
        if mode & 0o700 == 0o700 {
            continue;
        }
        permissions.set_mode(mode | 0o700);
        if let Err(e) = fs::set_permissions(entry.path(), permissions) {
            tracing::debug!(path = %entry.path().display(), error = %e, "Could not make directory writable");
        }
    }
}

#[cfg(not(unix))]
fn unlock(root: &Path) {
    for entry in walk_all(root) {
        let Ok(metadata) = entry.metadata() else { continue };
        let mut permissions = metadata.permissions();
        if !permissions.readonly() {
            continue;
        }
        permissions.set_readonly(false);
        if let Err(e) = fs::set_permissions(entry.path(), permissions) {
            tracing::debug!(path = %entry.path().display(), error = %e, "Could not clear read-only flag");
        }
    }
}

/// Returns `Ok(true)` if the rename happened. A failed rename is not an
/// error (the caller falls back to walking); failing to create the
/// destination's parent is.
fn try_rename(source: &Path, destination: &Path) -> io::Result<bool> {
    if fs::symlink_metadata(destination).is_ok() {
        return Ok(false);
    }
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::rename(source, destination) {
        Ok(()) => Ok(true),
        Err(e) => {
            tracing::debug!(error = %e, "Rename not possible; copying instead");
            Ok(false)
        },
    }
}

fn enumerate(source: &Path, report: &mut Report) -> (Vec<PathBuf>, Vec<Entry>) {
    let mut directories = Vec::new();
    let mut files = Vec::new();
    for entry in WalkDir::new(source).min_depth(1).follow_links(false) {
        match entry {
            Ok(entry) if entry.file_type().is_dir() => directories.push(entry.into_path()),
            Ok(entry) if entry.file_type().is_symlink() => files.push(Entry::Link(entry.into_path())),
            Ok(entry) => files.push(Entry::File(entry.into_path())),
            Err(e) => {
                let path = e.path().map_or_else(|| source.to_path_buf(), Path::to_path_buf);
                report.push(Exn::from(e).raise(ErrorKind::Walk(path)));
            },
        }
    }
    (directories, files)
}

/// Map a path under `source` to the same relative path under `destination`.
fn mirror(source: &Path, destination: &Path, path: &Path) -> PathBuf {
    // WalkDir only yields paths prefixed by its root.
    match path.strip_prefix(source) {
        Ok(relative) => destination.join(relative),
        Err(_) => destination.join(path.file_name().unwrap_or(path.as_os_str())),
    }
}

fn copy_file(
    report: &mut Report,
    source: &Path,
    target: &Path,
    options: &TransferOptions,
    replicator: &dyn MetadataReplicator,
) -> bool {
    if fs::symlink_metadata(target).is_ok() {
        tracing::trace!(path = %target.display(), "Already exists at destination; skipping");
        return true;
    }
    if report.note(fs::copy(source, target), || ErrorKind::CopyFile(target.to_path_buf())).is_none() {
        return false;
    }
    mirror_metadata(report, source, target, options, replicator, true);
    true
}

fn copy_link(report: &mut Report, source: &Path, target: &Path) -> bool {
    if fs::symlink_metadata(target).is_ok() {
        return true;
    }
    let Some(link) = report.note(fs::read_link(source), || ErrorKind::CopyLink(target.to_path_buf())) else {
        return false;
    };
    report.note(create_link(source, &link, target), || ErrorKind::CopyLink(target.to_path_buf())).is_some()
}

#[cfg(unix)]
fn create_link(_source: &Path, link: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(link, target)
}

#[cfg(windows)]
fn create_link(source: &Path, link: &Path, target: &Path) -> io::Result<()> {
    // Windows needs to know up front whether the link points at a directory.
    if fs::metadata(source).is_ok_and(|m| m.is_dir()) {
        std::os::windows::fs::symlink_dir(link, target)
    } else {
        std::os::windows::fs::symlink_file(link, target)
    }
}

fn mirror_metadata(
    report: &mut Report,
    source: &Path,
    target: &Path,
    options: &TransferOptions,
    replicator: &dyn MetadataReplicator,
    access_control: bool,
) {
    if access_control && options.replicate_access_control {
        let result = replicator.replicate_access_control(source, target);
        report.note(result, || ErrorKind::Metadata(target.to_path_buf()));
    }
    if options.replicate_attributes {
        let result = replicator.replicate_attributes(source, target);
        report.note(result, || ErrorKind::Metadata(target.to_path_buf()));
    }
}

fn hide(report: &mut Report, destination: &Path, options: &TransferOptions, replicator: &dyn MetadataReplicator) {
    if options.hide_destination {
        let result = replicator.hide(destination);
        report.note(result, || ErrorKind::Hide(destination.to_path_buf()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NoopReplicator, PlatformReplicator};
    use rstest::rstest;
    use std::sync::Mutex;

    /// Source tree used by most tests:
    ///
    /// ```text
    /// item/
    ///   top.txt
    ///   empty/
    ///   nested/
    ///     inner.txt
    ///     deeper/
    ///       deep.bin
    /// ```
    fn sample_tree(root: &Path) -> PathBuf {
        let item = root.join("item");
        fs::create_dir_all(item.join("empty")).unwrap();
        fs::create_dir_all(item.join("nested/deeper")).unwrap();
        fs::write(item.join("top.txt"), b"top").unwrap();
        fs::write(item.join("nested/inner.txt"), b"inner").unwrap();
        fs::write(item.join("nested/deeper/deep.bin"), [0u8, 1, 2, 3]).unwrap();
        item
    }

    fn assert_sample_tree(root: &Path) {
        assert!(root.join("empty").is_dir());
        assert_eq!(fs::read(root.join("top.txt")).unwrap(), b"top");
        assert_eq!(fs::read(root.join("nested/inner.txt")).unwrap(), b"inner");
        assert_eq!(fs::read(root.join("nested/deeper/deep.bin")).unwrap(), [0u8, 1, 2, 3]);
    }

    /// Records calls and fails every one of them.
    #[derive(Default)]
    struct FailingReplicator {
        calls: Mutex<Vec<String>>,
    }
    impl MetadataReplicator for FailingReplicator {
        fn name(&self) -> &str {
            "failing"
        }

        fn replicate_access_control(&self, _source: &Path, _destination: &Path) -> io::Result<()> {
            self.calls.lock().unwrap().push("acl".to_string());
            Err(io::Error::other("no access control here"))
        }

        fn replicate_attributes(&self, _source: &Path, _destination: &Path) -> io::Result<()> {
            self.calls.lock().unwrap().push("attributes".to_string());
            Err(io::Error::other("no attributes here"))
        }

        fn hide(&self, _path: &Path) -> io::Result<()> {
            self.calls.lock().unwrap().push("hide".to_string());
            Err(io::Error::other("no hiding here"))
        }
    }

    #[rstest]
    #[case::rename(true)]
    #[case::walk(false)]
    fn test_move(#[case] rename: bool) {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = sample_tree(temp_dir.path());
        let destination = temp_dir.path().join("cache/item");
        let options = TransferOptions::relocate().with_rename(rename);
        let report = transfer(&source, &destination, &options, &PlatformReplicator, None).unwrap();
        assert!(report.is_complete(), "{:?}", report.errors);
        assert_eq!(report.renamed, rename);
        assert!(report.source_removed);
        assert!(!source.exists());
        assert_sample_tree(&destination);
    }

    #[test]
    fn test_copy_keeps_source() {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = sample_tree(temp_dir.path());
        let destination = temp_dir.path().join("copy");
        let report = transfer(&source, &destination, &TransferOptions::copy(), &PlatformReplicator, None).unwrap();
        assert!(report.is_complete());
        assert!(!report.source_removed);
        assert_eq!(report.total, 6);
        assert_eq!(report.processed, 6);
        assert_sample_tree(&source);
        assert_sample_tree(&destination);
    }

    #[test]
    fn test_existing_files_are_not_overwritten() {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = sample_tree(temp_dir.path());
        let destination = temp_dir.path().join("copy");
        fs::create_dir_all(&destination).unwrap();
        fs::write(destination.join("top.txt"), b"already here").unwrap();
        let report = transfer(&source, &destination, &TransferOptions::copy(), &NoopReplicator, None).unwrap();
        assert!(report.is_complete());
        assert_eq!(fs::read(destination.join("top.txt")).unwrap(), b"already here");
        assert_eq!(fs::read(destination.join("nested/inner.txt")).unwrap(), b"inner");
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = sample_tree(temp_dir.path());
        let destination = temp_dir.path().join("copy");
        transfer(&source, &destination, &TransferOptions::copy(), &NoopReplicator, None).unwrap();
        let report = transfer(&source, &destination, &TransferOptions::copy(), &NoopReplicator, None).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.processed, report.total);
        assert_sample_tree(&destination);
    }

    #[test]
    fn test_entry_failure_does_not_abort() {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = sample_tree(temp_dir.path());
        let destination = temp_dir.path().join("copy");
        // A file squatting where the "nested" directory should go.
        fs::create_dir_all(&destination).unwrap();
        fs::write(destination.join("nested"), b"squatter").unwrap();
        let options = TransferOptions::relocate().with_rename(false);
        let report = transfer(&source, &destination, &options, &NoopReplicator, None).unwrap();
        assert!(!report.is_complete());
        assert!(report.errors.iter().any(|e| matches!(&**e, ErrorKind::CreateDirectory(_))));
        assert!(report.errors.iter().any(|e| matches!(&**e, ErrorKind::CopyFile(_))));
        // Unaffected entries still made it across.
        assert_eq!(fs::read(destination.join("top.txt")).unwrap(), b"top");
        assert!(destination.join("empty").is_dir());
        // Incomplete move never removes the source.
        assert!(!report.source_removed);
        assert!(report.errors.iter().any(|e| matches!(&**e, ErrorKind::SourceRetained(_))));
        assert_sample_tree(&source);
    }

    #[test]
    fn test_metadata_failures_are_not_fatal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = sample_tree(temp_dir.path());
        let destination = temp_dir.path().join("moved");
        let replicator = FailingReplicator::default();
        let options = TransferOptions::relocate().with_rename(false).hidden(true);
        let report = transfer(&source, &destination, &options, &replicator, None).unwrap();
        assert!(report.is_complete());
        assert!(report.source_removed);
        assert!(!report.errors.is_empty());
        assert!(report.errors.iter().all(|e| matches!(&**e, ErrorKind::Metadata(_) | ErrorKind::Hide(_))));
        assert_eq!(replicator.calls.lock().unwrap().last().map(String::as_str), Some("hide"));
        assert_sample_tree(&destination);
    }

    #[test]
    fn test_metadata_replication_disabled() {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = sample_tree(temp_dir.path());
        let replicator = FailingReplicator::default();
        let options = TransferOptions::copy().with_attributes(false).with_access_control(false);
        let report = transfer(&source, &temp_dir.path().join("copy"), &options, &replicator, None).unwrap();
        assert!(report.errors.is_empty());
        assert!(replicator.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_missing_source() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = transfer(
            &temp_dir.path().join("nope"),
            &temp_dir.path().join("copy"),
            &TransferOptions::copy(),
            &NoopReplicator,
            None,
        )
        .unwrap_err();
        assert!(matches!(&*err, ErrorKind::SourceNotFound(_)));
    }

    #[test]
    fn test_source_is_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("file");
        fs::write(&file, b"data").unwrap();
        let err = transfer(&file, &temp_dir.path().join("copy"), &TransferOptions::copy(), &NoopReplicator, None)
            .unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotADirectory(_)));
    }

    #[rstest]
    #[case::copy(TransferOptions::copy())]
    #[case::relocate(TransferOptions::relocate())]
    fn test_destination_root_blocked(#[case] options: TransferOptions) {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = sample_tree(temp_dir.path());
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, b"file, not directory").unwrap();
        let err = transfer(&source, &blocker.join("item"), &options, &NoopReplicator, None).unwrap_err();
        assert!(matches!(&*err, ErrorKind::DestinationRoot(_)));
        assert_sample_tree(&source);
    }

    #[test]
    fn test_progress() {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = sample_tree(temp_dir.path());
        let mut seen = Vec::new();
        let mut progress = |total: u64, processed: u64| seen.push((total, processed));
        transfer(
            &source,
            &temp_dir.path().join("copy"),
            &TransferOptions::copy(),
            &NoopReplicator,
            Some(&mut progress),
        )
        .unwrap();
        assert_eq!(seen.first(), Some(&(6, 0)));
        assert_eq!(seen.last(), Some(&(6, 6)));
        assert_eq!(seen.len(), 7);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_recreated() {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = sample_tree(temp_dir.path());
        std::os::unix::fs::symlink("top.txt", source.join("link.txt")).unwrap();
        let destination = temp_dir.path().join("copy");
        let report = transfer(&source, &destination, &TransferOptions::copy(), &NoopReplicator, None).unwrap();
        assert!(report.is_complete());
        let link = destination.join("link.txt");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&link).unwrap(), Path::new("top.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_read_only_directory_contents_are_copied() {
        use std::os::unix::fs::PermissionsExt;
        let temp_dir = tempfile::tempdir().unwrap();
        let source = sample_tree(temp_dir.path());
        fs::set_permissions(source.join("nested"), fs::Permissions::from_mode(0o555)).unwrap();
        let destination = temp_dir.path().join("copy");
        let report = transfer(&source, &destination, &TransferOptions::copy(), &PlatformReplicator, None).unwrap();
        assert!(report.is_complete(), "{:?}", report.errors);
        assert_sample_tree(&destination);
        let mode = fs::metadata(destination.join("nested")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o555);
        // Let tempdir clean up.
        fs::set_permissions(source.join("nested"), fs::Permissions::from_mode(0o755)).unwrap();
        fs::set_permissions(destination.join("nested"), fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_move_walk_removes_read_only_directories() {
        use std::os::unix::fs::PermissionsExt;
        let temp_dir = tempfile::tempdir().unwrap();
        let source = sample_tree(temp_dir.path());
        fs::set_permissions(source.join("nested/deeper"), fs::Permissions::from_mode(0o555)).unwrap();
        fs::set_permissions(source.join("nested"), fs::Permissions::from_mode(0o555)).unwrap();
        let destination = temp_dir.path().join("cache/item");
        let options = TransferOptions::relocate().with_rename(false);
        let report = transfer(&source, &destination, &options, &PlatformReplicator, None).unwrap();
        assert!(report.is_complete(), "{:?}", report.errors);
        assert!(report.source_removed);
        assert!(!source.exists());
        assert_sample_tree(&destination);
        // The copy keeps the source's permissions...
        let mode = fs::metadata(destination.join("nested")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o555);
        // ...and can itself be moved away again.
        remove_tree(&destination).unwrap();
        assert!(!destination.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_remove_tree_leaves_link_target_alone() {
        use std::os::unix::fs::PermissionsExt;
        let temp_dir = tempfile::tempdir().unwrap();
        let target = sample_tree(temp_dir.path());
        fs::set_permissions(target.join("nested"), fs::Permissions::from_mode(0o555)).unwrap();
        let link = temp_dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();
        remove_tree(&link).unwrap();
        assert!(fs::symlink_metadata(&link).is_err());
        let mode = fs::metadata(target.join("nested")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o555);
        assert_sample_tree(&target);
        fs::set_permissions(target.join("nested"), fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_remove_tree_missing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = remove_tree(&temp_dir.path().join("nope")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
