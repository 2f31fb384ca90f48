use std::ffi::{OsStr, OsString};
use std::path::{Component, Path, PathBuf};

const BACKUP_SUFFIX: &str = ".cached";

/// Absolute, lexically normalised form of `path`.
///
/// `None` if it is relative, climbs above the root or names the root itself.
/// Register records are line-oriented UTF-8, so a component that isn't valid
/// UTF-8 or holds a null byte or line break is refused as well.
pub(crate) fn qualify(path: &Path) -> Option<PathBuf> {
    if !path.is_absolute() {
        return None;
    }
    let mut anchor = PathBuf::new();
    let mut components: Vec<&OsStr> = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => anchor.push(component.as_os_str()),
            Component::CurDir => {},
            Component::ParentDir => {
                components.pop()?;
            },
            Component::Normal(s) => {
                if s.to_str()?.contains(['\0', '\n', '\r']) {
                    return None;
                }
                components.push(s);
            },
        }
    }
    if components.is_empty() {
        return None;
    }
    anchor.extend(components);
    Some(anchor)
}

/// `container/leaf`, unless `container` already ends in `leaf`.
pub(crate) fn with_leaf(container: &Path, leaf: &OsStr) -> PathBuf {
    if container.file_name() == Some(leaf) { container.to_path_buf() } else { container.join(leaf) }
}

/// Name of an item's backup copy: `<leaf>.cached`.
pub(crate) fn backup_leaf(leaf: &OsStr) -> OsString {
    let mut name = leaf.to_os_string();
    name.push(BACKUP_SUFFIX);
    name
}
