//! Tree enumeration
//!
//! Yields the root-relative key of every regular, non-hidden file. Hidden
//! directories are pruned, so nothing beneath them is visited.

use std::path::{Component, Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::error::{FreezeError, Result};

/// A file found by the walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Root-relative path with `/` separators, used as the snapshot key
    pub key: String,
    /// Full path used to open the file
    pub path: PathBuf,
}

/// Walk `root` lazily.
///
/// The first traversal error is yielded as `Err` and the caller is expected
/// to stop there; nothing is salvaged from a failed walk.
pub fn walk_tree(root: &Path) -> impl Iterator<Item = Result<TreeEntry>> + use<> {
    let root = root.to_path_buf();
    WalkDir::new(&root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry))
        .filter_map(move |entry| match entry {
            Ok(entry) if entry.file_type().is_file() => Some(tree_entry(&root, entry)),
            Ok(_) => None,
            Err(source) => {
                let path = source.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                Some(Err(FreezeError::Traversal { path, source }))
            }
        })
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

fn tree_entry(root: &Path, entry: DirEntry) -> Result<TreeEntry> {
    let key = relative_key(root, entry.path())?;
    Ok(TreeEntry { key, path: entry.into_path() })
}

/// Root-relative key for `path`, joined with `/` on every platform
pub fn relative_key(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| FreezeError::OutsideRoot { path: path.to_path_buf() })?;

    let parts: Vec<_> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect();

    Ok(parts.join("/"))
}
