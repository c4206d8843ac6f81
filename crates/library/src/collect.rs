use std::cmp::Reverse;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::config::LibraryConfig;
use crate::safety::check_path;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ItemKind {
    File,
    Dir,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkItem {
    pub path: PathBuf,
    /// Depth below the library root; direct children of the root are 0.
    pub depth: usize,
    pub kind: ItemKind,
}

#[derive(Debug, Default)]
pub struct Collection {
    pub items: Vec<WorkItem>,
    pub unsafe_skipped: usize,
    pub walk_errors: usize,
    pub non_media_files: usize,
}

impl Collection {
    pub fn files(&self) -> usize {
        self.items.iter().filter(|item| item.kind == ItemKind::File).count()
    }

    pub fn dirs(&self) -> usize {
        self.items.iter().filter(|item| item.kind == ItemKind::Dir).count()
    }
}

/// Walks `root` and returns every media file plus every directory holding
/// media somewhere beneath it, deepest first and files before directories.
///
/// Symlinks are never followed and excluded directories are not entered.
pub fn collect_items(root: &Path, config: &LibraryConfig) -> Collection {
    let mut out = Collection::default();
    let mut dirs_with_media: HashSet<PathBuf> = HashSet::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .map(|name| config.should_skip_dir(name))
                    .unwrap_or(false))
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("walk error under {:?}: {}", root, err);
                out.walk_errors += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if !config.is_media_path(path) {
            out.non_media_files += 1;
            continue;
        }
        if let Err(err) = check_path(root, path) {
            warn!("skipping {}", err);
            out.unsafe_skipped += 1;
            continue;
        }

        let mut ancestor = path.parent();
        while let Some(dir) = ancestor {
            if dir == root || !dir.starts_with(root) {
                break;
            }
            if !dirs_with_media.insert(dir.to_path_buf()) {
                break;
            }
            ancestor = dir.parent();
        }

        out.items.push(WorkItem {
            path: path.to_path_buf(),
            depth: entry.depth() - 1,
            kind: ItemKind::File,
        });
    }

    for dir in dirs_with_media {
        let depth = match dir.strip_prefix(root) {
            Ok(rel) => rel.components().count().saturating_sub(1),
            Err(_) => continue,
        };
        out.items.push(WorkItem {
            path: dir,
            depth,
            kind: ItemKind::Dir,
        });
    }

    sort_items(&mut out.items);
    out
}

pub fn sort_items(items: &mut [WorkItem]) {
    items.sort_by(|a, b| {
        (Reverse(a.depth), a.kind, &a.path).cmp(&(Reverse(b.depth), b.kind, &b.path))
    });
}
