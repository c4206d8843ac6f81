use std::collections::HashMap;
use std::path::{Path, PathBuf};

use common::canonical_key;
use metadata::{TagInfo, TagReader};
use tracing::{debug, info, warn};

use crate::collect::{ItemKind, WorkItem};
use crate::config::LibraryConfig;
use crate::fsview::TreeView;
use crate::names::{normalize_name, NameError, NameKind};
use crate::renames::RenameMap;
use crate::report::{FolderMergeRecord, OrganizeReport, RenameRecord};
use crate::safety::check_path;
use crate::unique::resolve_unique_name;
use crate::LibraryError;

/// Read-only inputs shared by every phase of a run.
pub struct RunContext<'a> {
    pub root: &'a Path,
    pub config: &'a LibraryConfig,
    pub tags: &'a dyn TagReader,
}

/// Per parent directory, the first folder registered under each canonical key.
#[derive(Debug, Default)]
pub struct FolderRegistry {
    by_parent: HashMap<PathBuf, HashMap<String, PathBuf>>,
}

impl FolderRegistry {
    pub fn lookup(&self, parent: &Path, key: &str) -> Option<&Path> {
        self.by_parent
            .get(parent)
            .and_then(|keys| keys.get(key))
            .map(PathBuf::as_path)
    }

    /// Registers `dir` unless the key is already taken. Returns whether it was stored.
    pub fn register(&mut self, parent: &Path, key: &str, dir: &Path) -> bool {
        let keys = self.by_parent.entry(parent.to_path_buf()).or_default();
        if keys.contains_key(key) {
            return false;
        }
        keys.insert(key.to_string(), dir.to_path_buf());
        true
    }
}

/// Mutable state threaded through the rename, prune and playlist phases.
pub struct RunState {
    pub renames: RenameMap,
    pub registry: FolderRegistry,
    pub report: OrganizeReport,
}

impl RunState {
    pub fn new(report: OrganizeReport) -> Self {
        Self {
            renames: RenameMap::new(),
            registry: FolderRegistry::default(),
            report,
        }
    }
}

pub(crate) fn preview_prefix(view: &TreeView) -> &'static str {
    if view.is_preview() {
        "[preview] "
    } else {
        ""
    }
}

/// Renames and merges every work item, in order. Item failures are logged and counted.
pub fn rename_and_merge(
    ctx: &RunContext<'_>,
    view: &mut TreeView,
    state: &mut RunState,
    items: &[WorkItem],
) {
    for item in items {
        state.report.processed += 1;
        match item.kind {
            ItemKind::File => state.report.files += 1,
            ItemKind::Dir => state.report.dirs += 1,
        }
        match process_item(ctx, view, state, item) {
            Ok(()) => {}
            Err(LibraryError::Unsafe(err)) => {
                warn!("skipping {}", err);
                state.report.unsafe_skipped += 1;
            }
            Err(err) => {
                warn!("failed on {:?}: {}", item.path, err);
                state.report.errors += 1;
            }
        }
    }
}

fn process_item(
    ctx: &RunContext<'_>,
    view: &mut TreeView,
    state: &mut RunState,
    item: &WorkItem,
) -> Result<(), LibraryError> {
    let path = state.renames.resolve(&item.path);
    if path != item.path {
        debug!("{:?} now lives at {:?}", item.path, path);
    }
    if !view.exists(&path) {
        return Err(LibraryError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("vanished before processing: {}", path.display()),
        )));
    }
    let physical = view.physical(&path).unwrap_or_else(|| path.clone());
    check_path(ctx.root, &physical)?;

    let name = file_name_str(&path)?;
    let parent = match path.parent() {
        Some(parent) => parent.to_path_buf(),
        None => return Ok(()),
    };

    match item.kind {
        ItemKind::File => {
            let tags = read_tags_lenient(ctx, state, &physical);
            let desired = normalize_name(
                &name,
                NameKind::File {
                    catalog_id: tags.catalog_id.as_deref(),
                },
                ctx.config.max_name_bytes,
            )?;
            if desired == name {
                return Ok(());
            }
            rename_entry(ctx, view, state, &path, &item.path, &parent, &desired)?;
            Ok(())
        }
        ItemKind::Dir => process_dir(ctx, view, state, &path, &item.path, &parent, &name),
    }
}

fn process_dir(
    ctx: &RunContext<'_>,
    view: &mut TreeView,
    state: &mut RunState,
    path: &Path,
    original: &Path,
    parent: &Path,
    name: &str,
) -> Result<(), LibraryError> {
    let desired = normalize_name(name, NameKind::Dir, ctx.config.max_name_bytes)?;
    let key = canonical_key(&desired);
    // names with no ascii letters or digits share the empty key; they only
    // ever collide by exact normalized name
    let registered = if key.is_empty() {
        None
    } else {
        state
            .registry
            .lookup(parent, &key)
            .map(Path::to_path_buf)
            .filter(|existing| existing != path)
    };

    if let Some(existing) = registered {
        debug!("{:?} shares key {:?} with {:?}", path, key, existing);
        merge_into(ctx, view, state, path, &existing)?;
        return Ok(());
    }

    if desired == name {
        if !key.is_empty() {
            state.registry.register(parent, &key, path);
        }
        return Ok(());
    }

    let target = parent.join(&desired);
    if view.exists(&target) && !view.same_entry(path, &target) && view.is_dir(&target) {
        merge_into(ctx, view, state, path, &target)?;
        if !key.is_empty() {
            state.registry.register(parent, &key, &target);
        }
        return Ok(());
    }

    let landed = rename_entry(ctx, view, state, path, original, parent, &desired)?;
    if !key.is_empty() {
        state.registry.register(parent, &key, &landed);
    }
    Ok(())
}

/// Renames `path` to `desired` inside `parent`, picking a variant when the name is taken.
fn rename_entry(
    ctx: &RunContext<'_>,
    view: &mut TreeView,
    state: &mut RunState,
    path: &Path,
    original: &Path,
    parent: &Path,
    desired: &str,
) -> Result<PathBuf, LibraryError> {
    let mut target = parent.join(desired);
    if view.exists(&target) && !view.same_entry(path, &target) {
        let unique = resolve_unique_name(
            view,
            parent,
            desired,
            original,
            ctx.config.unique_name_attempts,
        );
        if let Some(record) = unique.duplicate {
            info!(
                "{}name taken, using {} for {:?}",
                preview_prefix(view),
                record.assigned_name,
                original
            );
            state.report.duplicates.push(record);
        }
        target = parent.join(unique.name);
    }

    view.rename(path, &target)?;
    info!("{}renamed {:?} -> {:?}", preview_prefix(view), path, target);
    state.renames.record_move(path, &target);
    state.report.renamed.push(RenameRecord {
        from: path.to_path_buf(),
        to: target.clone(),
    });
    Ok(target)
}

fn merge_into(
    ctx: &RunContext<'_>,
    view: &mut TreeView,
    state: &mut RunState,
    source: &Path,
    target: &Path,
) -> Result<(), LibraryError> {
    let items_moved = merge_dirs(ctx, view, state, source, target)?;
    info!(
        "{}merged {:?} into {:?} ({} items)",
        preview_prefix(view),
        source,
        target,
        items_moved
    );
    state.report.merges.push(FolderMergeRecord {
        source_dir: source.to_path_buf(),
        target_dir: target.to_path_buf(),
        items_moved,
    });
    Ok(())
}

/// Moves the contents of `source` into `target`, recursing into folders both
/// sides have and renaming file collisions, then removes `source`.
fn merge_dirs(
    ctx: &RunContext<'_>,
    view: &mut TreeView,
    state: &mut RunState,
    source: &Path,
    target: &Path,
) -> Result<usize, LibraryError> {
    let mut moved = 0;
    for child in view.list_dir(source)? {
        if view.is_symlink(&child) {
            warn!("leaving symlink {:?} in place during merge", child);
            state.report.unsafe_skipped += 1;
            continue;
        }
        let name = file_name_str(&child)?;
        let dest = target.join(&name);
        let taken = view.exists(&dest) && !view.same_entry(&child, &dest);

        if taken && view.is_dir(&child) && view.is_dir(&dest) {
            moved += merge_dirs(ctx, view, state, &child, &dest)?;
            continue;
        }
        if !taken && view.is_dir(&child) {
            if let Some(twin) = find_dir_by_key(ctx, view, target, &child, &name)? {
                debug!("{:?} shares a key with {:?}", child, twin);
                moved += merge_dirs(ctx, view, state, &child, &twin)?;
                continue;
            }
        }

        let dest = if taken {
            let unique =
                resolve_unique_name(view, target, &name, &child, ctx.config.unique_name_attempts);
            if let Some(record) = unique.duplicate {
                state.report.duplicates.push(record);
            }
            target.join(unique.name)
        } else {
            dest
        };
        view.rename(&child, &dest)?;
        debug!("{}moved {:?} -> {:?}", preview_prefix(view), child, dest);
        state.renames.record_move(&child, &dest);
        moved += 1;
    }

    if let Err(err) = view.remove_dir(source) {
        warn!("could not remove merged folder {:?}: {}", source, err);
        state.report.errors += 1;
    }
    state.renames.record_move(source, target);
    Ok(moved)
}

/// A folder in `parent` other than `dir` whose name has the same non-empty canonical key.
fn find_dir_by_key(
    ctx: &RunContext<'_>,
    view: &TreeView,
    parent: &Path,
    dir: &Path,
    name: &str,
) -> Result<Option<PathBuf>, LibraryError> {
    let key = canonical_key(name);
    if key.is_empty() {
        return Ok(None);
    }
    for sibling in view.list_dir(parent)? {
        if sibling == dir || view.is_symlink(&sibling) || !view.is_dir(&sibling) {
            continue;
        }
        let sibling_name = file_name_str(&sibling)?;
        if ctx.config.should_skip_dir(&sibling_name) {
            continue;
        }
        if canonical_key(&sibling_name) == key {
            return Ok(Some(sibling));
        }
    }
    Ok(None)
}

fn read_tags_lenient(ctx: &RunContext<'_>, state: &mut RunState, path: &Path) -> TagInfo {
    let tags = match ctx.tags.read(path) {
        Ok(tags) => tags,
        Err(err) => {
            debug!("tag read failed for {:?}: {}", path, err);
            state.report.tag_failures += 1;
            TagInfo::default()
        }
    };
    if tags.catalog_id.is_some() {
        state.report.with_catalog_id += 1;
    } else {
        state.report.without_catalog_id += 1;
    }
    tags
}

pub(crate) fn file_name_str(path: &Path) -> Result<String, NameError> {
    let raw = path
        .file_name()
        .ok_or_else(|| NameError::NonUtf8(path.display().to_string()))?;
    raw.to_str()
        .map(|name| name.to_string())
        .ok_or_else(|| NameError::NonUtf8(raw.to_string_lossy().to_string()))
}
