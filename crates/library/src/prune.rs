use std::io;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::LibraryConfig;
use crate::fsview::TreeView;
use crate::organize::{preview_prefix, RunState};

/// Removes every directory under `root` with no media file beneath it.
///
/// Children go before parents, so a chain of empty folders disappears in one
/// pass. Removal is remove-if-empty: folders still holding other files stay.
/// Symlinks and excluded folders are never entered or removed.
pub fn prune_empty_dirs(root: &Path, config: &LibraryConfig, view: &mut TreeView, state: &mut RunState) {
    if let Err(err) = visit(root, root, config, view, state) {
        warn!("prune failed under {:?}: {}", root, err);
        state.report.errors += 1;
    }
}

fn visit(
    root: &Path,
    dir: &Path,
    config: &LibraryConfig,
    view: &mut TreeView,
    state: &mut RunState,
) -> io::Result<bool> {
    let mut has_media = false;
    for child in view.list_dir(dir)? {
        if view.is_symlink(&child) {
            continue;
        }
        if view.is_dir(&child) {
            let skipped = child
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| config.should_skip_dir(name))
                .unwrap_or(false);
            if skipped {
                continue;
            }
            match visit(root, &child, config, view, state) {
                Ok(child_media) => has_media |= child_media,
                Err(err) => {
                    warn!("cannot scan {:?}: {}", child, err);
                    state.report.errors += 1;
                    has_media = true;
                }
            }
        } else if config.is_media_path(&child) {
            has_media = true;
        }
    }

    if has_media || dir == root {
        return Ok(has_media);
    }

    match view.remove_dir(dir) {
        Ok(()) => {
            info!("{}removed empty folder {:?}", preview_prefix(view), dir);
            state.report.pruned.push(dir.to_path_buf());
        }
        Err(err)
            if matches!(
                err.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::DirectoryNotEmpty
            ) =>
        {
            debug!("keeping {:?}: {}", dir, err);
        }
        Err(err) => {
            warn!("could not remove {:?}: {}", dir, err);
            state.report.errors += 1;
        }
    }
    Ok(false)
}
