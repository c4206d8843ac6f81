use std::fs;
use std::path::{Component, Path, PathBuf};

use common::{
    canonical_key, join_relpath, relpath_from, split_extension, strip_catalog_from_path,
    strip_catalog_suffix,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::LibraryConfig;
use crate::fsview::TreeView;
use crate::organize::preview_prefix;
use crate::LibraryError;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

#[derive(Clone, Debug, Default, Serialize)]
pub struct PlaylistSummary {
    pub playlists: usize,
    pub entries: usize,
    /// Entries whose folder or file name changed beyond the catalog marker.
    pub updated: usize,
    pub unresolved: usize,
    pub written: usize,
    pub errors: usize,
    pub files: Vec<PlaylistFileSummary>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct PlaylistFileSummary {
    pub name: String,
    pub entries: usize,
    pub updated: usize,
    pub unresolved: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokenReason {
    NotFound,
    NotAFile,
}

impl std::fmt::Display for BrokenReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrokenReason::NotFound => write!(f, "file not found"),
            BrokenReason::NotAFile => write!(f, "not a file"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BrokenEntry {
    pub line: usize,
    pub entry: String,
    pub reason: BrokenReason,
    /// Where an organize run would point this entry, when it can be matched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct PlaylistCheck {
    pub name: String,
    pub entries: usize,
    pub broken: Vec<BrokenEntry>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ReconcileReport {
    pub playlists: Vec<PlaylistCheck>,
    pub entries: usize,
    pub broken: usize,
    pub fixable: usize,
    pub errors: usize,
}

/// Decoded playlist text plus what is needed to write it back the same way.
struct PlaylistText {
    body: String,
    had_bom: bool,
}

/// Rewrites every playlist in `input` so entries point at the current tree.
///
/// Entries whose literal path still exists are left alone, as are comments,
/// blank lines and entries that cannot be matched. Results go to `output`
/// (or back into `input`) in live mode only.
pub fn update_playlists(
    root: &Path,
    config: &LibraryConfig,
    view: &TreeView,
    input: &Path,
    output: Option<&Path>,
) -> PlaylistSummary {
    let mut summary = PlaylistSummary::default();
    if !input.is_dir() {
        warn!("playlist folder not found: {:?}", input);
        return summary;
    }
    let output = output.unwrap_or(input);

    let files = match list_playlists(input, config) {
        Ok(files) => files,
        Err(err) => {
            warn!("cannot list playlists in {:?}: {}", input, err);
            summary.errors += 1;
            return summary;
        }
    };
    if !view.is_preview() && output != input {
        if let Err(err) = fs::create_dir_all(output) {
            warn!("cannot create playlist output {:?}: {}", output, err);
            summary.errors += 1;
            return summary;
        }
    }

    for file in files {
        summary.playlists += 1;
        let name = file
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let text = match read_playlist(&file) {
            Ok(text) => text,
            Err(err) => {
                warn!("cannot read playlist {:?}: {}", file, err);
                summary.errors += 1;
                continue;
            }
        };

        let (rewritten, stats) = rewrite_playlist(root, config, view, &text.body);
        let file_summary = PlaylistFileSummary { name: name.clone(), ..stats };
        summary.entries += file_summary.entries;
        summary.updated += file_summary.updated;
        summary.unresolved += file_summary.unresolved;

        if file_summary.updated > 0 || file_summary.unresolved > 0 {
            info!(
                "{}{}: {} updated, {} not found",
                preview_prefix(view),
                name,
                file_summary.updated,
                file_summary.unresolved
            );
        }
        summary.files.push(file_summary);

        if view.is_preview() {
            continue;
        }
        let target = output.join(&name);
        if target == file && rewritten == text.body {
            continue;
        }
        let mut bytes = Vec::with_capacity(rewritten.len() + UTF8_BOM.len());
        if text.had_bom {
            bytes.extend_from_slice(UTF8_BOM);
        }
        bytes.extend_from_slice(rewritten.as_bytes());
        match fs::write(&target, bytes) {
            Ok(()) => summary.written += 1,
            Err(err) => {
                warn!("cannot write playlist {:?}: {}", target, err);
                summary.errors += 1;
            }
        }
    }
    summary
}

/// Lists entries in every playlist that no longer point at a file.
pub fn reconcile_playlists(
    root: &Path,
    config: &LibraryConfig,
    view: &TreeView,
    input: &Path,
) -> Result<ReconcileReport, LibraryError> {
    if !input.is_dir() {
        return Err(LibraryError::PlaylistDirMissing(input.to_path_buf()));
    }
    let mut report = ReconcileReport::default();
    for file in list_playlists(input, config)? {
        let name = file
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let text = match read_playlist(&file) {
            Ok(text) => text,
            Err(err) => {
                warn!("cannot read playlist {:?}: {}", file, err);
                report.errors += 1;
                continue;
            }
        };

        let mut check = PlaylistCheck {
            name,
            ..PlaylistCheck::default()
        };
        for (idx, line) in text.body.lines().enumerate() {
            let entry = line.trim();
            if entry.is_empty() || entry.starts_with('#') {
                continue;
            }
            check.entries += 1;
            let full = entry_path(root, entry);
            let reason = if !view.exists(&full) {
                BrokenReason::NotFound
            } else if !view.is_file(&full) {
                BrokenReason::NotAFile
            } else {
                continue;
            };
            let suggestion = match reason {
                BrokenReason::NotFound => resolve_entry(root, config, view, entry)
                    .and_then(|found| format_like(root, entry, &found)),
                BrokenReason::NotAFile => None,
            };
            if suggestion.is_some() {
                report.fixable += 1;
            }
            check.broken.push(BrokenEntry {
                line: idx + 1,
                entry: entry.to_string(),
                reason,
                suggestion,
            });
        }
        report.entries += check.entries;
        report.broken += check.broken.len();
        report.playlists.push(check);
    }
    Ok(report)
}

fn list_playlists(input: &Path, config: &LibraryConfig) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(input)? {
        let path = entry?.path();
        if path.is_file() && config.is_playlist_path(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// UTF-8 first (with or without a byte order mark), Latin-1 otherwise.
fn read_playlist(path: &Path) -> std::io::Result<PlaylistText> {
    let raw = fs::read(path)?;
    let (had_bom, bytes) = match raw.strip_prefix(UTF8_BOM) {
        Some(rest) => (true, rest),
        None => (false, raw.as_slice()),
    };
    let body = match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|byte| char::from(*byte)).collect(),
    };
    Ok(PlaylistText { body, had_bom })
}

fn rewrite_playlist(
    root: &Path,
    config: &LibraryConfig,
    view: &TreeView,
    body: &str,
) -> (String, PlaylistFileSummary) {
    let mut out = String::with_capacity(body.len());
    let mut stats = PlaylistFileSummary::default();

    for line in body.split_inclusive('\n') {
        let content = line.trim_end_matches(&['\n', '\r'][..]);
        let ending = &line[content.len()..];
        let entry = content.trim();
        if entry.is_empty() || entry.starts_with('#') {
            out.push_str(line);
            continue;
        }
        stats.entries += 1;

        let rewritten = resolve_entry(root, config, view, entry)
            .and_then(|found| format_like(root, entry, &found));
        match rewritten {
            Some(new_entry) if new_entry == entry => out.push_str(line),
            Some(new_entry) => {
                if strip_catalog_from_path(entry) != strip_catalog_from_path(&new_entry) {
                    stats.updated += 1;
                }
                out.push_str(&new_entry);
                out.push_str(ending);
            }
            None => {
                stats.unresolved += 1;
                out.push_str(line);
            }
        }
    }
    (out, stats)
}

fn entry_path(root: &Path, entry: &str) -> PathBuf {
    let path = Path::new(entry);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        join_relpath(root, entry)
    }
}

/// Writes `found` in the same style as `entry`: absolute stays absolute,
/// relative becomes a slash-separated path under the library root.
fn format_like(root: &Path, entry: &str, found: &Path) -> Option<String> {
    if Path::new(entry).is_absolute() {
        Some(found.to_string_lossy().to_string())
    } else {
        relpath_from(root, found)
    }
}

/// Finds the current location of a playlist entry.
///
/// An entry whose literal path exists is returned as is. Otherwise each folder
/// segment is matched by canonical key and the final media file by canonical
/// key of its stem with the catalog marker removed.
pub fn resolve_entry(
    root: &Path,
    config: &LibraryConfig,
    view: &TreeView,
    entry: &str,
) -> Option<PathBuf> {
    let full = entry_path(root, entry);
    if view.exists(&full) {
        return Some(full);
    }

    let rel = full.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?.to_string()),
            Component::CurDir => {}
            _ => return None,
        }
    }

    let mut current = root.to_path_buf();
    let last = parts.len().checked_sub(1)?;
    for (idx, part) in parts.iter().enumerate() {
        let is_media = idx == last
            && split_extension(part)
                .1
                .map(|ext| config.is_media_extension(ext))
                .unwrap_or(false);
        current = if is_media {
            match_file(view, &current, part)?
        } else {
            match_dir(config, view, &current, part)?
        };
    }
    if view.exists(&current) {
        Some(current)
    } else {
        None
    }
}

fn match_dir(config: &LibraryConfig, view: &TreeView, parent: &Path, wanted: &str) -> Option<PathBuf> {
    let key = canonical_key(wanted);
    let children = view.list_dir(parent).ok()?;
    children.into_iter().find(|child| {
        if !view.is_dir(child) || view.is_symlink(child) {
            return false;
        }
        let name = match child.file_name().and_then(|name| name.to_str()) {
            Some(name) => name,
            None => return false,
        };
        if config.should_skip_dir(name) {
            return false;
        }
        if key.is_empty() {
            name == wanted
        } else {
            canonical_key(name) == key
        }
    })
}

fn match_file(view: &TreeView, parent: &Path, wanted: &str) -> Option<PathBuf> {
    let (stem, ext) = split_extension(wanted);
    let ext = ext?;
    let key = canonical_key(strip_catalog_suffix(stem));
    let children = view.list_dir(parent).ok()?;
    children.into_iter().find(|child| {
        if !view.is_file(child) {
            return false;
        }
        let name = match child.file_name().and_then(|name| name.to_str()) {
            Some(name) => name,
            None => return false,
        };
        let (child_stem, child_ext) = split_extension(name);
        match child_ext {
            Some(child_ext) if child_ext.eq_ignore_ascii_case(ext) => {}
            _ => return false,
        }
        if key.is_empty() {
            name == wanted
        } else {
            canonical_key(strip_catalog_suffix(child_stem)) == key
        }
    })
}
