use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use common::{canonical_key, catalog_suffix, count_catalog_markers, split_extension};
use serde::Serialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::names::{normalize_name, NameKind};
use crate::organize::RunContext;
use crate::safety::check_path;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NameChange {
    pub path: PathBuf,
    pub normalized: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CatalogMismatch {
    pub path: PathBuf,
    pub in_name: String,
    pub in_tag: String,
}

/// Sibling entries that `organize` would fold together.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SiblingGroup {
    pub parent: PathBuf,
    pub key: String,
    pub members: Vec<String>,
}

/// What `organize` would touch, gathered without changing anything.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ObserveReport {
    pub files: usize,
    pub dirs: usize,
    pub non_media_files: usize,
    pub dirs_with_spaces: Vec<PathBuf>,
    pub files_with_spaces: Vec<PathBuf>,
    pub would_rename: Vec<NameChange>,
    pub missing_catalog_id: Vec<PathBuf>,
    pub catalog_mismatches: Vec<CatalogMismatch>,
    pub multiple_catalog_markers: Vec<PathBuf>,
    pub folder_groups: Vec<SiblingGroup>,
    pub duplicate_groups: Vec<SiblingGroup>,
    pub prune_candidates: Vec<PathBuf>,
    pub tag_failures: usize,
    pub unsafe_skipped: usize,
    pub errors: usize,
}

impl ObserveReport {
    /// Number of findings `organize` would act on.
    pub fn issues(&self) -> usize {
        self.would_rename.len()
            + self.catalog_mismatches.len()
            + self.folder_groups.len()
            + self.duplicate_groups.len()
            + self.prune_candidates.len()
    }
}

pub fn observe_library(ctx: &RunContext<'_>) -> ObserveReport {
    let mut report = ObserveReport::default();
    let mut all_dirs: Vec<PathBuf> = Vec::new();
    let mut dirs_with_media: HashSet<PathBuf> = HashSet::new();
    let mut folders: BTreeMap<(PathBuf, String), Vec<String>> = BTreeMap::new();
    let mut normalized_files: BTreeMap<(PathBuf, String), Vec<String>> = BTreeMap::new();

    let walker = WalkDir::new(ctx.root)
        .follow_links(false)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .map(|name| ctx.config.should_skip_dir(name))
                    .unwrap_or(false))
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("walk error under {:?}: {}", ctx.root, err);
                report.errors += 1;
                continue;
            }
        };
        let path = entry.path();
        let name = match entry.file_name().to_str() {
            Some(name) => name.to_string(),
            None => {
                warn!("skipping non-UTF-8 name {:?}", path);
                report.errors += 1;
                continue;
            }
        };

        if entry.file_type().is_dir() {
            report.dirs += 1;
            all_dirs.push(path.to_path_buf());
            if name.contains(' ') {
                report.dirs_with_spaces.push(path.to_path_buf());
            }
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }
        if !ctx.config.is_media_path(path) {
            report.non_media_files += 1;
            continue;
        }
        if let Err(err) = check_path(ctx.root, path) {
            warn!("skipping {}", err);
            report.unsafe_skipped += 1;
            continue;
        }

        report.files += 1;
        mark_ancestors(ctx.root, path, &mut dirs_with_media);
        if name.contains(' ') {
            report.files_with_spaces.push(path.to_path_buf());
        }
        observe_file(ctx, &mut report, path, &name, &mut normalized_files);
    }

    for dir in &all_dirs {
        if !dirs_with_media.contains(dir) {
            report.prune_candidates.push(dir.clone());
            continue;
        }
        let (parent, name) = match (dir.parent(), dir.file_name().and_then(|name| name.to_str())) {
            (Some(parent), Some(name)) => (parent, name),
            _ => continue,
        };
        match normalize_name(name, NameKind::Dir, ctx.config.max_name_bytes) {
            Ok(normalized) => {
                let key = canonical_key(&normalized);
                if normalized != name {
                    report.would_rename.push(NameChange {
                        path: dir.clone(),
                        normalized,
                    });
                }
                if !key.is_empty() {
                    folders
                        .entry((parent.to_path_buf(), key))
                        .or_default()
                        .push(name.to_string());
                }
            }
            Err(err) => {
                warn!("cannot normalize {:?}: {}", dir, err);
                report.errors += 1;
            }
        }
    }

    report.folder_groups = into_groups(folders);
    report.duplicate_groups = into_groups(normalized_files);
    report
}

fn observe_file(
    ctx: &RunContext<'_>,
    report: &mut ObserveReport,
    path: &Path,
    name: &str,
    normalized_files: &mut BTreeMap<(PathBuf, String), Vec<String>>,
) {
    let tags = match ctx.tags.read(path) {
        Ok(tags) => tags,
        Err(err) => {
            debug!("tag read failed for {:?}: {}", path, err);
            report.tag_failures += 1;
            Default::default()
        }
    };

    let (stem, _) = split_extension(name);
    let in_name = catalog_suffix(stem);
    if count_catalog_markers(stem) > 1 {
        report.multiple_catalog_markers.push(path.to_path_buf());
    }
    match (in_name, tags.catalog_id.as_deref()) {
        (None, None) => report.missing_catalog_id.push(path.to_path_buf()),
        (Some(in_name), Some(in_tag)) if !in_name.trim().eq_ignore_ascii_case(in_tag.trim()) => {
            report.catalog_mismatches.push(CatalogMismatch {
                path: path.to_path_buf(),
                in_name: in_name.to_string(),
                in_tag: in_tag.to_string(),
            });
        }
        _ => {}
    }

    let kind = NameKind::File {
        catalog_id: tags.catalog_id.as_deref(),
    };
    match normalize_name(name, kind, ctx.config.max_name_bytes) {
        Ok(normalized) => {
            if normalized != name {
                report.would_rename.push(NameChange {
                    path: path.to_path_buf(),
                    normalized: normalized.clone(),
                });
            }
            if let Some(parent) = path.parent() {
                normalized_files
                    .entry((parent.to_path_buf(), normalized))
                    .or_default()
                    .push(name.to_string());
            }
        }
        Err(err) => {
            warn!("cannot normalize {:?}: {}", path, err);
            report.errors += 1;
        }
    }
}

fn mark_ancestors(root: &Path, path: &Path, seen: &mut HashSet<PathBuf>) {
    let mut ancestor = path.parent();
    while let Some(dir) = ancestor {
        if dir == root || !dir.starts_with(root) || !seen.insert(dir.to_path_buf()) {
            break;
        }
        ancestor = dir.parent();
    }
}

fn into_groups(map: BTreeMap<(PathBuf, String), Vec<String>>) -> Vec<SiblingGroup> {
    map.into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|((parent, key), members)| SiblingGroup {
            parent,
            key,
            members,
        })
        .collect()
}
