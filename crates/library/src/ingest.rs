use std::path::{Path, PathBuf};

use common::canonical_key;
use metadata::TagInfo;
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::fsview::{CreateOutcome, TreeView};
use crate::names::{normalize_name, NameKind};
use crate::organize::{file_name_str, preview_prefix, RunContext};
use crate::report::DuplicateRecord;
use crate::safety::check_path;
use crate::unique::resolve_unique_name;
use crate::{LibraryError, Mode};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlacedFile {
    pub from: PathBuf,
    pub to: PathBuf,
}

#[derive(Clone, Debug, Serialize)]
pub struct IngestReport {
    pub mode: Mode,
    pub processed: usize,
    pub moved: Vec<PlacedFile>,
    pub skipped: Vec<SkippedFile>,
    pub errors: usize,
    pub unsafe_skipped: usize,
    pub tag_failures: usize,
    pub artists_created: Vec<PathBuf>,
    pub artists_reused: usize,
    pub albums_created: Vec<PathBuf>,
    pub albums_reused: usize,
    pub duplicates: Vec<DuplicateRecord>,
}

impl IngestReport {
    fn new(mode: Mode) -> Self {
        Self {
            mode,
            processed: 0,
            moved: Vec::new(),
            skipped: Vec::new(),
            errors: 0,
            unsafe_skipped: 0,
            tag_failures: 0,
            artists_created: Vec::new(),
            artists_reused: 0,
            albums_created: Vec::new(),
            albums_reused: 0,
            duplicates: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Level {
    Artist,
    Album,
}

/// Moves every media file in `inbox` to `<root>/<artist>/<album>/`.
///
/// Artist and album folders are matched by canonical key first and created
/// only when nothing matches. Files without an artist tag stay in the inbox.
pub fn ingest_inbox(
    ctx: &RunContext<'_>,
    view: &mut TreeView,
    inbox: &Path,
) -> Result<IngestReport, LibraryError> {
    if !inbox.is_dir() {
        return Err(LibraryError::InboxMissing(inbox.to_path_buf()));
    }
    let inbox = inbox.canonicalize()?;
    let mut report = IngestReport::new(view.mode());

    let walker = WalkDir::new(&inbox)
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
                warn!("walk error under {:?}: {}", inbox, err);
                report.errors += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() || !ctx.config.is_media_path(entry.path()) {
            continue;
        }
        report.processed += 1;
        let path = entry.path();
        match ingest_file(ctx, view, &inbox, path, &mut report) {
            Ok(()) => {}
            Err(LibraryError::Unsafe(err)) => {
                warn!("skipping {}", err);
                report.unsafe_skipped += 1;
            }
            Err(err) => {
                warn!("failed to ingest {:?}: {}", path, err);
                report.errors += 1;
            }
        }
    }
    Ok(report)
}

fn ingest_file(
    ctx: &RunContext<'_>,
    view: &mut TreeView,
    inbox: &Path,
    path: &Path,
    report: &mut IngestReport,
) -> Result<(), LibraryError> {
    check_path(inbox, path)?;

    let tags = match ctx.tags.read(path) {
        Ok(tags) => tags,
        Err(err) => {
            debug!("tag read failed for {:?}: {}", path, err);
            report.tag_failures += 1;
            TagInfo::default()
        }
    };
    let artist = match tags.placement_artist() {
        Some(artist) => artist.to_string(),
        None => {
            let reason = if tags.album.is_none() {
                "no tags found"
            } else {
                "no artist tag"
            };
            warn!("skipping {:?}: {}", path, reason);
            report.skipped.push(SkippedFile {
                path: path.to_path_buf(),
                reason: reason.to_string(),
            });
            return Ok(());
        }
    };

    let mut target_dir = find_or_create(ctx, view, ctx.root, &artist, Level::Artist, report)?;
    if let Some(album) = tags.album.as_deref() {
        target_dir = find_or_create(ctx, view, &target_dir, album, Level::Album, report)?;
    }

    let name = file_name_str(path)?;
    let desired = normalize_name(
        &name,
        NameKind::File {
            catalog_id: tags.catalog_id.as_deref(),
        },
        ctx.config.max_name_bytes,
    )?;
    let unique = resolve_unique_name(
        view,
        &target_dir,
        &desired,
        path,
        ctx.config.unique_name_attempts,
    );
    if let Some(record) = unique.duplicate {
        report.duplicates.push(record);
    }
    let target = target_dir.join(&unique.name);
    check_path(ctx.root, &target)?;

    view.move_file(path, &target)?;
    info!("{}placed {:?} -> {:?}", preview_prefix(view), path, target);
    report.moved.push(PlacedFile {
        from: path.to_path_buf(),
        to: target,
    });
    Ok(())
}

/// Folder under `parent` for `raw`, matched by canonical key or created.
fn find_or_create(
    ctx: &RunContext<'_>,
    view: &mut TreeView,
    parent: &Path,
    raw: &str,
    level: Level,
    report: &mut IngestReport,
) -> Result<PathBuf, LibraryError> {
    let key = canonical_key(raw);
    if let Some(found) = find_canonical(ctx, view, parent, &key) {
        note_reused(report, level);
        return Ok(found);
    }

    let name = normalize_name(raw, NameKind::Dir, ctx.config.max_name_bytes)?;
    let target = parent.join(&name);
    if view.is_dir(&target) {
        note_reused(report, level);
        return Ok(target);
    }
    check_path(ctx.root, &target)?;

    match view.create_dir_new(&target)? {
        CreateOutcome::Created => {
            info!("{}created folder {:?}", preview_prefix(view), target);
            match level {
                Level::Artist => report.artists_created.push(target.clone()),
                Level::Album => report.albums_created.push(target.clone()),
            }
            Ok(target)
        }
        CreateOutcome::AlreadyExists => {
            // someone else made it between our search and the create
            let found = find_canonical(ctx, view, parent, &key)
                .or_else(|| Some(target.clone()).filter(|dir| view.is_dir(dir)));
            match found {
                Some(found) => {
                    note_reused(report, level);
                    Ok(found)
                }
                None => Err(LibraryError::Io(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!("{} exists and is not a folder", target.display()),
                ))),
            }
        }
    }
}

fn find_canonical(ctx: &RunContext<'_>, view: &TreeView, parent: &Path, key: &str) -> Option<PathBuf> {
    if key.is_empty() {
        return None;
    }
    let children = view.list_dir(parent).ok()?;
    children.into_iter().find(|child| {
        if !view.is_dir(child) || view.is_symlink(child) {
            return false;
        }
        match child.file_name().and_then(|name| name.to_str()) {
            Some(name) => !ctx.config.should_skip_dir(name) && canonical_key(name) == key,
            None => false,
        }
    })
}

fn note_reused(report: &mut IngestReport, level: Level) {
    match level {
        Level::Artist => report.artists_reused += 1,
        Level::Album => report.albums_reused += 1,
    }
}
