use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::playlist::PlaylistSummary;
use crate::Mode;

/// A file that could not take its normalized name and got a variant instead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DuplicateRecord {
    pub original_path: PathBuf,
    pub desired_name: String,
    pub assigned_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FolderMergeRecord {
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    pub items_moved: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RenameRecord {
    pub from: PathBuf,
    pub to: PathBuf,
}

#[derive(Clone, Debug, Serialize)]
pub struct OrganizeReport {
    pub mode: Mode,
    pub processed: usize,
    pub files: usize,
    pub dirs: usize,
    pub renamed: Vec<RenameRecord>,
    pub merges: Vec<FolderMergeRecord>,
    pub duplicates: Vec<DuplicateRecord>,
    pub pruned: Vec<PathBuf>,
    pub errors: usize,
    pub unsafe_skipped: usize,
    pub tag_failures: usize,
    pub with_catalog_id: usize,
    pub without_catalog_id: usize,
    /// Work items left out because of the preview limit.
    pub not_processed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlists: Option<PlaylistSummary>,
}

impl OrganizeReport {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            processed: 0,
            files: 0,
            dirs: 0,
            renamed: Vec::new(),
            merges: Vec::new(),
            duplicates: Vec::new(),
            pruned: Vec::new(),
            errors: 0,
            unsafe_skipped: 0,
            tag_failures: 0,
            with_catalog_id: 0,
            without_catalog_id: 0,
            not_processed: 0,
            playlists: None,
        }
    }

    pub fn conflicts(&self) -> usize {
        self.duplicates.len()
    }

    /// True when the run changed nothing in the tree.
    pub fn is_clean(&self) -> bool {
        self.renamed.is_empty() && self.merges.is_empty() && self.pruned.is_empty()
    }
}

pub fn render_duplicate_report(root: &Path, duplicates: &[DuplicateRecord]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Duplicate Files Report");
    let _ = writeln!(out, "# Library: {}", root.display());
    let _ = writeln!(out, "# Total duplicates found: {}", duplicates.len());
    let _ = writeln!(out, "#");
    let _ = writeln!(out, "# Format: Original Path | Desired Name | Actual Name");
    let _ = writeln!(out, "# These files likely have duplicate content and may need cleanup");
    let _ = writeln!(out, "#");
    let _ = writeln!(out);

    for record in duplicates {
        let rel = record
            .original_path
            .strip_prefix(root)
            .unwrap_or(&record.original_path);
        let parent = rel
            .parent()
            .map(common::path_to_slash_string)
            .unwrap_or_default();
        let prefix = if parent.is_empty() {
            String::new()
        } else {
            format!("{}/", parent)
        };
        let _ = writeln!(out, "{}", common::path_to_slash_string(rel));
        let _ = writeln!(out, "  Desired:  {}{}", prefix, record.desired_name);
        let _ = writeln!(out, "  Actual:   {}{}", prefix, record.assigned_name);
        let _ = writeln!(out);
    }
    out
}

/// Writes the duplicate report. Nothing is written when there are no duplicates.
pub fn write_duplicate_report(
    path: &Path,
    root: &Path,
    duplicates: &[DuplicateRecord],
) -> io::Result<bool> {
    if duplicates.is_empty() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, render_duplicate_report(root, duplicates))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_report_lists_desired_and_actual_names() {
        let root = Path::new("/music");
        let records = vec![DuplicateRecord {
            original_path: root.join("R.D. Burman").join("Song.mp3"),
            desired_name: "song.mp3".to_string(),
            assigned_name: "song-1.mp3".to_string(),
        }];
        let text = render_duplicate_report(root, &records);
        assert!(text.contains("# Total duplicates found: 1"));
        assert!(text.contains("R.D. Burman/Song.mp3\n"));
        assert!(text.contains("  Desired:  R.D. Burman/song.mp3\n"));
        assert!(text.contains("  Actual:   R.D. Burman/song-1.mp3\n"));
    }

    #[test]
    fn empty_duplicate_list_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dups.txt");
        assert!(!write_duplicate_report(&path, dir.path(), &[]).unwrap());
        assert!(!path.exists());
    }
}
