use std::path::{Path, PathBuf};
use std::str::FromStr;

use metadata::{MetadataError, TagReader};
use serde::Serialize;
use tracing::{info, warn};

pub mod collect;
pub mod config;
pub mod fsview;
pub mod ingest;
pub mod names;
pub mod observe;
pub mod organize;
pub mod playlist;
pub mod prune;
pub mod renames;
pub mod report;
pub mod safety;
pub mod unique;

pub use config::{load_config, save_config, ConfigError, LibraryConfig};
pub use ingest::IngestReport;
pub use names::{normalize_name, NameError, NameKind};
pub use observe::ObserveReport;
pub use playlist::{PlaylistSummary, ReconcileReport};
pub use report::OrganizeReport;
pub use safety::UnsafePath;

use crate::fsview::TreeView;
use crate::organize::{RunContext, RunState};

/// Whether a run touches the disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Preview,
    Live,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Preview => "preview",
            Mode::Live => "live",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "preview" | "dry-run" | "dryrun" => Ok(Mode::Preview),
            "live" => Ok(Mode::Live),
            other => Err(format!("unknown mode {:?} (expected preview or live)", other)),
        }
    }
}

/// Where playlists come from and, optionally, where rewritten copies go.
#[derive(Clone, Copy, Debug)]
pub struct PlaylistTarget<'a> {
    pub input: &'a Path,
    pub output: Option<&'a Path>,
}

/// A managed music tree. The root is canonicalized once when opened.
#[derive(Clone, Debug)]
pub struct Library {
    root: PathBuf,
    config: LibraryConfig,
}

impl Library {
    pub fn open(root: &Path, config: LibraryConfig) -> Result<Self, LibraryError> {
        if !root.is_dir() {
            return Err(LibraryError::RootMissing(root.to_path_buf()));
        }
        let root = root.canonicalize()?;
        Ok(Self { root, config })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    fn context<'a>(&'a self, tags: &'a dyn TagReader) -> RunContext<'a> {
        RunContext {
            root: &self.root,
            config: &self.config,
            tags,
        }
    }

    /// Normalizes every name in the tree, merges folders that share a
    /// canonical key, prunes empty folders and rewrites playlists.
    pub fn organize(
        &self,
        tags: &dyn TagReader,
        mode: Mode,
        playlists: Option<PlaylistTarget<'_>>,
        duplicate_report: Option<&Path>,
    ) -> OrganizeReport {
        let ctx = self.context(tags);
        let mut view = TreeView::new(mode);
        let mut state = RunState::new(OrganizeReport::new(mode));

        let mut collection = collect::collect_items(&self.root, &self.config);
        state.report.unsafe_skipped += collection.unsafe_skipped;
        state.report.errors += collection.walk_errors;
        info!(
            "{}organizing {:?}: {} files, {} folders ({} non-media files left alone)",
            organize::preview_prefix(&view),
            self.root,
            collection.files(),
            collection.dirs(),
            collection.non_media_files
        );

        if mode == Mode::Preview {
            if let Some(limit) = self.config.preview_limit {
                if collection.items.len() > limit {
                    state.report.not_processed = collection.items.len() - limit;
                    collection.items.truncate(limit);
                }
            }
        }

        organize::rename_and_merge(&ctx, &mut view, &mut state, &collection.items);
        prune::prune_empty_dirs(&self.root, &self.config, &mut view, &mut state);

        if let Some(target) = playlists {
            let summary = playlist::update_playlists(
                &self.root,
                &self.config,
                &view,
                target.input,
                target.output,
            );
            state.report.errors += summary.errors;
            state.report.playlists = Some(summary);
        }

        if let Some(path) = duplicate_report {
            match report::write_duplicate_report(path, &self.root, &state.report.duplicates) {
                Ok(true) => info!("duplicate report written to {:?}", path),
                Ok(false) => {}
                Err(err) => {
                    warn!("cannot write duplicate report {:?}: {}", path, err);
                    state.report.errors += 1;
                }
            }
        }

        info!(
            "{}done: {} renamed, {} merged, {} pruned, {} conflicts, {} errors",
            organize::preview_prefix(&view),
            state.report.renamed.len(),
            state.report.merges.len(),
            state.report.pruned.len(),
            state.report.conflicts(),
            state.report.errors
        );
        state.report
    }

    /// Places every tagged media file in `inbox` under `<artist>/<album>/`.
    pub fn ingest(
        &self,
        tags: &dyn TagReader,
        mode: Mode,
        inbox: &Path,
    ) -> Result<IngestReport, LibraryError> {
        let ctx = self.context(tags);
        let mut view = TreeView::new(mode);
        let report = ingest::ingest_inbox(&ctx, &mut view, inbox)?;
        info!(
            "{}ingest done: {} placed, {} skipped, {} errors",
            organize::preview_prefix(&view),
            report.moved.len(),
            report.skipped.len(),
            report.errors
        );
        Ok(report)
    }

    /// Reports what `organize` would change without touching anything.
    pub fn observe(&self, tags: &dyn TagReader) -> ObserveReport {
        observe::observe_library(&self.context(tags))
    }

    /// Reports broken playlist entries without touching anything.
    pub fn reconcile(&self, playlist_dir: &Path) -> Result<ReconcileReport, LibraryError> {
        let view = TreeView::new(Mode::Preview);
        playlist::reconcile_playlists(&self.root, &self.config, &view, playlist_dir)
    }
}

#[derive(Debug)]
pub enum LibraryError {
    Io(std::io::Error),
    Name(NameError),
    Unsafe(UnsafePath),
    Config(ConfigError),
    Metadata(MetadataError),
    RootMissing(PathBuf),
    InboxMissing(PathBuf),
    PlaylistDirMissing(PathBuf),
}

impl std::fmt::Display for LibraryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryError::Io(err) => write!(f, "io error: {}", err),
            LibraryError::Name(err) => write!(f, "name error: {}", err),
            LibraryError::Unsafe(err) => write!(f, "unsafe path: {}", err),
            LibraryError::Config(err) => write!(f, "config error: {}", err),
            LibraryError::Metadata(err) => write!(f, "metadata error: {}", err),
            LibraryError::RootMissing(path) => {
                write!(f, "music folder not found: {}", path.display())
            }
            LibraryError::InboxMissing(path) => {
                write!(f, "inbox folder not found: {}", path.display())
            }
            LibraryError::PlaylistDirMissing(path) => {
                write!(f, "playlist folder not found: {}", path.display())
            }
        }
    }
}

impl std::error::Error for LibraryError {}

impl From<std::io::Error> for LibraryError {
    fn from(err: std::io::Error) -> Self {
        LibraryError::Io(err)
    }
}

impl From<NameError> for LibraryError {
    fn from(err: NameError) -> Self {
        LibraryError::Name(err)
    }
}

impl From<UnsafePath> for LibraryError {
    fn from(err: UnsafePath) -> Self {
        LibraryError::Unsafe(err)
    }
}

impl From<ConfigError> for LibraryError {
    fn from(err: ConfigError) -> Self {
        LibraryError::Config(err)
    }
}

impl From<MetadataError> for LibraryError {
    fn from(err: MetadataError) -> Self {
        LibraryError::Metadata(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modes_case_insensitively() {
        assert_eq!("Preview".parse::<Mode>(), Ok(Mode::Preview));
        assert_eq!("dry-run".parse::<Mode>(), Ok(Mode::Preview));
        assert_eq!(" LIVE ".parse::<Mode>(), Ok(Mode::Live));
        assert!("apply".parse::<Mode>().is_err());
        assert_eq!(Mode::Live.to_string(), "live");
    }

    #[test]
    fn open_rejects_missing_root() {
        let err = Library::open(Path::new("/no/such/music"), LibraryConfig::default()).unwrap_err();
        assert!(matches!(err, LibraryError::RootMissing(_)));
    }
}
