use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use library::config::config_path_from_env;
use library::{
    load_config, save_config, IngestReport, Library, LibraryConfig, Mode, ObserveReport,
    OrganizeReport, PlaylistTarget, ReconcileReport,
};
use metadata::LoftyTagReader;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "libnorm", version, about = "Keep a music folder's names, folders and playlists tidy")]
struct Cli {
    /// Config file (defaults to $LIBNORM_CONFIG, then libnorm.yaml next to the binary)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print the run report as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Normalize names, merge duplicate folders, prune empty ones, fix playlists
    Organize {
        #[arg(long)]
        music: PathBuf,
        #[arg(long)]
        playlist_input: Option<PathBuf>,
        /// Write rewritten playlists here instead of over the originals
        #[arg(long, requires = "playlist_input")]
        playlist_output: Option<PathBuf>,
        #[arg(long, default_value = "preview")]
        mode: Mode,
        /// Write a report of files that had to take a variant name
        #[arg(long)]
        duplicate_report: Option<PathBuf>,
    },
    /// Move tagged files from an inbox into <artist>/<album>/
    Ingest {
        #[arg(long)]
        music: PathBuf,
        #[arg(long)]
        inbox: PathBuf,
        #[arg(long, default_value = "preview")]
        mode: Mode,
    },
    /// Report what organize would change
    Observe {
        #[arg(long)]
        music: PathBuf,
    },
    /// Report playlist entries that point at missing files
    Reconcile {
        #[arg(long)]
        music: PathBuf,
        #[arg(long)]
        playlist_input: PathBuf,
    },
    /// Write a config file filled with defaults
    InitConfig { path: PathBuf },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    if let Command::InitConfig { path } = &cli.command {
        save_config(path, &LibraryConfig::default())?;
        println!("Wrote default config to {}", path.display());
        return Ok(());
    }

    let config_path = cli.config.clone().unwrap_or_else(config_path_from_env);
    let config = load_config(&config_path)?;
    info!("config: {:?}", config_path);
    let tags = LoftyTagReader::with_catalog_keys(config.catalog_tag_keys.iter().cloned());

    match cli.command {
        Command::Organize {
            music,
            playlist_input,
            playlist_output,
            mode,
            duplicate_report,
        } => {
            let library = Library::open(&music, config)?;
            let playlists = playlist_input.as_deref().map(|input| PlaylistTarget {
                input,
                output: playlist_output.as_deref(),
            });
            let report = library.organize(&tags, mode, playlists, duplicate_report.as_deref());
            emit(cli.json, &report, print_organize)?;
        }
        Command::Ingest { music, inbox, mode } => {
            let library = Library::open(&music, config)?;
            let report = library.ingest(&tags, mode, &inbox)?;
            emit(cli.json, &report, print_ingest)?;
        }
        Command::Observe { music } => {
            let library = Library::open(&music, config)?;
            let report = library.observe(&tags);
            emit(cli.json, &report, |report| print_observe(library.root(), report))?;
        }
        Command::Reconcile {
            music,
            playlist_input,
        } => {
            let library = Library::open(&music, config)?;
            let report = library.reconcile(&playlist_input)?;
            emit(cli.json, &report, print_reconcile)?;
        }
        Command::InitConfig { .. } => {}
    }
    Ok(())
}

fn emit<T, F>(json: bool, report: &T, human: F) -> Result<(), Box<dyn std::error::Error>>
where
    T: Serialize,
    F: FnOnce(&T),
{
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        human(report);
    }
    Ok(())
}

fn print_organize(report: &OrganizeReport) {
    println!("Mode: {}", report.mode);
    println!(
        "Processed {} items ({} files, {} folders)",
        report.processed, report.files, report.dirs
    );
    println!("Renamed: {}", report.renamed.len());
    println!("Merged folders: {}", report.merges.len());
    println!("Pruned folders: {}", report.pruned.len());
    println!("Name conflicts: {}", report.conflicts());
    println!(
        "Catalog id: {} with, {} without",
        report.with_catalog_id, report.without_catalog_id
    );
    if report.tag_failures > 0 {
        println!("Tag read failures: {}", report.tag_failures);
    }
    if report.unsafe_skipped > 0 {
        println!("Unsafe paths skipped: {}", report.unsafe_skipped);
    }
    if report.not_processed > 0 {
        println!("Not processed (preview limit): {}", report.not_processed);
    }
    if let Some(playlists) = &report.playlists {
        println!(
            "Playlists: {} read, {} entries updated, {} not found, {} written",
            playlists.playlists, playlists.updated, playlists.unresolved, playlists.written
        );
    }
    println!("Errors: {}", report.errors);
}

fn print_ingest(report: &IngestReport) {
    println!("Mode: {}", report.mode);
    println!("Processed: {}", report.processed);
    println!("Placed: {}", report.moved.len());
    for placed in &report.moved {
        println!("  {} -> {}", placed.from.display(), placed.to.display());
    }
    println!(
        "Artist folders: {} created, {} reused",
        report.artists_created.len(),
        report.artists_reused
    );
    println!(
        "Album folders: {} created, {} reused",
        report.albums_created.len(),
        report.albums_reused
    );
    println!("Skipped: {}", report.skipped.len());
    for skipped in &report.skipped {
        println!("  {} ({})", skipped.path.display(), skipped.reason);
    }
    println!("Name conflicts: {}", report.duplicates.len());
    println!("Errors: {}", report.errors);
}

fn print_observe(root: &Path, report: &ObserveReport) {
    let rel = |path: &Path| {
        path.strip_prefix(root)
            .unwrap_or(path)
            .display()
            .to_string()
    };
    println!("Files: {} media, {} other", report.files, report.non_media_files);
    println!("Folders: {}", report.dirs);
    println!("Names that would change: {}", report.would_rename.len());
    for change in &report.would_rename {
        println!("  {} -> {}", rel(&change.path), change.normalized);
    }
    println!("Folders with spaces: {}", report.dirs_with_spaces.len());
    println!("Files with spaces: {}", report.files_with_spaces.len());
    println!("Files without catalog id: {}", report.missing_catalog_id.len());
    println!("Catalog id mismatches: {}", report.catalog_mismatches.len());
    for mismatch in &report.catalog_mismatches {
        println!(
            "  {} (name {}, tag {})",
            rel(&mismatch.path),
            mismatch.in_name,
            mismatch.in_tag
        );
    }
    println!(
        "Files with repeated catalog markers: {}",
        report.multiple_catalog_markers.len()
    );
    println!("Folders that would merge: {}", report.folder_groups.len());
    for group in &report.folder_groups {
        println!("  {}: {}", rel(&group.parent), group.members.join(", "));
    }
    println!("Potential duplicates: {}", report.duplicate_groups.len());
    for group in &report.duplicate_groups {
        println!("  {}: {}", rel(&group.parent), group.members.join(", "));
    }
    println!("Empty folders: {}", report.prune_candidates.len());
    if report.tag_failures > 0 {
        println!("Tag read failures: {}", report.tag_failures);
    }
    println!("Errors: {}", report.errors);
}

fn print_reconcile(report: &ReconcileReport) {
    println!(
        "Playlists: {}, entries: {}, broken: {} ({} fixable)",
        report.playlists.len(),
        report.entries,
        report.broken,
        report.fixable
    );
    for playlist in &report.playlists {
        if playlist.broken.is_empty() {
            continue;
        }
        println!("{}", playlist.name);
        for broken in &playlist.broken {
            match &broken.suggestion {
                Some(suggestion) => println!(
                    "  line {}: {} ({}) -> {}",
                    broken.line, broken.entry, broken.reason, suggestion
                ),
                None => println!("  line {}: {} ({})", broken.line, broken.entry, broken.reason),
            }
        }
    }
    if report.errors > 0 {
        println!("Errors: {}", report.errors);
    }
}
