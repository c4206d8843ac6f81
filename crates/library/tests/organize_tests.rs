use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use library::playlist::BrokenReason;
use library::{Library, LibraryConfig, LibraryError, Mode, OrganizeReport, PlaylistTarget};
use metadata::{MetadataError, TagInfo, TagReader};
use walkdir::WalkDir;

#[derive(Default)]
struct FakeTags {
    by_name: HashMap<String, TagInfo>,
}

impl FakeTags {
    fn with(mut self, name: &str, tags: TagInfo) -> Self {
        self.by_name.insert(name.to_string(), tags);
        self
    }
}

impl TagReader for FakeTags {
    fn read(&self, path: &Path) -> Result<TagInfo, MetadataError> {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        self.by_name.get(name).cloned().ok_or_else(|| {
            MetadataError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "no tags"))
        })
    }
}

fn catalog(id: &str) -> TagInfo {
    TagInfo {
        catalog_id: Some(id.to_string()),
        ..TagInfo::default()
    }
}

fn write(path: PathBuf, body: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn snapshot(root: &Path) -> Vec<String> {
    WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| {
            let entry = entry.unwrap();
            common::relpath_from(root, entry.path()).unwrap()
        })
        .collect()
}

fn rel(root: &Path, path: &Path) -> String {
    common::relpath_from(root, path).unwrap()
}

fn burman_tree(root: &Path) {
    write(root.join("R. D. Burman").join("Song.mp3"), "first");
    write(root.join("R.D. Burman").join("Song.mp3"), "second");
    write(root.join("Artist Name").join("Album Title").join("01 Love Song.mp3"), "love");
    write(root.join("Artist Name").join("Album Title").join("cover.jpg"), "img");
    fs::create_dir_all(root.join("Old").join("Empty")).unwrap();
}

/// Two spellings of one artist, each holding its own spelling of the same album.
fn nested_twins(root: &Path) {
    write(root.join("A B").join("R.D. Burman").join("x.mp3"), "x");
    write(root.join("A.B").join("R. D. Burman").join("y.mp3"), "y");
}

fn burman_tags() -> FakeTags {
    FakeTags::default().with("01 Love Song.mp3", catalog("abc123"))
}

#[test]
fn live_run_normalizes_names_and_appends_catalog_id() {
    let dir = tempfile::tempdir().unwrap();
    burman_tree(dir.path());
    let library = Library::open(dir.path(), LibraryConfig::default()).unwrap();

    let report = library.organize(&burman_tags(), Mode::Live, None, None);
    let root = library.root();

    let song = root
        .join("artist-name")
        .join("album-title")
        .join("01-love-song-[id-abc123].mp3");
    assert_eq!(fs::read_to_string(song).unwrap(), "love");
    assert!(root.join("artist-name").join("album-title").join("cover.jpg").exists());
    assert!(!root.join("Artist Name").exists());
    assert_eq!(report.with_catalog_id, 1);
    assert_eq!(report.errors, 0);
}

#[test]
fn folders_sharing_a_canonical_key_merge_with_counter_suffixes() {
    let dir = tempfile::tempdir().unwrap();
    burman_tree(dir.path());
    let reports = tempfile::tempdir().unwrap();
    let dup_path = reports.path().join("duplicates.txt");
    let library = Library::open(dir.path(), LibraryConfig::default()).unwrap();

    let report = library.organize(&burman_tags(), Mode::Live, None, Some(&dup_path));
    let root = library.root();

    let merged = root.join("r-d-burman");
    assert_eq!(fs::read_to_string(merged.join("song.mp3")).unwrap(), "first");
    assert_eq!(fs::read_to_string(merged.join("song-1.mp3")).unwrap(), "second");
    assert!(!root.join("R.D. Burman").exists());
    assert!(!root.join("R. D. Burman").exists());

    assert_eq!(report.merges.len(), 1);
    assert_eq!(report.merges[0].target_dir, merged);
    assert_eq!(report.conflicts(), 1);
    assert_eq!(report.duplicates[0].desired_name, "song.mp3");
    assert_eq!(report.duplicates[0].assigned_name, "song-1.mp3");

    let text = fs::read_to_string(&dup_path).unwrap();
    assert!(text.contains("# Total duplicates found: 1"));
    assert!(text.contains("song-1.mp3"));
}

#[test]
fn nested_folders_sharing_a_key_merge_after_their_parents_do() {
    let dir = tempfile::tempdir().unwrap();
    nested_twins(dir.path());
    let library = Library::open(dir.path(), LibraryConfig::default()).unwrap();

    let report = library.organize(&FakeTags::default(), Mode::Live, None, None);
    let root = library.root();

    assert_eq!(report.errors, 0);
    assert_eq!(report.merges.len(), 1);
    assert_eq!(report.merges[0].target_dir, root.join("a-b"));
    let artist: Vec<String> = fs::read_dir(root.join("a-b"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(artist, vec!["rd-burman".to_string()]);
    let album = root.join("a-b").join("rd-burman");
    assert_eq!(fs::read_to_string(album.join("x.mp3")).unwrap(), "x");
    assert_eq!(fs::read_to_string(album.join("y.mp3")).unwrap(), "y");
    assert!(!root.join("A.B").exists());

    let again = library.organize(&FakeTags::default(), Mode::Live, None, None);
    assert_eq!(again.merges.len(), 0);
    assert!(again.is_clean(), "{:?}", again.renamed);
}

#[test]
fn empty_folders_are_pruned_but_the_root_stays() {
    let dir = tempfile::tempdir().unwrap();
    burman_tree(dir.path());
    let library = Library::open(dir.path(), LibraryConfig::default()).unwrap();

    let report = library.organize(&burman_tags(), Mode::Live, None, None);
    let root = library.root();

    assert!(!root.join("Old").exists());
    let pruned: Vec<String> = report.pruned.iter().map(|path| rel(root, path)).collect();
    assert_eq!(pruned, vec!["Old/Empty".to_string(), "Old".to_string()]);
    assert!(root.exists());
}

#[test]
fn second_run_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    burman_tree(dir.path());
    let library = Library::open(dir.path(), LibraryConfig::default()).unwrap();
    library.organize(&burman_tags(), Mode::Live, None, None);
    let before = snapshot(library.root());

    let tags = FakeTags::default().with("01-love-song-[id-abc123].mp3", catalog("abc123"));
    let report = library.organize(&tags, Mode::Live, None, None);

    assert!(report.is_clean(), "{:?}", report.renamed);
    assert_eq!(report.conflicts(), 0);
    assert_eq!(snapshot(library.root()), before);
}

#[test]
fn preview_matches_live_and_leaves_the_tree_alone() {
    let preview_dir = tempfile::tempdir().unwrap();
    let live_dir = tempfile::tempdir().unwrap();
    for root in [preview_dir.path(), live_dir.path()] {
        burman_tree(root);
        nested_twins(root);
    }
    let body = "Artist Name/Album Title/01 Love Song.mp3\nA.B/R. D. Burman/y.mp3\nGone/missing.mp3\n";
    let preview_lists = tempfile::tempdir().unwrap();
    let live_lists = tempfile::tempdir().unwrap();
    for lists in [preview_lists.path(), live_lists.path()] {
        fs::write(lists.join("mix.m3u"), body).unwrap();
    }
    let preview_lib = Library::open(preview_dir.path(), LibraryConfig::default()).unwrap();
    let live_lib = Library::open(live_dir.path(), LibraryConfig::default()).unwrap();
    let before = snapshot(preview_lib.root());

    let preview_target = PlaylistTarget {
        input: preview_lists.path(),
        output: None,
    };
    let live_target = PlaylistTarget {
        input: live_lists.path(),
        output: None,
    };
    let preview = preview_lib.organize(&burman_tags(), Mode::Preview, Some(preview_target), None);
    let live = live_lib.organize(&burman_tags(), Mode::Live, Some(live_target), None);

    assert_eq!(snapshot(preview_lib.root()), before);
    assert_eq!(
        fs::read_to_string(preview_lists.path().join("mix.m3u")).unwrap(),
        body
    );
    assert_eq!(preview.mode, Mode::Preview);
    assert_eq!(preview.errors, 0);
    assert_eq!(live.errors, 0);

    let renames = |lib: &Library, report: &OrganizeReport| -> Vec<(String, String)> {
        report
            .renamed
            .iter()
            .map(|record| (rel(lib.root(), &record.from), rel(lib.root(), &record.to)))
            .collect()
    };
    assert_eq!(renames(&preview_lib, &preview), renames(&live_lib, &live));

    let merges = |lib: &Library, report: &OrganizeReport| -> Vec<(String, String, usize)> {
        report
            .merges
            .iter()
            .map(|record| {
                (
                    rel(lib.root(), &record.source_dir),
                    rel(lib.root(), &record.target_dir),
                    record.items_moved,
                )
            })
            .collect()
    };
    assert_eq!(merges(&preview_lib, &preview), merges(&live_lib, &live));
    assert_eq!(live.merges.len(), 2);

    let pruned = |lib: &Library, report: &OrganizeReport| -> Vec<String> {
        report.pruned.iter().map(|path| rel(lib.root(), path)).collect()
    };
    assert_eq!(pruned(&preview_lib, &preview), pruned(&live_lib, &live));

    let assigned = |report: &OrganizeReport| -> Vec<String> {
        report
            .duplicates
            .iter()
            .map(|record| record.assigned_name.clone())
            .collect()
    };
    assert_eq!(assigned(&preview), assigned(&live));

    let preview_summary = preview.playlists.unwrap();
    let live_summary = live.playlists.unwrap();
    assert_eq!(preview_summary.updated, 2);
    assert_eq!(preview_summary.updated, live_summary.updated);
    assert_eq!(preview_summary.unresolved, live_summary.unresolved);
    assert_eq!(
        fs::read_to_string(live_lists.path().join("mix.m3u")).unwrap(),
        "artist-name/album-title/01-love-song-[id-abc123].mp3\na-b/rd-burman/y.mp3\nGone/missing.mp3\n"
    );
}

#[test]
fn playlists_follow_renamed_files() {
    let dir = tempfile::tempdir().unwrap();
    burman_tree(dir.path());
    let lists = tempfile::tempdir().unwrap();
    let body = "#EXTM3U\nArtist Name/Album Title/01 Love Song.mp3\nGone/missing.mp3\n";
    fs::write(lists.path().join("mix.m3u"), body).unwrap();
    let library = Library::open(dir.path(), LibraryConfig::default()).unwrap();

    let target = PlaylistTarget {
        input: lists.path(),
        output: None,
    };
    let preview = library.organize(&burman_tags(), Mode::Preview, Some(target), None);
    let summary = preview.playlists.unwrap();
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.unresolved, 1);
    assert_eq!(fs::read_to_string(lists.path().join("mix.m3u")).unwrap(), body);

    let live = library.organize(&burman_tags(), Mode::Live, Some(target), None);
    assert_eq!(live.playlists.unwrap().written, 1);
    assert_eq!(
        fs::read_to_string(lists.path().join("mix.m3u")).unwrap(),
        "#EXTM3U\nartist-name/album-title/01-love-song-[id-abc123].mp3\nGone/missing.mp3\n"
    );
}

#[test]
fn reconcile_reports_broken_entries_with_suggestions() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path().join("artist").join("song-[id-x1].mp3"), "x");
    let lists = tempfile::tempdir().unwrap();
    fs::write(
        lists.path().join("a.m3u8"),
        "Artist/Song.mp3\nartist/song-[id-x1].mp3\nnowhere/else.mp3\n",
    )
    .unwrap();
    let library = Library::open(dir.path(), LibraryConfig::default()).unwrap();

    let report = library.reconcile(lists.path()).unwrap();
    assert_eq!(report.entries, 3);
    assert_eq!(report.broken, 2);
    assert_eq!(report.fixable, 1);
    let broken = &report.playlists[0].broken;
    assert_eq!(broken[0].line, 1);
    assert_eq!(broken[0].reason, BrokenReason::NotFound);
    assert_eq!(
        broken[0].suggestion.as_deref(),
        Some("artist/song-[id-x1].mp3")
    );
    assert_eq!(broken[1].suggestion, None);
}

fn ingest_fixture() -> (tempfile::TempDir, tempfile::TempDir, FakeTags) {
    let music = tempfile::tempdir().unwrap();
    fs::create_dir_all(music.path().join("the-band")).unwrap();
    let inbox = tempfile::tempdir().unwrap();
    for name in ["Another.mp3", "Track One.mp3", "loose.mp3", "orphan.mp3"] {
        fs::write(inbox.path().join(name), name).unwrap();
    }
    let tags = FakeTags::default()
        .with(
            "Another.mp3",
            TagInfo {
                album_artist: Some("The  Band".to_string()),
                album: Some("First Album".to_string()),
                ..TagInfo::default()
            },
        )
        .with(
            "Track One.mp3",
            TagInfo {
                catalog_id: Some("c1".to_string()),
                artist: Some("The Band".to_string()),
                album: Some("First Album".to_string()),
                ..TagInfo::default()
            },
        )
        .with(
            "loose.mp3",
            TagInfo {
                album: Some("Somewhere".to_string()),
                ..TagInfo::default()
            },
        );
    (music, inbox, tags)
}

#[test]
fn ingest_places_files_under_matching_artist_and_album() {
    let (music, inbox, tags) = ingest_fixture();
    let library = Library::open(music.path(), LibraryConfig::default()).unwrap();

    let report = library.ingest(&tags, Mode::Live, inbox.path()).unwrap();
    let album = library.root().join("the-band").join("first-album");

    assert_eq!(fs::read_to_string(album.join("another.mp3")).unwrap(), "Another.mp3");
    assert_eq!(
        fs::read_to_string(album.join("track-one-[id-c1].mp3")).unwrap(),
        "Track One.mp3"
    );
    assert_eq!(report.processed, 4);
    assert_eq!(report.moved.len(), 2);
    assert!(report.artists_created.is_empty());
    assert_eq!(report.artists_reused, 2);
    assert_eq!(report.albums_created, vec![album.clone()]);
    assert_eq!(report.albums_reused, 1);
    assert_eq!(report.tag_failures, 1);

    let reasons: Vec<&str> = report.skipped.iter().map(|s| s.reason.as_str()).collect();
    assert_eq!(reasons, vec!["no artist tag", "no tags found"]);
    assert!(inbox.path().join("loose.mp3").exists());
    assert!(!inbox.path().join("Another.mp3").exists());
}

#[test]
fn ingest_preview_reports_the_same_placements_without_moving() {
    let (music, inbox, tags) = ingest_fixture();
    let library = Library::open(music.path(), LibraryConfig::default()).unwrap();
    let before = snapshot(library.root());

    let report = library.ingest(&tags, Mode::Preview, inbox.path()).unwrap();

    assert_eq!(snapshot(library.root()), before);
    assert!(inbox.path().join("Another.mp3").exists());
    assert_eq!(report.moved.len(), 2);
    assert_eq!(report.albums_created.len(), 1);
    assert_eq!(report.albums_reused, 1);
    let names: Vec<String> = report
        .moved
        .iter()
        .map(|placed| placed.to.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["another.mp3", "track-one-[id-c1].mp3"]);
}

#[test]
fn ingest_requires_an_existing_inbox() {
    let music = tempfile::tempdir().unwrap();
    let library = Library::open(music.path(), LibraryConfig::default()).unwrap();
    let err = library
        .ingest(&FakeTags::default(), Mode::Live, Path::new("/no/such/inbox"))
        .unwrap_err();
    assert!(matches!(err, LibraryError::InboxMissing(_)));
}

#[cfg(unix)]
#[test]
fn symlinked_entries_are_never_touched() {
    let outside = tempfile::tempdir().unwrap();
    write(outside.path().join("Far Away").join("Far Song.mp3"), "far");
    let dir = tempfile::tempdir().unwrap();
    std::os::unix::fs::symlink(outside.path().join("Far Away"), dir.path().join("Linked Dir"))
        .unwrap();
    std::os::unix::fs::symlink(
        outside.path().join("Far Away").join("Far Song.mp3"),
        dir.path().join("Alias Song.mp3"),
    )
    .unwrap();
    let library = Library::open(dir.path(), LibraryConfig::default()).unwrap();

    let report = library.organize(&FakeTags::default(), Mode::Live, None, None);

    assert!(report.renamed.is_empty());
    assert!(report.pruned.is_empty());
    assert!(outside.path().join("Far Away").join("Far Song.mp3").exists());
    assert!(fs::symlink_metadata(library.root().join("Linked Dir")).is_ok());
    assert!(fs::symlink_metadata(library.root().join("Alias Song.mp3")).is_ok());
}

#[test]
fn ingest_creates_missing_artist_and_album_folders() {
    let music = tempfile::tempdir().unwrap();
    let inbox = tempfile::tempdir().unwrap();
    fs::write(inbox.path().join("Tune.flac"), "tune").unwrap();
    let tags = FakeTags::default().with(
        "Tune.flac",
        TagInfo {
            artist: Some("Someone Else".to_string()),
            album_artist: Some("Foo".to_string()),
            album: Some("Bar".to_string()),
            ..TagInfo::default()
        },
    );
    let library = Library::open(music.path(), LibraryConfig::default()).unwrap();

    let report = library.ingest(&tags, Mode::Live, inbox.path()).unwrap();

    let artist = library.root().join("foo");
    assert_eq!(report.artists_created, vec![artist.clone()]);
    assert_eq!(report.albums_created, vec![artist.join("bar")]);
    assert_eq!(
        fs::read_to_string(artist.join("bar").join("tune.flac")).unwrap(),
        "tune"
    );
    assert!(!library.root().join("someone-else").exists());
}
