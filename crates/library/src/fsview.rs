use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io;
use std::ops::Bound;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::renames::rebase;
use crate::Mode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

#[derive(Clone, Debug)]
enum Op {
    Move { from: PathBuf, to: PathBuf },
    Remove(PathBuf),
    Create(PathBuf),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Resolved {
    Physical(PathBuf),
    Created,
    Missing,
}

/// The library tree as a run sees it.
///
/// In live mode every call goes straight to the filesystem. In preview mode
/// mutations are recorded in a journal and every query answers as if they had
/// been applied, so both modes walk through the same decisions.
pub struct TreeView {
    mode: Mode,
    journal: Vec<Op>,
    by_path: HashMap<PathBuf, Vec<usize>>,
    /// Staged entries per parent, keyed by the parent's current path.
    added_children: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
}

impl TreeView {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            journal: Vec::new(),
            by_path: HashMap::new(),
            added_children: BTreeMap::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_preview(&self) -> bool {
        self.mode == Mode::Preview
    }

    /// Number of mutations staged so far. Always zero in live mode.
    pub fn staged(&self) -> usize {
        self.journal.len()
    }

    pub fn exists(&self, path: &Path) -> bool {
        match self.resolve(path) {
            Resolved::Physical(real) => fs::symlink_metadata(real).is_ok(),
            Resolved::Created => true,
            Resolved::Missing => false,
        }
    }

    pub fn is_dir(&self, path: &Path) -> bool {
        match self.resolve(path) {
            Resolved::Physical(real) => fs::symlink_metadata(real)
                .map(|meta| meta.is_dir())
                .unwrap_or(false),
            Resolved::Created => true,
            Resolved::Missing => false,
        }
    }

    pub fn is_file(&self, path: &Path) -> bool {
        match self.resolve(path) {
            Resolved::Physical(real) => fs::symlink_metadata(real)
                .map(|meta| meta.is_file())
                .unwrap_or(false),
            _ => false,
        }
    }

    pub fn is_symlink(&self, path: &Path) -> bool {
        match self.resolve(path) {
            Resolved::Physical(real) => fs::symlink_metadata(real)
                .map(|meta| meta.file_type().is_symlink())
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Where `path` currently lives on disk, if it exists there.
    pub fn physical(&self, path: &Path) -> Option<PathBuf> {
        match self.resolve(path) {
            Resolved::Physical(real) if fs::symlink_metadata(&real).is_ok() => Some(real),
            _ => None,
        }
    }

    /// True when both paths name the same directory entry, e.g. a case-only
    /// rename on a case-insensitive filesystem.
    pub fn same_entry(&self, a: &Path, b: &Path) -> bool {
        match (self.physical(a), self.physical(b)) {
            (Some(a), Some(b)) => same_file_on_disk(&a, &b),
            _ => false,
        }
    }

    /// Children of `dir`, sorted by path.
    pub fn list_dir(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        if !self.is_preview() {
            let mut out = Vec::new();
            for entry in fs::read_dir(dir)? {
                out.push(entry?.path());
            }
            out.sort();
            return Ok(out);
        }

        let mut candidates = BTreeSet::new();
        match self.resolve(dir) {
            Resolved::Physical(real) => {
                for entry in fs::read_dir(&real)? {
                    candidates.insert(dir.join(entry?.file_name()));
                }
            }
            Resolved::Created => {}
            Resolved::Missing => return Err(io::Error::from(io::ErrorKind::NotFound)),
        }
        if let Some(added) = self.added_children.get(dir) {
            candidates.extend(added.iter().cloned());
        }
        Ok(candidates
            .into_iter()
            .filter(|child| self.exists(child))
            .collect())
    }

    /// Renames without ever replacing an existing entry.
    pub fn rename(&mut self, from: &Path, to: &Path) -> io::Result<()> {
        self.ensure_movable(from, to)?;
        if self.is_preview() {
            self.record(Op::Move {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
            });
            return Ok(());
        }
        fs::rename(from, to)
    }

    /// Like [`TreeView::rename`], but copies and deletes when a plain rename
    /// fails, e.g. across filesystems.
    pub fn move_file(&mut self, from: &Path, to: &Path) -> io::Result<()> {
        self.ensure_movable(from, to)?;
        if self.is_preview() {
            self.record(Op::Move {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
            });
            return Ok(());
        }
        match fs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(rename_err) => {
                if !from.is_file() {
                    return Err(rename_err);
                }
                if let Err(copy_err) = fs::copy(from, to) {
                    if let Err(cleanup_err) = fs::remove_file(to) {
                        if cleanup_err.kind() != io::ErrorKind::NotFound {
                            warn!("partial copy left at {:?}: {}", to, cleanup_err);
                        }
                    }
                    return Err(copy_err);
                }
                fs::remove_file(from)
            }
        }
    }

    /// Removes `dir` only if it is empty.
    pub fn remove_dir(&mut self, dir: &Path) -> io::Result<()> {
        if !self.is_preview() {
            return fs::remove_dir(dir);
        }
        if !self.is_dir(dir) {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        if !self.list_dir(dir)?.is_empty() {
            return Err(io::Error::from(io::ErrorKind::DirectoryNotEmpty));
        }
        self.record(Op::Remove(dir.to_path_buf()));
        Ok(())
    }

    /// Creates `dir`, failing rather than reusing when the name is taken.
    pub fn create_dir_new(&mut self, dir: &Path) -> io::Result<CreateOutcome> {
        if !self.is_preview() {
            return match fs::create_dir(dir) {
                Ok(()) => Ok(CreateOutcome::Created),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    Ok(CreateOutcome::AlreadyExists)
                }
                Err(err) => Err(err),
            };
        }
        if self.exists(dir) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        match dir.parent() {
            Some(parent) if self.is_dir(parent) => {}
            _ => return Err(io::Error::from(io::ErrorKind::NotFound)),
        }
        self.record(Op::Create(dir.to_path_buf()));
        Ok(CreateOutcome::Created)
    }

    fn ensure_movable(&self, from: &Path, to: &Path) -> io::Result<()> {
        if !self.exists(from) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("source vanished: {}", from.display()),
            ));
        }
        if self.exists(to) && !self.same_entry(from, to) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("target already exists: {}", to.display()),
            ));
        }
        Ok(())
    }

    fn record(&mut self, op: Op) {
        let id = self.journal.len();
        let (keys, added) = match &op {
            Op::Move { from, to } => (vec![from.clone(), to.clone()], Some(to.clone())),
            Op::Remove(dir) => (vec![dir.clone()], None),
            Op::Create(dir) => (vec![dir.clone()], Some(dir.clone())),
        };
        for key in keys {
            self.by_path.entry(key).or_default().push(id);
        }
        if let Op::Move { from, to } = &op {
            self.carry_added_children(from, to);
        }
        if let Some(added) = added {
            if let Some(parent) = added.parent() {
                self.added_children
                    .entry(parent.to_path_buf())
                    .or_default()
                    .insert(added);
            }
        }
        self.journal.push(op);
    }

    /// Re-keys staged entries at or beneath `from` so listings under `to` see them.
    fn carry_added_children(&mut self, from: &Path, to: &Path) {
        let keys: Vec<PathBuf> = self
            .added_children
            .range::<Path, _>((Bound::Included(from), Bound::Unbounded))
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(from))
            .cloned()
            .collect();
        for key in keys {
            let children = match self.added_children.remove(&key) {
                Some(children) => children,
                None => continue,
            };
            let moved = self.added_children.entry(rebase(&key, from, to)).or_default();
            moved.extend(children.iter().map(|child| rebase(child, from, to)));
        }
    }

    /// Maps a path in the staged tree back to the disk path it stands for,
    /// replaying staged operations newest first.
    fn resolve(&self, path: &Path) -> Resolved {
        let mut current = path.to_path_buf();
        let mut bound = self.journal.len();
        loop {
            let latest = current
                .ancestors()
                .filter_map(|ancestor| self.by_path.get(ancestor))
                .flat_map(|ids| ids.iter().copied())
                .filter(|id| *id < bound)
                .max();
            let id = match latest {
                Some(id) => id,
                None => return Resolved::Physical(current),
            };
            bound = id;
            match &self.journal[id] {
                Op::Move { from, to } => {
                    if let Ok(rest) = current.strip_prefix(to) {
                        current = if rest.as_os_str().is_empty() {
                            from.clone()
                        } else {
                            from.join(rest)
                        };
                    } else if current.starts_with(from) {
                        return Resolved::Missing;
                    }
                }
                Op::Remove(dir) => {
                    if current.starts_with(dir) {
                        return Resolved::Missing;
                    }
                }
                Op::Create(dir) => {
                    if current == *dir {
                        return Resolved::Created;
                    }
                    if current.starts_with(dir) {
                        return Resolved::Missing;
                    }
                }
            }
        }
    }
}

#[cfg(unix)]
fn same_file_on_disk(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (fs::symlink_metadata(a), fs::symlink_metadata(b)) {
        (Ok(a), Ok(b)) => a.dev() == b.dev() && a.ino() == b.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_file_on_disk(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn preview_rename_is_visible_but_not_applied() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("A")).unwrap();
        touch(&root.join("A").join("one.mp3"));

        let mut view = TreeView::new(Mode::Preview);
        view.rename(&root.join("A"), &root.join("a")).unwrap();

        assert!(root.join("A").exists());
        assert!(!view.exists(&root.join("A")));
        assert!(view.is_dir(&root.join("a")));
        assert!(view.is_file(&root.join("a").join("one.mp3")));
        assert_eq!(
            view.list_dir(root).unwrap(),
            vec![root.join("a")]
        );
        assert_eq!(
            view.physical(&root.join("a").join("one.mp3")),
            Some(root.join("A").join("one.mp3"))
        );
    }

    #[test]
    fn preview_tracks_nested_moves_and_removals() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("dst")).unwrap();
        touch(&root.join("src").join("song.mp3"));

        let mut view = TreeView::new(Mode::Preview);
        view.rename(&root.join("src").join("song.mp3"), &root.join("dst").join("song.mp3"))
            .unwrap();
        assert!(view.list_dir(&root.join("src")).unwrap().is_empty());
        view.remove_dir(&root.join("src")).unwrap();

        assert!(!view.exists(&root.join("src")));
        assert!(view.is_file(&root.join("dst").join("song.mp3")));
        assert!(root.join("src").join("song.mp3").exists());
        assert_eq!(view.staged(), 2);
    }

    #[test]
    fn preview_listing_follows_children_through_a_parent_rename() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("A").join("Disc")).unwrap();
        touch(&root.join("A").join("Song.mp3"));
        touch(&root.join("A").join("Disc").join("Track.mp3"));

        let mut view = TreeView::new(Mode::Preview);
        let disc = root.join("A").join("Disc");
        view.rename(&disc.join("Track.mp3"), &disc.join("track.mp3")).unwrap();
        view.rename(&disc, &root.join("A").join("disc")).unwrap();
        view.rename(&root.join("A").join("Song.mp3"), &root.join("A").join("song.mp3"))
            .unwrap();
        view.rename(&root.join("A"), &root.join("a")).unwrap();

        let a = root.join("a");
        assert_eq!(
            view.list_dir(&a).unwrap(),
            vec![a.join("disc"), a.join("song.mp3")]
        );
        assert_eq!(
            view.list_dir(&a.join("disc")).unwrap(),
            vec![a.join("disc").join("track.mp3")]
        );
        assert!(view.is_file(&a.join("disc").join("track.mp3")));
        assert!(view.list_dir(&root.join("A")).is_err());
        assert!(view.remove_dir(&a).is_err());
    }

    #[test]
    fn preview_remove_refuses_non_empty_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("full")).unwrap();
        touch(&root.join("full").join("cover.jpg"));

        let mut view = TreeView::new(Mode::Preview);
        let err = view.remove_dir(&root.join("full")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::DirectoryNotEmpty);
    }

    #[test]
    fn create_dir_new_reports_existing_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for mode in [Mode::Preview, Mode::Live] {
            let mut view = TreeView::new(mode);
            let target = root.join(format!("{:?}", mode).to_lowercase());
            assert_eq!(view.create_dir_new(&target).unwrap(), CreateOutcome::Created);
            assert_eq!(
                view.create_dir_new(&target).unwrap(),
                CreateOutcome::AlreadyExists
            );
            assert!(view.is_dir(&target));
            assert!(view.list_dir(&target).unwrap().is_empty());
        }
        assert!(!root.join("preview").exists());
        assert!(root.join("live").is_dir());
    }

    #[test]
    fn rename_never_replaces_existing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("a.mp3"));
        touch(&root.join("b.mp3"));
        for mode in [Mode::Preview, Mode::Live] {
            let mut view = TreeView::new(mode);
            let err = view.rename(&root.join("a.mp3"), &root.join("b.mp3")).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        }
        assert!(root.join("a.mp3").exists());
    }

    #[test]
    fn live_move_file_moves_content() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("in.mp3"), b"payload").unwrap();
        fs::create_dir(root.join("out")).unwrap();
        let mut view = TreeView::new(Mode::Live);
        view.move_file(&root.join("in.mp3"), &root.join("out").join("in.mp3"))
            .unwrap();
        assert!(!root.join("in.mp3").exists());
        assert_eq!(fs::read(root.join("out").join("in.mp3")).unwrap(), b"payload");
    }

    #[test]
    fn live_move_file_failure_keeps_the_source() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("in.mp3"), b"payload").unwrap();
        let target = root.join("missing").join("in.mp3");
        let mut view = TreeView::new(Mode::Live);
        assert!(view.move_file(&root.join("in.mp3"), &target).is_err());
        assert_eq!(fs::read(root.join("in.mp3")).unwrap(), b"payload");
        assert!(!target.exists());
    }
}
