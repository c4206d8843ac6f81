use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::path::{Path, PathBuf};

/// Original path to current path for everything a run has moved.
///
/// A reverse index (current to original) lets a directory move relocate every
/// entry beneath it without scanning the whole forward map.
#[derive(Debug, Default)]
pub struct RenameMap {
    forward: HashMap<PathBuf, PathBuf>,
    reverse: BTreeMap<PathBuf, PathBuf>,
}

impl RenameMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn current(&self, original: &Path) -> Option<&Path> {
        self.forward.get(original).map(PathBuf::as_path)
    }

    /// Records that whatever lived at `from` now lives at `to`.
    ///
    /// Entries whose current path is `from` or lies beneath it are relocated.
    /// When `from` was never recorded it is added as its own original.
    ///
    /// Paths order component-wise, so everything at or beneath `from` is one
    /// contiguous run of the reverse index starting at `from`.
    pub fn record_move(&mut self, from: &Path, to: &Path) {
        if from == to {
            return;
        }
        let affected: Vec<PathBuf> = self
            .reverse
            .range::<Path, _>((Bound::Included(from), Bound::Unbounded))
            .map(|(current, _)| current)
            .take_while(|current| current.starts_with(from))
            .cloned()
            .collect();

        let mut saw_from = false;
        for current in affected {
            let original = match self.reverse.remove(&current) {
                Some(original) => original,
                None => continue,
            };
            if current == from {
                saw_from = true;
            }
            let moved = rebase(&current, from, to);
            self.forward.insert(original.clone(), moved.clone());
            self.reverse.insert(moved, original);
        }

        if !saw_from {
            self.forward.insert(from.to_path_buf(), to.to_path_buf());
            self.reverse.insert(to.to_path_buf(), from.to_path_buf());
        }
    }

    /// Current location for a path collected before earlier moves happened.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        let lookup = |candidate: &Path| self.forward.get(candidate).cloned();
        rewrite_path(path, lookup).unwrap_or_else(|| path.to_path_buf())
    }
}

/// Substitutes the longest prefix of `path` known to `lookup`.
///
/// Returns `None` when no ancestor of `path` (itself included) has a mapping.
pub fn rewrite_path<F>(path: &Path, lookup: F) -> Option<PathBuf>
where
    F: Fn(&Path) -> Option<PathBuf>,
{
    for ancestor in path.ancestors() {
        if ancestor.as_os_str().is_empty() {
            break;
        }
        if let Some(mapped) = lookup(ancestor) {
            return Some(rebase(path, ancestor, &mapped));
        }
    }
    None
}

pub(crate) fn rebase(path: &Path, from: &Path, to: &Path) -> PathBuf {
    match path.strip_prefix(from) {
        Ok(rest) if rest.as_os_str().is_empty() => to.to_path_buf(),
        Ok(rest) => to.join(rest),
        Err(_) => path.to_path_buf(),
    }
}
