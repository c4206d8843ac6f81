use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum UnsafePath {
    Symlink(PathBuf),
    OutsideRoot(PathBuf),
    Unresolvable(PathBuf, io::Error),
}

impl std::fmt::Display for UnsafePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnsafePath::Symlink(path) => write!(f, "refusing symlink: {}", path.display()),
            UnsafePath::OutsideRoot(path) => {
                write!(f, "path resolves outside library root: {}", path.display())
            }
            UnsafePath::Unresolvable(path, err) => {
                write!(f, "cannot verify path {}: {}", path.display(), err)
            }
        }
    }
}

impl std::error::Error for UnsafePath {}

/// Rejects `path` if it is a symlink or resolves outside `root`.
///
/// `root` must already be canonical. Paths that do not exist yet are checked
/// through their deepest existing ancestor.
pub fn check_path(root: &Path, path: &Path) -> Result<(), UnsafePath> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            return Err(UnsafePath::Symlink(path.to_path_buf()));
        }
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(UnsafePath::Unresolvable(path.to_path_buf(), err)),
    }

    let resolved = resolve_lenient(path)
        .map_err(|err| UnsafePath::Unresolvable(path.to_path_buf(), err))?;
    if resolved.starts_with(root) {
        Ok(())
    } else {
        Err(UnsafePath::OutsideRoot(path.to_path_buf()))
    }
}

/// Canonicalizes the longest existing prefix of `path` and re-appends the rest.
fn resolve_lenient(path: &Path) -> io::Result<PathBuf> {
    let mut tail = Vec::new();
    let mut current = path;
    loop {
        match current.canonicalize() {
            Ok(mut base) => {
                for part in tail.iter().rev() {
                    base.push(part);
                }
                return Ok(base);
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let name = current.file_name().ok_or(err)?;
                tail.push(name.to_os_string());
                current = match current.parent() {
                    Some(parent) if !parent.as_os_str().is_empty() => parent,
                    _ => Path::new("."),
                };
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_paths_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::create_dir(root.join("artist")).unwrap();
        assert!(check_path(&root, &root.join("artist")).is_ok());
        assert!(check_path(&root, &root.join("artist").join("not-yet")).is_ok());
    }

    #[test]
    fn rejects_dot_dot_escape() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("lib");
        fs::create_dir(&root).unwrap();
        let root = root.canonicalize().unwrap();
        let escape = root.join("..").join("elsewhere");
        assert!(matches!(
            check_path(&root, &escape),
            Err(UnsafePath::OutsideRoot(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlinks_even_when_target_is_inside() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::create_dir(root.join("real")).unwrap();
        std::os::unix::fs::symlink(root.join("real"), root.join("link")).unwrap();
        assert!(matches!(
            check_path(&root, &root.join("link")),
            Err(UnsafePath::Symlink(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn rejects_paths_through_symlinked_parent_leaving_root() {
        let outside = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(outside.path().join("song.mp3"), b"x").unwrap();
        std::os::unix::fs::symlink(outside.path(), root.join("away")).unwrap();
        assert!(matches!(
            check_path(&root, &root.join("away").join("song.mp3")),
            Err(UnsafePath::OutsideRoot(_))
        ));
    }
}
