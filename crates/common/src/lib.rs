use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Trailing catalog marker on a file stem: `-[id-VALUE]` or `-[VALUE]`.
pub static CATALOG_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-\[(?:id-)?([^\]]+)\]$").unwrap());

/// Any catalog-looking marker, anchored or not. Used to spot names carrying more than one.
pub static CATALOG_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-\[(?:id-)?[^\]]+\]").unwrap());

/// Reduces a name to the key used for fuzzy folder and file matching.
///
/// NFC first, then lowercase, then everything outside `[a-z0-9]` is dropped, so
/// `"R. D. Burman"`, `"R.D. Burman"` and `"R.D.Burman"` all collapse to `"rdburman"`.
/// Names written entirely in other scripts collapse to the empty string.
pub fn canonical_key(name: &str) -> String {
    let composed: String = name.nfc().collect();
    composed
        .to_lowercase()
        .chars()
        .filter(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit())
        .collect()
}

pub fn stable_id(input: &str) -> String {
    blake3::hash(input.as_bytes()).to_hex().to_string()
}

/// First eight hex digits of [`stable_id`].
pub fn short_hash(input: &str) -> String {
    let mut id = stable_id(input);
    id.truncate(8);
    id
}

/// Splits `name` at its last dot. A leading dot does not start an extension.
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    }
}

/// Catalog value embedded at the end of a stem, if any.
pub fn catalog_suffix(stem: &str) -> Option<&str> {
    CATALOG_SUFFIX
        .captures(stem)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

pub fn strip_catalog_suffix(stem: &str) -> &str {
    match CATALOG_SUFFIX.find(stem) {
        Some(m) => &stem[..m.start()],
        None => stem,
    }
}

pub fn count_catalog_markers(stem: &str) -> usize {
    CATALOG_MARKER.find_iter(stem).count()
}

/// Removes the catalog marker from the final segment of a slash or backslash separated path.
pub fn strip_catalog_from_path(path: &str) -> String {
    let cut = path.rfind(&['/', '\\'][..]).map(|idx| idx + 1).unwrap_or(0);
    let (head, file) = path.split_at(cut);
    let (stem, ext) = split_extension(file);
    let stem = strip_catalog_suffix(stem);
    match ext {
        Some(ext) => format!("{}{}.{}", head, stem, ext),
        None => format!("{}{}", head, stem),
    }
}

pub fn relpath_from(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(path_to_slash_string(rel))
}

pub fn join_relpath(root: &Path, relpath: &str) -> PathBuf {
    let mut out = PathBuf::from(root);
    for part in relpath.split(&['/', '\\'][..]) {
        if part.is_empty() || part == "." {
            continue;
        }
        out.push(part);
    }
    out
}

pub fn path_to_slash_string(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    parts.join("/")
}
