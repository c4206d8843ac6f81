use common::{catalog_suffix, split_extension, strip_catalog_suffix};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

static SPACE_AROUND_PUNCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*([^\w\s-])\s*").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static HYPHENS: Lazy<Regex> = Lazy::new(|| Regex::new(r"-{2,}").unwrap());
static BRACKET_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\[[^\]]*\]\s*$").unwrap());

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Bytes kept free when truncating a long file name.
const TRUNCATE_MARGIN: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NameKind<'a> {
    File { catalog_id: Option<&'a str> },
    Dir,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    Empty,
    ResidualSpace(String),
    ExtensionTooLong(String),
    NonUtf8(String),
}

impl std::fmt::Display for NameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NameError::Empty => write!(f, "name is empty after normalization"),
            NameError::ResidualSpace(name) => write!(f, "normalized name still has a space: {}", name),
            NameError::ExtensionTooLong(ext) => write!(f, "extension too long for a valid name: {}", ext),
            NameError::NonUtf8(name) => write!(f, "name is not valid utf-8: {}", name),
        }
    }
}

impl std::error::Error for NameError {}

/// Produces the on-disk form of `raw`.
///
/// Files keep their extension (lowercased) and get the catalog id appended as
/// `-[id-VALUE]`. When the stem already carries a catalog marker, a matching or
/// missing tag value keeps it and a differing tag value replaces it. Other
/// trailing bracket groups are dropped. Output never contains a space and never
/// a dot outside the extension.
pub fn normalize_name(raw: &str, kind: NameKind<'_>, max_bytes: usize) -> Result<String, NameError> {
    if raw.is_empty() {
        return Err(NameError::Empty);
    }
    let composed: String = raw.nfc().filter(|ch| *ch != '\0').collect();
    let cleaned = composed.replace('/', "-").replace('\\', "-");

    match kind {
        NameKind::Dir => normalize_dir(&cleaned, max_bytes),
        NameKind::File { catalog_id } => normalize_file(&cleaned, catalog_id, max_bytes),
    }
}

fn normalize_dir(name: &str, max_bytes: usize) -> Result<String, NameError> {
    let mut out = clean_segment(strip_leading_symbols(name));
    if out.is_empty() {
        return Err(NameError::Empty);
    }
    guard_spaces(&out)?;
    if is_reserved(&out) {
        out.insert(0, '_');
    }
    if out.len() > max_bytes {
        truncate_at_boundary(&mut out, max_bytes);
        trim_trailing_hyphens(&mut out);
    }
    Ok(out)
}

fn normalize_file(name: &str, tag_catalog: Option<&str>, max_bytes: usize) -> Result<String, NameError> {
    let (stem, ext) = split_extension(name);
    let ext = ext.map(|ext| ext.to_lowercase()).filter(|ext| !ext.is_empty());
    let stem = strip_leading_symbols(stem);

    let tag_catalog = tag_catalog
        .map(sanitize_catalog_id)
        .filter(|value| !value.is_empty());
    let embedded = catalog_suffix(stem).map(sanitize_catalog_id);

    let (stem, catalog) = match embedded {
        Some(embedded) => {
            let bare = strip_catalog_suffix(stem);
            match tag_catalog {
                Some(tag) if tag.eq_ignore_ascii_case(&embedded) => (bare, Some(embedded)),
                Some(tag) => {
                    debug!("catalog id {} in name replaced by tag value {}", embedded, tag);
                    (bare, Some(tag))
                }
                None => (bare, Some(embedded).filter(|value| !value.is_empty())),
            }
        }
        None => {
            let bare = match BRACKET_SUFFIX.find(stem) {
                Some(m) => &stem[..m.start()],
                None => stem,
            };
            (bare, tag_catalog)
        }
    };

    let mut out_stem = clean_segment(stem);
    if out_stem.is_empty() {
        return Err(NameError::Empty);
    }
    let suffix = catalog
        .map(|value| format!("-[id-{}]", value))
        .unwrap_or_default();
    let dotted_ext = ext.map(|ext| format!(".{}", ext)).unwrap_or_default();

    if is_reserved(&out_stem) {
        out_stem.insert(0, '_');
    }

    let total = out_stem.len() + suffix.len() + dotted_ext.len();
    if total > max_bytes {
        let available = max_bytes
            .saturating_sub(dotted_ext.len())
            .saturating_sub(suffix.len())
            .saturating_sub(TRUNCATE_MARGIN);
        if available < TRUNCATE_MARGIN {
            return Err(NameError::ExtensionTooLong(format!("{}{}", suffix, dotted_ext)));
        }
        truncate_at_boundary(&mut out_stem, available);
        trim_trailing_hyphens(&mut out_stem);
        if out_stem.is_empty() {
            return Err(NameError::Empty);
        }
    }

    let out = format!("{}{}{}", out_stem, suffix, dotted_ext);
    guard_spaces(&out)?;
    Ok(out)
}

/// Lowercase, hyphenate and de-dot one name segment.
fn clean_segment(input: &str) -> String {
    let lowered = input.to_lowercase().replace('_', "-").replace('.', "");
    let tightened = SPACE_AROUND_PUNCT.replace_all(&lowered, "$1");
    let hyphenated = WHITESPACE.replace_all(&tightened, "-");
    let mut out = HYPHENS.replace_all(&hyphenated, "-").into_owned();
    trim_trailing_hyphens(&mut out);
    out
}

fn strip_leading_symbols(input: &str) -> &str {
    input.trim_start_matches(|ch: char| !ch.is_alphanumeric())
}

/// Catalog values end up inside a file name, so they get the same guarantees.
fn sanitize_catalog_id(value: &str) -> String {
    let trimmed = value.trim();
    let replaced = WHITESPACE.replace_all(trimmed, "-");
    let kept: String = replaced
        .chars()
        .filter(|ch| !matches!(ch, '.' | '/' | '\\' | '\0' | '[' | ']'))
        .collect();
    HYPHENS.replace_all(&kept, "-").trim_matches('-').to_string()
}

fn is_reserved(stem: &str) -> bool {
    RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(stem))
}

fn guard_spaces(name: &str) -> Result<(), NameError> {
    if name.contains(' ') {
        Err(NameError::ResidualSpace(name.to_string()))
    } else {
        Ok(())
    }
}

fn truncate_at_boundary(value: &mut String, max_bytes: usize) {
    if value.len() <= max_bytes {
        return;
    }
    let mut cut = max_bytes;
    while cut > 0 && !value.is_char_boundary(cut) {
        cut -= 1;
    }
    value.truncate(cut);
}

fn trim_trailing_hyphens(value: &mut String) {
    while value.ends_with('-') {
        value.pop();
    }
}
