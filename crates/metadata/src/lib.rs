use std::path::Path;

use lofty::error::LoftyError;
use lofty::prelude::{ItemKey, TaggedFileExt};
use lofty::tag::{ItemValue, Tag};
use tracing::debug;

/// Tag keys probed for the catalog id when nothing else is configured.
pub const DEFAULT_CATALOG_KEYS: &[&str] = &[
    "MCATALOGID",
    "CUSTOM1",
    "CUSTOM2",
    "MUSICIP_PUID",
    "MUSICIP PUID",
];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TagInfo {
    pub catalog_id: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
}

impl TagInfo {
    /// Album artist when present, otherwise the track artist.
    pub fn placement_artist(&self) -> Option<&str> {
        self.album_artist.as_deref().or(self.artist.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.catalog_id.is_none()
            && self.artist.is_none()
            && self.album_artist.is_none()
            && self.album.is_none()
    }
}

#[derive(Debug)]
pub enum MetadataError {
    Io(std::io::Error),
    Lofty(LoftyError),
}

impl std::fmt::Display for MetadataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataError::Io(err) => write!(f, "io error: {}", err),
            MetadataError::Lofty(err) => write!(f, "tag error: {}", err),
        }
    }
}

impl std::error::Error for MetadataError {}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        MetadataError::Io(err)
    }
}

impl From<LoftyError> for MetadataError {
    fn from(err: LoftyError) -> Self {
        MetadataError::Lofty(err)
    }
}

/// Source of the few tag fields the normalizer cares about.
///
/// Callers treat an error the same as a file with no tags.
pub trait TagReader {
    fn read(&self, path: &Path) -> Result<TagInfo, MetadataError>;
}

#[derive(Debug, Clone)]
pub struct LoftyTagReader {
    catalog_keys: Vec<String>,
}

impl Default for LoftyTagReader {
    fn default() -> Self {
        Self::with_catalog_keys(DEFAULT_CATALOG_KEYS.iter().map(|key| key.to_string()))
    }
}

impl LoftyTagReader {
    pub fn with_catalog_keys<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let catalog_keys = keys
            .into_iter()
            .map(|key| key.trim().to_ascii_uppercase())
            .filter(|key| !key.is_empty())
            .collect();
        Self { catalog_keys }
    }
}

impl TagReader for LoftyTagReader {
    fn read(&self, path: &Path) -> Result<TagInfo, MetadataError> {
        read_tags(path, &self.catalog_keys)
    }
}

pub fn read_tags(path: &Path, catalog_keys: &[String]) -> Result<TagInfo, MetadataError> {
    let tagged_file = lofty::read_from_path(path)?;
    let mut info = TagInfo::default();

    if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        info.album = text_value(tag, &ItemKey::AlbumTitle);
        info.album_artist = text_value(tag, &ItemKey::AlbumArtist);
        info.artist = text_value(tag, &ItemKey::TrackArtist);
    }

    // the catalog id may live in any tag block the file carries
    for tag in tagged_file.tags() {
        if let Some(id) = find_catalog_id(tag, catalog_keys) {
            info.catalog_id = Some(id);
            break;
        }
    }

    if info.catalog_id.is_none() {
        debug!("no catalog id in {:?}", path);
    }
    Ok(info)
}

fn text_value(tag: &Tag, key: &ItemKey) -> Option<String> {
    tag.get_string(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(|value| value.to_string())
}

fn find_catalog_id(tag: &Tag, catalog_keys: &[String]) -> Option<String> {
    for item in tag.items() {
        let raw_key = match item.key() {
            ItemKey::Unknown(key) => key.as_str(),
            _ => continue,
        };
        if !is_catalog_key(raw_key, catalog_keys) {
            continue;
        }
        if let ItemValue::Text(value) = item.value() {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Matches `MCATALOGID`, `TXXX:MCATALOGID` and `----:com.apple.iTunes:MCATALOGID` alike.
fn is_catalog_key(raw_key: &str, catalog_keys: &[String]) -> bool {
    let upper = raw_key.trim().to_ascii_uppercase();
    let short = upper.rsplit(':').next().unwrap_or(&upper);
    catalog_keys
        .iter()
        .any(|key| *key == upper || key.as_str() == short)
}
