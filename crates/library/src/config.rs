use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;
pub const DEFAULT_MAX_NAME_BYTES: usize = 255;
pub const DEFAULT_UNIQUE_NAME_ATTEMPTS: usize = 50_000;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub version: u32,
    pub media_extensions: Vec<String>,
    pub skip_dirs: Vec<String>,
    pub skip_dir_suffixes: Vec<String>,
    pub playlist_extensions: Vec<String>,
    pub catalog_tag_keys: Vec<String>,
    pub max_name_bytes: usize,
    pub unique_name_attempts: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_limit: Option<usize>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            media_extensions: to_strings(&[
                "mp3", "flac", "m4a", "ogg", "opus", "wav", "wma", "aac", "ape", "mpc",
            ]),
            skip_dirs: to_strings(&["@eaDir", ".Spotlight-V100", ".Trashes", ".movpkg"]),
            skip_dir_suffixes: to_strings(&[".movpkg"]),
            playlist_extensions: to_strings(&["m3u", "m3u8"]),
            catalog_tag_keys: to_strings(metadata::DEFAULT_CATALOG_KEYS),
            max_name_bytes: DEFAULT_MAX_NAME_BYTES,
            unique_name_attempts: DEFAULT_UNIQUE_NAME_ATTEMPTS,
            preview_limit: None,
        }
    }
}

impl LibraryConfig {
    pub fn is_media_path(&self, path: &Path) -> bool {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) => self
                .media_extensions
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }

    pub fn is_playlist_path(&self, path: &Path) -> bool {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) => self
                .playlist_extensions
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }

    pub fn is_media_extension(&self, ext: &str) -> bool {
        self.media_extensions
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext))
    }

    pub fn should_skip_dir(&self, name: &str) -> bool {
        self.skip_dirs.iter().any(|skip| skip == name)
            || self
                .skip_dir_suffixes
                .iter()
                .any(|suffix| !suffix.is_empty() && name.ends_with(suffix.as_str()))
    }

    /// Puts back defaults for values that would make a run meaningless.
    fn repair(&mut self) {
        let defaults = LibraryConfig::default();
        if self.version < CONFIG_VERSION {
            self.version = CONFIG_VERSION;
        }
        trim_list(&mut self.media_extensions);
        if self.media_extensions.is_empty() {
            self.media_extensions = defaults.media_extensions;
        }
        trim_list(&mut self.playlist_extensions);
        if self.playlist_extensions.is_empty() {
            self.playlist_extensions = defaults.playlist_extensions;
        }
        trim_list(&mut self.catalog_tag_keys);
        if self.catalog_tag_keys.is_empty() {
            self.catalog_tag_keys = defaults.catalog_tag_keys;
        }
        if self.max_name_bytes < 32 {
            self.max_name_bytes = DEFAULT_MAX_NAME_BYTES;
        }
        if self.unique_name_attempts == 0 {
            self.unique_name_attempts = DEFAULT_UNIQUE_NAME_ATTEMPTS;
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("LIBNORM_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("libnorm.yaml"))
            .unwrap_or_else(|| PathBuf::from("libnorm.yaml")),
        Err(_) => PathBuf::from("libnorm.yaml"),
    }
}

/// Reads the config at `path`, falling back to defaults when the file is absent.
pub fn load_config(path: &Path) -> Result<LibraryConfig, ConfigError> {
    if !path.exists() {
        return Ok(LibraryConfig::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(LibraryConfig::default());
    }
    let mut config: LibraryConfig = serde_yaml::from_str(&contents)?;
    config.repair();
    Ok(config)
}

pub fn save_config(path: &Path, config: &LibraryConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn trim_list(values: &mut Vec<String>) {
    for value in values.iter_mut() {
        *value = value.trim().trim_start_matches('.').to_string();
    }
    values.retain(|value| !value.is_empty());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_recognizes_media_and_playlists() {
        let config = LibraryConfig::default();
        assert!(config.is_media_path(Path::new("a/b/song.MP3")));
        assert!(config.is_media_path(Path::new("song.flac")));
        assert!(!config.is_media_path(Path::new("cover.jpg")));
        assert!(!config.is_media_path(Path::new("mp3")));
        assert!(config.is_playlist_path(Path::new("mix.m3u8")));
    }

    #[test]
    fn skips_listed_dirs_and_suffixes() {
        let config = LibraryConfig::default();
        assert!(config.should_skip_dir("@eaDir"));
        assert!(config.should_skip_dir("clip.movpkg"));
        assert!(!config.should_skip_dir("album"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config(Path::new("/no/such/libnorm.yaml")).unwrap();
        assert_eq!(config.max_name_bytes, DEFAULT_MAX_NAME_BYTES);
    }

    #[test]
    fn partial_yaml_keeps_defaults_and_repairs_values() {
        let mut config: LibraryConfig =
            serde_yaml::from_str("max_name_bytes: 0\nmedia_extensions: ['.FLAC', '']\n").unwrap();
        config.repair();
        assert_eq!(config.max_name_bytes, DEFAULT_MAX_NAME_BYTES);
        assert_eq!(config.media_extensions, vec!["FLAC".to_string()]);
        assert_eq!(config.unique_name_attempts, DEFAULT_UNIQUE_NAME_ATTEMPTS);
        assert!(config.is_media_path(Path::new("x.flac")));
    }
}
