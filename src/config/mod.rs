//! Configuration management for tankobon.
//!
//! Configuration is read from `~/.config/tankobon/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.
//! The loaded [`Config`] is a read-only snapshot for the rest of the run.

pub mod colors;
pub mod keybindings;
pub mod paths;

pub use colors::ColorConfig;
pub use keybindings::KeybindingConfig;

use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::converter::Format;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub downloader: DownloaderConfig,
    pub formats: FormatsConfig,
    pub reader: ReaderConfig,
    pub history: HistoryConfig,
    pub mangadex: MangadexConfig,
    pub logs: LogsConfig,
    pub colors: ColorConfig,
    pub keybindings: KeybindingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    /// Where chapters are written; relative paths resolve against the working directory.
    pub path: PathBuf,
    /// Placeholders: `{padded-index}`, `{index}`, `{chapter}`, `{manga}`
    pub chapter_name_template: String,
    /// Download several chapters at once. When false exactly one worker runs.
    #[serde(rename = "async")]
    pub async_enabled: bool,
    pub workers: usize,
    pub create_manga_dir: bool,
    /// Provider id to open directly, skipping the source list.
    pub default_source: String,
    pub stop_on_error: bool,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("."),
            chapter_name_template: "[{padded-index}] {chapter}".to_string(),
            async_enabled: true,
            workers: 4,
            create_manga_dir: true,
            default_source: String::new(),
            stop_on_error: false,
        }
    }
}

impl DownloaderConfig {
    /// Absolute download directory, falling back to the working directory.
    pub fn downloads_dir(&self) -> PathBuf {
        if self.path.is_absolute() {
            return self.path.clone();
        }
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(&self.path),
            Err(_) => self.path.clone(),
        }
    }

    pub fn default_source(&self) -> Option<&str> {
        let source = self.default_source.trim();
        (!source.is_empty()).then_some(source)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FormatsConfig {
    #[serde(rename = "use")]
    pub format: String,
    /// Drop pages the PDF encoder cannot read instead of failing the chapter.
    pub skip_unsupported_images: bool,
}

impl Default for FormatsConfig {
    fn default() -> Self {
        Self {
            format: "pdf".to_string(),
            skip_unsupported_images: true,
        }
    }
}

/// Applications used to open a chapter for reading. Empty means the system default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub pdf: String,
    pub cbz: String,
    pub zip: String,
    pub plain: String,
    /// Open the chapter page on the provider's site instead of downloading it.
    pub read_in_browser: bool,
}

impl ReaderConfig {
    pub fn app_for(&self, format: Format) -> Option<&str> {
        let app = match format {
            Format::Pdf => &self.pdf,
            Format::Cbz => &self.cbz,
            Format::Zip => &self.zip,
            Format::Plain => &self.plain,
        };
        let app = app.trim();
        (!app.is_empty()).then_some(app)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub save_on_read: bool,
    pub save_on_download: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            save_on_read: true,
            save_on_download: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MangadexConfig {
    pub enabled: bool,
    pub language: String,
    pub nsfw: bool,
    pub show_unavailable_chapters: bool,
}

impl Default for MangadexConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            language: "en".to_string(),
            nsfw: false,
            show_unavailable_chapters: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    /// Write logs to the logs directory while the TUI is running.
    pub write: bool,
    pub level: String,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            write: false,
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// If the config file exists but is invalid, returns an error.
    /// Missing fields in the config file will use default values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = paths::config_file()?;

        if !config_path.exists() {
            Self::write_default(&config_path)?;
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Write the commented default config to `path`.
    pub fn write_default(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    pub fn default_config_content() -> String {
        r##"# Tankobon Configuration
#
# Colors can be specified as:
# - Named colors: Black, Red, Green, Yellow, Blue, Magenta, Cyan, Gray,
#   DarkGray, LightRed, LightGreen, LightYellow, LightBlue, LightMagenta,
#   LightCyan, White, Reset
# - Hex colors: "#RRGGBB" or "#RGB"
#
# Keybindings can be specified as:
# - Single characters: "a", "A", "1", "*"
# - Special keys: Enter, Tab, BackTab, Backspace, Delete, Home, End,
#   PageUp, PageDown, Up, Down, Left, Right, Esc, Space, F1-F12
# - With modifiers: "Ctrl+c", "Shift+Tab", "Alt+Enter"

[downloader]
# Where to save downloaded chapters
path = "."

# Chapter file name. Placeholders:
# {padded-index} {index} {chapter} {manga}
chapter_name_template = "[{padded-index}] {chapter}"

# Download chapters concurrently
async = true
workers = 4

# Put chapters into a directory named after the manga
create_manga_dir = true

# Provider to open on start, e.g. "mangadex". Empty shows the source list.
default_source = ""

# Stop starting new chapters after the first failure
stop_on_error = false

[formats]
# One of: plain, zip, cbz, pdf
use = "pdf"
# Leave out pages the PDF encoder cannot read instead of failing the chapter
skip_unsupported_images = true

[reader]
# Application to open each format with when reading. Empty uses the system default.
pdf = ""
cbz = ""
zip = ""
plain = ""
# Open chapters on the source website instead
read_in_browser = false

[history]
save_on_read = true
save_on_download = false

[mangadex]
enabled = true
language = "en"
nsfw = false
show_unavailable_chapters = false

[logs]
# Write logs to the logs directory (see `tankobon where --logs`)
write = false
level = "info"

[colors]
active_border = "Cyan"
inactive_border = "DarkGray"
title = "Magenta"
selection_bg = "Cyan"
selection_fg = "Black"
marked = "Yellow"
success = "Green"
failure = "Red"
progress = "Magenta"
status_fg = "White"
status_bg = "DarkGray"

[keybindings]
quit = ["q"]
force_quit = ["Ctrl+c", "Ctrl+d"]
back = ["Esc"]
move_up = ["k", "Up"]
move_down = ["j", "Down"]
next_page = ["l", "Right", "PageDown"]
prev_page = ["h", "Left", "PageUp"]
top = ["g", "Home"]
bottom = ["G", "End"]
confirm = ["Enter"]
select_one = ["Space"]
select_all = ["Tab", "Ctrl+a", "*"]
clear_selection = ["Backspace"]
read = ["r"]
redownload_failed = ["r"]
open_url = ["o"]
open_folder = ["o"]
remove = ["d"]
history = ["H"]
filter = ["/"]
help = ["?"]
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Could not determine cache directory")]
    NoCacheDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_deserializes() {
        let content = Config::default_config_content();
        let config: Config = toml::from_str(&content).expect("Default config should be valid TOML");

        assert_eq!(config.colors.active_border, ratatui::style::Color::Cyan);
        assert_eq!(config.keybindings.quit, vec!["q"]);
        assert_eq!(config.formats.format, "pdf");
        assert!(config.downloader.async_enabled);
        assert_eq!(config.downloader.workers, 4);
        assert!(config.formats.skip_unsupported_images);
        assert_eq!(config.reader, ReaderConfig::default());
        assert_eq!(config.keybindings.filter, vec!["/"]);
    }

    #[test]
    fn test_reader_app_for_format() {
        let content = r##"
[reader]
cbz = "mcomix"
pdf = "  "
read_in_browser = true
"##;
        let config: Config = toml::from_str(content).unwrap();

        assert_eq!(config.reader.app_for(Format::Cbz), Some("mcomix"));
        assert_eq!(config.reader.app_for(Format::Pdf), None);
        assert_eq!(config.reader.app_for(Format::Plain), None);
        assert!(config.reader.read_in_browser);
    }

    #[test]
    fn test_partial_config() {
        let content = r##"
[downloader]
async = false
stop_on_error = true

[formats]
use = "cbz"
"##;
        let config: Config = toml::from_str(content).expect("Partial config should work");

        assert!(!config.downloader.async_enabled);
        assert!(config.downloader.stop_on_error);
        assert_eq!(config.formats.format, "cbz");
        // Defaults
        assert_eq!(
            config.downloader.chapter_name_template,
            "[{padded-index}] {chapter}"
        );
        assert!(config.history.save_on_read);
    }

    #[test]
    fn test_empty_config() {
        let config: Config = toml::from_str("").expect("Empty config should work");

        assert_eq!(config.mangadex.language, "en");
        assert_eq!(config.logs.level, "info");
        assert!(config.downloader.default_source().is_none());
    }

    #[test]
    fn test_write_default_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        Config::write_default(&path).unwrap();
        let config = Config::load_from(&path).unwrap();
        assert!(config.mangadex.enabled);
    }

    #[test]
    fn test_invalid_config_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[downloader]\nasync = \"yes\"").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_downloads_dir_is_absolute() {
        let config = DownloaderConfig::default();
        assert!(config.downloads_dir().is_absolute());
    }
}
