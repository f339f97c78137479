//! Output formats.
//!
//! Every format implements [`Converter`]; [`ConverterRegistry`] maps a format name to its
//! converter.

mod archive;
mod pdf;
mod plain;

pub use archive::Archive;
pub use pdf::Pdf;
pub use plain::Plain;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use crate::app::{Result, TankobonError};
use crate::config::FormatsConfig;
use crate::domain::ChapterContent;
use crate::downloader::naming::sanitize_filename;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Plain,
    Zip,
    Cbz,
    Pdf,
}

impl Format {
    pub const ALL: [Format; 4] = [Format::Plain, Format::Cbz, Format::Pdf, Format::Zip];

    pub fn name(self) -> &'static str {
        match self {
            Format::Plain => "plain",
            Format::Zip => "zip",
            Format::Cbz => "cbz",
            Format::Pdf => "pdf",
        }
    }

    /// `None` for formats that produce a directory.
    pub fn extension(self) -> Option<&'static str> {
        match self {
            Format::Plain => None,
            Format::Zip => Some("zip"),
            Format::Cbz => Some("cbz"),
            Format::Pdf => Some("pdf"),
        }
    }

    /// Appends the extension to `stem`. Chapter names often contain dots ("Ch. 10.5"), so
    /// `Path::with_extension` cannot be used.
    pub fn output_path(self, stem: &Path) -> PathBuf {
        match self.extension() {
            Some(ext) => {
                let mut name = stem.as_os_str().to_owned();
                name.push(".");
                name.push(ext);
                PathBuf::from(name)
            }
            None => stem.to_path_buf(),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = TankobonError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "plain" => Ok(Format::Plain),
            "zip" => Ok(Format::Zip),
            "cbz" => Ok(Format::Cbz),
            "pdf" => Ok(Format::Pdf),
            _ => Err(TankobonError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Persists a chapter's pages in one output format.
pub trait Converter: Send + Sync {
    fn format(&self) -> Format;

    /// Writes `content` at `stem` plus the format's extension and returns the written path.
    fn save(&self, content: &ChapterContent, stem: &Path) -> Result<PathBuf>;

    /// Writes `content` into a fresh staging directory and returns the written path.
    ///
    /// Every call gets its own directory, the parent of the returned path. It is left behind
    /// for the caller to move or read.
    fn save_temp(&self, content: &ChapterContent) -> Result<PathBuf> {
        let dir = staging_dir(content)?;
        self.save(content, &dir.join(sanitize_filename(&content.chapter.name)))
    }
}

/// Creates a unique directory under `<tmp>/tankobon/<provider>/<manga>`.
pub fn staging_dir(content: &ChapterContent) -> Result<PathBuf> {
    let chapter = &content.chapter;
    let base = std::env::temp_dir()
        .join("tankobon")
        .join(sanitize_filename(&chapter.provider))
        .join(sanitize_filename(&chapter.manga_name));
    fs::create_dir_all(&base)?;

    let dir = tempfile::Builder::new()
        .prefix(&format!("{}-", sanitize_filename(&chapter.id)))
        .tempdir_in(&base)?;
    Ok(dir.keep())
}

/// Settings shared by every converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConverterOptions {
    /// Leave out pages the PDF encoder cannot read instead of failing the chapter.
    pub skip_unsupported_images: bool,
}

impl ConverterOptions {
    pub fn from_config(config: &FormatsConfig) -> Self {
        Self {
            skip_unsupported_images: config.skip_unsupported_images,
        }
    }
}

impl Default for ConverterOptions {
    fn default() -> Self {
        Self::from_config(&FormatsConfig::default())
    }
}

pub struct ConverterRegistry;

impl ConverterRegistry {
    pub fn available() -> Vec<&'static str> {
        Format::ALL.iter().map(|f| f.name()).collect()
    }

    /// Resolves a format name. Names match exactly.
    pub fn get(name: &str, options: ConverterOptions) -> Result<Arc<dyn Converter>> {
        Ok(Self::for_format(name.parse()?, options))
    }

    pub fn for_format(format: Format, options: ConverterOptions) -> Arc<dyn Converter> {
        match format {
            Format::Plain => Arc::new(Plain),
            Format::Zip => Arc::new(Archive::zip()),
            Format::Cbz => Arc::new(Archive::cbz()),
            Format::Pdf => Arc::new(Pdf::new(options.skip_unsupported_images)),
        }
    }
}

pub(crate) fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub(crate) fn require_pages(content: &ChapterContent) -> Result<()> {
    if content.pages.is_empty() {
        return Err(TankobonError::ConvertFailed(format!(
            "chapter \"{}\" has no pages",
            content.chapter.name
        )));
    }
    Ok(())
}
