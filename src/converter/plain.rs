use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::app::Result;
use crate::converter::{require_pages, Converter, Format};
use crate::domain::ChapterContent;

/// Pages as individual image files inside a chapter directory.
pub struct Plain;

impl Converter for Plain {
    fn format(&self) -> Format {
        Format::Plain
    }

    fn save(&self, content: &ChapterContent, stem: &Path) -> Result<PathBuf> {
        require_pages(content)?;

        let dir = Format::Plain.output_path(stem);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;

        for page in &content.pages {
            fs::write(dir.join(content.page_file_name(page)), &page.data)?;
        }

        debug!("Wrote {} pages to {}", content.pages.len(), dir.display());
        Ok(dir)
    }
}
