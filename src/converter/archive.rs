use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::app::Result;
use crate::converter::{ensure_parent, require_pages, Converter, Format};
use crate::domain::ChapterContent;

/// Zip based formats. CBZ archives additionally carry a `ComicInfo.xml`.
pub struct Archive {
    format: Format,
}

impl Archive {
    pub fn zip() -> Self {
        Self {
            format: Format::Zip,
        }
    }

    pub fn cbz() -> Self {
        Self {
            format: Format::Cbz,
        }
    }
}

impl Converter for Archive {
    fn format(&self) -> Format {
        self.format
    }

    fn save(&self, content: &ChapterContent, stem: &Path) -> Result<PathBuf> {
        require_pages(content)?;

        let path = self.format.output_path(stem);
        ensure_parent(&path)?;

        let file = BufWriter::new(File::create(&path)?);
        let mut zip = ZipWriter::new(file);
        // Images are already compressed
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

        for page in &content.pages {
            zip.start_file(content.page_file_name(page), options)?;
            zip.write_all(&page.data)?;
        }

        if self.format == Format::Cbz {
            zip.start_file("ComicInfo.xml", options)?;
            zip.write_all(comic_info(content).as_bytes())?;
        }

        zip.finish()?.flush()?;
        debug!("Wrote {} archive {}", self.format, path.display());
        Ok(path)
    }
}

fn comic_info(content: &ChapterContent) -> String {
    let chapter = &content.chapter;
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<ComicInfo xmlns:xsd="http://www.w3.org/2001/XMLSchema" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <Title>{}</Title>
  <Series>{}</Series>
  <Number>{}</Number>
  <PageCount>{}</PageCount>
  <Manga>YesAndRightToLeft</Manga>
</ComicInfo>
"#,
        html_escape::encode_text(&chapter.name),
        html_escape::encode_text(&chapter.manga_name),
        chapter.index + 1,
        content.pages.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    use crate::domain::{Chapter, Manga, Page};

    fn content() -> ChapterContent {
        let manga = Manga::new("test", "m", "Tom & Jerry");
        let chapter = Chapter::new(&manga, "c1", "Chapter <1>", 4);
        let pages = (0..2)
            .map(|index| Page {
                index,
                extension: "png".into(),
                data: vec![7; 8],
            })
            .collect();
        ChapterContent::new(chapter, pages)
    }

    fn entry_names(path: &Path) -> Vec<String> {
        let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn test_zip_contains_pages_only() {
        let dir = tempfile::tempdir().unwrap();
        let out = Archive::zip().save(&content(), &dir.path().join("ch")).unwrap();

        assert_eq!(out, dir.path().join("ch.zip"));
        assert_eq!(entry_names(&out), vec!["1.png", "2.png"]);
    }

    #[test]
    fn test_cbz_has_escaped_comic_info() {
        let dir = tempfile::tempdir().unwrap();
        let out = Archive::cbz().save(&content(), &dir.path().join("ch")).unwrap();

        assert_eq!(out, dir.path().join("ch.cbz"));
        assert!(entry_names(&out).contains(&"ComicInfo.xml".to_string()));

        let mut archive = zip::ZipArchive::new(File::open(&out).unwrap()).unwrap();
        let mut xml = String::new();
        archive
            .by_name("ComicInfo.xml")
            .unwrap()
            .read_to_string(&mut xml)
            .unwrap();
        assert!(xml.contains("<Series>Tom &amp; Jerry</Series>"));
        assert!(xml.contains("<Title>Chapter &lt;1&gt;</Title>"));
        assert!(xml.contains("<Number>5</Number>"));
    }
}
