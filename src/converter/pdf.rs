use std::fs;
use std::path::{Path, PathBuf};

use genpdf::fonts::{FontData, FontFamily};
use tracing::{debug, trace, warn};

use crate::app::{Result, TankobonError};
use crate::converter::{ensure_parent, require_pages, Converter, Format};
use crate::domain::ChapterContent;

// A4 minus page margins, in millimetres
const PAGE_WIDTH_MM: f64 = 200.0;
const PAGE_HEIGHT_MM: f64 = 287.0;
const MARGIN_MM: i32 = 5;
const IMAGE_DPI: f64 = 300.0;

#[cfg(target_os = "macos")]
const SYSTEM_FONTS: &[&str] = &[
    "/System/Library/Fonts/Geneva.ttf",
    "/System/Library/Fonts/Monaco.ttf",
    "/Library/Fonts/Arial.ttf",
];

#[cfg(target_os = "windows")]
const SYSTEM_FONTS: &[&str] = &[
    "C:\\Windows\\Fonts\\arial.ttf",
    "C:\\Windows\\Fonts\\verdana.ttf",
    "C:\\Windows\\Fonts\\tahoma.ttf",
];

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
];

/// One page image per PDF page.
pub struct Pdf {
    skip_unsupported_images: bool,
}

impl Pdf {
    pub fn new(skip_unsupported_images: bool) -> Self {
        Self {
            skip_unsupported_images,
        }
    }

    /// Writes every page into `scratch` and pairs it with its scale. Pages that cannot be
    /// decoded are dropped when skipping is on.
    fn prepare_pages(&self, content: &ChapterContent, scratch: &Path) -> Result<Vec<(PathBuf, f64)>> {
        let mut pages = Vec::with_capacity(content.pages.len());

        for page in &content.pages {
            let page_path = scratch.join(content.page_file_name(page));
            fs::write(&page_path, &page.data)?;

            match fit_scale(&page_path) {
                Ok(scale) => {
                    trace!("Page {} scale {:.2}", page.index + 1, scale);
                    pages.push((page_path, scale));
                }
                Err(e) if self.skip_unsupported_images => {
                    warn!("Skipping page {} of {}: {}", page.index + 1, content.chapter.name, e);
                }
                Err(e) => return Err(e),
            }
        }

        if pages.is_empty() {
            return Err(TankobonError::ConvertFailed(format!(
                "chapter \"{}\" has no pages the PDF encoder can read",
                content.chapter.name
            )));
        }
        Ok(pages)
    }
}

impl Converter for Pdf {
    fn format(&self) -> Format {
        Format::Pdf
    }

    fn save(&self, content: &ChapterContent, stem: &Path) -> Result<PathBuf> {
        require_pages(content)?;

        // genpdf only loads images from disk
        let scratch = tempfile::tempdir()?;
        let pages = self.prepare_pages(content, scratch.path())?;

        let path = Format::Pdf.output_path(stem);
        ensure_parent(&path)?;

        let mut doc = genpdf::Document::new(load_font(SYSTEM_FONTS)?);
        doc.set_title(format!("{} - {}", content.chapter.manga_name, content.chapter.name));
        doc.set_paper_size(genpdf::PaperSize::A4);
        let mut decorator = genpdf::SimplePageDecorator::new();
        decorator.set_margins(MARGIN_MM);
        doc.set_page_decorator(decorator);

        let mut pushed = 0;
        for (page_path, scale) in &pages {
            let image = match genpdf::elements::Image::from_path(page_path) {
                Ok(image) => image,
                Err(e) if self.skip_unsupported_images => {
                    warn!("Skipping {}: {}", page_path.display(), e);
                    continue;
                }
                Err(e) => return Err(convert_failed(page_path, e)),
            };

            if pushed > 0 {
                doc.push(genpdf::elements::PageBreak::new());
            }
            doc.push(
                image
                    .with_alignment(genpdf::Alignment::Center)
                    .with_scale(genpdf::Scale::new(*scale, *scale)),
            );
            pushed += 1;
        }

        if pushed == 0 {
            return Err(TankobonError::ConvertFailed(format!(
                "chapter \"{}\" has no pages the PDF encoder can read",
                content.chapter.name
            )));
        }

        doc.render_to_file(&path)
            .map_err(|e| convert_failed(&path, e))?;
        debug!("Rendered {} pages to {}", pushed, path.display());
        Ok(path)
    }
}

/// Scale that fits the image onto one page, never enlarging it.
fn fit_scale(path: &Path) -> Result<f64> {
    let (width, height) = image::image_dimensions(path).map_err(|e| convert_failed(path, e))?;

    let width_mm = width as f64 * 25.4 / IMAGE_DPI;
    let height_mm = height as f64 * 25.4 / IMAGE_DPI;
    if width_mm <= 0.0 || height_mm <= 0.0 {
        return Err(TankobonError::ConvertFailed(format!(
            "empty image {}",
            path.display()
        )));
    }

    Ok((PAGE_WIDTH_MM / width_mm).min(PAGE_HEIGHT_MM / height_mm).min(1.0))
}

/// First candidate that parses as a TrueType font, used for every style.
fn load_font(candidates: &[&str]) -> Result<FontFamily<FontData>> {
    for candidate in candidates {
        let Ok(bytes) = fs::read(candidate) else {
            continue;
        };
        match FontData::new(bytes, None) {
            Ok(font) => {
                debug!("Using font {}", candidate);
                return Ok(FontFamily {
                    regular: font.clone(),
                    bold: font.clone(),
                    italic: font.clone(),
                    bold_italic: font,
                });
            }
            Err(e) => warn!("Failed to load font {}: {}", candidate, e),
        }
    }

    Err(TankobonError::ConvertFailed(
        "no usable TrueType font found for PDF output".to_string(),
    ))
}

fn convert_failed(path: &Path, e: impl std::fmt::Display) -> TankobonError {
    TankobonError::ConvertFailed(format!("{}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Chapter, Manga, Page};

    fn png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        image::RgbImage::new(width, height).save(&path).unwrap();
        path
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let dir = tempfile::tempdir().unwrap();
        fs::read(png(dir.path(), "page.png", width, height)).unwrap()
    }

    fn content(pages: Vec<Vec<u8>>) -> ChapterContent {
        let manga = Manga::new("test", "m", "Manga");
        let chapter = Chapter::new(&manga, "c1", "Chapter 1", 0);
        let pages = pages
            .into_iter()
            .enumerate()
            .map(|(index, data)| Page {
                index,
                extension: "png".into(),
                data,
            })
            .collect();
        ChapterContent::new(chapter, pages)
    }

    #[test]
    fn test_fit_scale_never_enlarges() {
        let dir = tempfile::tempdir().unwrap();
        let small = png(dir.path(), "small.png", 100, 100);
        assert_eq!(fit_scale(&small).unwrap(), 1.0);
    }

    #[test]
    fn test_fit_scale_fits_tall_and_wide_pages() {
        let dir = tempfile::tempdir().unwrap();
        let to_mm = |px: u32| px as f64 * 25.4 / IMAGE_DPI;

        let tall = fit_scale(&png(dir.path(), "tall.png", 400, 4000)).unwrap();
        assert!(tall < 1.0);
        assert!((to_mm(4000) * tall - PAGE_HEIGHT_MM).abs() < 1e-6);
        assert!(to_mm(400) * tall <= PAGE_WIDTH_MM);

        let wide = fit_scale(&png(dir.path(), "wide.png", 4000, 400)).unwrap();
        assert!((to_mm(4000) * wide - PAGE_WIDTH_MM).abs() < 1e-6);
        assert!(to_mm(400) * wide <= PAGE_HEIGHT_MM);
    }

    #[test]
    fn test_fit_scale_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        fs::write(&path, b"not an image").unwrap();
        assert!(matches!(fit_scale(&path), Err(TankobonError::ConvertFailed(_))));
    }

    #[test]
    fn test_missing_font_is_convert_failed() {
        let result = load_font(&["/nonexistent/tankobon/font.ttf"]);
        assert!(matches!(result, Err(TankobonError::ConvertFailed(ref m)) if m.contains("font")));
    }

    #[test]
    fn test_save_rejects_empty_chapter() {
        let dir = tempfile::tempdir().unwrap();
        let result = Pdf::new(true).save(&content(Vec::new()), &dir.path().join("out"));
        assert!(matches!(result, Err(TankobonError::ConvertFailed(_))));
        assert!(!dir.path().join("out.pdf").exists());
    }

    #[test]
    fn test_unreadable_pages_are_skipped() {
        let scratch = tempfile::tempdir().unwrap();
        let chapter = content(vec![png_bytes(20, 30), b"garbage".to_vec()]);

        let pages = Pdf::new(true).prepare_pages(&chapter, scratch.path()).unwrap();
        assert_eq!(pages.len(), 1);
        assert!(pages[0].0.ends_with("1.png"));
    }

    #[test]
    fn test_unreadable_page_fails_without_skipping() {
        let scratch = tempfile::tempdir().unwrap();
        let chapter = content(vec![png_bytes(20, 30), b"garbage".to_vec()]);

        let result = Pdf::new(false).prepare_pages(&chapter, scratch.path());
        assert!(matches!(result, Err(TankobonError::ConvertFailed(ref m)) if m.contains("2.png")));
    }

    #[test]
    fn test_all_pages_unreadable_fails() {
        let scratch = tempfile::tempdir().unwrap();
        let chapter = content(vec![b"garbage".to_vec()]);

        let result = Pdf::new(true).prepare_pages(&chapter, scratch.path());
        assert!(matches!(result, Err(TankobonError::ConvertFailed(ref m)) if m.contains("no pages")));
    }
}
