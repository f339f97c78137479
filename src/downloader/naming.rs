//! Output naming for downloaded chapters.

use std::env;
use std::path::PathBuf;

use crate::config::DownloaderConfig;
use crate::domain::Chapter;

pub const PADDED_INDEX: &str = "{padded-index}";
pub const INDEX: &str = "{index}";
pub const CHAPTER: &str = "{chapter}";
pub const MANGA: &str = "{manga}";

/// Where and under which name a batch writes its chapters.
#[derive(Debug, Clone)]
pub struct NamingSettings {
    pub downloads_dir: PathBuf,
    pub create_manga_dir: bool,
    pub template: String,
}

impl NamingSettings {
    pub fn from_config(config: &DownloaderConfig) -> Self {
        Self {
            downloads_dir: config.downloads_dir(),
            create_manga_dir: config.create_manga_dir,
            template: config.chapter_name_template.clone(),
        }
    }

    /// Output path without the format's extension.
    ///
    /// `ordinal` is 1-based. Templates without `{padded-index}` get it as a prefix so that
    /// two chapters of one batch never share a path.
    pub fn output_stem(&self, chapter: &Chapter, ordinal: usize, width: usize) -> PathBuf {
        let template = if self.template.contains(PADDED_INDEX) {
            self.template.clone()
        } else {
            format!("[{}] {}", PADDED_INDEX, self.template)
        };

        let name = render_template(&template, chapter, ordinal, width);

        let mut path = self.downloads_dir.clone();
        if self.create_manga_dir {
            path.push(sanitize_filename(&chapter.manga_name));
        }
        path.push(sanitize_filename(&name));
        path
    }
}

pub fn render_template(template: &str, chapter: &Chapter, ordinal: usize, width: usize) -> String {
    template
        .replace(PADDED_INDEX, &format!("{:0width$}", ordinal, width = width))
        .replace(INDEX, &ordinal.to_string())
        .replace(CHAPTER, &chapter.name)
        .replace(MANGA, &chapter.manga_name)
}

/// Replaces characters that are not allowed in file names.
pub fn sanitize_filename(input: &str) -> String {
    let invalid_chars: &[char] = match env::consts::OS {
        "windows" => &['\\', '/', ':', '*', '?', '"', '<', '>', '|'],
        _ => &['/', '\0'],
    };

    let mut result: String = input
        .trim()
        .chars()
        .map(|c| if invalid_chars.contains(&c) { '_' } else { c })
        .collect();

    if result.starts_with('.') {
        result = format!("_{}", result);
    }

    if result.is_empty() {
        result.push('_');
    }

    // Some filesystems cap names at 255 bytes
    while result.len() > 240 {
        result.pop();
    }

    result
}
