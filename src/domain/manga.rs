use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manga {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub url: Option<String>,
    pub chapters: Vec<Chapter>,
}

impl Manga {
    pub fn new(provider: impl Into<String>, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            provider: provider.into(),
            url: None,
            chapters: Vec::new(),
        }
    }
}

/// One orderable unit of a manga.
///
/// Holds the owning manga's id and name for lookups and naming only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub name: String,
    pub index: usize,
    pub provider: String,
    pub manga_id: String,
    pub manga_name: String,
    pub url: Option<String>,
}

impl Chapter {
    pub fn new(manga: &Manga, id: impl Into<String>, name: impl Into<String>, index: usize) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            index,
            provider: manga.provider.clone(),
            manga_id: manga.id.clone(),
            manga_name: manga.name.clone(),
            url: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Page {
    pub index: usize,
    pub extension: String,
    pub data: Vec<u8>,
}

/// Raw page data for a chapter, as returned by a provider.
#[derive(Debug, Clone)]
pub struct ChapterContent {
    pub chapter: Chapter,
    pub pages: Vec<Page>,
}

impl ChapterContent {
    pub fn new(chapter: Chapter, pages: Vec<Page>) -> Self {
        Self { chapter, pages }
    }

    /// File name for a page, zero padded to the number of digits of the page count.
    pub fn page_file_name(&self, page: &Page) -> String {
        let width = digits(self.pages.len());
        format!("{:0width$}.{}", page.index + 1, page.extension, width = width)
    }
}

pub(crate) fn digits(n: usize) -> usize {
    n.max(1).to_string().len()
}
