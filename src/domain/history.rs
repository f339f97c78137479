use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{Chapter, Manga};

/// Last chapter read or downloaded for one manga.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub provider: String,
    pub manga_id: String,
    pub manga_name: String,
    pub manga_url: Option<String>,
    pub chapter_id: String,
    pub chapter_name: String,
    pub chapter_index: usize,
    pub updated_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn from_chapter(chapter: &Chapter, manga_url: Option<String>) -> Self {
        Self {
            id: Self::generate_id(&chapter.provider, &chapter.manga_id),
            provider: chapter.provider.clone(),
            manga_id: chapter.manga_id.clone(),
            manga_name: chapter.manga_name.clone(),
            manga_url,
            chapter_id: chapter.id.clone(),
            chapter_name: chapter.name.clone(),
            chapter_index: chapter.index,
            updated_at: Utc::now(),
        }
    }

    /// One entry per manga and provider.
    pub fn generate_id(provider: &str, manga_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(provider.as_bytes());
        hasher.update([0u8]);
        hasher.update(manga_id.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// The manga this entry points at, without chapters.
    pub fn manga(&self) -> Manga {
        let mut manga = Manga::new(&self.provider, &self.manga_id, &self.manga_name);
        manga.url = self.manga_url.clone();
        manga
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_is_per_manga() {
        let manga = Manga::new("mangadex", "m1", "Manga");
        let a = HistoryEntry::from_chapter(&Chapter::new(&manga, "c1", "One", 0), None);
        let b = HistoryEntry::from_chapter(&Chapter::new(&manga, "c2", "Two", 1), None);
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), 64);
        assert_ne!(a.id, HistoryEntry::generate_id("other", "m1"));
    }

    #[test]
    fn test_manga_roundtrip() {
        let mut manga = Manga::new("mangadex", "m1", "Manga");
        manga.url = Some("https://example.com/m1".into());
        let entry = HistoryEntry::from_chapter(&Chapter::new(&manga, "c1", "One", 0), manga.url.clone());
        assert_eq!(entry.manga(), manga);
    }
}
