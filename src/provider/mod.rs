//! Content providers.
//!
//! A provider searches a catalog, lists a manga's chapters and fetches a chapter's pages.
//! [`ProviderRegistry`] maps provider ids to instances.

pub mod mangadex;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::app::{Result, TankobonError};
use crate::domain::{Chapter, ChapterContent, Manga};

pub use mangadex::Mangadex;

#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier, stored in history and used for staging paths.
    fn id(&self) -> &str;

    /// Human readable name shown in the source list.
    fn name(&self) -> &str;

    async fn search(&self, query: &str) -> Result<Vec<Manga>>;

    /// Chapters in reading order.
    async fn chapters(&self, manga: &Manga) -> Result<Vec<Chapter>>;

    async fn content(&self, chapter: &Chapter) -> Result<ChapterContent>;
}

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.id().to_string(), provider);
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn Provider>> {
        self.providers
            .get(id)
            .cloned()
            .ok_or_else(|| TankobonError::ProviderUnavailable(format!("provider {} not found", id)))
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// (id, name) pairs sorted by id.
    pub fn list(&self) -> Vec<(String, String)> {
        self.providers
            .values()
            .map(|p| (p.id().to_string(), p.name().to_string()))
            .collect()
    }
}
