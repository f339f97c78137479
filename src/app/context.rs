use std::path::PathBuf;
use std::sync::Arc;

use crate::app::error::{Result, TankobonError};
use crate::config::{paths, Config};
use crate::converter::Converter;
use crate::domain::{Chapter, HistoryEntry};
use crate::downloader::{DownloadOrchestrator, DownloadSettings, NamingSettings};
use crate::provider::{Mangadex, ProviderRegistry};
use crate::store::{HistoryStore, SqliteHistoryStore};

pub struct AppContext {
    pub config: Arc<Config>,
    pub providers: ProviderRegistry,
    pub history: Arc<SqliteHistoryStore>,
}

impl AppContext {
    pub fn new(config: Config, db_path: Option<PathBuf>) -> Result<Self> {
        let db_path = match db_path {
            Some(p) => p,
            None => paths::history_db()?,
        };

        let history = Arc::new(SqliteHistoryStore::new(&db_path)?);
        Self::with_store(config, history)
    }

    pub fn in_memory(config: Config) -> Result<Self> {
        let history = Arc::new(SqliteHistoryStore::in_memory()?);
        Self::with_store(config, history)
    }

    fn with_store(config: Config, history: Arc<SqliteHistoryStore>) -> Result<Self> {
        let providers = Self::enabled_providers(&config)?;
        Ok(Self {
            config: Arc::new(config),
            providers,
            history,
        })
    }

    fn enabled_providers(config: &Config) -> Result<ProviderRegistry> {
        let mut providers = ProviderRegistry::new();
        if config.mangadex.enabled {
            let mangadex = Mangadex::new(config.mangadex.clone())
                .map_err(|e| TankobonError::ProviderUnavailable(format!("mangadex: {}", e)))?;
            providers.register(Arc::new(mangadex));
        }
        Ok(providers)
    }

    pub fn naming(&self) -> NamingSettings {
        NamingSettings::from_config(&self.config.downloader)
    }

    /// An orchestrator bound to one provider, configured from the current settings.
    pub fn orchestrator(
        &self,
        provider: &str,
        converter: Arc<dyn Converter>,
    ) -> Result<DownloadOrchestrator> {
        let provider = self.providers.get(provider)?;
        Ok(DownloadOrchestrator::new(
            provider,
            converter,
            DownloadSettings::from_config(&self.config.downloader),
        ))
    }

    pub fn record_history(&self, chapter: &Chapter, manga_url: Option<String>) -> Result<()> {
        let entry = HistoryEntry::from_chapter(chapter, manga_url);
        tracing::debug!("Saving {} / {} to history", entry.manga_name, entry.chapter_name);
        self.history.record(&entry)
    }
}
