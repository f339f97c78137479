use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::app::{Result, TankobonError};
use crate::config::MangadexConfig;
use crate::domain::{Chapter, ChapterContent, Manga, Page};
use crate::provider::Provider;

const API: &str = "https://api.mangadex.org";
const SITE: &str = "https://mangadex.org";
const SEARCH_LIMIT: usize = 20;
const FEED_LIMIT: usize = 500;
const PAGE_CONCURRENCY: usize = 4;

pub struct Mangadex {
    client: Client,
    config: MangadexConfig,
}

impl Mangadex {
    pub fn new(config: MangadexConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .gzip(true)
            .brotli(true)
            .user_agent(concat!("tankobon/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, config })
    }

    fn content_ratings(&self) -> Vec<(&'static str, &'static str)> {
        let mut ratings = vec![
            ("contentRating[]", "safe"),
            ("contentRating[]", "suggestive"),
        ];
        if self.config.nsfw {
            ratings.push(("contentRating[]", "erotica"));
            ratings.push(("contentRating[]", "pornographic"));
        }
        ratings
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        response.error_for_status_ref()?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn fetch_page(&self, index: usize, url: String) -> Result<Page> {
        let response = self.client.get(&url).send().await?;
        response.error_for_status_ref()?;
        let data = response.bytes().await?.to_vec();

        Ok(Page {
            index,
            extension: extension_of(&url),
            data,
        })
    }
}

#[async_trait]
impl Provider for Mangadex {
    fn id(&self) -> &str {
        "mangadex"
    }

    fn name(&self) -> &str {
        "Mangadex"
    }

    async fn search(&self, query: &str) -> Result<Vec<Manga>> {
        let limit = SEARCH_LIMIT.to_string();
        let mut params = vec![
            ("title", query),
            ("limit", limit.as_str()),
            ("order[relevance]", "desc"),
            ("availableTranslatedLanguage[]", self.config.language.as_str()),
        ];
        params.extend(self.content_ratings());

        let url = Url::parse_with_params(&format!("{}/manga", API), &params)?;
        let response: ListResponse<MangaData> = self.get_json(url).await?;

        let mangas = mangas_from(response, self.id(), &self.config.language);
        info!("Found {} manga for \"{}\"", mangas.len(), query);
        Ok(mangas)
    }

    async fn chapters(&self, manga: &Manga) -> Result<Vec<Chapter>> {
        let mut data = Vec::new();
        let mut offset = 0;

        loop {
            let limit = FEED_LIMIT.to_string();
            let offset_param = offset.to_string();
            let mut params = vec![
                ("limit", limit.as_str()),
                ("offset", offset_param.as_str()),
                ("translatedLanguage[]", self.config.language.as_str()),
                ("order[volume]", "asc"),
                ("order[chapter]", "asc"),
                ("includeFutureUpdates", "0"),
            ];
            params.extend(self.content_ratings());

            let url = Url::parse_with_params(&format!("{}/manga/{}/feed", API, manga.id), &params)?;
            let response: ListResponse<ChapterData> = self.get_json(url).await?;

            let received = response.data.len();
            data.extend(response.data);
            offset += received;

            if received == 0 || offset >= response.total.unwrap_or(0) {
                break;
            }
        }

        Ok(chapters_from(
            data,
            manga,
            self.config.show_unavailable_chapters,
        ))
    }

    async fn content(&self, chapter: &Chapter) -> Result<ChapterContent> {
        let url = Url::parse(&format!("{}/at-home/server/{}", API, chapter.id))?;
        let server: AtHomeResponse = self.get_json(url).await?;
        let urls = page_urls(&server);

        if urls.is_empty() {
            return Err(TankobonError::FetchFailed(format!(
                "chapter \"{}\" has no pages",
                chapter.name
            )));
        }

        let pages: Vec<Page> = stream::iter(urls.into_iter().enumerate())
            .map(|(index, url)| self.fetch_page(index, url))
            .buffered(PAGE_CONCURRENCY)
            .try_collect()
            .await?;

        debug!("Fetched {} pages of {}", pages.len(), chapter.name);
        Ok(ChapterContent::new(chapter.clone(), pages))
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    data: Vec<T>,
    total: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct MangaData {
    id: String,
    attributes: MangaAttributes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MangaAttributes {
    #[serde(default)]
    title: HashMap<String, String>,
    #[serde(default)]
    alt_titles: Vec<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct ChapterData {
    id: String,
    attributes: ChapterAttributes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChapterAttributes {
    volume: Option<String>,
    chapter: Option<String>,
    title: Option<String>,
    #[serde(default)]
    pages: u32,
    external_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AtHomeResponse {
    base_url: String,
    chapter: AtHomeChapter,
}

#[derive(Debug, Deserialize)]
struct AtHomeChapter {
    hash: String,
    data: Vec<String>,
}

fn mangas_from(response: ListResponse<MangaData>, provider: &str, language: &str) -> Vec<Manga> {
    response
        .data
        .into_iter()
        .map(|data| {
            let name = pick_title(&data.attributes, language);
            let mut manga = Manga::new(provider, data.id, name);
            manga.url = Some(format!("{}/title/{}", SITE, manga.id));
            manga
        })
        .collect()
}

/// Title in the preferred language, then English, then any alternative title.
fn pick_title(attributes: &MangaAttributes, language: &str) -> String {
    attributes
        .title
        .get(language)
        .or_else(|| attributes.title.get("en"))
        .or_else(|| {
            attributes
                .alt_titles
                .iter()
                .find_map(|alt| alt.get(language).or_else(|| alt.get("en")))
        })
        .or_else(|| attributes.title.values().next())
        .cloned()
        .unwrap_or_else(|| "Untitled".to_string())
}

fn chapters_from(data: Vec<ChapterData>, manga: &Manga, show_unavailable: bool) -> Vec<Chapter> {
    data.into_iter()
        .filter(|c| show_unavailable || (c.attributes.pages > 0 && c.attributes.external_url.is_none()))
        .enumerate()
        .map(|(index, c)| {
            let name = chapter_name(&c.attributes);
            let mut chapter = Chapter::new(manga, c.id, name, index);
            chapter.url = Some(format!("{}/chapter/{}", SITE, chapter.id));
            chapter
        })
        .collect()
}

fn chapter_name(attributes: &ChapterAttributes) -> String {
    let title = attributes.title.as_deref().filter(|t| !t.trim().is_empty());

    let mut name = match (&attributes.chapter, title) {
        (Some(number), Some(title)) => format!("Chapter {}: {}", number, title),
        (Some(number), None) => format!("Chapter {}", number),
        (None, Some(title)) => title.to_string(),
        (None, None) => "Oneshot".to_string(),
    };

    if let Some(volume) = &attributes.volume {
        name = format!("Vol. {} {}", volume, name);
    }
    name
}

fn page_urls(server: &AtHomeResponse) -> Vec<String> {
    server
        .chapter
        .data
        .iter()
        .map(|file| format!("{}/data/{}/{}", server.base_url, server.chapter.hash, file))
        .collect()
}

fn extension_of(url: &str) -> String {
    url.rsplit('/')
        .next()
        .and_then(|file| file.rsplit_once('.'))
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 4)
        .unwrap_or_else(|| "jpg".to_string())
}
