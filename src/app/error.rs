use thiserror::Error;

#[derive(Error, Debug)]
pub enum TankobonError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Failed to fetch chapter: {0}")]
    FetchFailed(String),

    #[error("Failed to convert chapter: {0}")]
    ConvertFailed(String),

    #[error("Unsupported format \"{0}\"")]
    UnsupportedFormat(String),

    #[error("No chapters selected")]
    EmptySelection,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TankobonError>;

impl From<crate::config::ConfigError> for TankobonError {
    fn from(e: crate::config::ConfigError) -> Self {
        TankobonError::Config(e.to_string())
    }
}
