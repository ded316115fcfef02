pub mod memory;
pub mod omdb;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reelwatch_model::{FetchStatus, MediaMetadata, MetadataKey};

pub use memory::InMemoryProvider;
pub use omdb::OmdbProvider;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Not found")]
    NotFound,

    #[error("Rate limited")]
    RateLimited,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Provider disabled: {0}")]
    Disabled(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl ProviderError {
    /// A definitive "no such title"; everything else is worth retrying on a
    /// later cycle.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Details a provider returns for one title. Missing fields stay `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderRecord {
    pub title: String,
    pub year: Option<String>,
    pub plot: Option<String>,
    pub genre: Option<String>,
    pub poster_url: Option<String>,
    pub external_id: Option<String>,
    pub rated: Option<String>,
    pub runtime: Option<String>,
    pub director: Option<String>,
    pub actors: Option<String>,
    pub imdb_rating: Option<String>,
    pub kind: Option<String>,
}

impl ProviderRecord {
    pub fn into_metadata(self, key: MetadataKey, at: DateTime<Utc>) -> MediaMetadata {
        MediaMetadata {
            key,
            title: self.title,
            year: self.year,
            plot: self.plot,
            genre: self.genre,
            poster_url: self.poster_url,
            external_id: self.external_id,
            rated: self.rated,
            runtime: self.runtime,
            director: self.director,
            actors: self.actors,
            imdb_rating: self.imdb_rating,
            kind: self.kind,
            status: FetchStatus::Resolved,
            fetched_at: at,
        }
    }
}

/// External metadata lookup by title and optional year.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn fetch(
        &self,
        title: &str,
        year: Option<u16>,
    ) -> Result<ProviderRecord, ProviderError>;
}
