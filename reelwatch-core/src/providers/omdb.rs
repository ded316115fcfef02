use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use super::{MetadataProvider, ProviderError, ProviderRecord};

pub const OMDB_BASE_URL: &str = "https://www.omdbapi.com/";

/// OMDb lookup by exact title (`t`) and optional year (`y`).
pub struct OmdbProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl fmt::Debug for OmdbProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OmdbProvider")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl OmdbProvider {
    pub fn new(
        api_key: Option<String>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.unwrap_or_else(|| OMDB_BASE_URL.to_string()),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl MetadataProvider for OmdbProvider {
    async fn fetch(
        &self,
        title: &str,
        year: Option<u16>,
    ) -> Result<ProviderRecord, ProviderError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ProviderError::Disabled(
                "no OMDb API key configured".to_string(),
            ));
        };

        let mut query = vec![("t", title.to_string()), ("apikey", api_key.to_string())];
        if let Some(year) = year {
            query.push(("y", year.to_string()));
        }

        debug!("OMDb lookup for {:?} ({:?})", title, year);
        let response = self
            .client
            .get(&self.base_url)
            .query(&query)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.without_url()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(ProviderError::InvalidApiKey),
            StatusCode::TOO_MANY_REQUESTS => return Err(ProviderError::RateLimited),
            status if !status.is_success() => {
                return Err(ProviderError::ApiError(format!("HTTP {status}")));
            }
            _ => {}
        }

        let body: OmdbResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.without_url().to_string()))?;
        interpret(body)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct OmdbResponse {
    response: String,
    error: Option<String>,
    title: Option<String>,
    year: Option<String>,
    rated: Option<String>,
    runtime: Option<String>,
    genre: Option<String>,
    director: Option<String>,
    actors: Option<String>,
    plot: Option<String>,
    poster: Option<String>,
    #[serde(rename = "imdbRating")]
    imdb_rating: Option<String>,
    #[serde(rename = "imdbID")]
    imdb_id: Option<String>,
    #[serde(rename = "Type")]
    kind: Option<String>,
}

fn interpret(body: OmdbResponse) -> Result<ProviderRecord, ProviderError> {
    if !body.response.eq_ignore_ascii_case("true") {
        let message = body.error.unwrap_or_else(|| "unknown error".to_string());
        let lowered = message.to_ascii_lowercase();
        return Err(if lowered.contains("not found") {
            ProviderError::NotFound
        } else if lowered.contains("api key") {
            ProviderError::InvalidApiKey
        } else if lowered.contains("limit") {
            ProviderError::RateLimited
        } else {
            ProviderError::ApiError(message)
        });
    }

    let title = present(body.title)
        .ok_or_else(|| ProviderError::ParseError("response without Title".to_string()))?;

    Ok(ProviderRecord {
        title,
        year: present(body.year),
        plot: present(body.plot),
        genre: present(body.genre),
        poster_url: present(body.poster),
        external_id: present(body.imdb_id),
        rated: present(body.rated),
        runtime: present(body.runtime),
        director: present(body.director),
        actors: present(body.actors),
        imdb_rating: present(body.imdb_rating),
        kind: present(body.kind),
    })
}

/// OMDb spells missing values as `"N/A"`.
fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v != "N/A")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<ProviderRecord, ProviderError> {
        interpret(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn maps_found_response() {
        let record = parse(
            r#"{"Title":"The Matrix","Year":"1999","Rated":"R","Runtime":"136 min",
                "Genre":"Action, Sci-Fi","Director":"Lana Wachowski, Lilly Wachowski",
                "Plot":"A hacker learns the truth.","Poster":"https://img/matrix.jpg",
                "imdbRating":"8.7","imdbID":"tt0133093","Type":"movie","Response":"True"}"#,
        )
        .unwrap();
        assert_eq!(record.title, "The Matrix");
        assert_eq!(record.external_id.as_deref(), Some("tt0133093"));
        assert_eq!(record.genre.as_deref(), Some("Action, Sci-Fi"));
        assert_eq!(record.kind.as_deref(), Some("movie"));
        assert!(record.actors.is_none());
    }

    #[test]
    fn treats_na_as_missing() {
        let record = parse(
            r#"{"Title":"Obscure","Year":"2001","Plot":"N/A","Poster":"N/A","Response":"True"}"#,
        )
        .unwrap();
        assert!(record.plot.is_none());
        assert!(record.poster_url.is_none());
    }

    #[test]
    fn classifies_failures() {
        assert!(parse(r#"{"Response":"False","Error":"Movie not found!"}"#)
            .unwrap_err()
            .is_not_found());
        assert!(matches!(
            parse(r#"{"Response":"False","Error":"Invalid API key!"}"#),
            Err(ProviderError::InvalidApiKey)
        ));
        assert!(matches!(
            parse(r#"{"Response":"False","Error":"Request limit reached!"}"#),
            Err(ProviderError::RateLimited)
        ));
        assert!(matches!(
            parse(r#"{"Response":"False","Error":"Something broke"}"#),
            Err(ProviderError::ApiError(_))
        ));
    }

    #[tokio::test]
    async fn missing_key_disables_lookups() {
        let provider =
            OmdbProvider::new(Some("  ".into()), None, Duration::from_secs(1)).unwrap();
        assert!(!provider.is_configured());
        assert!(matches!(
            provider.fetch("Anything", None).await,
            Err(ProviderError::Disabled(_))
        ));
    }
}
