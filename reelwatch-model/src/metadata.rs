use std::fmt;

use crate::chrono::{DateTime, Utc};
use crate::entry::FolderEntry;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Cache key for metadata lookups: normalized title plus optional year.
///
/// Normalization lower-cases the title, collapses whitespace runs and trims,
/// so `"The  Matrix"` and `"the matrix"` share one record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MetadataKey {
    pub title: String,
    pub year: Option<u16>,
}

impl MetadataKey {
    pub fn new(title: &str, year: Option<u16>) -> Self {
        Self {
            title: normalize_title(title),
            year,
        }
    }

    pub fn for_entry(entry: &FolderEntry) -> Self {
        Self::new(&entry.title, entry.year)
    }
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.year {
            Some(year) => write!(f, "{} ({})", self.title, year),
            None => f.write_str(&self.title),
        }
    }
}

fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Outcome of the most recent lookup for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FetchStatus {
    /// The provider returned details. Cached indefinitely.
    Resolved,
    /// The provider has no match. Cached for a cooldown window.
    NotFound,
    /// No usable answer yet (not fetched, or the fetch failed transiently).
    /// Never persisted.
    Pending,
}

/// Metadata for one media item, keyed by [`MetadataKey`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MediaMetadata {
    pub key: MetadataKey,
    /// Display title: provider canonical title when resolved, otherwise the
    /// title parsed from the folder name.
    pub title: String,
    /// Display year. Series report ranges such as `2008–2013`.
    #[cfg_attr(feature = "serde", serde(default))]
    pub year: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub plot: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub genre: Option<String>,
    /// Remote poster reference (URL).
    #[cfg_attr(feature = "serde", serde(default))]
    pub poster_url: Option<String>,
    /// External id at the provider (IMDb id for OMDb).
    #[cfg_attr(feature = "serde", serde(default))]
    pub external_id: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub rated: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub runtime: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub director: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub actors: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub imdb_rating: Option<String>,
    /// Provider media kind, e.g. `movie` or `series`.
    #[cfg_attr(feature = "serde", serde(default))]
    pub kind: Option<String>,
    pub status: FetchStatus,
    /// When the status was last established.
    pub fetched_at: DateTime<Utc>,
}

impl MediaMetadata {
    /// Title/year-only record used when no details are available.
    pub fn placeholder(
        key: MetadataKey,
        title: impl Into<String>,
        year: Option<u16>,
        status: FetchStatus,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            title: title.into(),
            year: year.map(|year| year.to_string()),
            plot: None,
            genre: None,
            poster_url: None,
            external_id: None,
            rated: None,
            runtime: None,
            director: None,
            actors: None,
            imdb_rating: None,
            kind: None,
            status,
            fetched_at: at,
        }
    }

    /// Placeholder derived from a folder entry's parsed fields.
    pub fn placeholder_for(
        entry: &FolderEntry,
        status: FetchStatus,
        at: DateTime<Utc>,
    ) -> Self {
        Self::placeholder(
            MetadataKey::for_entry(entry),
            entry.title.clone(),
            entry.year,
            status,
            at,
        )
    }

    pub fn is_resolved(&self) -> bool {
        self.status == FetchStatus::Resolved
    }

    /// Year rendered for display; empty when unknown.
    pub fn year_label(&self) -> &str {
        self.year.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_normalizes_case_and_whitespace() {
        let a = MetadataKey::new("  The   Matrix ", Some(1999));
        let b = MetadataKey::new("the matrix", Some(1999));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "the matrix (1999)");
    }

    #[test]
    fn key_distinguishes_years() {
        assert_ne!(
            MetadataKey::new("Dune", Some(1984)),
            MetadataKey::new("Dune", Some(2021))
        );
        assert_ne!(
            MetadataKey::new("Dune", None),
            MetadataKey::new("Dune", Some(2021))
        );
    }

    #[test]
    fn placeholder_carries_only_title_and_year() {
        let record = MediaMetadata::placeholder(
            MetadataKey::new("MovieB", Some(2021)),
            "MovieB",
            Some(2021),
            FetchStatus::NotFound,
            Utc::now(),
        );
        assert_eq!(record.title, "MovieB");
        assert_eq!(record.year_label(), "2021");
        assert!(record.plot.is_none());
        assert!(record.genre.is_none());
        assert!(!record.is_resolved());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&FetchStatus::NotFound).unwrap();
        assert_eq!(json, "\"not_found\"");
    }
}
