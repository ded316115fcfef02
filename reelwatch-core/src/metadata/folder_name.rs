use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reelwatch_model::{FolderEntry, MonitoredPath};

/// `Title (2020)` or `Title [2020]`, optionally followed by whitespace.
static GROUPED_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<title>.+?)\s*(?:\((?P<paren>\d{4})\)|\[(?P<bracket>\d{4})\])\s*$",
    )
    .expect("grouped year pattern")
});

/// Release-style names such as `The.Matrix.1999` or `Alien_1979`. Plain
/// spaces are not accepted as a separator so `Blade Runner 2049` stays a
/// title.
static RELEASE_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<title>.+?)[._]+(?P<year>\d{4})$")
        .expect("release year pattern")
});

const MIN_YEAR: u16 = 1888;
const MAX_YEAR: u16 = 2100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFolderName {
    pub title: String,
    pub year: Option<u16>,
}

/// Best-effort title/year extraction. Never fails: names without a usable
/// year yield the whole (trimmed) name as the title.
pub fn parse(name: &str) -> ParsedFolderName {
    let trimmed = name.trim();

    if let Some(captures) = GROUPED_YEAR.captures(trimmed)
        && let Some(year) = captures
            .name("paren")
            .or_else(|| captures.name("bracket"))
            .and_then(|m| valid_year(m.as_str()))
    {
        let title = clean_title(&captures["title"], false);
        if !title.is_empty() {
            return ParsedFolderName {
                title,
                year: Some(year),
            };
        }
    }

    if let Some(captures) = RELEASE_YEAR.captures(trimmed)
        && let Some(year) = valid_year(&captures["year"])
    {
        let title = clean_title(&captures["title"], true);
        if !title.is_empty() {
            return ParsedFolderName {
                title,
                year: Some(year),
            };
        }
    }

    ParsedFolderName {
        title: trimmed.to_string(),
        year: None,
    }
}

/// Build the entry for a folder observed under `path`.
pub fn observe(
    path: MonitoredPath,
    name: &str,
    first_seen: DateTime<Utc>,
) -> FolderEntry {
    let parsed = parse(name);
    FolderEntry {
        name: name.to_string(),
        title: parsed.title,
        year: parsed.year,
        path,
        first_seen,
    }
}

fn valid_year(raw: &str) -> Option<u16> {
    raw.parse::<u16>()
        .ok()
        .filter(|year| (MIN_YEAR..=MAX_YEAR).contains(year))
}

fn clean_title(raw: &str, release_style: bool) -> String {
    let raw = if release_style {
        raw.replace(['.', '_'], " ")
    } else {
        raw.to_string()
    };
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
