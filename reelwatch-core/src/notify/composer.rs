use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reelwatch_model::{ChangeSet, EntryKey, FolderEntry, MediaMetadata, MonitoredPath};

use super::chunker::{Block, Chunk, Chunker};
use super::markup::{MarkupDialect, Span};
use crate::settings::NotifySettings;

const IMDB_TITLE_URL: &str = "https://www.imdb.com/title/";

/// Poster attached ahead of a change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub url: String,
    /// Plain (unescaped) caption.
    pub caption: String,
    pub item: EntryKey,
}

/// Ready-to-send message: optional image, then ordered text chunks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationMessage {
    pub image: Option<ImageRef>,
    pub chunks: Vec<Chunk>,
}

impl NotificationMessage {
    pub fn items(&self) -> impl Iterator<Item = &EntryKey> {
        self.chunks.iter().flat_map(|chunk| chunk.items.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty() && self.image.is_none()
    }
}

/// Builds dialect-rendered, size-bounded messages.
pub struct Composer {
    dialect: Arc<dyn MarkupDialect>,
    settings: NotifySettings,
    max_len: usize,
}

impl fmt::Debug for Composer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composer")
            .field("dialect", &self.dialect)
            .field("max_len", &self.max_len)
            .finish()
    }
}

impl Composer {
    /// `channel_limit` is the transport's own ceiling; the effective limit is
    /// the smaller of it and the configured one.
    pub fn new(
        dialect: Arc<dyn MarkupDialect>,
        settings: NotifySettings,
        channel_limit: usize,
    ) -> Self {
        let max_len = settings.max_message_length.min(channel_limit).max(1);
        Self {
            dialect,
            settings,
            max_len,
        }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn dialect(&self) -> &dyn MarkupDialect {
        self.dialect.as_ref()
    }

    /// Change notification for one cycle. `None` when there is nothing to
    /// report and no-change messages are disabled.
    pub fn compose_changes(
        &self,
        changes: &ChangeSet,
        metadata: &BTreeMap<EntryKey, MediaMetadata>,
        totals: &[(MonitoredPath, usize)],
        at: DateTime<Utc>,
    ) -> Option<NotificationMessage> {
        if changes.is_empty() && !self.settings.send_no_change_message {
            return None;
        }

        let mut blocks = vec![self.header(changes, at)];
        let mut image = None;

        for path in changes.paths() {
            let mut added: Vec<&FolderEntry> = changes.added_in(path).collect();
            if added.is_empty() {
                continue;
            }
            added.sort_by(|a, b| a.name.cmp(&b.name));
            blocks.push(section_heading(path, "New content added"));
            for entry in added {
                let key = entry.key();
                let record = metadata.get(&key);
                if image.is_none() && self.settings.attach_poster {
                    image = record.and_then(|record| poster(&key, record));
                }
                blocks.push(self.added_block(key, entry, record));
            }
        }

        for path in changes.paths() {
            let mut removed: Vec<&FolderEntry> = changes.removed_in(path).collect();
            if removed.is_empty() {
                continue;
            }
            removed.sort_by(|a, b| a.name.cmp(&b.name));
            blocks.push(section_heading(path, "Content removed"));
            for entry in removed {
                blocks.push(Block::for_item(
                    entry.key(),
                    vec![Span::text(format!("    - {}", entry.name))],
                ));
            }
        }

        blocks.extend(totals_blocks(totals));

        Some(NotificationMessage {
            image,
            chunks: self.chunk(blocks),
        })
    }

    pub fn compose_heartbeat(
        &self,
        at: DateTime<Utc>,
        last_scan: Option<DateTime<Utc>>,
    ) -> NotificationMessage {
        let last = last_scan.map_or_else(|| "never".to_string(), format_timestamp);
        let blocks = vec![
            Block::new(vec![Span::bold("🧡 Reelwatch Heartbeat 🧡")]),
            Block::new(vec![Span::text(format!("Now: {}", format_timestamp(at)))]),
            Block::new(vec![Span::text(format!("Last scan: {last}"))]),
            Block::new(vec![Span::text(
                "I'm still running and monitoring your library!",
            )]),
        ];
        self.compose(blocks)
    }

    /// Generic reply made of caller-built blocks.
    pub fn compose(&self, blocks: Vec<Block>) -> NotificationMessage {
        NotificationMessage {
            image: None,
            chunks: self.chunk(blocks),
        }
    }

    pub fn plot_preview(&self, plot: &str) -> String {
        plot_preview(plot, self.settings.plot_preview_chars)
    }

    fn chunk(&self, blocks: Vec<Block>) -> Vec<Chunk> {
        let mut chunker = Chunker::new(self.dialect.as_ref(), self.max_len);
        chunker.extend(blocks);
        chunker.finish()
    }

    fn header(&self, changes: &ChangeSet, at: DateTime<Utc>) -> Block {
        let stamp = format!(" {}", format_timestamp(at));
        if changes.is_empty() {
            return Block::new(vec![
                Span::bold("Library Status"),
                Span::text(stamp),
                Span::text("\nNo new content or removals detected."),
            ]);
        }

        let summary = match (changes.added.len(), changes.removed.len()) {
            (added, 0) => format!("Found {added} new items."),
            (0, removed) => format!("Found {removed} removed items."),
            (added, removed) => {
                format!("Found {added} new items and {removed} removed items.")
            }
        };
        Block::new(vec![
            Span::bold("Library Updates!"),
            Span::text(stamp),
            Span::text(format!("\n{summary}")),
        ])
    }

    fn added_block(
        &self,
        key: EntryKey,
        entry: &FolderEntry,
        record: Option<&MediaMetadata>,
    ) -> Block {
        let Some(record) = record.filter(|record| record.is_resolved()) else {
            let mut spans = vec![Span::text("    - "), Span::bold(entry.title.clone())];
            if let Some(year) = entry.year {
                spans.push(Span::text(format!(" ({year})")));
            }
            spans.push(Span::italic(" (no details found)"));
            return Block::for_item(key, spans);
        };

        let mut spans = vec![Span::text("    - "), Span::bold(record.title.clone())];
        if !record.year_label().is_empty() {
            spans.push(Span::text(format!(" ({})", record.year_label())));
        }
        if let Some(genre) = &record.genre {
            spans.push(Span::text(format!("\n      Genre: {genre}")));
        }
        if let Some(plot) = &record.plot {
            spans.push(Span::text(format!("\n      Plot: {}", self.plot_preview(plot))));
        }
        if let Some(id) = &record.external_id {
            spans.push(Span::text("\n      "));
            spans.push(imdb_link(id));
        }
        Block::for_item(key, spans)
    }
}

fn section_heading(path: &MonitoredPath, label: &str) -> Block {
    Block::new(vec![
        Span::bold(path.label()),
        Span::text(":\n  "),
        Span::italic(format!("{label}:")),
    ])
    .with_gap()
}

fn totals_blocks(totals: &[(MonitoredPath, usize)]) -> Vec<Block> {
    if totals.is_empty() {
        return Vec::new();
    }
    let mut blocks = vec![Block::new(vec![Span::bold("Current Library Totals:")]).with_gap()];
    for (path, count) in totals {
        blocks.push(Block::new(vec![
            Span::text("  "),
            Span::bold(path.label()),
            Span::text(format!(": {count} folders")),
        ]));
    }
    blocks
}

fn poster(key: &EntryKey, record: &MediaMetadata) -> Option<ImageRef> {
    let url = record.poster_url.clone()?;
    let caption = match record.year_label() {
        "" => record.title.clone(),
        year => format!("{} ({year})", record.title),
    };
    Some(ImageRef {
        url,
        caption,
        item: key.clone(),
    })
}

/// Plot cut at a word boundary near `max_chars`, with an ellipsis when cut.
pub fn plot_preview(plot: &str, max_chars: usize) -> String {
    let plot = plot.trim();
    if plot.chars().count() <= max_chars {
        return plot.to_string();
    }
    let head: String = plot.chars().take(max_chars).collect();
    let cut = match head.rfind(char::is_whitespace) {
        Some(idx) if idx > 0 => head[..idx].trim_end(),
        _ => head.as_str(),
    };
    format!("{cut}...")
}

pub fn imdb_link(id: &str) -> Span {
    Span::link("IMDb Link", format!("{IMDB_TITLE_URL}{id}/"))
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::folder_name;
    use crate::notify::markup::{PlainText, text_len};
    use chrono::TimeZone;
    use reelwatch_model::{FetchStatus, MetadataKey};

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 9, 30, 0).unwrap()
    }

    fn composer(max: usize) -> Composer {
        Composer::new(Arc::new(PlainText), NotifySettings::default(), max)
    }

    fn resolved(entry: &FolderEntry, plot: &str) -> MediaMetadata {
        MediaMetadata {
            plot: Some(plot.to_string()),
            genre: Some("Drama".to_string()),
            poster_url: Some(format!("https://img/{}.jpg", entry.title)),
            external_id: Some("tt0000001".to_string()),
            status: FetchStatus::Resolved,
            ..MediaMetadata::placeholder(
                MetadataKey::for_entry(entry),
                entry.title.clone(),
                entry.year,
                FetchStatus::Resolved,
                ts(),
            )
        }
    }

    #[test]
    fn nothing_to_say_without_no_change_messages() {
        let message = composer(4096).compose_changes(
            &ChangeSet::default(),
            &BTreeMap::new(),
            &[],
            ts(),
        );
        assert!(message.is_none());
    }

    #[test]
    fn no_change_message_when_enabled() {
        let settings = NotifySettings {
            send_no_change_message: true,
            ..Default::default()
        };
        let composer = Composer::new(Arc::new(PlainText), settings, 4096);
        let message = composer
            .compose_changes(
                &ChangeSet::default(),
                &BTreeMap::new(),
                &[(MonitoredPath::new("/media/Movies"), 3)],
                ts(),
            )
            .unwrap();
        assert_eq!(message.chunks.len(), 1);
        let text = &message.chunks[0].text;
        assert!(text.contains("No new content or removals detected."));
        assert!(text.contains("Movies: 3 folders"));
    }

    #[test]
    fn change_message_lists_every_item_once() {
        let path = MonitoredPath::new("/media/Movies");
        let a = folder_name::observe(path.clone(), "MovieA (2020)", ts());
        let b = folder_name::observe(path.clone(), "MovieB (2021)", ts());
        let gone = folder_name::observe(path.clone(), "Old (1990)", ts());
        let changes = ChangeSet {
            added: vec![b.clone(), a.clone()],
            removed: vec![gone.clone()],
        };
        let mut metadata = BTreeMap::new();
        metadata.insert(a.key(), resolved(&a, "A plot."));
        metadata.insert(
            b.key(),
            MediaMetadata::placeholder_for(&b, FetchStatus::NotFound, ts()),
        );

        let message = composer(4096)
            .compose_changes(&changes, &metadata, &[(path, 2)], ts())
            .unwrap();

        assert_eq!(message.items().count(), 3);
        let text = &message.chunks[0].text;
        assert!(text.starts_with("Library Updates! 2024-07-01 09:30 UTC"));
        assert!(text.contains("Found 2 new items and 1 removed items."));
        assert!(text.contains("MovieA (2020)\n      Genre: Drama"));
        assert!(text.contains("IMDb Link (https://www.imdb.com/title/tt0000001/)"));
        assert!(text.contains("MovieB (2021) (no details found)"));
        assert!(text.contains("    - Old (1990)"));
        assert!(text.find("MovieA").unwrap() < text.find("MovieB").unwrap());

        let image = message.image.unwrap();
        assert_eq!(image.url, "https://img/MovieA.jpg");
        assert_eq!(image.item, a.key());
    }

    #[test]
    fn large_change_sets_split_without_losing_items() {
        let path = MonitoredPath::new("/m");
        let added: Vec<_> = (0..120)
            .map(|i| folder_name::observe(path.clone(), &format!("Film {i:03} (2001)"), ts()))
            .collect();
        let metadata: BTreeMap<_, _> = added
            .iter()
            .map(|entry| (entry.key(), resolved(entry, &"word ".repeat(60))))
            .collect();
        let changes = ChangeSet {
            added,
            removed: Vec::new(),
        };

        let composer = composer(1000);
        let message = composer
            .compose_changes(&changes, &metadata, &[(path, 120)], ts())
            .unwrap();
        assert!(message.chunks.len() > 1);
        assert!(message.chunks.iter().all(|c| text_len(&c.text) <= 1000));
        assert_eq!(message.items().count(), 120);
    }

    #[test]
    fn plot_preview_cuts_at_word_boundary() {
        assert_eq!(plot_preview("Short plot.", 200), "Short plot.");
        assert_eq!(plot_preview("one two three four", 10), "one two...");
        assert_eq!(plot_preview("abcdefghijkl", 5), "abcde...");
    }

    #[test]
    fn heartbeat_reports_last_scan() {
        let message = composer(4096).compose_heartbeat(ts(), None);
        assert_eq!(message.chunks.len(), 1);
        assert!(message.chunks[0].text.contains("Last scan: never"));
        assert_eq!(message.items().count(), 0);
    }
}
