use reelwatch_model::EntryKey;

use super::markup::{MarkupDialect, Span, text_len};

/// Appended to a block that alone exceeds the message limit.
pub const TRUNCATION_MARKER: &str = " … [truncated]";

/// Smallest unit of layout. A block is never split across chunks; one that
/// cannot fit an empty chunk is truncated instead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub spans: Vec<Span>,
    /// Changed entries this block announces.
    pub items: Vec<EntryKey>,
    /// Separate from the previous block by a blank line.
    pub gap_before: bool,
}

impl Block {
    pub fn new(spans: Vec<Span>) -> Self {
        Self {
            spans,
            ..Default::default()
        }
    }

    pub fn for_item(item: EntryKey, spans: Vec<Span>) -> Self {
        Self {
            spans,
            items: vec![item],
            gap_before: false,
        }
    }

    pub fn with_gap(mut self) -> Self {
        self.gap_before = true;
        self
    }
}

/// One message of a possibly multi-part notification, already rendered in
/// the channel dialect.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub items: Vec<EntryKey>,
    pub truncated: bool,
}

/// Packs blocks into chunks no longer than `max_len` UTF-16 units.
#[derive(Debug)]
pub struct Chunker<'a> {
    dialect: &'a dyn MarkupDialect,
    max_len: usize,
    chunks: Vec<Chunk>,
    current: Option<Chunk>,
    current_len: usize,
}

impl<'a> Chunker<'a> {
    pub fn new(dialect: &'a dyn MarkupDialect, max_len: usize) -> Self {
        Self {
            dialect,
            max_len,
            chunks: Vec::new(),
            current: None,
            current_len: 0,
        }
    }

    pub fn push(&mut self, block: Block) {
        let rendered = self.dialect.render_all(&block.spans);
        let len = text_len(&rendered);
        if len == 0 && block.items.is_empty() {
            return;
        }

        if let Some(current) = self.current.as_mut() {
            let separator = if block.gap_before { "\n\n" } else { "\n" };
            let needed = text_len(separator) + len;
            if self.current_len + needed <= self.max_len {
                current.text.push_str(separator);
                current.text.push_str(&rendered);
                current.items.extend(block.items);
                self.current_len += needed;
                return;
            }
            self.close();
        }

        if len <= self.max_len {
            self.current = Some(Chunk {
                text: rendered,
                items: block.items,
                truncated: false,
            });
            self.current_len = len;
        } else {
            let text = self.truncate(&block.spans);
            self.chunks.push(Chunk {
                text,
                items: block.items,
                truncated: true,
            });
        }
    }

    pub fn extend(&mut self, blocks: impl IntoIterator<Item = Block>) {
        for block in blocks {
            self.push(block);
        }
    }

    pub fn finish(mut self) -> Vec<Chunk> {
        self.close();
        self.chunks
    }

    fn close(&mut self) {
        if let Some(chunk) = self.current.take() {
            self.chunks.push(chunk);
        }
        self.current_len = 0;
    }

    /// Longest span prefix that fits together with the marker. The marker is
    /// plain text so it never sits flush against another span's delimiter.
    fn truncate(&self, spans: &[Span]) -> String {
        let marker = self.dialect.render(&Span::text(TRUNCATION_MARKER));
        let budget = self.max_len.saturating_sub(text_len(&marker));
        let fits = |span: &Span, room: usize| text_len(&self.dialect.render(span)) <= room;

        let mut out = String::new();
        let mut used = 0;
        for span in spans {
            let rendered = self.dialect.render(span);
            let len = text_len(&rendered);
            if used + len <= budget {
                out.push_str(&rendered);
                used += len;
                continue;
            }

            let room = budget - used;
            let chars = span.content().chars().count();
            let (mut lo, mut hi, mut best) = (1, chars.saturating_sub(1), 0);
            while lo <= hi {
                let mid = lo + (hi - lo) / 2;
                if fits(&span.with_prefix(mid), room) {
                    best = mid;
                    lo = mid + 1;
                } else {
                    hi = mid - 1;
                }
            }
            if best > 0 {
                out.push_str(&self.dialect.render(&span.with_prefix(best)));
            }
            break;
        }

        if text_len(&marker) <= self.max_len {
            out.push_str(&marker);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::markup::PlainText;
    use reelwatch_model::MonitoredPath;

    fn key(name: &str) -> EntryKey {
        EntryKey::new(MonitoredPath::new("/m"), name)
    }

    fn item(name: &str, body: &str) -> Block {
        Block::for_item(key(name), vec![Span::text(body)])
    }

    #[test]
    fn packs_blocks_until_the_limit() {
        let mut chunker = Chunker::new(&PlainText, 10);
        chunker.push(item("a", "aaaa"));
        chunker.push(item("b", "bbbb"));
        chunker.push(item("c", "cccc"));
        let chunks = chunker.finish();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "aaaa\nbbbb");
        assert_eq!(chunks[0].items, vec![key("a"), key("b")]);
        assert_eq!(chunks[1].text, "cccc");
    }

    #[test]
    fn every_chunk_respects_the_limit() {
        let mut chunker = Chunker::new(&PlainText, 64);
        for i in 0..200 {
            let body = "x".repeat(i % 50 + 1);
            chunker.push(item(&i.to_string(), &body).with_gap());
        }
        let chunks = chunker.finish();
        assert!(chunks.iter().all(|chunk| text_len(&chunk.text) <= 64));
        let items: usize = chunks.iter().map(|chunk| chunk.items.len()).sum();
        assert_eq!(items, 200);
    }

    #[test]
    fn oversized_block_is_truncated_with_marker() {
        let mut chunker = Chunker::new(&PlainText, 30);
        chunker.push(item("small", "hi"));
        chunker.push(Block::for_item(
            key("big"),
            vec![Span::bold("Heading "), Span::text("y".repeat(100))],
        ));
        let chunks = chunker.finish();

        assert_eq!(chunks.len(), 2);
        let big = &chunks[1];
        assert!(big.truncated);
        assert!(big.text.starts_with("Heading yyy"));
        assert!(big.text.ends_with(TRUNCATION_MARKER));
        assert_eq!(text_len(&big.text), 30);
        assert_eq!(big.items, vec![key("big")]);
    }
}
