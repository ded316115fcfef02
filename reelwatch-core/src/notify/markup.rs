use std::fmt;

/// A run of message text with one presentational style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Span {
    Text(String),
    Bold(String),
    Italic(String),
    Link { label: String, url: String },
}

impl Span {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn bold(value: impl Into<String>) -> Self {
        Self::Bold(value.into())
    }

    pub fn italic(value: impl Into<String>) -> Self {
        Self::Italic(value.into())
    }

    pub fn link(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Link {
            label: label.into(),
            url: url.into(),
        }
    }

    /// The user-visible characters of this span.
    pub fn content(&self) -> &str {
        match self {
            Self::Text(value) | Self::Bold(value) | Self::Italic(value) => value,
            Self::Link { label, .. } => label,
        }
    }

    /// Same style, content cut to its first `chars` characters.
    pub fn with_prefix(&self, chars: usize) -> Self {
        let cut = |value: &str| value.chars().take(chars).collect::<String>();
        match self {
            Self::Text(value) => Self::Text(cut(value)),
            Self::Bold(value) => Self::Bold(cut(value)),
            Self::Italic(value) => Self::Italic(cut(value)),
            Self::Link { label, url } => Self::Link {
                label: cut(label),
                url: url.clone(),
            },
        }
    }
}

/// Rendering rules of a channel's markup language. Every piece of dynamic
/// text goes through [`MarkupDialect::escape`] before it reaches the wire.
pub trait MarkupDialect: Send + Sync + fmt::Debug {
    /// Escape every character the dialect reserves.
    fn escape(&self, text: &str) -> String;

    /// Escape text placed inside a link target.
    fn escape_url(&self, url: &str) -> String {
        url.to_string()
    }

    fn bold(&self, escaped: &str) -> String {
        escaped.to_string()
    }

    fn italic(&self, escaped: &str) -> String {
        escaped.to_string()
    }

    fn link(&self, escaped_label: &str, escaped_url: &str) -> String {
        format!("{escaped_label} ({escaped_url})")
    }

    fn render(&self, span: &Span) -> String {
        match span {
            Span::Text(value) => self.escape(value),
            Span::Bold(value) => self.bold(&self.escape(value)),
            Span::Italic(value) => self.italic(&self.escape(value)),
            Span::Link { label, url } => {
                self.link(&self.escape(label), &self.escape_url(url))
            }
        }
    }

    fn render_all(&self, spans: &[Span]) -> String {
        spans.iter().map(|span| self.render(span)).collect()
    }
}

/// Unformatted output; nothing is reserved.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainText;

impl MarkupDialect for PlainText {
    fn escape(&self, text: &str) -> String {
        text.to_string()
    }
}

/// Message length as channels count it: UTF-16 code units.
pub fn text_len(text: &str) -> usize {
    text.encode_utf16().count()
}
