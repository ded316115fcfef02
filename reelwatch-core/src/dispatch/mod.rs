pub mod dispatcher;
pub mod memory;
pub mod retry;
pub mod telegram;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::notify::{ImageRef, MarkupDialect};

pub use dispatcher::{ChunkOutcome, DispatchReport, Dispatcher};
pub use memory::{RecordingChannel, SentMessage};
pub use retry::Backoff;
pub use telegram::{IncomingMessage, MarkdownV2, TelegramChannel};

/// Why a send attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("transient send failure: {0}")]
    Transient(String),

    #[error("rate limited; retry after {0:?}")]
    RateLimited(Duration),

    #[error("send attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("message rejected: {0}")]
    Rejected(String),

    #[error("not authorized: {0}")]
    Unauthorized(String),
}

impl SendError {
    /// Whether repeating the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transient(_) | Self::RateLimited(_) | Self::Timeout(_)
        )
    }

    /// Minimum wait the channel asked for before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited(wait) => Some(*wait),
            _ => None,
        }
    }
}

/// Chat the notifications are delivered to: a numeric id or `@channel`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatTarget(String);

impl ChatTarget {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether an incoming chat id refers to this target.
    pub fn matches(&self, chat_id: i64) -> bool {
        self.0.trim() == chat_id.to_string()
    }
}

impl fmt::Display for ChatTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outbound messaging capability.
#[async_trait]
pub trait MessagingChannel: Send + Sync {
    /// Hard per-message limit in UTF-16 code units.
    fn max_message_length(&self) -> usize;

    /// Markup language the channel parses.
    fn dialect(&self) -> Arc<dyn MarkupDialect>;

    /// Send text already rendered in [`MessagingChannel::dialect`].
    async fn send_text(&self, target: &ChatTarget, text: &str) -> Result<(), SendError>;

    async fn send_image(&self, target: &ChatTarget, image: &ImageRef) -> Result<(), SendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_transient_errors() {
        assert!(SendError::Transient("503".into()).is_transient());
        assert!(SendError::RateLimited(Duration::from_secs(3)).is_transient());
        assert!(SendError::Timeout(Duration::from_secs(3)).is_transient());
        assert!(!SendError::Rejected("bad markup".into()).is_transient());
        assert!(!SendError::Unauthorized("401".into()).is_transient());
        assert_eq!(
            SendError::RateLimited(Duration::from_secs(3)).retry_after(),
            Some(Duration::from_secs(3))
        );
    }

    #[test]
    fn chat_target_matches_numeric_ids() {
        assert!(ChatTarget::new("-100123").matches(-100123));
        assert!(!ChatTarget::new("@channel").matches(5));
    }
}
