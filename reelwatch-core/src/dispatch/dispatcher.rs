use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use reelwatch_model::EntryKey;
use tracing::{debug, info, warn};

use super::retry::Backoff;
use super::{ChatTarget, MessagingChannel, SendError};
use crate::notify::NotificationMessage;
use crate::settings::{DispatchSettings, RetryConfig};

/// What happened to one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    Delivered { attempts: u16 },
    Failed { attempts: u16, error: SendError },
    /// Not attempted because an earlier chunk failed.
    Skipped,
}

/// Per-chunk results of one dispatch. Items of failed or skipped chunks are
/// withheld and must not be committed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    pub image: Option<Result<(), SendError>>,
    pub outcomes: Vec<ChunkOutcome>,
    delivered: BTreeSet<EntryKey>,
    withheld: BTreeSet<EntryKey>,
}

impl DispatchReport {
    pub fn is_complete(&self) -> bool {
        self.outcomes
            .iter()
            .all(|outcome| matches!(outcome, ChunkOutcome::Delivered { .. }))
    }

    pub fn is_delivered(&self, item: &EntryKey) -> bool {
        self.delivered.contains(item)
    }

    pub fn delivered_items(&self) -> &BTreeSet<EntryKey> {
        &self.delivered
    }

    pub fn withheld_items(&self) -> &BTreeSet<EntryKey> {
        &self.withheld
    }

    /// The error that stopped the dispatch, if any.
    pub fn failure(&self) -> Option<&SendError> {
        self.outcomes.iter().find_map(|outcome| match outcome {
            ChunkOutcome::Failed { error, .. } => Some(error),
            _ => None,
        })
    }
}

/// Delivers messages in chunk order with bounded retries. Never sends chunk
/// `i + 1` before chunk `i` is delivered.
pub struct Dispatcher {
    channel: Arc<dyn MessagingChannel>,
    target: ChatTarget,
    backoff: Backoff,
    settings: DispatchSettings,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("target", &self.target)
            .field("backoff", &self.backoff)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(
        channel: Arc<dyn MessagingChannel>,
        target: ChatTarget,
        retry: RetryConfig,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            channel,
            target,
            backoff: Backoff::new(retry),
            settings,
        }
    }

    pub fn target(&self) -> &ChatTarget {
        &self.target
    }

    pub async fn dispatch(&self, message: &NotificationMessage) -> DispatchReport {
        let mut report = DispatchReport::default();

        if let Some(image) = &message.image {
            let sent = self
                .send_with_retry("image", || self.channel.send_image(&self.target, image))
                .await
                .map(|_| ())
                .map_err(|(_, error)| error);
            if let Err(error) = &sent {
                warn!("Poster for {:?} not sent: {}", image.caption, error);
            }
            report.image = Some(sent);
        }

        let total = message.chunks.len();
        let mut stopped = false;
        for (index, chunk) in message.chunks.iter().enumerate() {
            if stopped {
                report.outcomes.push(ChunkOutcome::Skipped);
                report.withheld.extend(chunk.items.iter().cloned());
                continue;
            }

            if index > 0 && !self.settings.inter_chunk_delay.is_zero() {
                tokio::time::sleep(self.settings.inter_chunk_delay).await;
            }

            let label = format!("chunk {}/{}", index + 1, total);
            match self
                .send_with_retry(&label, || self.channel.send_text(&self.target, &chunk.text))
                .await
            {
                Ok(attempts) => {
                    debug!("Delivered {} after {} attempt(s)", label, attempts);
                    report.delivered.extend(chunk.items.iter().cloned());
                    report.outcomes.push(ChunkOutcome::Delivered { attempts });
                }
                Err((attempts, error)) => {
                    warn!(
                        "Giving up on {} after {} attempt(s): {}; {} item(s) withheld",
                        label,
                        attempts,
                        error,
                        message.chunks[index..]
                            .iter()
                            .map(|chunk| chunk.items.len())
                            .sum::<usize>()
                    );
                    report.withheld.extend(chunk.items.iter().cloned());
                    report.outcomes.push(ChunkOutcome::Failed { attempts, error });
                    stopped = true;
                }
            }
        }

        if total > 0 && report.is_complete() {
            info!("Delivered {} chunk(s) to {}", total, self.target);
        }
        report
    }

    async fn send_with_retry<F, Fut>(
        &self,
        label: &str,
        mut op: F,
    ) -> Result<u16, (u16, SendError)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), SendError>>,
    {
        let max_attempts = self.backoff.max_attempts();
        let timeout = self.settings.send_timeout;
        let mut attempt = 0u16;

        loop {
            attempt += 1;
            let result = match tokio::time::timeout(timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(SendError::Timeout(timeout)),
            };

            match result {
                Ok(()) => return Ok(attempt),
                Err(error) if error.is_transient() && attempt < max_attempts => {
                    let wait = self.backoff.delay(attempt, error.retry_after());
                    warn!(
                        "Send of {} failed (attempt {}/{}): {}; retrying in {:?}",
                        label, attempt, max_attempts, error, wait
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(error) => return Err((attempt, error)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::memory::{RecordingChannel, SentMessage};
    use crate::notify::{Chunk, ImageRef};
    use reelwatch_model::MonitoredPath;
    use std::time::Duration;

    fn key(name: &str) -> EntryKey {
        EntryKey::new(MonitoredPath::new("/m"), name)
    }

    fn message(chunks: &[(&str, &[&str])]) -> NotificationMessage {
        NotificationMessage {
            image: None,
            chunks: chunks
                .iter()
                .map(|(text, items)| Chunk {
                    text: text.to_string(),
                    items: items.iter().map(|name| key(name)).collect(),
                    truncated: false,
                })
                .collect(),
        }
    }

    fn settings() -> DispatchSettings {
        DispatchSettings {
            send_timeout: Duration::from_secs(5),
            inter_chunk_delay: Duration::ZERO,
        }
    }

    fn dispatcher(channel: Arc<RecordingChannel>, attempts: u16) -> Dispatcher {
        Dispatcher::new(
            channel,
            ChatTarget::new("42"),
            RetryConfig::immediate(attempts),
            settings(),
        )
    }

    #[tokio::test]
    async fn delivers_chunks_in_order() {
        let channel = Arc::new(RecordingChannel::plain(4096));
        let report = dispatcher(channel.clone(), 3)
            .dispatch(&message(&[("one", &["a"]), ("two", &["b"])]))
            .await;

        assert!(report.is_complete());
        assert_eq!(channel.texts(), vec!["one", "two"]);
        assert!(report.is_delivered(&key("a")) && report.is_delivered(&key("b")));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let channel = Arc::new(RecordingChannel::plain(4096));
        channel.push_failure(SendError::Transient("502".into()));
        channel.push_failure(SendError::RateLimited(Duration::ZERO));

        let report = dispatcher(channel.clone(), 5)
            .dispatch(&message(&[("only", &["a"])]))
            .await;

        assert_eq!(report.outcomes, vec![ChunkOutcome::Delivered { attempts: 3 }]);
        assert_eq!(channel.attempts(), 3);
    }

    #[tokio::test]
    async fn failure_withholds_the_rest_in_order() {
        let channel = Arc::new(RecordingChannel::plain(4096));
        channel.push_ok();
        channel.push_failure(SendError::Rejected("can't parse entities".into()));

        let report = dispatcher(channel.clone(), 5)
            .dispatch(&message(&[
                ("one", &["a"]),
                ("two", &["b", "c"]),
                ("three", &["d"]),
            ]))
            .await;

        assert_eq!(channel.texts(), vec!["one"]);
        assert!(matches!(report.outcomes[1], ChunkOutcome::Failed { attempts: 1, .. }));
        assert_eq!(report.outcomes[2], ChunkOutcome::Skipped);
        assert_eq!(report.delivered_items().len(), 1);
        assert_eq!(report.withheld_items().len(), 3);
        assert!(matches!(report.failure(), Some(SendError::Rejected(_))));
    }

    #[tokio::test]
    async fn exhausted_retries_fail_the_chunk() {
        let channel = Arc::new(RecordingChannel::plain(4096));
        channel.fail_all(SendError::Transient("down".into()));

        let report = dispatcher(channel.clone(), 4)
            .dispatch(&message(&[("one", &["a"])]))
            .await;

        assert_eq!(channel.attempts(), 4);
        assert!(!report.is_complete());
        assert!(report.delivered_items().is_empty());
    }

    #[tokio::test]
    async fn image_failure_is_not_fatal() {
        let channel = Arc::new(RecordingChannel::plain(4096));
        channel.push_failure(SendError::Rejected("wrong file identifier".into()));

        let mut msg = message(&[("text", &["a"])]);
        msg.image = Some(ImageRef {
            url: "https://img/a.jpg".into(),
            caption: "A".into(),
            item: key("a"),
        });
        let report = dispatcher(channel.clone(), 3).dispatch(&msg).await;

        assert!(matches!(report.image, Some(Err(_))));
        assert!(report.is_complete());
        assert_eq!(channel.sent(), vec![SentMessage::Text("text".into())]);
    }
}
