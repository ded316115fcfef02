//! Chat command loop: long-polls for messages from the configured chat and
//! answers them through the command router.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reelwatch_core::commands::CommandRouter;
use reelwatch_core::dispatch::{ChatTarget, Dispatcher, IncomingMessage, SendError, TelegramChannel};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Long-poll window for `getUpdates`.
pub const POLL_WAIT: Duration = Duration::from_secs(25);

const ERROR_BACKOFF_START: Duration = Duration::from_secs(2);
const ERROR_BACKOFF_MAX: Duration = Duration::from_secs(60);

/// Source of incoming chat messages.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn poll(
        &self,
        offset: Option<i64>,
        wait: Duration,
    ) -> Result<Vec<IncomingMessage>, SendError>;
}

#[async_trait]
impl UpdateSource for TelegramChannel {
    async fn poll(
        &self,
        offset: Option<i64>,
        wait: Duration,
    ) -> Result<Vec<IncomingMessage>, SendError> {
        self.poll_updates(offset, wait).await
    }
}

pub struct CommandLoop {
    source: Arc<dyn UpdateSource>,
    router: Arc<CommandRouter>,
    replies: Arc<Dispatcher>,
    target: ChatTarget,
    wait: Duration,
}

impl fmt::Debug for CommandLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandLoop")
            .field("target", &self.target)
            .field("wait", &self.wait)
            .finish_non_exhaustive()
    }
}

impl CommandLoop {
    /// Replies go out through `replies`, the same dispatcher notifications
    /// use, so they share its retry policy.
    pub fn new(
        source: Arc<dyn UpdateSource>,
        router: Arc<CommandRouter>,
        replies: Arc<Dispatcher>,
    ) -> Self {
        let target = replies.target().clone();
        Self {
            source,
            router,
            replies,
            target,
            wait: POLL_WAIT,
        }
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Poll and answer until cancelled. An unauthorized token stops the
    /// loop; any other polling error is retried with growing delays.
    pub async fn run(self, cancel: CancellationToken) {
        info!("Listening for commands from chat {}", self.target);
        let mut offset: Option<i64> = None;
        let mut backoff = ERROR_BACKOFF_START;

        loop {
            let polled = tokio::select! {
                _ = cancel.cancelled() => break,
                polled = self.source.poll(offset, self.wait) => polled,
            };

            match polled {
                Ok(messages) => {
                    backoff = ERROR_BACKOFF_START;
                    for message in messages {
                        offset = Some(message.update_id + 1);
                        self.answer(&message).await;
                    }
                }
                Err(SendError::Unauthorized(reason)) => {
                    error!("Command polling stopped: {}", reason);
                    break;
                }
                Err(e) => {
                    let delay = e.retry_after().unwrap_or(backoff);
                    warn!(
                        "Polling for commands failed: {}; retrying in {}",
                        e,
                        humantime::format_duration(delay)
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    backoff = (backoff * 2).min(ERROR_BACKOFF_MAX);
                }
            }
        }
        info!("Command loop stopped");
    }

    async fn answer(&self, message: &IncomingMessage) {
        if !self.target.matches(message.chat_id) {
            debug!("Ignoring message from chat {}", message.chat_id);
            return;
        }
        let Some(text) = message.text.as_deref() else {
            return;
        };
        let Some(reply) = self.router.handle(text).await else {
            return;
        };

        info!(
            "Command from {}: {}",
            message.from.as_deref().unwrap_or("unknown"),
            text.trim()
        );
        let report = self.replies.dispatch(&reply).await;
        if let Some(error) = report.failure() {
            warn!("Reply not delivered: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelwatch_core::context::LibraryContext;
    use reelwatch_core::dispatch::RecordingChannel;
    use reelwatch_core::notify::{Composer, PlainText};
    use reelwatch_core::query::QueryService;
    use reelwatch_core::scanner::InMemoryFs;
    use reelwatch_core::settings::{DispatchSettings, NotifySettings, RetryConfig, StateSettings};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Hands out scripted batches, then waits until cancelled.
    struct ScriptedSource {
        batches: Mutex<VecDeque<Result<Vec<IncomingMessage>, SendError>>>,
        offsets: Mutex<Vec<Option<i64>>>,
    }

    #[async_trait]
    impl UpdateSource for ScriptedSource {
        async fn poll(
            &self,
            offset: Option<i64>,
            _wait: Duration,
        ) -> Result<Vec<IncomingMessage>, SendError> {
            self.offsets.lock().unwrap().push(offset);
            let next = self.batches.lock().unwrap().pop_front();
            match next {
                Some(batch) => batch,
                None => std::future::pending().await,
            }
        }
    }

    fn message(update_id: i64, chat_id: i64, text: &str) -> IncomingMessage {
        IncomingMessage {
            update_id,
            chat_id,
            from: Some("tester".to_string()),
            text: Some(text.to_string()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn answers_only_the_configured_chat() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateSettings {
            state_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let context = Arc::new(
            LibraryContext::init(Vec::new(), Arc::new(InMemoryFs::new()), &state)
                .await
                .unwrap(),
        );
        let composer = Arc::new(Composer::new(
            Arc::new(PlainText),
            NotifySettings::default(),
            4096,
        ));
        let router = Arc::new(CommandRouter::new(
            Arc::new(QueryService::new(context)),
            composer,
        ));
        let channel = Arc::new(RecordingChannel::plain(4096));
        let replies = Arc::new(Dispatcher::new(
            channel.clone(),
            ChatTarget::new("42"),
            RetryConfig::immediate(1),
            DispatchSettings {
                send_timeout: Duration::from_secs(5),
                inter_chunk_delay: Duration::ZERO,
            },
        ));

        let source = Arc::new(ScriptedSource {
            batches: Mutex::new(VecDeque::from([
                Ok(vec![message(7, 42, "/help"), message(8, 99, "/help")]),
                Err(SendError::Transient("502".to_string())),
                Ok(vec![message(9, 42, "hello"), message(10, 42, "/status")]),
            ])),
            offsets: Mutex::new(Vec::new()),
        });

        let cancel = CancellationToken::new();
        let task = tokio::spawn(
            CommandLoop::new(source.clone(), router, replies).run(cancel.clone()),
        );
        tokio::time::sleep(Duration::from_secs(30)).await;
        cancel.cancel();
        task.await.unwrap();

        let texts = channel.texts();
        assert_eq!(texts.len(), 2);
        assert!(texts[0].contains("/recent [count]"));
        assert!(texts[1].contains("Library Status"));
        assert_eq!(
            *source.offsets.lock().unwrap(),
            vec![None, Some(9), Some(9), Some(11)]
        );
    }
}
