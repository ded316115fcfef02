use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{ChatTarget, MessagingChannel, SendError};
use crate::notify::{ImageRef, MarkupDialect, PlainText};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentMessage {
    Text(String),
    Image(ImageRef),
}

/// In-memory channel that records deliveries. Used by tests and dry runs.
///
/// Scripted results are consumed one per send attempt, texts and images
/// alike; once the script is empty every attempt succeeds unless
/// [`RecordingChannel::fail_all`] is active.
#[derive(Debug)]
pub struct RecordingChannel {
    dialect: Arc<dyn MarkupDialect>,
    max_len: usize,
    state: Mutex<RecordingState>,
}

#[derive(Debug, Default)]
struct RecordingState {
    sent: Vec<SentMessage>,
    script: VecDeque<Result<(), SendError>>,
    fail_all: Option<SendError>,
    attempts: usize,
}

impl RecordingChannel {
    pub fn new(dialect: Arc<dyn MarkupDialect>, max_len: usize) -> Self {
        Self {
            dialect,
            max_len,
            state: Mutex::new(RecordingState::default()),
        }
    }

    pub fn plain(max_len: usize) -> Self {
        Self::new(Arc::new(PlainText), max_len)
    }

    pub fn push_ok(&self) {
        self.with_state(|state| state.script.push_back(Ok(())));
    }

    pub fn push_failure(&self, error: SendError) {
        self.with_state(|state| state.script.push_back(Err(error)));
    }

    pub fn fail_all(&self, error: SendError) {
        self.with_state(|state| state.fail_all = Some(error));
    }

    pub fn recover(&self) {
        self.with_state(|state| {
            state.fail_all = None;
            state.script.clear();
        });
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.with_state(|state| state.sent.clone())
    }

    pub fn texts(&self) -> Vec<String> {
        self.with_state(|state| {
            state
                .sent
                .iter()
                .filter_map(|message| match message {
                    SentMessage::Text(text) => Some(text.clone()),
                    SentMessage::Image(_) => None,
                })
                .collect()
        })
    }

    pub fn attempts(&self) -> usize {
        self.with_state(|state| state.attempts)
    }

    pub fn clear(&self) {
        self.with_state(|state| {
            state.sent.clear();
            state.attempts = 0;
        });
    }

    fn attempt(&self, message: SentMessage) -> Result<(), SendError> {
        self.with_state(|state| {
            state.attempts += 1;
            if let Some(error) = &state.fail_all {
                return Err(error.clone());
            }
            state.script.pop_front().unwrap_or(Ok(()))?;
            state.sent.push(message);
            Ok(())
        })
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut RecordingState) -> R) -> R {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

#[async_trait]
impl MessagingChannel for RecordingChannel {
    fn max_message_length(&self) -> usize {
        self.max_len
    }

    fn dialect(&self) -> Arc<dyn MarkupDialect> {
        self.dialect.clone()
    }

    async fn send_text(&self, target: &ChatTarget, text: &str) -> Result<(), SendError> {
        tracing::debug!("[{}] {}", target, text);
        self.attempt(SentMessage::Text(text.to_string()))
    }

    async fn send_image(&self, target: &ChatTarget, image: &ImageRef) -> Result<(), SendError> {
        tracing::debug!("[{}] image {}", target, image.url);
        self.attempt(SentMessage::Image(image.clone()))
    }
}
