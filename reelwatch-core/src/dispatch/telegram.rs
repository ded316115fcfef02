use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use super::{ChatTarget, MessagingChannel, SendError};
use crate::notify::{ImageRef, MarkupDialect};

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Bot API limit for message text after entity parsing.
pub const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Bot API limit for photo captions.
const TELEGRAM_MAX_CAPTION_LENGTH: usize = 1024;

const RESERVED: &[char] = &[
    '\\', '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|',
    '{', '}', '.', '!',
];

/// Telegram's MarkdownV2 parse mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownV2;

impl MarkupDialect for MarkdownV2 {
    fn escape(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for ch in text.chars() {
            if RESERVED.contains(&ch) {
                out.push('\\');
            }
            out.push(ch);
        }
        out
    }

    fn escape_url(&self, url: &str) -> String {
        let mut out = String::with_capacity(url.len());
        for ch in url.chars() {
            if ch == ')' || ch == '\\' {
                out.push('\\');
            }
            out.push(ch);
        }
        out
    }

    fn bold(&self, escaped: &str) -> String {
        format!("*{escaped}*")
    }

    fn italic(&self, escaped: &str) -> String {
        format!("_{escaped}_")
    }

    fn link(&self, escaped_label: &str, escaped_url: &str) -> String {
        format!("[{escaped_label}]({escaped_url})")
    }
}

/// Text message received by the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub update_id: i64,
    pub chat_id: i64,
    pub from: Option<String>,
    pub text: Option<String>,
}

/// Telegram Bot API adapter: outbound messages plus long-poll updates.
pub struct TelegramChannel {
    client: reqwest::Client,
    api_base: String,
    token: String,
    dialect: Arc<MarkdownV2>,
}

impl fmt::Debug for TelegramChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramChannel")
            .field("api_base", &self.api_base)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    #[serde(default)]
    from: Option<User>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct User {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BotIdentity {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

impl TelegramChannel {
    pub fn new(
        token: impl Into<String>,
        api_base: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base
                .unwrap_or_else(|| TELEGRAM_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            token: token.into(),
            dialect: Arc::new(MarkdownV2),
        })
    }

    /// `getMe`: verifies the token and reports the bot's username.
    pub async fn identity(&self) -> Result<BotIdentity, SendError> {
        self.call("getMe", &json!({}), None).await
    }

    /// Long-poll `getUpdates`. Messages from every chat are returned; callers
    /// filter by chat.
    pub async fn poll_updates(
        &self,
        offset: Option<i64>,
        wait: Duration,
    ) -> Result<Vec<IncomingMessage>, SendError> {
        let mut body = json!({
            "timeout": wait.as_secs(),
            "allowed_updates": ["message"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        let updates: Vec<Update> = self
            .call("getUpdates", &body, Some(wait + Duration::from_secs(10)))
            .await?;

        Ok(updates
            .into_iter()
            .map(|update| {
                let (chat_id, from, text) = match update.message {
                    Some(message) => (
                        message.chat.id,
                        message
                            .from
                            .and_then(|user| user.username.or(user.first_name)),
                        message.text,
                    ),
                    None => (0, None, None),
                };
                IncomingMessage {
                    update_id: update.update_id,
                    chat_id,
                    from,
                    text,
                }
            })
            .collect())
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<T, SendError> {
        let mut request = self.client.post(self.method_url(method)).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        // The URL carries the bot token, so it is stripped from errors.
        let response = request
            .send()
            .await
            .map_err(|e| SendError::Transient(e.without_url().to_string()))?;
        let status = response.status();
        let parsed: Result<ApiResponse<T>, _> = response.json().await;

        match parsed {
            Ok(ApiResponse {
                ok: true,
                result: Some(result),
                ..
            }) => Ok(result),
            Ok(api) => Err(classify(
                status,
                api.description,
                api.parameters.and_then(|p| p.retry_after),
            )),
            Err(e) if status.is_success() => Err(SendError::Transient(format!(
                "{method}: malformed response: {}",
                e.without_url()
            ))),
            Err(_) => Err(classify(status, None, None)),
        }
    }
}

fn classify(
    status: StatusCode,
    description: Option<String>,
    retry_after: Option<u64>,
) -> SendError {
    let description = description.unwrap_or_else(|| status.to_string());
    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            SendError::RateLimited(Duration::from_secs(retry_after.unwrap_or(1)))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SendError::Unauthorized(description)
        }
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => SendError::Rejected(description),
        _ => SendError::Transient(description),
    }
}

#[async_trait]
impl MessagingChannel for TelegramChannel {
    fn max_message_length(&self) -> usize {
        TELEGRAM_MAX_MESSAGE_LENGTH
    }

    fn dialect(&self) -> Arc<dyn MarkupDialect> {
        self.dialect.clone()
    }

    async fn send_text(&self, target: &ChatTarget, text: &str) -> Result<(), SendError> {
        let body = json!({
            "chat_id": target.as_str(),
            "text": text,
            "parse_mode": "MarkdownV2",
            "link_preview_options": { "is_disabled": true },
        });
        let _: serde_json::Value = self.call("sendMessage", &body, None).await?;
        debug!("sendMessage to {} ok ({} bytes)", target, text.len());
        Ok(())
    }

    async fn send_image(&self, target: &ChatTarget, image: &ImageRef) -> Result<(), SendError> {
        let caption: String = image.caption.chars().take(TELEGRAM_MAX_CAPTION_LENGTH / 2).collect();
        let body = json!({
            "chat_id": target.as_str(),
            "photo": image.url,
            "caption": self.dialect.bold(&self.dialect.escape(&caption)),
            "parse_mode": "MarkdownV2",
        });
        let _: serde_json::Value = self.call("sendPhoto", &body, None).await?;
        Ok(())
    }
}
