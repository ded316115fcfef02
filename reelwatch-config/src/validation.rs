use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use super::models::Config;

/// Bounds for `notify.max_message_length`; Telegram rejects anything longer
/// than 4096 UTF-16 units.
pub const MIN_MESSAGE_LENGTH: usize = 64;
pub const MAX_MESSAGE_LENGTH: usize = 4096;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigGuardRailError {
    #[error("no monitored folders configured")]
    NoMonitoredFolders,
    #[error("{field} is required")]
    MissingSecret { field: &'static str },
    #[error(
        "notify.max_message_length must be between {MIN_MESSAGE_LENGTH} and {MAX_MESSAGE_LENGTH}, got {value}"
    )]
    MessageLengthOutOfRange { value: usize },
    #[error("{field} {reason}")]
    InvalidSetting { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.hint {
            Some(hint) => write!(f, "{} (hint: {})", self.message, hint),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.items.iter()
    }
}

/// Reject configurations the pipeline cannot run with; collect the merely
/// questionable ones as warnings.
pub fn apply_guard_rails(config: &Config) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    if config.monitored_folders.is_empty() {
        return Err(ConfigGuardRailError::NoMonitoredFolders);
    }
    if config.telegram.bot_token.trim().is_empty() {
        return Err(ConfigGuardRailError::MissingSecret {
            field: "TELEGRAM_BOT_TOKEN",
        });
    }
    if config.telegram.chat_id.trim().is_empty() {
        return Err(ConfigGuardRailError::MissingSecret {
            field: "TELEGRAM_CHAT_ID",
        });
    }

    let max_len = config.sync.notify.max_message_length;
    if !(MIN_MESSAGE_LENGTH..=MAX_MESSAGE_LENGTH).contains(&max_len) {
        return Err(ConfigGuardRailError::MessageLengthOutOfRange { value: max_len });
    }

    non_zero("scan.interval", config.sync.scan.interval)?;
    non_zero("scan.cycle_timeout", config.sync.scan.cycle_timeout)?;
    non_zero("dispatch.send_timeout", config.sync.dispatch.send_timeout)?;
    non_zero("metadata.fetch_timeout", config.sync.metadata.fetch_timeout)?;
    if config.sync.heartbeat.enabled {
        non_zero("heartbeat.interval", config.sync.heartbeat.interval)?;
    }
    if config.sync.retry.max_attempts == 0 {
        return Err(ConfigGuardRailError::InvalidSetting {
            field: "retry.max_attempts",
            reason: "must be at least 1".to_string(),
        });
    }
    if !(0.0..=1.0).contains(&config.sync.retry.jitter_ratio) {
        return Err(ConfigGuardRailError::InvalidSetting {
            field: "retry.jitter_ratio",
            reason: format!("must be within 0.0..=1.0, got {}", config.sync.retry.jitter_ratio),
        });
    }

    let mut seen = HashSet::new();
    for folder in &config.monitored_folders {
        if !seen.insert(folder) {
            warnings.push(format!(
                "Monitored folder {folder} is listed more than once; it is scanned once"
            ));
        }
        if folder.as_path().is_relative() {
            warnings.push_with_hint(
                format!("Monitored folder {folder} is a relative path"),
                "Relative paths resolve against the working directory of the process",
            );
        }
    }

    if config.omdb.api_key.is_none() {
        warnings.push_with_hint(
            "OMDB_API_KEY not configured; notifications will carry titles only",
            "Set OMDB_API_KEY or omdb.api_key to enable plot, genre and IMDb links",
        );
    }

    if config.sync.scan.cycle_timeout < config.sync.dispatch.send_timeout {
        warnings.push(
            "scan.cycle_timeout is shorter than dispatch.send_timeout; slow sends will time out whole cycles",
        );
    }

    Ok(warnings)
}

fn non_zero(field: &'static str, value: Duration) -> Result<(), ConfigGuardRailError> {
    if value.is_zero() {
        return Err(ConfigGuardRailError::InvalidSetting {
            field,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}
