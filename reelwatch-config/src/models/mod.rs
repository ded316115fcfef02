pub mod sources;

use std::fmt;
use std::path::PathBuf;

use reelwatch_core::settings::SyncSettings;
use reelwatch_model::MonitoredPath;

/// Fully resolved configuration: file values with environment overrides
/// applied and defaults filled in.
#[derive(Debug, Clone)]
pub struct Config {
    pub monitored_folders: Vec<MonitoredPath>,
    pub telegram: TelegramConfig,
    pub omdb: OmdbConfig,
    pub sync: SyncSettings,
    pub logging: LoggingConfig,
    pub metadata: ConfigMetadata,
}

#[derive(Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Numeric chat id or `@channel` username.
    pub chat_id: String,
    /// Overrides `https://api.telegram.org` (tests, local Bot API servers).
    pub api_base: Option<String>,
    /// Answer chat commands. Notifications go out regardless.
    pub commands_enabled: bool,
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &redact(&self.bot_token))
            .field("chat_id", &self.chat_id)
            .field("api_base", &self.api_base)
            .field("commands_enabled", &self.commands_enabled)
            .finish()
    }
}

#[derive(Clone, Default)]
pub struct OmdbConfig {
    /// Lookups are disabled when unset.
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

impl fmt::Debug for OmdbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OmdbConfig")
            .field("api_key", &self.api_key.as_deref().map(redact))
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub filter: Option<String>,
    /// Append logs to this file in addition to stderr.
    pub file: Option<PathBuf>,
}

/// Where the configuration came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() { "<unset>" } else { "<redacted>" }
}
