use std::path::PathBuf;

use reelwatch_core::settings::SyncSettings;
use serde::{Deserialize, Deserializer};

use crate::util::{non_empty_var, parse_bool_var, parse_csv_var, path_var};

/// Raw configuration as written in a TOML or JSON file.
///
/// Pipeline settings (`[scan]`, `[heartbeat]`, `[metadata]`, `[notify]`,
/// `[dispatch]`, `[retry]`, `[state]`) sit at the top level next to the
/// integration sections.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub monitored_folders: Vec<String>,
    #[serde(default)]
    pub telegram: FileTelegramConfig,
    #[serde(default)]
    pub omdb: FileOmdbConfig,
    #[serde(default)]
    pub logging: FileLoggingConfig,
    #[serde(flatten)]
    pub sync: SyncSettings,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct FileTelegramConfig {
    pub bot_token: Option<String>,
    #[serde(default, deserialize_with = "chat_id")]
    pub chat_id: Option<String>,
    pub api_base: Option<String>,
    pub commands_enabled: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct FileOmdbConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct FileLoggingConfig {
    pub filter: Option<String>,
    pub file: Option<PathBuf>,
}

/// Chat ids are accepted as numbers or strings.
fn chat_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Number(id) => id.to_string(),
        Raw::Text(id) => id,
    }))
}

/// Values taken from the process environment (after `.env` is applied).
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub telegram_api_base: Option<String>,
    pub commands_enabled: Option<bool>,
    pub omdb_api_key: Option<String>,
    pub omdb_base_url: Option<String>,
    pub monitored_folders: Option<Vec<String>>,
    pub state_dir: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self {
            config_path: path_var("REELWATCH_CONFIG"),
            bot_token: non_empty_var("TELEGRAM_BOT_TOKEN"),
            chat_id: non_empty_var("TELEGRAM_CHAT_ID"),
            telegram_api_base: non_empty_var("TELEGRAM_API_BASE"),
            commands_enabled: parse_bool_var("REELWATCH_COMMANDS"),
            omdb_api_key: non_empty_var("OMDB_API_KEY"),
            omdb_base_url: non_empty_var("OMDB_BASE_URL"),
            monitored_folders: parse_csv_var("MONITORED_FOLDERS"),
            state_dir: path_var("REELWATCH_STATE_DIR"),
            log_file: path_var("REELWATCH_LOG_FILE"),
        }
    }
}
