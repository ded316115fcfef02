pub mod error;

use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use reelwatch_model::MonitoredPath;

use self::error::ConfigLoadError;
use crate::models::sources::{EnvConfig, FileConfig};
use crate::models::{Config, ConfigMetadata, LoggingConfig, OmdbConfig, TelegramConfig};
use crate::validation::{self, ConfigWarnings};

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("reelwatch.toml"),
        PathBuf::from("config/reelwatch.toml"),
        PathBuf::from("config.json"),
    ]
});

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    /// Use these values instead of reading `.env` and the process
    /// environment.
    pub env: Option<EnvConfig>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn with_env(mut self, env: EnvConfig) -> Self {
        self.options.env = Some(env);
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let (env, env_file_loaded) = match &self.options.env {
            Some(env) => (env.clone(), false),
            None => {
                let loaded = self.load_env_file()?;
                (EnvConfig::gather(), loaded)
            }
        };

        let (file_config, config_path) = self.load_file_config(&env)?;
        let mut warnings = ConfigWarnings::default();
        if config_path.is_none() {
            warnings.push_with_hint(
                "No reelwatch.toml detected; using defaults and environment variables",
                "Pass --config or set REELWATCH_CONFIG to point at a configuration file",
            );
        }

        let config = compose_config(
            file_config.unwrap_or_default(),
            env,
            ConfigMetadata {
                config_path,
                env_file_loaded,
            },
        );
        warnings.extend(validation::apply_guard_rails(&config)?);

        Ok(ConfigLoad { config, warnings })
    }

    fn load_env_file(&self) -> Result<bool, ConfigLoadError> {
        let loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true),
            None => dotenvy::dotenv().map(|_| true),
        };
        match loaded {
            Ok(loaded) => Ok(loaded),
            Err(dotenvy::Error::Io(_)) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let (path, explicit) = match (&self.options.config_path, &env.config_path) {
            (Some(path), _) | (None, Some(path)) => (path.clone(), true),
            (None, None) => match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .find(|candidate| candidate.exists())
            {
                Some(path) => (path.clone(), false),
                None => return Ok((None, None)),
            },
        };

        if !path.exists() {
            if explicit {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let contents = fs::read_to_string(&path).map_err(|source| ConfigLoadError::Io {
            path: path.clone(),
            source,
        })?;
        let file_config = parse_file(&path, &contents)?;
        Ok((Some(file_config), Some(path)))
    }
}

/// JSON when the extension says so, TOML otherwise.
fn parse_file(path: &Path, contents: &str) -> Result<FileConfig, ConfigLoadError> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(contents).map_err(|source| ConfigLoadError::ParseJson {
            path: path.to_path_buf(),
            source,
        })
    } else {
        toml::from_str(contents).map_err(|source| ConfigLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Environment values win over file values.
fn compose_config(file: FileConfig, env: EnvConfig, metadata: ConfigMetadata) -> Config {
    let FileConfig {
        monitored_folders: file_folders,
        telegram: file_telegram,
        omdb: file_omdb,
        logging: file_logging,
        sync: mut sync,
    } = file;

    let monitored_folders = env
        .monitored_folders
        .unwrap_or(file_folders)
        .into_iter()
        .map(|folder| folder.trim().to_string())
        .filter(|folder| !folder.is_empty())
        .map(MonitoredPath::new)
        .collect();

    let telegram = TelegramConfig {
        bot_token: env
            .bot_token
            .or(file_telegram.bot_token)
            .unwrap_or_default(),
        chat_id: env.chat_id.or(file_telegram.chat_id).unwrap_or_default(),
        api_base: env.telegram_api_base.or(file_telegram.api_base),
        commands_enabled: env
            .commands_enabled
            .or(file_telegram.commands_enabled)
            .unwrap_or(true),
    };

    let omdb = OmdbConfig {
        api_key: env
            .omdb_api_key
            .or(file_omdb.api_key)
            .filter(|key| !key.trim().is_empty()),
        base_url: env.omdb_base_url.or(file_omdb.base_url),
    };

    if let Some(state_dir) = env.state_dir {
        sync.state.state_dir = state_dir;
    }

    let logging = LoggingConfig {
        filter: file_logging.filter,
        file: env.log_file.or(file_logging.file),
    };

    Config {
        monitored_folders,
        telegram,
        omdb,
        sync,
        logging,
        metadata,
    }
}
