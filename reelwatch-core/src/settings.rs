use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Runtime knobs for the whole pipeline.
///
/// Every section carries defaults, so a configuration file only needs to
/// mention the values it changes.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct SyncSettings {
    pub scan: ScanSettings,
    pub heartbeat: HeartbeatSettings,
    pub metadata: MetadataSettings,
    pub notify: NotifySettings,
    pub dispatch: DispatchSettings,
    /// Retry/backoff policy for outbound messages.
    pub retry: RetryConfig,
    pub state: StateSettings,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScanSettings {
    /// Period between automatic scan cycles.
    #[serde(with = "human_duration")]
    pub interval: Duration,
    /// Upper bound for a whole cycle, dispatch included.
    #[serde(with = "human_duration")]
    pub cycle_timeout: Duration,
    /// Run the first cycle immediately instead of after one interval.
    pub scan_on_startup: bool,
    /// Count dot-prefixed folders as library entries.
    pub include_hidden: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(12 * 60 * 60),
            cycle_timeout: Duration::from_secs(30 * 60),
            scan_on_startup: true,
            include_hidden: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HeartbeatSettings {
    pub enabled: bool,
    /// First beat fires one interval after startup.
    #[serde(with = "human_duration")]
    pub interval: Duration,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(6 * 60 * 60),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetadataSettings {
    /// How long a NotFound answer suppresses refetching.
    #[serde(with = "human_duration")]
    pub not_found_cooldown: Duration,
    /// Per-request bound for provider lookups.
    #[serde(with = "human_duration")]
    pub fetch_timeout: Duration,
}

impl Default for MetadataSettings {
    fn default() -> Self {
        Self {
            not_found_cooldown: Duration::from_secs(24 * 60 * 60),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotifySettings {
    /// Channel message limit in UTF-16 code units, markup included.
    pub max_message_length: usize,
    /// Send a status message when a cycle finds nothing new.
    pub send_no_change_message: bool,
    /// Plot previews are cut at a word boundary near this many characters.
    pub plot_preview_chars: usize,
    /// Attach the first available poster of the added items.
    pub attach_poster: bool,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            max_message_length: 4096,
            send_no_change_message: false,
            plot_preview_chars: 200,
            attach_poster: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatchSettings {
    /// Bound for a single send attempt.
    #[serde(with = "human_duration")]
    pub send_timeout: Duration,
    /// Pause between consecutive chunks of one message.
    #[serde(with = "human_duration")]
    pub inter_chunk_delay: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(30),
            inter_chunk_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u16,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Percentage-based jitter to spread out retries.
    pub jitter_ratio: f32,
}

impl RetryConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    /// Policy with no waiting between attempts, for tests and dry runs.
    pub fn immediate(max_attempts: u16) -> Self {
        Self {
            max_attempts,
            backoff_base_ms: 0,
            backoff_max_ms: 0,
            jitter_ratio: 0.0,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base_ms: 1_000,
            backoff_max_ms: 60_000,
            jitter_ratio: 0.2,
        }
    }
}

/// Where the snapshot and metadata cache live.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StateSettings {
    pub state_dir: PathBuf,
    pub snapshot_file: String,
    pub metadata_file: String,
}

impl StateSettings {
    pub fn snapshot_path(&self) -> PathBuf {
        self.state_dir.join(&self.snapshot_file)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.state_dir.join(&self.metadata_file)
    }
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("state"),
            snapshot_file: "folder_list.json".to_string(),
            metadata_file: "media_metadata.json".to_string(),
        }
    }
}

/// Serde adapter for human readable durations such as `12h` or `500ms`.
pub mod human_duration {
    use std::time::Duration;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer
            .serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(D::Error::custom)
    }
}
