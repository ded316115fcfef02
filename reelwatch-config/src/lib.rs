//! Configuration loading for reelwatch.
//!
//! A TOML or JSON file supplies the settings, `.env` and the process
//! environment override secrets and paths, and [`validation`] rejects
//! configurations the pipeline cannot run with. The runtime settings structs
//! themselves live in `reelwatch-core`; this crate composes them.

pub mod loader;
pub mod models;
pub mod util;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoader, ConfigLoaderOptions, error::ConfigLoadError};
pub use models::sources::{EnvConfig, FileConfig};
pub use models::{Config, ConfigMetadata, LoggingConfig, OmdbConfig, TelegramConfig};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
