//! # Reelwatch Server
//!
//! Long-running service around `reelwatch-core`: wires the configured
//! filesystem, metadata provider and Telegram channel into the scan
//! scheduler, answers chat commands, and shuts down cleanly on signal.

pub mod app;
pub mod bot;
pub mod telemetry;
