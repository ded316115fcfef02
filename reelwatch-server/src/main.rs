//! # Reelwatch
//!
//! Watches media library folders, announces added and removed titles to a
//! Telegram chat, and answers chat commands about the library.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use reelwatch_config::{Config, ConfigLoad, ConfigLoader};
use reelwatch_server::app::{App, DeliveryMode};
use reelwatch_server::telemetry;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "reelwatch")]
#[command(about = "Media library watcher with Telegram notifications", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct ConfigArgs {
    /// Path to the configuration file (TOML or JSON)
    #[arg(long, global = true, env = "REELWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Load environment variables from this file instead of `.env`
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the scheduler and chat command loop until interrupted (default)
    Run,
    /// Run a single scan cycle and exit
    ScanOnce {
        /// Print messages instead of sending them; state is not modified
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate the configuration and exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::ScanOnce { dry_run } => scan_once(config, dry_run).await,
        Command::CheckConfig => {
            println!(
                "Configuration OK: {} monitored folder(s), chat {}",
                config.monitored_folders.len(),
                config.telegram.chat_id
            );
            Ok(())
        }
    }
}

fn load_config(args: &ConfigArgs) -> anyhow::Result<Config> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = args.config.clone() {
        loader = loader.with_config_path(path);
    }
    if let Some(path) = args.env_file.clone() {
        loader = loader.with_env_file(path);
    }
    let ConfigLoad { config, warnings } =
        loader.load().context("failed to load configuration")?;

    telemetry::init(&config.logging)?;

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    match &config.metadata.config_path {
        Some(path) => info!("configuration loaded from {}", path.display()),
        None => info!("no configuration file; using environment only"),
    }
    for warning in warnings.iter() {
        warn!("{}", warning);
    }
    Ok(config)
}

async fn run(config: Config) -> anyhow::Result<()> {
    let app = App::build(&config, DeliveryMode::Live).await?;
    info!(
        "Watching {} folder(s): {}",
        config.monitored_folders.len(),
        config
            .monitored_folders
            .iter()
            .map(|path| path.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));
    app.run(cancel).await
}

async fn scan_once(config: Config, dry_run: bool) -> anyhow::Result<()> {
    let mode = if dry_run {
        DeliveryMode::DryRun
    } else {
        DeliveryMode::Live
    };
    let app = App::build(&config, mode).await?;
    let report = app.scan_once().await?;

    if dry_run {
        for (index, text) in app.recorded_messages().iter().enumerate() {
            println!("--- message {} ---\n{}", index + 1, text);
        }
    }
    println!("{report}");
    Ok(())
}

/// Cancel `token` on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received");
    token.cancel();
}
