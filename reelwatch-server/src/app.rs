//! Service wiring: turns a loaded [`Config`] into a running pipeline.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use reelwatch_config::Config;
use reelwatch_core::commands::CommandRouter;
use reelwatch_core::context::LibraryContext;
use reelwatch_core::dispatch::{
    ChatTarget, Dispatcher, MarkdownV2, MessagingChannel, RecordingChannel, SendError,
    TelegramChannel,
};
use reelwatch_core::metadata::MetadataResolver;
use reelwatch_core::notify::Composer;
use reelwatch_core::providers::OmdbProvider;
use reelwatch_core::query::QueryService;
use reelwatch_core::scanner::RealFs;
use reelwatch_core::scheduler::{CycleReport, Heartbeat, ScanCycle, ScanReason, Scheduler};
use reelwatch_core::settings::StateSettings;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bot::{CommandLoop, UpdateSource};

/// Where outbound messages go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Send to Telegram and persist state.
    Live,
    /// Record messages in memory and work on a scratch copy of the state.
    DryRun,
}

pub struct App {
    context: Arc<LibraryContext>,
    scheduler: Scheduler,
    router: Arc<CommandRouter>,
    dispatcher: Arc<Dispatcher>,
    updates: Option<Arc<dyn UpdateSource>>,
    recorder: Option<Arc<RecordingChannel>>,
    _scratch: Option<TempDir>,
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("context", &self.context)
            .field("scheduler", &self.scheduler)
            .field("commands", &self.updates.is_some())
            .field("dry_run", &self.recorder.is_some())
            .finish_non_exhaustive()
    }
}

impl App {
    pub async fn build(config: &Config, mode: DeliveryMode) -> anyhow::Result<Self> {
        let settings = &config.sync;

        let (state, scratch) = match mode {
            DeliveryMode::Live => (settings.state.clone(), None),
            DeliveryMode::DryRun => {
                let scratch = tempfile::tempdir().context("failed to create scratch state dir")?;
                let state = copy_state(&settings.state, scratch.path()).await?;
                (state, Some(scratch))
            }
        };

        let fs = Arc::new(RealFs::with_hidden(settings.scan.include_hidden));
        let context = Arc::new(
            LibraryContext::init(config.monitored_folders.clone(), fs, &state)
                .await
                .context("failed to load library state")?,
        );

        let provider = OmdbProvider::new(
            config.omdb.api_key.clone(),
            config.omdb.base_url.clone(),
            settings.metadata.fetch_timeout,
        )
        .context("failed to build OMDb client")?;
        if !provider.is_configured() {
            warn!("No OMDb API key; entries will be announced without details");
        }
        let resolver = MetadataResolver::new(Arc::new(provider), settings.metadata.clone());

        let mut updates: Option<Arc<dyn UpdateSource>> = None;
        let mut recorder = None;
        let mut bot_username = None;
        let channel: Arc<dyn MessagingChannel> = match mode {
            DeliveryMode::Live => {
                let telegram = Arc::new(
                    TelegramChannel::new(
                        config.telegram.bot_token.clone(),
                        config.telegram.api_base.clone(),
                        settings.dispatch.send_timeout,
                    )
                    .context("failed to build Telegram client")?,
                );
                if config.telegram.commands_enabled {
                    bot_username = bot_identity(&telegram).await?;
                    updates = Some(telegram.clone());
                }
                telegram
            }
            DeliveryMode::DryRun => {
                let recording = Arc::new(RecordingChannel::new(
                    Arc::new(MarkdownV2),
                    reelwatch_core::dispatch::telegram::TELEGRAM_MAX_MESSAGE_LENGTH,
                ));
                recorder = Some(recording.clone());
                recording
            }
        };

        let composer = Arc::new(Composer::new(
            channel.dialect(),
            settings.notify.clone(),
            channel.max_message_length(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            channel,
            ChatTarget::new(config.telegram.chat_id.clone()),
            settings.retry.clone(),
            settings.dispatch.clone(),
        ));

        let cycle = ScanCycle::new(
            context.clone(),
            resolver,
            composer.clone(),
            dispatcher.clone(),
            settings.scan.clone(),
        );
        let mut scheduler = Scheduler::new(cycle, settings.scan.clone());
        let mut queries = QueryService::new(context.clone()).with_scheduler(scheduler.handle());

        if settings.heartbeat.enabled {
            let heartbeat = Heartbeat::new(
                dispatcher.clone(),
                composer.clone(),
                context.clone(),
                settings.heartbeat.interval,
            );
            queries = queries.with_heartbeat(heartbeat.state());
            scheduler = scheduler.with_heartbeat(heartbeat);
        }

        let mut router = CommandRouter::new(Arc::new(queries), composer)
            .with_scheduler(scheduler.handle());
        if let Some(username) = bot_username {
            router = router.with_bot_username(username);
        }

        Ok(Self {
            context,
            scheduler,
            router: Arc::new(router),
            dispatcher,
            updates,
            recorder,
            _scratch: scratch,
        })
    }

    /// Run the scheduler and command loop until `cancel` fires, then write
    /// the committed state out once more.
    pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<()> {
        let bot = self.updates.map(|source| {
            let commands = CommandLoop::new(source, self.router.clone(), self.dispatcher.clone());
            tokio::spawn(commands.run(cancel.child_token()))
        });
        if bot.is_none() {
            info!("Chat commands disabled");
        }

        self.scheduler.run(cancel).await;

        if let Some(handle) = bot
            && let Err(e) = handle.await
        {
            warn!("Command loop ended abnormally: {}", e);
        }
        self.context
            .flush()
            .await
            .context("failed to write state on shutdown")?;
        info!("Shutdown complete");
        Ok(())
    }

    /// Run a single cycle and return its report.
    pub async fn scan_once(&self) -> anyhow::Result<CycleReport> {
        let Some(result) = self.scheduler.run_once(ScanReason::Manual).await else {
            bail!("a scan is already in progress");
        };
        Ok(result?)
    }

    /// Texts a dry run would have sent, in order. Empty for live runs.
    pub fn recorded_messages(&self) -> Vec<String> {
        self.recorder
            .as_ref()
            .map(|recorder| recorder.texts())
            .unwrap_or_default()
    }
}

/// `getMe` doubles as a token check: a rejected token fails startup, any
/// other error only costs the `@username` filter.
async fn bot_identity(telegram: &TelegramChannel) -> anyhow::Result<Option<String>> {
    match telegram.identity().await {
        Ok(identity) => {
            info!(
                "Connected to Telegram as @{}",
                identity.username.as_deref().unwrap_or("<unnamed>")
            );
            Ok(identity.username)
        }
        Err(SendError::Unauthorized(reason)) => {
            bail!("Telegram rejected the bot token: {reason}")
        }
        Err(e) => {
            warn!("Could not look up the bot identity: {}", e);
            Ok(None)
        }
    }
}

/// Copy existing state files into `dir` so a dry run starts from the real
/// state without touching it.
async fn copy_state(state: &StateSettings, dir: &Path) -> anyhow::Result<StateSettings> {
    let scratch = StateSettings {
        state_dir: dir.to_path_buf(),
        ..state.clone()
    };
    for (from, to) in [
        (state.snapshot_path(), scratch.snapshot_path()),
        (state.metadata_path(), scratch.metadata_path()),
    ] {
        if tokio::fs::try_exists(&from).await.unwrap_or(false) {
            tokio::fs::copy(&from, &to)
                .await
                .with_context(|| format!("failed to copy {}", from.display()))?;
        }
    }
    Ok(scratch)
}
