//! Shared fixtures for core integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use reelwatch_core::commands::CommandRouter;
use reelwatch_core::context::LibraryContext;
use reelwatch_core::dispatch::{ChatTarget, Dispatcher, MessagingChannel, RecordingChannel};
use reelwatch_core::metadata::MetadataResolver;
use reelwatch_core::notify::Composer;
use reelwatch_core::providers::{InMemoryProvider, ProviderRecord};
use reelwatch_core::query::QueryService;
use reelwatch_core::scanner::InMemoryFs;
use reelwatch_core::scheduler::{CycleReport, ScanCycle, ScanReason, Scheduler};
use reelwatch_core::settings::{
    DispatchSettings, MetadataSettings, NotifySettings, RetryConfig, StateSettings, SyncSettings,
};
use reelwatch_core::MonitoredPath;
use tempfile::TempDir;

pub const MOVIES: &str = "/library/movies";
pub const SHOWS: &str = "/library/shows";

/// Whole pipeline wired over in-memory capabilities and a temp state dir.
pub struct Pipeline {
    pub state_dir: TempDir,
    pub fs: Arc<InMemoryFs>,
    pub provider: Arc<InMemoryProvider>,
    pub channel: Arc<RecordingChannel>,
    pub context: Arc<LibraryContext>,
    pub scheduler: Scheduler,
    pub router: CommandRouter,
}

pub fn settings(state_dir: &TempDir) -> SyncSettings {
    SyncSettings {
        notify: NotifySettings {
            attach_poster: false,
            ..Default::default()
        },
        dispatch: DispatchSettings {
            send_timeout: Duration::from_secs(5),
            inter_chunk_delay: Duration::ZERO,
        },
        retry: RetryConfig::immediate(3),
        metadata: MetadataSettings::default(),
        state: StateSettings {
            state_dir: state_dir.path().to_path_buf(),
            ..Default::default()
        },
        ..Default::default()
    }
}

impl Pipeline {
    pub async fn new(paths: &[&str]) -> Self {
        let state_dir = tempfile::tempdir().expect("temp dir");
        let fs = Arc::new(InMemoryFs::new());
        for path in paths {
            fs.add_root(*path);
        }
        Self::with_parts(
            state_dir,
            fs,
            Arc::new(InMemoryProvider::new()),
            Arc::new(RecordingChannel::plain(4096)),
            paths,
        )
        .await
    }

    /// Rebuild on the same state dir and capabilities, as after a restart.
    pub async fn restart(self, paths: &[&str]) -> Self {
        Self::with_parts(self.state_dir, self.fs, self.provider, self.channel, paths).await
    }

    async fn with_parts(
        state_dir: TempDir,
        fs: Arc<InMemoryFs>,
        provider: Arc<InMemoryProvider>,
        channel: Arc<RecordingChannel>,
        paths: &[&str],
    ) -> Self {
        let settings = settings(&state_dir);
        let monitored = paths.iter().map(|path| MonitoredPath::new(*path)).collect();
        let context = Arc::new(
            LibraryContext::init(monitored, fs.clone(), &settings.state)
                .await
                .expect("context"),
        );
        let composer = Arc::new(Composer::new(
            channel.dialect(),
            settings.notify.clone(),
            channel.max_message_length(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            channel.clone(),
            ChatTarget::new("42"),
            settings.retry.clone(),
            settings.dispatch.clone(),
        ));
        let resolver = MetadataResolver::new(provider.clone(), settings.metadata.clone());
        let cycle = ScanCycle::new(
            context.clone(),
            resolver,
            composer.clone(),
            dispatcher,
            settings.scan.clone(),
        );
        let scheduler = Scheduler::new(cycle, settings.scan.clone());
        let queries = Arc::new(QueryService::new(context.clone()).with_scheduler(scheduler.handle()));
        let router = CommandRouter::new(queries, composer).with_scheduler(scheduler.handle());

        Self {
            state_dir,
            fs,
            provider,
            channel,
            context,
            scheduler,
            router,
        }
    }

    pub async fn scan(&self) -> CycleReport {
        self.scheduler
            .run_once(ScanReason::Manual)
            .await
            .expect("gate was idle")
            .expect("cycle succeeded")
    }

    /// Everything sent since the last call, joined.
    pub fn take_text(&self) -> String {
        let text = self.channel.texts().join("\n---\n");
        self.channel.clear();
        text
    }
}

pub fn movie(title: &str, year: &str, id: &str) -> ProviderRecord {
    ProviderRecord {
        title: title.to_string(),
        year: Some(year.to_string()),
        plot: Some(format!("{title} plot.")),
        genre: Some("Drama".to_string()),
        external_id: Some(id.to_string()),
        ..Default::default()
    }
}
