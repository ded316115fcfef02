use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reelwatch_model::{MetadataKey, MonitoredPath};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::ScanPermit;
use crate::context::{CommittedState, LibraryContext};
use crate::dispatch::{DispatchReport, Dispatcher, SendError};
use crate::error::Result;
use crate::metadata::{MetadataCache, MetadataResolver, ResolveStats};
use crate::notify::Composer;
use crate::persistence::Snapshot;
use crate::scanner::{DiffEngine, DiffOutcome, ListingFailure};
use crate::settings::ScanSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The cycle ran to completion and its result was committed.
    Committed,
    /// The cycle exceeded its time budget. Only the metadata gathered so far
    /// was committed; the snapshot is unchanged.
    TimedOut,
}

/// Summary of one scan cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub outcome: CycleOutcome,
    pub added: usize,
    pub removed: usize,
    /// Changed entries whose announcement was delivered and committed.
    pub delivered: usize,
    /// Changed entries left uncommitted because their chunk was not delivered.
    pub withheld: usize,
    pub listing_failures: Vec<ListingFailure>,
    pub resolve: ResolveStats,
    pub dispatch_error: Option<SendError>,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.outcome {
            CycleOutcome::TimedOut => write!(f, "timed out, snapshot unchanged"),
            CycleOutcome::Committed => write!(
                f,
                "{} added, {} removed, {} delivered, {} withheld, {} path(s) unreadable",
                self.added,
                self.removed,
                self.delivered,
                self.withheld,
                self.listing_failures.len()
            ),
        }
    }
}

struct Built {
    snapshot: Snapshot,
    evict: Vec<MetadataKey>,
    diff: DiffOutcome,
    dispatch: DispatchReport,
    resolve: ResolveStats,
}

/// One pass of list, diff, resolve, compose, dispatch and commit.
pub struct ScanCycle {
    context: Arc<LibraryContext>,
    resolver: MetadataResolver,
    composer: Arc<Composer>,
    dispatcher: Arc<Dispatcher>,
    settings: ScanSettings,
}

impl fmt::Debug for ScanCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanCycle")
            .field("context", &self.context)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ScanCycle {
    pub fn new(
        context: Arc<LibraryContext>,
        resolver: MetadataResolver,
        composer: Arc<Composer>,
        dispatcher: Arc<Dispatcher>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            context,
            resolver,
            composer,
            dispatcher,
            settings,
        }
    }

    /// Run a cycle under `permit`. Only entries whose announcement was
    /// delivered are committed; everything else is reported again next time.
    pub async fn run(&self, permit: &ScanPermit<'_>) -> Result<CycleReport> {
        let started_at = Utc::now();
        let base = self.context.committed().await;
        let staged = Arc::new(Mutex::new(base.cache.clone()));

        let built = tokio::time::timeout(
            self.settings.cycle_timeout,
            self.build(&base, staged.clone(), started_at),
        )
        .await;

        permit.enter_committing();
        let mut cache = staged.lock().await.clone();
        let cooldown = self.resolver.settings().not_found_cooldown;

        let Ok(built) = built else {
            warn!(
                "Scan cycle exceeded {}; keeping the previous snapshot",
                humantime::format_duration(self.settings.cycle_timeout)
            );
            self.context
                .commit(CommittedState::new(base.snapshot.clone(), cache))
                .await?;
            return Ok(CycleReport {
                started_at,
                outcome: CycleOutcome::TimedOut,
                added: 0,
                removed: 0,
                delivered: 0,
                withheld: 0,
                listing_failures: Vec::new(),
                resolve: ResolveStats::default(),
                dispatch_error: None,
            });
        };

        for key in &built.evict {
            cache.remove(key);
        }
        let pruned = cache.prune_expired(started_at, cooldown);
        if pruned > 0 {
            info!("Dropped {} expired not-found records", pruned);
        }

        self.context
            .commit(CommittedState::new(built.snapshot, cache))
            .await?;

        Ok(CycleReport {
            started_at,
            outcome: CycleOutcome::Committed,
            added: built.diff.changes.added.len(),
            removed: built.diff.changes.removed.len(),
            delivered: built.dispatch.delivered_items().len(),
            withheld: built.dispatch.withheld_items().len(),
            listing_failures: built.diff.failures,
            resolve: built.resolve,
            dispatch_error: built.dispatch.failure().cloned(),
        })
    }

    async fn build(
        &self,
        base: &CommittedState,
        staged: Arc<Mutex<MetadataCache>>,
        now: DateTime<Utc>,
    ) -> Built {
        let engine = DiffEngine::new(self.context.fs());
        let diff = engine.diff(self.context.paths(), &base.snapshot, now).await;

        let mut session = self.resolver.session(staged, now);
        let metadata = session.resolve_all(&diff.changes.added).await;
        let resolve = session.stats();

        let totals = diff.totals(&base.snapshot);
        let dispatch = match self
            .composer
            .compose_changes(&diff.changes, &metadata, &totals, now)
        {
            Some(message) => self.dispatcher.dispatch(&message).await,
            None => DispatchReport::default(),
        };

        let snapshot = next_snapshot(&base.snapshot, &diff, &dispatch, self.context.paths(), now);
        let evict = evictions(&diff, &dispatch, &snapshot);

        Built {
            snapshot,
            evict,
            diff,
            dispatch,
            resolve,
        }
    }
}

/// Apply the delivered part of a diff to `base`.
fn next_snapshot(
    base: &Snapshot,
    diff: &DiffOutcome,
    dispatch: &DispatchReport,
    configured: &[MonitoredPath],
    now: DateTime<Utc>,
) -> Snapshot {
    let mut next = base.clone();

    let stale: Vec<MonitoredPath> = next
        .paths
        .keys()
        .filter(|path| !configured.contains(path))
        .cloned()
        .collect();
    for path in stale {
        info!("{} is no longer monitored; forgetting its entries", path);
        next.paths.remove(&path);
    }

    for path in diff.listings.keys() {
        next.track_path(path);
    }
    for entry in &diff.changes.added {
        if dispatch.is_delivered(&entry.key()) {
            next.insert(&entry.path, &entry.name, entry.first_seen);
        }
    }
    for entry in &diff.changes.removed {
        if dispatch.is_delivered(&entry.key()) {
            next.remove(&entry.path, &entry.name);
        }
    }

    next.last_scan = Some(now);
    next
}

/// Cache keys of delivered removals that no remaining entry still uses.
fn evictions(diff: &DiffOutcome, dispatch: &DispatchReport, next: &Snapshot) -> Vec<MetadataKey> {
    let removed: BTreeSet<MetadataKey> = diff
        .changes
        .removed
        .iter()
        .filter(|entry| dispatch.is_delivered(&entry.key()))
        .map(MetadataKey::for_entry)
        .collect();
    if removed.is_empty() {
        return Vec::new();
    }

    let referenced: BTreeSet<MetadataKey> =
        next.entries().map(|entry| MetadataKey::for_entry(&entry)).collect();
    removed.difference(&referenced).cloned().collect()
}

#[cfg(test)]
pub(super) mod tests {
    use super::*;
    use crate::dispatch::{ChatTarget, MessagingChannel, RecordingChannel};
    use crate::providers::{InMemoryProvider, ProviderRecord};
    use crate::scanner::InMemoryFs;
    use crate::scheduler::ScanGate;
    use crate::settings::{DispatchSettings, MetadataSettings, NotifySettings, RetryConfig, StateSettings};
    use reelwatch_model::FetchStatus;
    use std::time::Duration;
    use tempfile::TempDir;

    pub(crate) struct Harness {
        _dir: TempDir,
        pub fs: Arc<InMemoryFs>,
        pub provider: Arc<InMemoryProvider>,
        pub channel: Arc<RecordingChannel>,
        pub context: Arc<LibraryContext>,
        pub state: StateSettings,
        composer: Arc<Composer>,
        dispatcher: Arc<Dispatcher>,
        settings: ScanSettings,
        gate: ScanGate,
    }

    impl Harness {
        pub async fn new(paths: &[&str], max_len: usize) -> Self {
            Self::with_settings(paths, max_len, ScanSettings::default()).await
        }

        pub async fn with_settings(paths: &[&str], max_len: usize, settings: ScanSettings) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let fs = Arc::new(InMemoryFs::new());
            for path in paths {
                fs.add_root(*path);
            }
            let provider = Arc::new(InMemoryProvider::new());
            let channel = Arc::new(RecordingChannel::plain(max_len));
            let state = StateSettings {
                state_dir: dir.path().to_path_buf(),
                ..Default::default()
            };
            let context = Arc::new(
                LibraryContext::init(
                    paths.iter().map(|p| MonitoredPath::new(*p)).collect(),
                    fs.clone(),
                    &state,
                )
                .await
                .unwrap(),
            );
            let composer = Arc::new(Composer::new(
                channel.dialect(),
                NotifySettings::default(),
                max_len,
            ));
            let dispatcher = Arc::new(Dispatcher::new(
                channel.clone(),
                ChatTarget::new("1"),
                RetryConfig::immediate(2),
                DispatchSettings {
                    send_timeout: Duration::from_secs(5),
                    inter_chunk_delay: Duration::ZERO,
                },
            ));
            Self {
                _dir: dir,
                fs,
                provider,
                channel,
                context,
                state,
                composer,
                dispatcher,
                settings,
                gate: ScanGate::new(),
            }
        }

        /// A fresh cycle over the shared context, fakes and settings.
        pub fn cycle(&self) -> ScanCycle {
            let resolver = MetadataResolver::new(
                self.provider.clone(),
                MetadataSettings {
                    fetch_timeout: Duration::from_secs(60),
                    ..Default::default()
                },
            );
            ScanCycle::new(
                self.context.clone(),
                resolver,
                self.composer.clone(),
                self.dispatcher.clone(),
                self.settings.clone(),
            )
        }

        pub async fn run(&self) -> CycleReport {
            let permit = self.gate.try_begin().unwrap();
            self.cycle().run(&permit).await.unwrap()
        }
    }

    pub(crate) fn record(title: &str) -> ProviderRecord {
        ProviderRecord {
            title: title.to_string(),
            year: Some("2020".to_string()),
            plot: Some("Plot.".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn first_run_announces_and_commits_everything() {
        let h = Harness::new(&["/movies"], 4096).await;
        h.fs.add_folder("/movies", "MovieA (2020)");
        h.fs.add_folder("/movies", "MovieB (2021)");
        h.provider.insert("MovieA", Some(2020), record("MovieA"));

        let report = h.run().await;
        assert_eq!(report.outcome, CycleOutcome::Committed);
        assert_eq!((report.added, report.removed, report.delivered), (2, 0, 2));

        let texts = h.channel.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("MovieA (2020)"));
        assert!(texts[0].contains("MovieB (2021) (no details found)"));

        let committed = h.context.committed().await;
        assert_eq!(committed.snapshot.total_entries(), 2);
        assert!(committed.snapshot.last_scan.is_some());
        let missing = committed.cache.get(&MetadataKey::new("MovieB", Some(2021))).unwrap();
        assert_eq!(missing.status, FetchStatus::NotFound);
    }

    #[tokio::test]
    async fn unchanged_library_sends_nothing() {
        let h = Harness::new(&["/movies"], 4096).await;
        h.fs.add_folder("/movies", "X");
        h.run().await;
        h.channel.clear();

        let before = h.context.committed().await;
        let report = h.run().await;
        assert_eq!((report.added, report.removed), (0, 0));
        assert!(h.channel.sent().is_empty());
        assert_eq!(
            h.context.committed().await.snapshot.paths,
            before.snapshot.paths
        );
    }

    #[tokio::test]
    async fn removal_is_announced_and_cache_evicted() {
        let h = Harness::new(&["/movies"], 4096).await;
        h.fs.add_folder("/movies", "MovieA (2020)");
        h.provider.insert("MovieA", Some(2020), record("MovieA"));
        h.run().await;
        h.channel.clear();

        h.fs.remove_folder("/movies", "MovieA (2020)");
        let report = h.run().await;
        assert_eq!(report.removed, 1);
        assert!(h.channel.texts()[0].contains("Content removed"));

        let committed = h.context.committed().await;
        assert_eq!(committed.snapshot.total_entries(), 0);
        assert!(committed.cache.get(&MetadataKey::new("MovieA", Some(2020))).is_none());
    }

    #[tokio::test]
    async fn shared_record_survives_removal_from_one_path() {
        let h = Harness::new(&["/movies", "/backup"], 4096).await;
        h.fs.add_folder("/movies", "Dune (2021)");
        h.fs.add_folder("/backup", "Dune (2021)");
        h.provider.insert("Dune", Some(2021), record("Dune"));
        h.run().await;
        assert_eq!(h.provider.calls().len(), 1);

        h.fs.remove_folder("/backup", "Dune (2021)");
        h.run().await;
        let committed = h.context.committed().await;
        assert!(committed.cache.get(&MetadataKey::new("Dune", Some(2021))).is_some());
    }

    #[tokio::test]
    async fn failed_delivery_leaves_items_for_next_cycle() {
        let h = Harness::new(&["/movies"], 4096).await;
        h.fs.add_folder("/movies", "MovieA (2020)");
        h.channel.fail_all(SendError::Unauthorized("bot was kicked".into()));

        let report = h.run().await;
        assert_eq!((report.delivered, report.withheld), (0, 1));
        assert!(matches!(report.dispatch_error, Some(SendError::Unauthorized(_))));
        assert_eq!(h.context.committed().await.snapshot.total_entries(), 0);

        h.channel.recover();
        let report = h.run().await;
        assert_eq!((report.added, report.delivered), (1, 1));
        assert_eq!(h.context.committed().await.snapshot.total_entries(), 1);
    }

    #[tokio::test]
    async fn unreadable_path_keeps_its_entries() {
        let h = Harness::new(&["/movies", "/tv"], 4096).await;
        h.fs.add_folder("/movies", "A");
        h.fs.add_folder("/tv", "Show");
        h.run().await;
        h.channel.clear();

        h.fs.fail_path("/tv");
        h.fs.add_folder("/movies", "B");
        let report = h.run().await;
        assert_eq!((report.added, report.removed), (1, 0));
        assert_eq!(report.listing_failures.len(), 1);

        let committed = h.context.committed().await;
        assert!(committed.snapshot.contains(&MonitoredPath::new("/tv"), "Show"));
        assert!(committed.snapshot.contains(&MonitoredPath::new("/movies"), "B"));
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_cycle_keeps_snapshot_and_fetched_metadata() {
        let settings = ScanSettings {
            cycle_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let h = Harness::with_settings(&["/movies"], 4096, settings).await;
        h.fs.add_folder("/movies", "Alien (1979)");
        h.fs.add_folder("/movies", "Heat (1995)");
        h.provider.insert("Alien", Some(1979), record("Alien"));
        h.provider.insert("Heat", Some(1995), record("Heat"));
        h.provider.set_latency(Duration::from_secs(3));

        let report = h.run().await;
        assert_eq!(report.outcome, CycleOutcome::TimedOut);
        assert_eq!(report.to_string(), "timed out, snapshot unchanged");
        assert_eq!(h.channel.attempts(), 0);

        let committed = h.context.committed().await;
        assert_eq!(committed.snapshot.total_entries(), 0);
        assert!(committed.snapshot.last_scan.is_none());
        assert!(committed.cache.get(&MetadataKey::new("Alien", Some(1979))).is_some());
        assert!(committed.cache.get(&MetadataKey::new("Heat", Some(1995))).is_none());
        assert_eq!(h.gate.phase(), crate::scheduler::ScanPhase::Idle);

        // The next cycle reuses the cached record and announces both titles.
        h.provider.set_latency(Duration::ZERO);
        let report = h.run().await;
        assert_eq!((report.outcome, report.added), (CycleOutcome::Committed, 2));
        assert_eq!(h.provider.calls().len(), 3);
    }
}
