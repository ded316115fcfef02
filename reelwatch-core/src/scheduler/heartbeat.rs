use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reelwatch_model::HeartbeatState;
use tokio::sync::RwLock;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::LibraryContext;
use crate::dispatch::{DispatchReport, Dispatcher};
use crate::notify::Composer;

/// Periodic liveness message, independent of library changes.
pub struct Heartbeat {
    dispatcher: Arc<Dispatcher>,
    composer: Arc<Composer>,
    context: Arc<LibraryContext>,
    state: Arc<RwLock<HeartbeatState>>,
}

impl fmt::Debug for Heartbeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heartbeat")
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl Heartbeat {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        composer: Arc<Composer>,
        context: Arc<LibraryContext>,
        interval: Duration,
    ) -> Self {
        Self {
            dispatcher,
            composer,
            context,
            state: Arc::new(RwLock::new(HeartbeatState::new(interval))),
        }
    }

    /// Shared view of when the last heartbeat went out.
    pub fn state(&self) -> Arc<RwLock<HeartbeatState>> {
        self.state.clone()
    }

    /// Send one heartbeat now. `last_sent` only advances on delivery.
    pub async fn beat(&self) -> DispatchReport {
        let now = Utc::now();
        let last_scan = self.context.committed().await.snapshot.last_scan;
        let message = self.composer.compose_heartbeat(now, last_scan);
        let report = self.dispatcher.dispatch(&message).await;

        if report.is_complete() {
            self.state.write().await.record_sent(now);
            debug!("Heartbeat delivered");
        } else if let Some(error) = report.failure() {
            warn!("Heartbeat not delivered: {}", error);
        }
        report
    }

    /// Beat every interval until cancelled. The first beat comes one
    /// interval after start.
    pub async fn run(self, cancel: CancellationToken) {
        let period = self.state.read().await.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            "Heartbeat every {}",
            humantime::format_duration(period)
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.beat().await;
                }
            }
        }
        debug!("Heartbeat stopped");
    }
}
