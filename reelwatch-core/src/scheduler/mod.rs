pub mod cycle;
pub mod heartbeat;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::settings::ScanSettings;

pub use cycle::{CycleOutcome, CycleReport, ScanCycle};
pub use heartbeat::Heartbeat;

/// Scan state machine: `Idle -> Scanning -> Committing -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ScanPhase {
    Idle = 0,
    Scanning = 1,
    Committing = 2,
}

impl ScanPhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Scanning,
            2 => Self::Committing,
            _ => Self::Idle,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Committing => "committing",
        }
    }
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Admits at most one scan cycle at a time.
#[derive(Debug, Default)]
pub struct ScanGate {
    phase: AtomicU8,
}

impl ScanGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> ScanPhase {
        ScanPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Move `Idle -> Scanning`, or report the phase that blocks it.
    pub fn try_begin(&self) -> std::result::Result<ScanPermit<'_>, ScanPhase> {
        self.phase
            .compare_exchange(
                ScanPhase::Idle as u8,
                ScanPhase::Scanning as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ScanPermit { gate: self })
            .map_err(ScanPhase::from_u8)
    }
}

/// Held for the duration of a cycle; returns the gate to `Idle` on drop,
/// including when the cycle is cancelled.
#[derive(Debug)]
pub struct ScanPermit<'a> {
    gate: &'a ScanGate,
}

impl ScanPermit<'_> {
    pub fn enter_committing(&self) {
        self.gate
            .phase
            .store(ScanPhase::Committing as u8, Ordering::Release);
    }
}

impl Drop for ScanPermit<'_> {
    fn drop(&mut self) {
        self.gate.phase.store(ScanPhase::Idle as u8, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanReason {
    Startup,
    Interval,
    Manual,
}

impl fmt::Display for ScanReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Startup => "startup",
            Self::Interval => "interval",
            Self::Manual => "manual",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Accepted,
    /// A cycle is already in progress in the given phase.
    Rejected(ScanPhase),
}

/// Cloneable handle for requesting scans and observing the scan phase.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    gate: Arc<ScanGate>,
    trigger: Arc<Notify>,
}

impl SchedulerHandle {
    pub fn phase(&self) -> ScanPhase {
        self.gate.phase()
    }

    /// Ask for an immediate cycle. Rejected unless the scheduler is idle;
    /// requests made before the scheduler wakes up coalesce into one cycle.
    pub fn request_scan(&self) -> TriggerOutcome {
        match self.gate.phase() {
            ScanPhase::Idle => {
                self.trigger.notify_one();
                TriggerOutcome::Accepted
            }
            phase => TriggerOutcome::Rejected(phase),
        }
    }
}

/// Drives scan cycles on an interval and on demand, plus the optional
/// heartbeat task.
pub struct Scheduler {
    cycle: ScanCycle,
    gate: Arc<ScanGate>,
    trigger: Arc<Notify>,
    settings: ScanSettings,
    heartbeat: Option<Heartbeat>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("phase", &self.gate.phase())
            .field("settings", &self.settings)
            .field("heartbeat", &self.heartbeat.is_some())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new(cycle: ScanCycle, settings: ScanSettings) -> Self {
        Self {
            cycle,
            gate: Arc::new(ScanGate::new()),
            trigger: Arc::new(Notify::new()),
            settings,
            heartbeat: None,
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Heartbeat) -> Self {
        self.heartbeat = Some(heartbeat);
        self
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            gate: self.gate.clone(),
            trigger: self.trigger.clone(),
        }
    }

    pub fn gate(&self) -> Arc<ScanGate> {
        self.gate.clone()
    }

    /// Run one cycle now. `None` when another cycle holds the gate.
    pub async fn run_once(&self, reason: ScanReason) -> Option<Result<CycleReport>> {
        let permit = match self.gate.try_begin() {
            Ok(permit) => permit,
            Err(phase) => {
                warn!("Skipping {} scan: a cycle is already {}", reason, phase);
                return None;
            }
        };

        info!("Starting {} scan", reason);
        let result = self.cycle.run(&permit).await;
        match &result {
            Ok(report) => info!("{} scan finished: {}", reason, report),
            Err(e) => error!("{} scan failed: {}", reason, e),
        }
        Some(result)
    }

    /// Run until `cancel` fires. A cycle still in flight at cancellation is
    /// abandoned before it commits, so its changes are reported again by the
    /// next run.
    pub async fn run(mut self, cancel: CancellationToken) {
        let heartbeat = self.heartbeat.take().map(|heartbeat| {
            let token = cancel.child_token();
            tokio::spawn(heartbeat.run(token))
        });

        let period = self.settings.interval;
        let first = if self.settings.scan_on_startup {
            Instant::now()
        } else {
            Instant::now() + period
        };
        let mut ticker = interval_at(first, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut startup = self.settings.scan_on_startup;

        info!(
            "Scheduler started; scanning every {}",
            humantime::format_duration(period)
        );

        loop {
            let reason = tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if std::mem::take(&mut startup) {
                        ScanReason::Startup
                    } else {
                        ScanReason::Interval
                    }
                }
                _ = self.trigger.notified() => ScanReason::Manual,
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!("Shutdown requested during {} scan; abandoning uncommitted cycle", reason);
                    break;
                }
                _ = self.run_once(reason) => {}
            }

            if self.drain_trigger() {
                debug!("Dropping scan request accepted while the {} scan started", reason);
            }
            if reason == ScanReason::Manual {
                ticker.reset();
            }
        }

        if let Some(handle) = heartbeat
            && let Err(e) = handle.await
        {
            error!("Heartbeat task ended abnormally: {}", e);
        }
        info!("Scheduler stopped");
    }

    /// Consume a trigger stored while a cycle was running. The cycle that
    /// just finished already covered it.
    fn drain_trigger(&self) -> bool {
        let pending = std::pin::pin!(self.trigger.notified());
        pending.enable()
    }
}
