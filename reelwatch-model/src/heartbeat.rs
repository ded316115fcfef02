use std::time::Duration;

use crate::chrono::{DateTime, TimeDelta, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Liveness notification bookkeeping. Lives independently of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HeartbeatState {
    pub last_sent: Option<DateTime<Utc>>,
    pub interval: Duration,
}

impl HeartbeatState {
    pub fn new(interval: Duration) -> Self {
        Self {
            last_sent: None,
            interval,
        }
    }

    pub fn record_sent(&mut self, at: DateTime<Utc>) {
        self.last_sent = Some(at);
    }

    /// Earliest time the next heartbeat is expected, if one was ever sent.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        let last = self.last_sent?;
        let interval = TimeDelta::from_std(self.interval).ok()?;
        last.checked_add_signed(interval)
    }
}
