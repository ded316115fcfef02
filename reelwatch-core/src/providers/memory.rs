use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reelwatch_model::MetadataKey;

use super::{MetadataProvider, ProviderError, ProviderRecord};

/// In-memory provider for tests and offline runs. Unknown titles are
/// `NotFound`; titles marked unavailable fail transiently.
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    state: Mutex<ProviderState>,
}

#[derive(Debug, Default)]
struct ProviderState {
    records: HashMap<MetadataKey, ProviderRecord>,
    unavailable: HashSet<MetadataKey>,
    calls: Vec<MetadataKey>,
    latency: Duration,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, title: &str, year: Option<u16>, record: ProviderRecord) {
        self.with_state(|state| {
            state.records.insert(MetadataKey::new(title, year), record);
        });
    }

    /// Make lookups of `title`/`year` fail with a transient error.
    pub fn set_unavailable(&self, title: &str, year: Option<u16>, unavailable: bool) {
        let key = MetadataKey::new(title, year);
        self.with_state(|state| {
            if unavailable {
                state.unavailable.insert(key);
            } else {
                state.unavailable.remove(&key);
            }
        });
    }

    /// Delay every lookup by `latency` before answering.
    pub fn set_latency(&self, latency: Duration) {
        self.with_state(|state| state.latency = latency);
    }

    /// Keys looked up so far, in call order.
    pub fn calls(&self) -> Vec<MetadataKey> {
        self.with_state(|state| state.calls.clone())
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ProviderState) -> R) -> R {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

#[async_trait]
impl MetadataProvider for InMemoryProvider {
    async fn fetch(
        &self,
        title: &str,
        year: Option<u16>,
    ) -> Result<ProviderRecord, ProviderError> {
        let key = MetadataKey::new(title, year);
        let latency = self.with_state(|state| {
            state.calls.push(key.clone());
            state.latency
        });
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.with_state(|state| {
            if state.unavailable.contains(&key) {
                return Err(ProviderError::ApiError("provider unavailable".to_string()));
            }
            state.records.get(&key).cloned().ok_or(ProviderError::NotFound)
        })
    }
}
