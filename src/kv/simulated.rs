//! Simulated Key-Value Store with Fault Injection
//!
//! DST wrapper: seeded failures and latency in front of any [`KvStore`].
//! Latency uses `tokio::time::sleep`, so under paused test time a run is
//! fully deterministic for a given seed.

use super::KvStore;
use crate::engine::StorageFuture;
use crate::error::StorageError;
use crate::simulator::{buggify, DeterministicRng};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for simulated fault injection
#[derive(Debug, Clone)]
pub struct SimulatedKvConfig {
    /// Probability of PUT operation failure
    pub put_fail_prob: f64,
    /// Probability of GET operation failure
    pub get_fail_prob: f64,
    /// Probability of GET returning a record that fails to parse
    pub get_corrupt_prob: f64,
    /// Simulated latency range in milliseconds (min, max)
    pub latency_range_ms: (u64, u64),
}

impl Default for SimulatedKvConfig {
    fn default() -> Self {
        SimulatedKvConfig {
            put_fail_prob: 0.02,
            get_fail_prob: 0.02,
            get_corrupt_prob: 0.005,
            latency_range_ms: (1, 20),
        }
    }
}

impl SimulatedKvConfig {
    /// High chaos configuration for stress testing
    pub fn high_chaos() -> Self {
        SimulatedKvConfig {
            put_fail_prob: 0.2,
            get_fail_prob: 0.1,
            get_corrupt_prob: 0.05,
            latency_range_ms: (5, 400),
        }
    }

    /// No faults - for baseline testing
    pub fn no_faults() -> Self {
        SimulatedKvConfig {
            put_fail_prob: 0.0,
            get_fail_prob: 0.0,
            get_corrupt_prob: 0.0,
            latency_range_ms: (0, 0),
        }
    }

    /// Fail every operation
    pub fn always_fail() -> Self {
        SimulatedKvConfig {
            put_fail_prob: 1.0,
            get_fail_prob: 1.0,
            ..Self::no_faults()
        }
    }
}

/// Statistics for fault injection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulatedKvStats {
    pub put_attempts: u64,
    pub put_failures: u64,
    pub get_attempts: u64,
    pub get_failures: u64,
    pub get_corruptions: u64,
}

struct SimulatedKvInner {
    rng: DeterministicRng,
    stats: SimulatedKvStats,
}

enum Fault {
    None,
    Fail,
    Corrupt,
}

/// Wraps another store and injects faults. Clones share RNG and stats.
pub struct SimulatedKvStore<S: KvStore> {
    inner_store: Arc<S>,
    config: SimulatedKvConfig,
    state: Arc<Mutex<SimulatedKvInner>>,
}

impl<S: KvStore> Clone for SimulatedKvStore<S> {
    fn clone(&self) -> Self {
        SimulatedKvStore {
            inner_store: self.inner_store.clone(),
            config: self.config.clone(),
            state: self.state.clone(),
        }
    }
}

impl<S: KvStore> SimulatedKvStore<S> {
    pub fn new(inner_store: S, seed: u64, config: SimulatedKvConfig) -> Self {
        SimulatedKvStore {
            inner_store: Arc::new(inner_store),
            config,
            state: Arc::new(Mutex::new(SimulatedKvInner {
                rng: DeterministicRng::new(seed),
                stats: SimulatedKvStats::default(),
            })),
        }
    }

    pub fn stats(&self) -> SimulatedKvStats {
        self.state.lock().stats.clone()
    }

    pub fn reset_stats(&self) {
        self.state.lock().stats = SimulatedKvStats::default();
    }

    pub fn inner(&self) -> &S {
        &self.inner_store
    }

    /// Draw latency and fault for one call under a single lock.
    fn roll(&self, is_put: bool) -> (Duration, Fault) {
        let mut state = self.state.lock();
        let (min, max) = self.config.latency_range_ms;
        let latency = Duration::from_millis(state.rng.gen_range(min, max.saturating_add(1)));

        let fault = if is_put {
            state.stats.put_attempts += 1;
            if buggify(&mut state.rng, self.config.put_fail_prob) {
                state.stats.put_failures += 1;
                Fault::Fail
            } else {
                Fault::None
            }
        } else {
            state.stats.get_attempts += 1;
            if buggify(&mut state.rng, self.config.get_fail_prob) {
                state.stats.get_failures += 1;
                Fault::Fail
            } else if buggify(&mut state.rng, self.config.get_corrupt_prob) {
                state.stats.get_corruptions += 1;
                Fault::Corrupt
            } else {
                Fault::None
            }
        };
        (latency, fault)
    }
}

impl<S: KvStore> KvStore for SimulatedKvStore<S> {
    fn get<'a>(&'a self, key: &'a str) -> StorageFuture<'a, Option<Value>> {
        Box::pin(async move {
            let (latency, fault) = self.roll(false);
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            match fault {
                Fault::Fail => Err(StorageError::Unavailable(format!(
                    "simulated get failure for {}",
                    key
                ))),
                Fault::Corrupt => Err(StorageError::Corrupt {
                    key: key.to_string(),
                    reason: "simulated corruption".to_string(),
                }),
                Fault::None => self.inner_store.get(key).await,
            }
        })
    }

    fn put<'a>(&'a self, key: &'a str, value: &'a Value) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            let (latency, fault) = self.roll(true);
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            match fault {
                Fault::Fail => Err(StorageError::Unavailable(format!(
                    "simulated put failure for {}",
                    key
                ))),
                Fault::Corrupt | Fault::None => self.inner_store.put(key, value).await,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKvStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_no_faults_passes_through() {
        let inner = InMemoryKvStore::new();
        let store = SimulatedKvStore::new(inner.clone(), 7, SimulatedKvConfig::no_faults());
        store.put("doc", &json!({"a": 1})).await.unwrap();
        assert_eq!(store.get("doc").await.unwrap(), Some(json!({"a": 1})));
        assert_eq!(inner.put_count(), 1);
        assert_eq!(
            store.stats(),
            SimulatedKvStats {
                put_attempts: 1,
                get_attempts: 1,
                ..Default::default()
            }
        );
    }

    #[tokio::test]
    async fn test_always_fail_never_reaches_inner_store() {
        let inner = InMemoryKvStore::new();
        let store = SimulatedKvStore::new(inner.clone(), 7, SimulatedKvConfig::always_fail());
        assert!(store.put("doc", &json!(1)).await.is_err());
        assert!(matches!(
            store.get("doc").await,
            Err(StorageError::Unavailable(_))
        ));
        assert_eq!(inner.put_count(), 0);
        assert_eq!(store.stats().put_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_seed_same_fault_sequence() {
        async fn outcomes(seed: u64) -> Vec<bool> {
            let store =
                SimulatedKvStore::new(InMemoryKvStore::new(), seed, SimulatedKvConfig::high_chaos());
            let mut out = Vec::new();
            for i in 0..50 {
                out.push(store.put("doc", &json!(i)).await.is_ok());
            }
            out
        }
        assert_eq!(outcomes(42).await, outcomes(42).await);
    }
}
