//! Deterministic Simulation Testing for the autosave pipeline
//!
//! Drives a seeded random editing workload against a [`MemoryEditor`] with
//! the storage and pages bridges attached, persisting through a
//! fault-injecting [`SimulatedKvStore`]. Run under paused tokio time, every
//! run is reproducible from its seed.
//!
//! ```text
//! for seed in 0..1000 {
//!     let mut harness = AutosaveDSTHarness::new(AutosaveDSTConfig::chaos(seed)).await?;
//!     harness.run(200).await;
//!     harness.check_invariants().await;   // violations carry the seed
//! }
//! ```
//!
//! Invariants:
//! - the pages mirror equals the engine's pages (order, ids, attributes)
//! - the selected projection is the engine's selected page
//! - writer accounting: every scheduled write was coalesced, fired, flushed,
//!   cancelled, or is the single pending one
//! - every injected storage fault surfaces exactly once as `storage:error`
//! - after a quiet period the persisted record equals the engine's project
//!   data (selection excluded; selecting a page is not a mutation). With
//!   store latency or put faults, concurrent puts complete in any order, so
//!   one final store runs first.

use super::DeterministicRng;
use crate::bridges::{use_kv_storage, use_pages, PagesState, StorageState};
use crate::config::AutosaveConfig;
use crate::engine::{Editor, EngineHandle, MemoryEditor, Model};
use crate::error::BridgeResult;
use crate::events::EngineEvent;
use crate::kv::{InMemoryKvStore, KvStore, SimulatedKvConfig, SimulatedKvStats, SimulatedKvStore};
use crate::reactive::Attributes;
use crate::scheduler::SchedulerStats;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

const ATTRIBUTE_KEYS: [&str; 3] = ["name", "slug", "title"];

/// Configuration for autosave DST
#[derive(Debug, Clone)]
pub struct AutosaveDSTConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Key-value store fault configuration
    pub store_config: SimulatedKvConfig,
    pub autosave: AutosaveConfig,
    /// Probability of an idle gap (lets the debounce fire)
    pub idle_probability: f64,
    /// Probability of a store outside the scheduler
    pub manual_store_probability: f64,
    /// Probability of a structural page operation (add/remove/select)
    pub page_op_probability: f64,
    /// Upper bound on the number of pages
    pub max_pages: usize,
}

impl Default for AutosaveDSTConfig {
    fn default() -> Self {
        AutosaveDSTConfig {
            seed: 0,
            store_config: SimulatedKvConfig::default(),
            autosave: AutosaveConfig::test(),
            idle_probability: 0.15,
            manual_store_probability: 0.03,
            page_op_probability: 0.25,
            max_pages: 8,
        }
    }
}

impl AutosaveDSTConfig {
    pub fn new(seed: u64) -> Self {
        AutosaveDSTConfig {
            seed,
            ..Default::default()
        }
    }

    /// No faults, no latency
    pub fn calm(seed: u64) -> Self {
        AutosaveDSTConfig {
            seed,
            store_config: SimulatedKvConfig::no_faults(),
            ..Default::default()
        }
    }

    pub fn moderate(seed: u64) -> Self {
        AutosaveDSTConfig {
            seed,
            store_config: SimulatedKvConfig::default(),
            ..Default::default()
        }
    }

    /// Aggressive faults and latency, with a max-wait ceiling on the writer
    pub fn chaos(seed: u64) -> Self {
        AutosaveDSTConfig {
            seed,
            store_config: SimulatedKvConfig::high_chaos(),
            autosave: AutosaveConfig::test().with_max_wait(Duration::from_millis(400)),
            idle_probability: 0.1,
            manual_store_probability: 0.05,
            ..Default::default()
        }
    }

    fn max_latency(&self) -> Duration {
        Duration::from_millis(self.store_config.latency_range_ms.1 + 1)
    }
}

/// Workload operation
#[derive(Debug, Clone, PartialEq)]
pub enum AutosaveOperation {
    EditAttribute {
        page_id: String,
        key: String,
        value: String,
    },
    AddPage {
        name: String,
    },
    RemovePage {
        page_id: String,
    },
    SelectPage {
        page_id: String,
    },
    SetCss {
        css: String,
    },
    /// Add an asset; emits an asset update as well as the general update
    AddAsset {
        url: String,
    },
    /// Replace the selected page's components
    SetComponents {
        html: String,
    },
    /// Let virtual time pass
    Idle {
        millis: u64,
    },
    /// Call the engine's store directly, racing the autosave
    ManualStore,
}

impl AutosaveOperation {
    /// Whether the operation emits a mutation event when it succeeds.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            AutosaveOperation::EditAttribute { .. }
                | AutosaveOperation::AddPage { .. }
                | AutosaveOperation::RemovePage { .. }
                | AutosaveOperation::SetCss { .. }
                | AutosaveOperation::AddAsset { .. }
                | AutosaveOperation::SetComponents { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome {
    Success,
    /// Failed (expected under fault injection)
    Failed(String),
}

/// Recorded operation for history tracking
#[derive(Debug, Clone)]
pub struct RecordedOperation {
    pub id: u64,
    pub operation: AutosaveOperation,
    pub outcome: OperationOutcome,
    /// Virtual milliseconds since the run started
    pub elapsed_ms: u64,
}

/// Workload generator
pub struct AutosaveWorkload {
    rng: DeterministicRng,
    config: AutosaveDSTConfig,
    operation_counter: u64,
}

impl AutosaveWorkload {
    pub fn new(config: AutosaveDSTConfig) -> Self {
        AutosaveWorkload {
            rng: DeterministicRng::new(config.seed),
            config,
            operation_counter: 0,
        }
    }

    /// Generate the next operation against the current page ids.
    pub fn next_operation(&mut self, page_ids: &[String]) -> AutosaveOperation {
        self.operation_counter += 1;
        let counter = self.operation_counter;
        let roll = self.rng.next_u64() as f64 / u64::MAX as f64;
        let idle = self.config.idle_probability;
        let manual = idle + self.config.manual_store_probability;
        let structural = manual + self.config.page_op_probability;

        if roll < idle {
            let delay = self.config.autosave.delay.as_millis() as u64;
            return AutosaveOperation::Idle {
                millis: self.rng.gen_range(1, delay.saturating_mul(3).max(2)),
            };
        }
        if roll < manual {
            return AutosaveOperation::ManualStore;
        }
        if roll < structural {
            return self.page_operation(page_ids, counter);
        }

        match self.rng.choose(page_ids) {
            Some(page_id) if self.rng.gen_bool(0.75) => {
                let key = ATTRIBUTE_KEYS[self.rng.gen_range(0, ATTRIBUTE_KEYS.len() as u64) as usize];
                AutosaveOperation::EditAttribute {
                    page_id: page_id.clone(),
                    key: key.to_string(),
                    value: format!("v{}", counter),
                }
            }
            _ => match self.rng.gen_range(0, 3) {
                0 => AutosaveOperation::AddAsset {
                    url: format!("https://cdn.example.com/img-{}.png", counter),
                },
                1 => AutosaveOperation::SetComponents {
                    html: format!("<section class=\"s{}\">v{}</section>", counter % 5, counter),
                },
                _ => AutosaveOperation::SetCss {
                    css: format!(".c{} {{ order: {}; }}", counter % 7, counter),
                },
            },
        }
    }

    fn page_operation(&mut self, page_ids: &[String], counter: u64) -> AutosaveOperation {
        let choice = self.rng.gen_range(0, 3);
        match (choice, self.rng.choose(page_ids).cloned()) {
            (0, Some(page_id)) if page_ids.len() > 1 => AutosaveOperation::RemovePage { page_id },
            (1, Some(page_id)) => AutosaveOperation::SelectPage { page_id },
            _ if page_ids.len() < self.config.max_pages => AutosaveOperation::AddPage {
                name: format!("Page {}", counter),
            },
            _ => AutosaveOperation::Idle { millis: 1 },
        }
    }
}

/// Result of a DST run
#[derive(Debug, Clone)]
pub struct AutosaveDSTResult {
    pub seed: u64,
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    pub mutations: u64,
    pub idles: u64,
    pub manual_stores: u64,
    /// Store fault statistics
    pub store_stats: SimulatedKvStats,
    pub writer_stats: SchedulerStats,
    /// `storage:error` events seen on the engine bus
    pub storage_errors_observed: u64,
    /// Invariant violations found
    pub invariant_violations: Vec<String>,
    /// Operation history
    pub history: Vec<RecordedOperation>,
}

impl AutosaveDSTResult {
    pub fn new(seed: u64) -> Self {
        AutosaveDSTResult {
            seed,
            total_operations: 0,
            successful_operations: 0,
            failed_operations: 0,
            mutations: 0,
            idles: 0,
            manual_stores: 0,
            store_stats: SimulatedKvStats::default(),
            writer_stats: SchedulerStats::default(),
            storage_errors_observed: 0,
            invariant_violations: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.invariant_violations.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Seed {}: {} ops ({} ok, {} failed), {} mutations, {} autosaves, {} storage errors, {} violations",
            self.seed,
            self.total_operations,
            self.successful_operations,
            self.failed_operations,
            self.mutations,
            self.writer_stats.fired + self.writer_stats.flushed,
            self.storage_errors_observed,
            self.invariant_violations.len()
        )
    }
}

type DSTStore = SimulatedKvStore<InMemoryKvStore>;

/// Main DST harness for the autosave pipeline
pub struct AutosaveDSTHarness {
    config: AutosaveDSTConfig,
    store: Arc<DSTStore>,
    inner_store: InMemoryKvStore,
    handle: Arc<EngineHandle>,
    engine: Arc<MemoryEditor>,
    storage: Arc<StorageState>,
    pages: Arc<PagesState>,
    workload: AutosaveWorkload,
    storage_errors: Arc<AtomicU64>,
    started: Instant,
    result: AutosaveDSTResult,
}

impl AutosaveDSTHarness {
    /// Attach the bridges, initialize the engine and let the initial load
    /// settle. Must run inside a tokio runtime.
    pub async fn new(config: AutosaveDSTConfig) -> BridgeResult<Self> {
        let inner_store = InMemoryKvStore::new();
        // Different seed for the store than for the workload
        let store = Arc::new(SimulatedKvStore::new(
            inner_store.clone(),
            config.seed.wrapping_add(1),
            config.store_config.clone(),
        ));

        let handle = EngineHandle::new();
        let kv: Arc<dyn KvStore> = store.clone();
        let storage = use_kv_storage(&handle, kv, &config.autosave)?;
        let pages = use_pages(&handle)?;

        let engine = MemoryEditor::from_config(&handle.config());
        let storage_errors = Arc::new(AtomicU64::new(0));
        let counter = storage_errors.clone();
        engine.events().on(EngineEvent::StorageError, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let shared: Arc<dyn Editor> = engine.clone();
        handle.initialize(move |_| shared)?;
        sleep(config.max_latency()).await;

        Ok(AutosaveDSTHarness {
            workload: AutosaveWorkload::new(config.clone()),
            result: AutosaveDSTResult::new(config.seed),
            config,
            store,
            inner_store,
            handle,
            engine,
            storage,
            pages,
            storage_errors,
            started: Instant::now(),
        })
    }

    /// Run the workload for a specified number of operations
    pub async fn run(&mut self, operations: usize) {
        for _ in 0..operations {
            let page_ids: Vec<String> = self.engine.pages().models().iter().map(|p| p.id()).collect();
            let op = self.workload.next_operation(&page_ids);
            self.execute_operation(op).await;
            self.check_live_invariants();
        }
    }

    async fn execute_operation(&mut self, op: AutosaveOperation) {
        self.result.total_operations += 1;
        let id = self.result.total_operations;

        let outcome = match &op {
            AutosaveOperation::EditAttribute {
                page_id,
                key,
                value,
            } => match self.engine.pages().get(page_id) {
                Some(page) => {
                    page.set(key, Value::String(value.clone()));
                    OperationOutcome::Success
                }
                None => OperationOutcome::Failed(format!("page {} vanished", page_id)),
            },
            AutosaveOperation::AddPage { name } => {
                let mut attributes = Attributes::new();
                attributes.insert("name".into(), Value::String(name.clone()));
                outcome_of(self.engine.add_page(attributes).map(|_| ()))
            }
            AutosaveOperation::RemovePage { page_id } => {
                outcome_of(self.engine.remove_page(page_id).map(|_| ()))
            }
            AutosaveOperation::SelectPage { page_id } => {
                outcome_of(self.engine.select_page(page_id))
            }
            AutosaveOperation::SetCss { css } => outcome_of(self.engine.set_style(css)),
            AutosaveOperation::AddAsset { url } => {
                self.engine.add_asset(url);
                OperationOutcome::Success
            }
            AutosaveOperation::SetComponents { html } => {
                outcome_of(self.engine.set_components(html))
            }
            AutosaveOperation::Idle { millis } => {
                self.result.idles += 1;
                sleep(Duration::from_millis(*millis)).await;
                OperationOutcome::Success
            }
            AutosaveOperation::ManualStore => {
                self.result.manual_stores += 1;
                outcome_of(self.engine.store().await.map(|_| ()))
            }
        };

        match outcome {
            OperationOutcome::Success => {
                self.result.successful_operations += 1;
                if op.is_mutation() {
                    self.result.mutations += 1;
                }
            }
            OperationOutcome::Failed(_) => self.result.failed_operations += 1,
        }
        self.result.history.push(RecordedOperation {
            id,
            operation: op,
            outcome,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        });
    }

    fn violation(&mut self, message: String) {
        self.result
            .invariant_violations
            .push(format!("seed {} op {}: {}", self.config.seed, self.result.total_operations, message));
    }

    /// Mirror and writer invariants; cheap enough to run after every step.
    fn check_live_invariants(&mut self) {
        let engine_pages = self.engine.pages().models();
        let mirror = self.pages.pages();
        let engine_ids: Vec<String> = engine_pages.iter().map(|p| p.id()).collect();
        if mirror.ids() != engine_ids {
            self.violation(format!(
                "pages mirror {:?} != engine pages {:?}",
                mirror.ids(),
                engine_ids
            ));
        }
        for page in &engine_pages {
            let mirrored = mirror.find(&page.id()).map(|p| p.to_value());
            if mirrored != Some(Value::Object(page.attributes())) {
                self.violation(format!("page {} mirror diverged from model", page.id()));
            }
        }

        let selected = self.engine.selected_page().map(|p| p.id());
        if self.pages.selected().id() != selected {
            self.violation(format!(
                "selected projection {:?} != engine selection {:?}",
                self.pages.selected().id(),
                selected
            ));
        }

        let stats = self.storage.writer().stats();
        let pending = u64::from(self.storage.is_write_pending());
        let settled = stats.coalesced + stats.fired + stats.flushed + stats.cancelled + pending;
        if stats.scheduled != settled {
            self.violation(format!("writer accounting off: {:?}, pending {}", stats, pending));
        }
    }

    /// Let the system go quiet, then check the persistence invariants.
    pub async fn check_invariants(&mut self) {
        self.check_live_invariants();

        // Quiet period: debounce fires, in-flight stores complete
        let max_wait = self.config.autosave.max_wait.unwrap_or_default();
        let quiet = self.config.autosave.delay + max_wait + self.config.max_latency() * 2;
        sleep(quiet).await;

        let store_stats = self.store.stats();
        let injected = store_stats.put_failures + store_stats.get_failures + store_stats.get_corruptions;
        let observed = self.storage_errors.load(Ordering::SeqCst);
        if injected != observed {
            self.violation(format!(
                "{} injected storage faults but {} storage:error events",
                injected, observed
            ));
        }

        if self.needs_final_store() {
            // Failed or reordered puts may leave an older record; store once
            // more through the engine until it is durable
            for _ in 0..32 {
                if self.engine.store().await.is_ok() {
                    break;
                }
            }
        }
        self.check_persisted_record();

        self.result.store_stats = self.store.stats();
        self.result.writer_stats = self.storage.writer().stats();
        self.result.storage_errors_observed = self.storage_errors.load(Ordering::SeqCst);
    }

    fn needs_final_store(&self) -> bool {
        let store = &self.config.store_config;
        store.put_fail_prob > 0.0 || store.latency_range_ms.1 > 0
    }

    fn check_persisted_record(&mut self) {
        let Some(document_id) = self.storage.document_id() else {
            self.violation("storage bridge never went live".to_string());
            return;
        };
        let mut expected = self.engine.project_data();
        expected.remove("selectedPage");

        match self.inner_store.snapshot(&document_id) {
            Some(Value::Object(mut persisted)) => {
                persisted.remove("selectedPage");
                if persisted != expected {
                    self.violation("persisted record differs from engine project data".to_string());
                }
            }
            Some(_) => self.violation("persisted record is not an object".to_string()),
            None if self.result.mutations == 0 && self.result.manual_stores == 0 => {}
            None => self.violation("nothing persisted after mutations".to_string()),
        }
    }

    pub fn handle(&self) -> &Arc<EngineHandle> {
        &self.handle
    }

    pub fn engine(&self) -> &Arc<MemoryEditor> {
        &self.engine
    }

    pub fn result(&self) -> &AutosaveDSTResult {
        &self.result
    }

    pub fn into_result(self) -> AutosaveDSTResult {
        self.result
    }
}

fn outcome_of<E: std::fmt::Display>(result: Result<(), E>) -> OperationOutcome {
    match result {
        Ok(()) => OperationOutcome::Success,
        Err(err) => OperationOutcome::Failed(err.to_string()),
    }
}

/// Run a batch of DST runs with consecutive seeds
pub async fn run_dst_batch(
    base_seed: u64,
    count: usize,
    ops_per_run: usize,
    config_fn: impl Fn(u64) -> AutosaveDSTConfig,
) -> BridgeResult<Vec<AutosaveDSTResult>> {
    let mut results = Vec::with_capacity(count);
    for i in 0..count {
        let seed = base_seed + i as u64;
        let mut harness = AutosaveDSTHarness::new(config_fn(seed)).await?;
        harness.run(ops_per_run).await;
        harness.check_invariants().await;
        results.push(harness.into_result());
    }
    Ok(results)
}

/// Summary of batch results
pub fn summarize_batch(results: &[AutosaveDSTResult]) -> String {
    let passed = results.iter().filter(|r| r.is_success()).count();
    let failed_seeds: Vec<u64> = results
        .iter()
        .filter(|r| !r.is_success())
        .map(|r| r.seed)
        .collect();
    let total_ops: u64 = results.iter().map(|r| r.total_operations).sum();
    let total_errors: u64 = results.iter().map(|r| r.storage_errors_observed).sum();

    let mut summary = format!(
        "Batch: {}/{} passed, {} total ops, {} storage errors",
        passed,
        results.len(),
        total_ops,
        total_errors
    );
    if !failed_seeds.is_empty() {
        summary.push_str(&format!("\nFailed seeds: {:?}", failed_seeds));
    }
    summary
}
