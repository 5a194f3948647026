//! Autosave DST Tests
//!
//! Deterministic simulation tests (seed-based) for the storage and pages
//! bridges running against a fault-injecting key-value store. Tokio time is
//! paused, so latency and debounce deadlines are virtual and every run is
//! reproducible from its seed.
//!
//! ## Invariants checked per run
//!
//! 1. The pages mirror and selection always match the engine
//! 2. Writer accounting balances: every schedule is coalesced, fired,
//!    flushed, cancelled or still pending
//! 3. Every injected store fault is reported as exactly one `storage:error`
//! 4. After the system goes quiet, the stored record equals the engine state
//!
//! ## Test Categories
//!
//! - **Calm tests**: No faults, verify basic correctness
//! - **Moderate tests**: Some faults and latency, verify resilience
//! - **Chaos tests**: Many faults, long latency, max-wait forced writes

use editor_bridge::simulator::{
    run_dst_batch, summarize_batch, AutosaveDSTConfig, AutosaveDSTHarness, AutosaveOperation,
};

// =============================================================================
// Single Seed Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_autosave_dst_single_calm() {
    let mut harness = AutosaveDSTHarness::new(AutosaveDSTConfig::calm(12345)).await.unwrap();

    harness.run(500).await;
    harness.check_invariants().await;

    let result = harness.result();
    println!("{}", result.summary());

    assert!(
        result.is_success(),
        "Calm mode should not violate invariants: {:?}",
        result.invariant_violations
    );
    assert_eq!(result.total_operations, 500);
    assert_eq!(result.failed_operations, 0);
    assert_eq!(result.storage_errors_observed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_autosave_dst_single_moderate() {
    let mut harness = AutosaveDSTHarness::new(AutosaveDSTConfig::moderate(54321)).await.unwrap();

    harness.run(300).await;
    harness.check_invariants().await;

    let result = harness.result();
    println!("{}", result.summary());
    println!("Store stats: {:?}", result.store_stats);

    assert!(result.total_operations >= 300);
    assert!(result.store_stats.put_attempts > 0);
}

#[tokio::test(start_paused = true)]
async fn test_autosave_dst_single_chaos() {
    let mut harness = AutosaveDSTHarness::new(AutosaveDSTConfig::chaos(99999)).await.unwrap();

    harness.run(200).await;
    harness.check_invariants().await;

    let result = harness.result();
    println!("{}", result.summary());
    println!("Store stats: {:?}", result.store_stats);
    println!("Writer stats: {:?}", result.writer_stats);

    // Chaos mode will have failures, but operations should complete
    assert!(result.total_operations >= 200);
}

#[tokio::test(start_paused = true)]
async fn test_autosave_dst_coalesces_bursts() {
    let mut harness = AutosaveDSTHarness::new(AutosaveDSTConfig::calm(777)).await.unwrap();
    harness.run(300).await;
    harness.check_invariants().await;

    let result = harness.result();
    assert!(result.is_success(), "{:?}", result.invariant_violations);
    assert!(
        result.writer_stats.fired < result.mutations,
        "bursts should coalesce: {} writes for {} mutations",
        result.writer_stats.fired,
        result.mutations
    );
}

#[tokio::test(start_paused = true)]
async fn test_autosave_dst_history_replays_for_seed() {
    async fn history(seed: u64) -> Vec<AutosaveOperation> {
        let mut harness = AutosaveDSTHarness::new(AutosaveDSTConfig::chaos(seed)).await.unwrap();
        harness.run(120).await;
        harness.check_invariants().await;
        harness
            .into_result()
            .history
            .into_iter()
            .map(|record| record.operation)
            .collect()
    }

    let first = history(2024).await;
    assert_eq!(first, history(2024).await);
    assert_ne!(first, history(2025).await);
}

// =============================================================================
// Multi-Seed Batch Tests (DST)
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_autosave_dst_50_seeds_calm() {
    let results = run_dst_batch(0, 50, 100, AutosaveDSTConfig::calm).await.unwrap();

    let summary = summarize_batch(&results);
    println!("50 Seeds Calm:\n{}", summary);

    // All calm runs should pass
    let passed = results.iter().filter(|r| r.is_success()).count();
    assert_eq!(
        passed,
        results.len(),
        "All calm runs should pass. Failed seeds: {:?}",
        results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.seed)
            .collect::<Vec<_>>()
    );
}

#[tokio::test(start_paused = true)]
async fn test_autosave_dst_50_seeds_moderate() {
    let results = run_dst_batch(1000, 50, 100, AutosaveDSTConfig::moderate)
        .await
        .unwrap();

    let summary = summarize_batch(&results);
    println!("50 Seeds Moderate:\n{}", summary);

    let passed = results.iter().filter(|r| r.is_success()).count();
    assert!(
        passed >= 40,
        "At least 80% of moderate runs should pass. Passed: {}/{}",
        passed,
        results.len()
    );
}

#[tokio::test(start_paused = true)]
async fn test_autosave_dst_25_seeds_chaos() {
    let results = run_dst_batch(5000, 25, 100, AutosaveDSTConfig::chaos).await.unwrap();

    let summary = summarize_batch(&results);
    println!("25 Seeds Chaos:\n{}", summary);

    let total_errors: u64 = results.iter().map(|r| r.storage_errors_observed).sum();
    assert!(total_errors > 0, "chaos runs should observe storage errors");
    assert_eq!(results.len(), 25);
}
