//! Debounced Write Scheduler
//!
//! Coalescing debounce: every `schedule` call cancels the pending timer and
//! arms a new one, so a burst of mutations produces one write after the burst
//! goes quiet. At most one write is pending per writer.
//!
//! ```text
//! schedule  t=0    -> deadline 500
//! schedule  t=100  -> cancel, deadline 600
//! schedule  t=300  -> cancel, deadline 800
//! (quiet)   t=800  -> trigger runs once
//! ```
//!
//! With `max_wait` set, the deadline is additionally capped at
//! `burst start + max_wait`, so a sustained burst still writes periodically.

use crate::config::AutosaveConfig;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{trace, warn};

pub type Trigger = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// `schedule` calls
    pub scheduled: u64,
    /// Pending writes replaced by a newer `schedule`
    pub coalesced: u64,
    /// Triggers run by the timer
    pub fired: u64,
    /// Timer firings that hit the max-wait ceiling instead of the quiet delay
    pub forced_by_max_wait: u64,
    /// Triggers run early by `flush`
    pub flushed: u64,
    /// Pending writes dropped by `cancel`
    pub cancelled: u64,
}

struct PendingWrite {
    generation: u64,
    deadline: Instant,
    forced: bool,
    task: JoinHandle<()>,
    trigger: Trigger,
}

#[derive(Default)]
struct SchedulerState {
    generation: u64,
    pending: Option<PendingWrite>,
    burst_started: Option<Instant>,
    stats: SchedulerStats,
}

pub struct DebouncedWriter {
    delay: Duration,
    max_wait: Option<Duration>,
    runtime: Option<Handle>,
    state: Mutex<SchedulerState>,
    this: Weak<DebouncedWriter>,
}

impl DebouncedWriter {
    /// The runtime current at construction (if any) is used when `schedule`
    /// is called from outside a runtime.
    pub fn new(delay: Duration, max_wait: Option<Duration>) -> Arc<Self> {
        Arc::new_cyclic(|this| DebouncedWriter {
            delay,
            max_wait,
            runtime: Handle::try_current().ok(),
            state: Mutex::new(SchedulerState::default()),
            this: this.clone(),
        })
    }

    pub fn from_config(config: &AutosaveConfig) -> Arc<Self> {
        Self::new(config.delay, config.max_wait)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait
    }

    /// Arm (or re-arm) the timer. When it fires, `trigger` runs once; any
    /// trigger from an earlier, superseded call is dropped without running.
    pub fn schedule<F>(&self, trigger: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(runtime) = Handle::try_current().ok().or_else(|| self.runtime.clone()) else {
            warn!("no tokio runtime available; running write trigger without delay");
            trigger();
            return;
        };

        let now = Instant::now();
        let mut state = self.state.lock();
        state.generation += 1;
        state.stats.scheduled += 1;
        let generation = state.generation;
        let burst_started = *state.burst_started.get_or_insert(now);

        let quiet_deadline = now + self.delay;
        let deadline = match self.max_wait {
            Some(max_wait) => quiet_deadline.min(burst_started + max_wait),
            None => quiet_deadline,
        };

        if let Some(previous) = state.pending.take() {
            previous.task.abort();
            state.stats.coalesced += 1;
        }

        let writer = self.this.clone();
        let task = runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(writer) = writer.upgrade() {
                writer.fire(generation);
            }
        });
        trace!(generation, delay_ms = (deadline - now).as_millis() as u64, "write scheduled");

        state.pending = Some(PendingWrite {
            generation,
            deadline,
            forced: deadline < quiet_deadline,
            task,
            trigger: Box::new(trigger),
        });
    }

    fn fire(&self, generation: u64) {
        let trigger = {
            let mut state = self.state.lock();
            match &state.pending {
                Some(pending) if pending.generation == generation => {}
                _ => return,
            }
            let Some(pending) = state.pending.take() else {
                return;
            };
            state.burst_started = None;
            state.stats.fired += 1;
            if pending.forced {
                state.stats.forced_by_max_wait += 1;
            }
            pending.trigger
        };
        trace!(generation, "write trigger fired");
        trigger();
    }

    /// Run the pending trigger now. Returns false when nothing was pending.
    pub fn flush(&self) -> bool {
        let pending = {
            let mut state = self.state.lock();
            let Some(pending) = state.pending.take() else {
                return false;
            };
            state.burst_started = None;
            state.stats.flushed += 1;
            pending
        };
        pending.task.abort();
        (pending.trigger)();
        true
    }

    /// Drop the pending trigger without running it.
    pub fn cancel(&self) -> bool {
        let mut state = self.state.lock();
        let Some(pending) = state.pending.take() else {
            return false;
        };
        pending.task.abort();
        state.burst_started = None;
        state.stats.cancelled += 1;
        true
    }

    pub fn is_pending(&self) -> bool {
        self.state.lock().pending.is_some()
    }

    pub fn pending_deadline(&self) -> Option<Instant> {
        self.state.lock().pending.as_ref().map(|p| p.deadline)
    }

    pub fn stats(&self) -> SchedulerStats {
        self.state.lock().stats.clone()
    }
}

impl Drop for DebouncedWriter {
    fn drop(&mut self) {
        if let Some(pending) = self.state.get_mut().pending.take() {
            pending.task.abort();
        }
    }
}

impl fmt::Debug for DebouncedWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebouncedWriter")
            .field("delay", &self.delay)
            .field("max_wait", &self.max_wait)
            .field("pending", &self.is_pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{sleep, sleep_until};

    fn recorder() -> (Arc<Mutex<Vec<Instant>>>, impl Fn() -> Trigger) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        let make = move || -> Trigger {
            let sink = sink.clone();
            Box::new(move || sink.lock().push(Instant::now()))
        };
        (fired, make)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_one_write_after_last_event() {
        let writer = DebouncedWriter::new(Duration::from_millis(500), None);
        let (fired, make) = recorder();
        let start = Instant::now();

        for offset in [0u64, 100, 200, 300] {
            sleep_until(start + Duration::from_millis(offset)).await;
            writer.schedule(make());
        }
        assert!(writer.is_pending());

        sleep_until(start + Duration::from_millis(799)).await;
        assert!(fired.lock().is_empty());

        sleep_until(start + Duration::from_millis(1_500)).await;
        let fired = fired.lock();
        assert_eq!(fired.len(), 1);
        let elapsed = fired[0] - start;
        assert!(elapsed >= Duration::from_millis(800) && elapsed < Duration::from_millis(802));
        assert!(!writer.is_pending());

        let stats = writer.stats();
        assert_eq!(stats.scheduled, 4);
        assert_eq!(stats.coalesced, 3);
        assert_eq!(stats.fired, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_write_separately() {
        let writer = DebouncedWriter::new(Duration::from_millis(500), None);
        let (fired, make) = recorder();

        writer.schedule(make());
        sleep(Duration::from_millis(600)).await;
        writer.schedule(make());
        sleep(Duration::from_millis(600)).await;

        assert_eq!(fired.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbroken_stream_never_writes_without_max_wait() {
        let writer = DebouncedWriter::new(Duration::from_millis(500), None);
        let (fired, make) = recorder();

        for _ in 0..50 {
            writer.schedule(make());
            sleep(Duration::from_millis(400)).await;
        }
        assert!(fired.lock().is_empty());
        assert!(writer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_wait_caps_a_sustained_burst() {
        let writer = DebouncedWriter::new(
            Duration::from_millis(500),
            Some(Duration::from_millis(2_000)),
        );
        let (fired, make) = recorder();
        let start = Instant::now();

        for i in 0..25u64 {
            sleep_until(start + Duration::from_millis(i * 200)).await;
            writer.schedule(make());
        }
        sleep(Duration::from_millis(1_000)).await;

        let fired = fired.lock();
        assert!(fired.len() >= 2);
        let first = fired[0] - start;
        assert!(first >= Duration::from_millis(2_000) && first < Duration::from_millis(2_002));
        assert!(writer.stats().forced_by_max_wait >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_runs_now_and_cancel_drops() {
        let writer = DebouncedWriter::new(Duration::from_millis(500), None);
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        writer.schedule(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(writer.flush());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!writer.flush());

        let counter = runs.clone();
        writer.schedule(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(writer.cancel());
        sleep(Duration::from_secs(2)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!writer.cancel());
    }

    #[test]
    fn test_without_runtime_trigger_runs_inline() {
        let writer = DebouncedWriter::new(Duration::from_millis(500), None);
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        writer.schedule(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!writer.is_pending());
    }
}
