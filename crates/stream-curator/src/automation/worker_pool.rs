//! Worker pool draining the check queue
//!
//! The dispatcher wakes on a fixed tick and whenever the queue signals a new
//! entry. Each tick refills a dispatch budget of `max_channels_per_run`
//! channels; at most `global_limit` checks run at the same time. Within one
//! check the checker itself waits `stagger_delay` between stream probes.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::check_queue::{CheckQueue, CheckQueueEntry};
use super::checker::ChannelChecker;
use super::immunity::ImmunityTracker;
use super::types::{ConcurrencyLimits, QueueLimits};
use crate::models::ChannelId;

/// Snapshot of the pool's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPoolStatus {
    pub running: bool,
    pub active_workers: usize,
    pub global_limit: usize,
    pub max_channels_per_run: usize,
    pub dispatched_total: u64,
    pub skipped_immune_total: u64,
    pub last_dispatch_at: Option<DateTime<Utc>>,
}

/// Decrements the active worker count when a check task ends, even on abort
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct WorkerPool {
    queue: Arc<CheckQueue>,
    checker: Arc<ChannelChecker>,
    immunity: Arc<ImmunityTracker>,
    global_limit: AtomicUsize,
    max_channels_per_run: AtomicUsize,
    active: Arc<AtomicUsize>,
    dispatched_total: AtomicU64,
    skipped_immune_total: AtomicU64,
    /// Unix millis of the latest dispatch, 0 before the first one
    last_dispatch_ms: AtomicI64,
    running: AtomicBool,
    dispatch_interval: Duration,
    shutdown_grace_period: Duration,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<CheckQueue>,
        checker: Arc<ChannelChecker>,
        immunity: Arc<ImmunityTracker>,
        queue_limits: &QueueLimits,
        concurrency: &ConcurrencyLimits,
        dispatch_interval: Duration,
        shutdown_grace_period: Duration,
    ) -> Self {
        checker.set_stagger_delay(concurrency.stagger_delay);
        Self {
            queue,
            checker,
            immunity,
            global_limit: AtomicUsize::new(concurrency.global_limit),
            max_channels_per_run: AtomicUsize::new(queue_limits.max_channels_per_run),
            active: Arc::new(AtomicUsize::new(0)),
            dispatched_total: AtomicU64::new(0),
            skipped_immune_total: AtomicU64::new(0),
            last_dispatch_ms: AtomicI64::new(0),
            running: AtomicBool::new(false),
            dispatch_interval,
            shutdown_grace_period,
        }
    }

    /// Run the dispatcher until `cancellation_token` fires, then drain
    pub async fn run(&self, cancellation_token: CancellationToken) {
        info!(
            "Starting check worker pool (global limit: {}, per-run budget: {}, dispatch every {:?})",
            self.global_limit.load(Ordering::Relaxed),
            self.max_channels_per_run.load(Ordering::Relaxed),
            self.dispatch_interval
        );
        self.running.store(true, Ordering::SeqCst);

        let mut tasks: JoinSet<(ChannelId, Option<bool>)> = JoinSet::new();
        let mut ticker = interval(self.dispatch_interval);
        let mut budget = 0usize;

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    info!("Check worker pool received cancellation signal");
                    break;
                }
                _ = ticker.tick() => {
                    budget = self.max_channels_per_run.load(Ordering::Relaxed);
                    self.dispatch(&mut tasks, &mut budget).await;
                }
                _ = self.queue.notified() => {
                    self.dispatch(&mut tasks, &mut budget).await;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    self.on_task_finished(joined).await;
                    self.dispatch(&mut tasks, &mut budget).await;
                }
            }
        }

        self.drain(&mut tasks).await;
        self.running.store(false, Ordering::SeqCst);
        info!("Check worker pool stopped");
    }

    /// Dispatch one budget's worth of checks and wait for them to finish.
    /// Returns the number of channels dispatched.
    pub async fn process_batch(&self) -> usize {
        let mut tasks = JoinSet::new();
        let mut budget = self.max_channels_per_run.load(Ordering::Relaxed);
        let before = budget;
        self.dispatch(&mut tasks, &mut budget).await;

        while let Some(joined) = tasks.join_next().await {
            self.on_task_finished(joined).await;
            self.dispatch(&mut tasks, &mut budget).await;
        }
        before - budget
    }

    async fn dispatch(&self, tasks: &mut JoinSet<(ChannelId, Option<bool>)>, budget: &mut usize) {
        while *budget > 0 && self.active.load(Ordering::SeqCst) < self.global_limit.load(Ordering::Relaxed) {
            let Some(entry) = self.queue.dequeue().await else {
                break;
            };

            if self.should_skip(&entry).await {
                continue;
            }

            *budget -= 1;
            self.active.fetch_add(1, Ordering::SeqCst);
            self.dispatched_total.fetch_add(1, Ordering::Relaxed);
            self.last_dispatch_ms.store(Utc::now().timestamp_millis(), Ordering::Relaxed);

            let guard = ActiveGuard(self.active.clone());
            let checker = self.checker.clone();
            let channel_id = entry.channel_id;
            debug!("Dispatching check of channel {} (source: {})", channel_id, entry.source);
            tasks.spawn(async move {
                let _guard = guard;
                // None when the check panicked
                let ok = AssertUnwindSafe(checker.run_check(channel_id))
                    .catch_unwind()
                    .await
                    .ok();
                (channel_id, ok)
            });
        }
    }

    /// Immunity can begin between enqueue and dequeue; honor it unless bypassed
    async fn should_skip(&self, entry: &CheckQueueEntry) -> bool {
        if entry.bypass_immunity || !self.immunity.is_immune(entry.channel_id) {
            return false;
        }
        debug!("Channel {} became immune while queued, skipping", entry.channel_id);
        self.skipped_immune_total.fetch_add(1, Ordering::Relaxed);
        self.queue.abandon(entry.channel_id).await;
        true
    }

    /// Release the in-flight entry of a finished check. A panicked check
    /// counts as failed so the channel can be queued again. Aborted tasks are
    /// released by `drain`.
    async fn on_task_finished(&self, joined: Result<(ChannelId, Option<bool>), tokio::task::JoinError>) {
        match joined {
            Ok((channel_id, Some(ok))) => self.queue.complete(channel_id, ok).await,
            Ok((channel_id, None)) => {
                warn!("Check of channel {} panicked, releasing it", channel_id);
                self.queue.complete(channel_id, false).await;
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => warn!("Channel check task failed to join: {}", e),
        }
    }

    async fn drain(&self, tasks: &mut JoinSet<(ChannelId, Option<bool>)>) {
        if !tasks.is_empty() {
            info!("Waiting up to {:?} for {} running checks", self.shutdown_grace_period, tasks.len());
        }

        let start = Instant::now();
        while !tasks.is_empty() {
            let remaining = self.shutdown_grace_period.saturating_sub(start.elapsed());
            match tokio::time::timeout(remaining, tasks.join_next()).await {
                Ok(Some(joined)) => self.on_task_finished(joined).await,
                Ok(None) => break,
                Err(_) => {
                    warn!("Timeout waiting for {} checks, aborting them", tasks.len());
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    break;
                }
            }
        }

        let released = self.queue.release_in_flight().await;
        if !released.is_empty() {
            debug!("Unfinished checks released: {:?}", released);
        }
    }

    pub fn status(&self) -> WorkerPoolStatus {
        WorkerPoolStatus {
            running: self.running.load(Ordering::SeqCst),
            active_workers: self.active.load(Ordering::SeqCst),
            global_limit: self.global_limit.load(Ordering::Relaxed),
            max_channels_per_run: self.max_channels_per_run.load(Ordering::Relaxed),
            dispatched_total: self.dispatched_total.load(Ordering::Relaxed),
            skipped_immune_total: self.skipped_immune_total.load(Ordering::Relaxed),
            last_dispatch_at: match self.last_dispatch_ms.load(Ordering::Relaxed) {
                0 => None,
                ms => DateTime::from_timestamp_millis(ms),
            },
        }
    }

    /// Apply new concurrency limits; running checks are not interrupted
    pub fn update_concurrency(&self, limits: &ConcurrencyLimits) {
        let old = self.global_limit.swap(limits.global_limit, Ordering::Relaxed);
        self.checker.set_stagger_delay(limits.stagger_delay);
        info!(
            "Updated check concurrency from {} to {} (stagger {:?})",
            old, limits.global_limit, limits.stagger_delay
        );
    }

    pub fn update_queue_limits(&self, limits: &QueueLimits) {
        self.max_channels_per_run.store(limits.max_channels_per_run, Ordering::Relaxed);
        self.queue.set_max_size(limits.max_size);
    }
}
