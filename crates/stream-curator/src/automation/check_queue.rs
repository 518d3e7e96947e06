//! Bounded, deduplicating FIFO of channel-check requests
//!
//! Membership test and insertion happen under one lock so two producers can
//! never enqueue the same channel twice. Entries handed to a worker move to an
//! in-flight set: they no longer count toward `max_size` but still block
//! duplicates until the worker completes or abandons them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use super::types::{AutomationError, EnqueueOutcome, TriggerSource};
use crate::models::ChannelId;

/// A pending channel check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckQueueEntry {
    pub channel_id: ChannelId,
    pub enqueued_at: DateTime<Utc>,
    pub bypass_immunity: bool,
    pub source: TriggerSource,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<CheckQueueEntry>,
    queued: HashSet<ChannelId>,
    in_flight: HashMap<ChannelId, CheckQueueEntry>,
    total_processed: u64,
    total_failed: u64,
    total_rejected: u64,
    total_abandoned: u64,
}

/// Statistics about the check queue state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckQueueStats {
    pub queued: usize,
    pub in_flight: usize,
    pub max_size: usize,
    pub total_processed: u64,
    pub total_failed: u64,
    pub total_rejected: u64,
    pub total_abandoned: u64,
}

#[derive(Debug)]
pub struct CheckQueue {
    state: Mutex<QueueState>,
    max_size: AtomicUsize,
    notify: Notify,
}

impl CheckQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            max_size: AtomicUsize::new(max_size),
            notify: Notify::new(),
        }
    }

    /// Add a channel unless it is already queued or being checked.
    ///
    /// A bypassing request for a channel that is already queued upgrades the
    /// existing entry in place; its position is unchanged.
    pub async fn enqueue(
        &self,
        channel_id: ChannelId,
        bypass_immunity: bool,
        source: TriggerSource,
    ) -> Result<EnqueueOutcome, AutomationError> {
        let mut state = self.state.lock().await;

        if state.queued.contains(&channel_id) {
            if bypass_immunity {
                if let Some(entry) = state
                    .pending
                    .iter_mut()
                    .find(|entry| entry.channel_id == channel_id)
                {
                    entry.bypass_immunity = true;
                }
            }
            debug!("Channel {} already queued, skipping", channel_id);
            return Ok(EnqueueOutcome::AlreadyQueued);
        }

        if state.in_flight.contains_key(&channel_id) {
            debug!("Channel {} is being checked, skipping", channel_id);
            return Ok(EnqueueOutcome::InFlight);
        }

        let max_size = self.max_size.load(Ordering::Relaxed);
        if state.pending.len() >= max_size {
            state.total_rejected += 1;
            warn!(
                "Check queue full ({} entries), rejecting channel {}",
                max_size, channel_id
            );
            return Err(AutomationError::QueueFull { max_size });
        }

        state.queued.insert(channel_id);
        state.pending.push_back(CheckQueueEntry {
            channel_id,
            enqueued_at: Utc::now(),
            bypass_immunity,
            source,
        });
        drop(state);

        self.notify.notify_one();
        debug!("Enqueued channel {} for checking (source: {})", channel_id, source);
        Ok(EnqueueOutcome::Enqueued)
    }

    /// Take the oldest entry and mark it in flight
    pub async fn dequeue(&self) -> Option<CheckQueueEntry> {
        let mut state = self.state.lock().await;
        let entry = state.pending.pop_front()?;
        state.queued.remove(&entry.channel_id);
        state.in_flight.insert(entry.channel_id, entry.clone());
        Some(entry)
    }

    /// Release an in-flight entry after its check finished
    pub async fn complete(&self, channel_id: ChannelId, success: bool) {
        let mut state = self.state.lock().await;
        if state.in_flight.remove(&channel_id).is_none() {
            warn!("Attempted to complete unknown in-flight channel {}", channel_id);
            return;
        }
        state.total_processed += 1;
        if !success {
            state.total_failed += 1;
        }
    }

    /// Release an in-flight entry whose check never finished.
    /// The channel is not counted as processed and may be enqueued again.
    pub async fn abandon(&self, channel_id: ChannelId) -> bool {
        let mut state = self.state.lock().await;
        let released = state.in_flight.remove(&channel_id).is_some();
        if released {
            state.total_abandoned += 1;
        }
        released
    }

    /// Abandon every in-flight entry, returning the released channel ids
    pub async fn release_in_flight(&self) -> Vec<ChannelId> {
        let mut state = self.state.lock().await;
        let released: Vec<ChannelId> = state.in_flight.drain().map(|(id, _)| id).collect();
        state.total_abandoned += released.len() as u64;
        if !released.is_empty() {
            info!("Released {} unfinished channel checks", released.len());
        }
        released
    }

    /// Drop all waiting entries. In-flight checks are unaffected.
    pub async fn clear(&self) -> usize {
        let mut state = self.state.lock().await;
        let cleared = state.pending.len();
        state.pending.clear();
        state.queued.clear();
        info!("Cleared {} entries from the check queue", cleared);
        cleared
    }

    /// Waiting entries in FIFO order
    pub async fn list(&self) -> Vec<CheckQueueEntry> {
        self.state.lock().await.pending.iter().cloned().collect()
    }

    pub async fn contains(&self, channel_id: ChannelId) -> bool {
        let state = self.state.lock().await;
        state.queued.contains(&channel_id) || state.in_flight.contains_key(&channel_id)
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn in_flight_count(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    pub async fn stats(&self) -> CheckQueueStats {
        let state = self.state.lock().await;
        CheckQueueStats {
            queued: state.pending.len(),
            in_flight: state.in_flight.len(),
            max_size: self.max_size.load(Ordering::Relaxed),
            total_processed: state.total_processed,
            total_failed: state.total_failed,
            total_rejected: state.total_rejected,
            total_abandoned: state.total_abandoned,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size.load(Ordering::Relaxed)
    }

    /// Change the ceiling at runtime. Entries already queued beyond a lowered
    /// ceiling stay queued; only new enqueues are rejected.
    pub fn set_max_size(&self, max_size: usize) {
        let old = self.max_size.swap(max_size, Ordering::Relaxed);
        info!("Updated check queue max size from {} to {}", old, max_size);
    }

    /// Resolves when an entry was enqueued since the last wake-up
    pub async fn notified(&self) {
        self.notify.notified().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_enqueue_is_idempotent() {
        let queue = CheckQueue::new(10);

        let first = queue.enqueue(1, false, TriggerSource::PlaylistUpdate).await.unwrap();
        let second = queue.enqueue(1, false, TriggerSource::Discovery).await.unwrap();

        assert_eq!(first, EnqueueOutcome::Enqueued);
        assert_eq!(second, EnqueueOutcome::AlreadyQueued);
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_queue_full_then_room_after_dequeue() {
        let queue = CheckQueue::new(2);
        queue.enqueue(1, false, TriggerSource::ManualCheck).await.unwrap();
        queue.enqueue(2, false, TriggerSource::ManualCheck).await.unwrap();

        let rejected = queue.enqueue(3, false, TriggerSource::ManualCheck).await;
        assert!(matches!(rejected, Err(AutomationError::QueueFull { max_size: 2 })));

        let entry = queue.dequeue().await.unwrap();
        assert_eq!(entry.channel_id, 1);

        let accepted = queue.enqueue(3, false, TriggerSource::ManualCheck).await.unwrap();
        assert_eq!(accepted, EnqueueOutcome::Enqueued);
        assert_eq!(queue.stats().await.total_rejected, 1);
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = CheckQueue::new(10);
        for id in [5, 3, 9] {
            queue.enqueue(id, false, TriggerSource::PlaylistUpdate).await.unwrap();
        }

        let order: Vec<ChannelId> = vec![
            queue.dequeue().await.unwrap().channel_id,
            queue.dequeue().await.unwrap().channel_id,
            queue.dequeue().await.unwrap().channel_id,
        ];
        assert_eq!(order, vec![5, 3, 9]);
        assert!(queue.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn test_bypass_upgrades_without_reordering() {
        let queue = CheckQueue::new(10);
        queue.enqueue(1, false, TriggerSource::PlaylistUpdate).await.unwrap();
        queue.enqueue(2, false, TriggerSource::PlaylistUpdate).await.unwrap();

        let outcome = queue.enqueue(2, true, TriggerSource::GlobalSweep).await.unwrap();
        assert_eq!(outcome, EnqueueOutcome::AlreadyQueued);

        let entries = queue.list().await;
        assert_eq!(entries[0].channel_id, 1);
        assert!(!entries[0].bypass_immunity);
        assert_eq!(entries[1].channel_id, 2);
        assert!(entries[1].bypass_immunity);
    }

    #[tokio::test]
    async fn test_in_flight_blocks_duplicates_but_not_capacity() {
        let queue = CheckQueue::new(1);
        queue.enqueue(1, false, TriggerSource::ManualCheck).await.unwrap();
        queue.dequeue().await.unwrap();

        let duplicate = queue.enqueue(1, false, TriggerSource::ManualCheck).await.unwrap();
        assert_eq!(duplicate, EnqueueOutcome::InFlight);

        let other = queue.enqueue(2, false, TriggerSource::ManualCheck).await.unwrap();
        assert_eq!(other, EnqueueOutcome::Enqueued);

        queue.complete(1, true).await;
        assert!(!queue.contains(1).await);
        assert_eq!(queue.stats().await.total_processed, 1);
    }

    #[tokio::test]
    async fn test_abandoned_entries_can_be_enqueued_again() {
        let queue = CheckQueue::new(5);
        queue.enqueue(4, false, TriggerSource::ManualCheck).await.unwrap();
        queue.enqueue(6, false, TriggerSource::ManualCheck).await.unwrap();
        queue.dequeue().await.unwrap();
        queue.dequeue().await.unwrap();

        assert!(queue.abandon(4).await);
        let released = queue.release_in_flight().await;
        assert_eq!(released, vec![6]);

        let stats = queue.stats().await;
        assert_eq!(stats.total_processed, 0);
        assert_eq!(stats.total_abandoned, 2);
        assert_eq!(
            queue.enqueue(4, false, TriggerSource::ManualCheck).await.unwrap(),
            EnqueueOutcome::Enqueued
        );
    }

    #[tokio::test]
    async fn test_clear_keeps_in_flight() {
        let queue = CheckQueue::new(5);
        for id in 1..=3 {
            queue.enqueue(id, false, TriggerSource::ManualCheck).await.unwrap();
        }
        queue.dequeue().await.unwrap();

        assert_eq!(queue.clear().await, 2);
        assert!(queue.is_empty().await);
        assert_eq!(queue.in_flight_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_producers_never_duplicate() {
        let queue = std::sync::Arc::new(CheckQueue::new(100));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                for id in 0..20 {
                    queue.enqueue(id, false, TriggerSource::PlaylistUpdate).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(queue.len().await, 20);
    }

    proptest! {
        #[test]
        fn prop_each_channel_appears_once(ids in proptest::collection::vec(0i64..15, 0..60)) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            runtime.block_on(async {
                let queue = CheckQueue::new(1000);
                for id in &ids {
                    queue.enqueue(*id, false, TriggerSource::PlaylistUpdate).await.unwrap();
                }
                let entries = queue.list().await;
                let unique: HashSet<ChannelId> = ids.iter().copied().collect();
                assert_eq!(entries.len(), unique.len());
            });
        }
    }
}
