//! Per-channel cooldown tracking
//!
//! A channel is immune for two hours after its last completed check. Reads and
//! writes go through a sharded concurrent map so checks of unrelated channels
//! never contend on a single lock.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::trace;

use crate::models::ChannelId;

/// Length of the cooldown window in hours
pub const IMMUNITY_WINDOW_HOURS: i64 = 2;

#[derive(Debug)]
pub struct ImmunityTracker {
    last_checked: DashMap<ChannelId, DateTime<Utc>>,
    window: Duration,
}

impl ImmunityTracker {
    pub fn new() -> Self {
        Self {
            last_checked: DashMap::new(),
            window: Duration::hours(IMMUNITY_WINDOW_HOURS),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_immune(&self, channel_id: ChannelId) -> bool {
        self.is_immune_at(channel_id, Utc::now())
    }

    /// Immune while no more than the window has elapsed since the last check
    pub fn is_immune_at(&self, channel_id: ChannelId, now: DateTime<Utc>) -> bool {
        self.last_checked
            .get(&channel_id)
            .is_some_and(|checked| now.signed_duration_since(*checked) <= self.window)
    }

    /// Record a completed check. Older timestamps never replace newer ones.
    pub fn mark_checked(&self, channel_id: ChannelId, checked_at: DateTime<Utc>) {
        self.last_checked
            .entry(channel_id)
            .and_modify(|current| {
                if checked_at > *current {
                    *current = checked_at;
                }
            })
            .or_insert(checked_at);
        trace!("Channel {} marked checked at {}", channel_id, checked_at);
    }

    pub fn last_checked(&self, channel_id: ChannelId) -> Option<DateTime<Utc>> {
        self.last_checked.get(&channel_id).map(|entry| *entry)
    }

    /// When the channel stops being immune, if it currently is
    pub fn immune_until(&self, channel_id: ChannelId) -> Option<DateTime<Utc>> {
        self.last_checked(channel_id).map(|checked| checked + self.window)
    }

    pub fn immune_count_at(&self, now: DateTime<Utc>) -> usize {
        self.last_checked
            .iter()
            .filter(|entry| now.signed_duration_since(*entry.value()) <= self.window)
            .count()
    }

    /// Forget channels whose window ended long ago
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let before = self.last_checked.len();
        self.last_checked
            .retain(|_, checked| now.signed_duration_since(*checked) <= self.window);
        before - self.last_checked.len()
    }
}

impl Default for ImmunityTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_unknown_channel_is_not_immune() {
        let tracker = ImmunityTracker::new();
        assert!(!tracker.is_immune(1));
        assert!(tracker.last_checked(1).is_none());
    }

    #[test]
    fn test_window_boundary() {
        let tracker = ImmunityTracker::new();
        let checked = Utc::now();
        tracker.mark_checked(5, checked);

        assert!(tracker.is_immune_at(5, checked));
        assert!(tracker.is_immune_at(5, checked + Duration::minutes(119)));
        assert!(tracker.is_immune_at(5, checked + Duration::hours(2)));
        assert!(!tracker.is_immune_at(5, checked + Duration::hours(2) + Duration::milliseconds(1)));
    }

    #[test]
    fn test_older_timestamp_does_not_overwrite() {
        let tracker = ImmunityTracker::new();
        let newer = Utc::now();
        tracker.mark_checked(9, newer);
        tracker.mark_checked(9, newer - Duration::hours(5));
        assert_eq!(tracker.last_checked(9), Some(newer));

        let newest = newer + Duration::minutes(1);
        tracker.mark_checked(9, newest);
        assert_eq!(tracker.last_checked(9), Some(newest));
    }

    #[test]
    fn test_prune_drops_expired_channels() {
        let tracker = ImmunityTracker::new();
        let now = Utc::now();
        tracker.mark_checked(1, now - Duration::hours(3));
        tracker.mark_checked(2, now);

        assert_eq!(tracker.immune_count_at(now), 1);
        assert_eq!(tracker.prune(now), 1);
        assert!(tracker.last_checked(1).is_none());
        assert!(tracker.last_checked(2).is_some());
    }

    proptest! {
        #[test]
        fn prop_last_checked_is_maximum_of_marks(offsets in proptest::collection::vec(-10_000i64..10_000, 1..40)) {
            let tracker = ImmunityTracker::new();
            let base = Utc::now();
            for offset in &offsets {
                tracker.mark_checked(3, base + Duration::seconds(*offset));
            }
            let expected = offsets.iter().max().map(|o| base + Duration::seconds(*o));
            prop_assert_eq!(tracker.last_checked(3), expected);
        }

        #[test]
        fn prop_immune_right_after_mark(elapsed_secs in 0i64..(4 * 3600)) {
            let tracker = ImmunityTracker::new();
            let checked = Utc::now();
            tracker.mark_checked(11, checked);
            let now = checked + Duration::seconds(elapsed_secs);
            prop_assert_eq!(tracker.is_immune_at(11, now), elapsed_secs <= 2 * 3600);
        }
    }
}
