//! Backoff tracking for resources that failed to fetch.
//!
//! Every failed fetch marks its tile key absent. Once a key has failed
//! `max_attempts` times it is not retried until `cooldown` has elapsed since
//! the last attempt; after that the record is dropped and retries resume, so a
//! resource that was only transiently unavailable recovers on its own.
//!
//! Before the attempt cap is reached, consecutive attempts are still spaced by
//! at least `min_check_interval` so a tile visible every frame does not retry
//! every frame.
//!
//! The number of records is bounded by `max_records`. When a new failure
//! pushes the map past the bound, records whose cooldown has passed are
//! dropped first, then the least recently attempted ones.
//!
//! # State Machine
//!
//! ```text
//! (no record) --failure--> Absent(1) --failure--> ... --> Absent(max)
//!      ^                        |                              |
//!      +------ success ---------+                              |
//!      +------ cooldown elapsed -------------------------------+
//! ```

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::tile::TileKey;

/// Default number of failures before a key is held back.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default minimum spacing between attempts (10 seconds).
pub const DEFAULT_MIN_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Default hold-back period after `max_attempts` failures (60 seconds).
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Default bound on tracked keys.
pub const DEFAULT_MAX_RECORDS: usize = 10_000;

/// Retry policy for absent resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbsentResourceConfig {
    /// Failures after which the key is held back until the cooldown elapses.
    pub max_attempts: u32,
    /// Minimum time between attempts while under the cap.
    pub min_check_interval: Duration,
    /// Time after the last attempt at which the record is reset.
    pub cooldown: Duration,
    /// Keys remembered before the oldest records are dropped.
    pub max_records: usize,
}

impl Default for AbsentResourceConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            min_check_interval: DEFAULT_MIN_CHECK_INTERVAL,
            cooldown: DEFAULT_COOLDOWN,
            max_records: DEFAULT_MAX_RECORDS,
        }
    }
}

/// Failure history of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsentRecord {
    pub attempts: u32,
    pub last_attempt: Instant,
}

/// Concurrent map of absent resources.
#[derive(Debug, Default)]
pub struct AbsentResourceTracker {
    config: AbsentResourceConfig,
    records: DashMap<TileKey, AbsentRecord>,
}

impl AbsentResourceTracker {
    pub fn new(config: AbsentResourceConfig) -> Self {
        Self {
            config,
            records: DashMap::new(),
        }
    }

    pub fn config(&self) -> &AbsentResourceConfig {
        &self.config
    }

    /// Records a failed attempt now.
    pub fn mark_absent(&self, key: &TileKey) -> u32 {
        self.mark_absent_at(key, Instant::now())
    }

    /// Records a failed attempt at `now`, returning the attempt count.
    pub fn mark_absent_at(&self, key: &TileKey, now: Instant) -> u32 {
        let attempts = {
            let mut record = self.records.entry(key.clone()).or_insert(AbsentRecord {
                attempts: 0,
                last_attempt: now,
            });
            record.attempts += 1;
            record.last_attempt = now;
            record.attempts
        };
        if self.records.len() > self.config.max_records.max(1) {
            self.prune(key, now);
        }
        attempts
    }

    /// Shrinks the map to nine tenths of `max_records`, sparing `keep`.
    fn prune(&self, keep: &TileKey, now: Instant) {
        let cooldown = self.config.cooldown;
        self.records
            .retain(|_, record| now.saturating_duration_since(record.last_attempt) < cooldown);

        let max = self.config.max_records.max(1);
        if self.records.len() <= max {
            return;
        }
        let target = max - max / 10;
        let mut oldest: Vec<(Instant, TileKey)> = self
            .records
            .iter()
            .filter(|entry| entry.key() != keep)
            .map(|entry| (entry.value().last_attempt, entry.key().clone()))
            .collect();
        oldest.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let excess = self.records.len().saturating_sub(target);
        for (_, key) in oldest.into_iter().take(excess) {
            self.records.remove(&key);
        }
        tracing::debug!(
            remaining = self.records.len(),
            max_records = max,
            "Pruned absent resource records"
        );
    }

    /// Clears the record after a successful fetch.
    pub fn unmark(&self, key: &TileKey) {
        self.records.remove(key);
    }

    /// Whether a fetch for the key may be attempted now.
    pub fn should_attempt(&self, key: &TileKey) -> bool {
        self.should_attempt_at(key, Instant::now())
    }

    /// Whether a fetch for the key may be attempted at `now`.
    ///
    /// Expired records are removed as a side effect.
    pub fn should_attempt_at(&self, key: &TileKey, now: Instant) -> bool {
        let record = match self.records.get(key) {
            Some(entry) => *entry.value(),
            None => return true,
        };

        let elapsed = now.saturating_duration_since(record.last_attempt);
        if elapsed >= self.config.cooldown {
            self.records
                .remove_if(key, |_, current| current.last_attempt == record.last_attempt);
            return true;
        }
        if record.attempts >= self.config.max_attempts {
            return false;
        }
        elapsed >= self.config.min_check_interval
    }

    /// Negation of [`should_attempt`](Self::should_attempt).
    pub fn is_absent(&self, key: &TileKey) -> bool {
        !self.should_attempt(key)
    }

    /// Failure count recorded for a key.
    pub fn attempts(&self, key: &TileKey) -> Option<u32> {
        self.records.get(key).map(|entry| entry.attempts)
    }

    pub fn record(&self, key: &TileKey) -> Option<AbsentRecord> {
        self.records.get(key).map(|entry| *entry.value())
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(col: i32) -> TileKey {
        TileKey::new(3, 1, col, "test")
    }

    fn tracker(max_attempts: u32, min_check_secs: u64, cooldown_secs: u64) -> AbsentResourceTracker {
        AbsentResourceTracker::new(AbsentResourceConfig {
            max_attempts,
            min_check_interval: Duration::from_secs(min_check_secs),
            cooldown: Duration::from_secs(cooldown_secs),
            max_records: DEFAULT_MAX_RECORDS,
        })
    }

    #[test]
    fn test_unknown_key_may_be_attempted() {
        let tracker = AbsentResourceTracker::default();
        assert!(tracker.should_attempt(&key(1)));
        assert_eq!(tracker.attempts(&key(1)), None);
    }

    #[test]
    fn test_mark_increments_attempts() {
        let tracker = AbsentResourceTracker::default();
        assert_eq!(tracker.mark_absent(&key(1)), 1);
        assert_eq!(tracker.mark_absent(&key(1)), 2);
        assert_eq!(tracker.attempts(&key(1)), Some(2));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_unmark_clears_record() {
        let tracker = AbsentResourceTracker::default();
        tracker.mark_absent(&key(1));
        tracker.unmark(&key(1));
        assert!(tracker.should_attempt(&key(1)));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_backoff_after_max_attempts_until_cooldown() {
        let tracker = tracker(3, 0, 60);
        let start = Instant::now();
        let k = key(1);

        tracker.mark_absent_at(&k, start);
        assert!(tracker.should_attempt_at(&k, start));
        tracker.mark_absent_at(&k, start);
        assert!(tracker.should_attempt_at(&k, start));
        tracker.mark_absent_at(&k, start);

        assert!(!tracker.should_attempt_at(&k, start));
        assert!(!tracker.should_attempt_at(&k, start + Duration::from_secs(59)));
        assert!(tracker.should_attempt_at(&k, start + Duration::from_secs(60)));

        // Cooldown reset the record, so retries start from scratch
        assert_eq!(tracker.attempts(&k), None);
    }

    #[test]
    fn test_min_check_interval_spaces_attempts() {
        let tracker = tracker(3, 10, 60);
        let start = Instant::now();
        let k = key(2);

        tracker.mark_absent_at(&k, start);
        assert!(!tracker.should_attempt_at(&k, start + Duration::from_secs(5)));
        assert!(tracker.should_attempt_at(&k, start + Duration::from_secs(10)));
    }

    #[test]
    fn test_keys_are_independent() {
        let tracker = tracker(1, 0, 60);
        tracker.mark_absent(&key(1));
        assert!(tracker.is_absent(&key(1)));
        assert!(!tracker.is_absent(&key(2)));
    }

    #[test]
    fn test_cooldown_with_real_clock() {
        let tracker = AbsentResourceTracker::new(AbsentResourceConfig {
            max_attempts: 1,
            min_check_interval: Duration::ZERO,
            cooldown: Duration::from_millis(20),
            max_records: DEFAULT_MAX_RECORDS,
        });
        tracker.mark_absent(&key(1));
        assert!(!tracker.should_attempt(&key(1)));
        std::thread::sleep(Duration::from_millis(30));
        assert!(tracker.should_attempt(&key(1)));
    }

    #[test]
    fn test_record_count_is_bounded() {
        let tracker = AbsentResourceTracker::new(AbsentResourceConfig {
            max_records: 100,
            ..AbsentResourceConfig::default()
        });
        let start = Instant::now();
        for col in 0..1_000 {
            tracker.mark_absent_at(&key(col), start + Duration::from_millis(col as u64));
            assert!(tracker.len() <= 100);
        }

        // The newest failures survive, the oldest were dropped
        assert_eq!(tracker.attempts(&key(999)), Some(1));
        assert_eq!(tracker.attempts(&key(0)), None);
    }

    #[test]
    fn test_expired_records_are_pruned_first() {
        let tracker = AbsentResourceTracker::new(AbsentResourceConfig {
            max_attempts: 1,
            min_check_interval: Duration::ZERO,
            cooldown: Duration::from_secs(60),
            max_records: 4,
        });
        let start = Instant::now();
        for col in 0..4 {
            tracker.mark_absent_at(&key(col), start);
        }
        let later = start + Duration::from_secs(61);
        tracker.mark_absent_at(&key(10), later);

        assert_eq!(tracker.len(), 1);
        assert!(!tracker.should_attempt_at(&key(10), later));
    }
}
