//! Over-limit streak tracking
//!
//! Keeps one [`OverageRecord`] per pod name that has been observed at or
//! above the memory threshold, and decides when a streak is long enough to
//! terminate the pod.
//!
//! Counting starts at zero: the first over-limit observation creates the
//! record with a count of 0 and every later one adds 1. With `kill_after = K`
//! the pod is killed on its (K+1)-th consecutive over-limit observation.
//!
//! Below-limit readings never touch a record. Records are only forgotten by
//! [`OverageTracker::expire`], once older than `kill_sleep × (count + 1)`.

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Streak state for one pod
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverageRecord {
    /// When the current streak started
    pub first_observed_at: Instant,
    /// Over-limit observations after the first one
    pub consecutive_count: u32,
}

impl OverageRecord {
    /// How long the record survives without a kill
    pub fn grace_window(&self, kill_sleep: Duration) -> Duration {
        kill_sleep.saturating_mul(self.consecutive_count.saturating_add(1))
    }

    fn is_expired(&self, now: Instant, kill_sleep: Duration) -> bool {
        now.saturating_duration_since(self.first_observed_at) > self.grace_window(kill_sleep)
    }
}

/// Outcome of feeding one sample to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Below the threshold, nothing changed
    Below,
    /// Over the threshold, streak recorded with the given count
    Tracking { consecutive_count: u32 },
    /// Streak reached `kill_after`; the record has been removed
    Kill { consecutive_count: u32 },
}

/// Per-pod over-limit state machine
#[derive(Debug)]
pub struct OverageTracker {
    records: HashMap<String, OverageRecord>,
    /// Threshold in percent, inclusive
    memory_limit: f64,
    kill_after: u32,
    kill_sleep: Duration,
}

impl OverageTracker {
    pub fn new(memory_limit: u32, kill_after: u32, kill_sleep: Duration) -> Self {
        Self {
            records: HashMap::new(),
            memory_limit: f64::from(memory_limit),
            kill_after,
            kill_sleep,
        }
    }

    /// Record one observation of `pod_name` at `percentage`
    pub fn observe(&mut self, pod_name: &str, percentage: f64, now: Instant) -> Decision {
        if percentage < self.memory_limit {
            return Decision::Below;
        }

        let record = self
            .records
            .entry(pod_name.to_string())
            .and_modify(|r| r.consecutive_count = r.consecutive_count.saturating_add(1))
            .or_insert(OverageRecord {
                first_observed_at: now,
                consecutive_count: 0,
            });
        let consecutive_count = record.consecutive_count;

        if consecutive_count >= self.kill_after {
            self.records.remove(pod_name);
            Decision::Kill { consecutive_count }
        } else {
            Decision::Tracking { consecutive_count }
        }
    }

    /// Drop records whose grace window has passed, returning their pod names
    pub fn expire(&mut self, now: Instant) -> Vec<String> {
        let expired: Vec<String> = self
            .records
            .iter()
            .filter(|(_, record)| record.is_expired(now, self.kill_sleep))
            .map(|(name, _)| name.clone())
            .collect();

        for name in &expired {
            self.records.remove(name);
        }

        expired
    }

    pub fn get(&self, pod_name: &str) -> Option<&OverageRecord> {
        self.records.get(pod_name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
