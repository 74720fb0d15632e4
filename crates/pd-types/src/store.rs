//! A physical server hosting region peers (spec.md §3 "Store").

use crate::ids::StoreId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::time::{Duration, SystemTime};

/// A store never re-enters `Up` once it is `Tombstone`; `Offline -> Tombstone`
/// is terminal and only legal once the store holds no replicas (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreState {
    Up,
    Offline,
    Tombstone,
}

impl StoreState {
    /// Enforces the one-way lifecycle invariant from spec.md §3.
    pub fn can_transition_to(self, next: StoreState) -> bool {
        use StoreState::*;
        matches!(
            (self, next),
            (Up, Up) | (Up, Offline) | (Up, Tombstone) | (Offline, Offline) | (Offline, Tombstone)
                | (Tombstone, Tombstone)
        )
    }
}

/// A simple windowed moving-average filter with a max-deviation guard: a
/// sample that differs from the current average by more than
/// `max_deviation` is folded in at reduced weight instead of accepted
/// outright, damping single-heartbeat spikes in reported available space.
#[derive(Debug, Clone)]
pub struct MovingAverageFilter {
    window: VecDeque<i64>,
    window_size: usize,
    max_deviation: i64,
}

impl MovingAverageFilter {
    pub fn new(window_size: usize, max_deviation: i64) -> Self {
        Self { window: VecDeque::with_capacity(window_size.max(1)), window_size: window_size.max(1), max_deviation }
    }

    /// Folds in a new raw sample and returns the smoothed value. The result
    /// is clamped to be non-negative (spec.md §3 invariant on `available`).
    pub fn update(&mut self, sample: i64) -> u64 {
        let current_avg = self.average();
        let accepted = if self.window.is_empty() {
            sample
        } else if (sample - current_avg).abs() > self.max_deviation {
            // Outlier: move the average only a quarter of the way toward it.
            current_avg + (sample - current_avg) / 4
        } else {
            sample
        };

        if self.window.len() == self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(accepted);
        self.average().max(0) as u64
    }

    fn average(&self) -> i64 {
        if self.window.is_empty() {
            0
        } else {
            self.window.iter().sum::<i64>() / self.window.len() as i64
        }
    }
}

/// Default window sized for a 10-second heartbeat cadence (spec.md §4.C).
pub fn default_available_space_filter() -> MovingAverageFilter {
    MovingAverageFilter::new(6, 64 * 1024 * 1024)
}

/// A token-bucket rate limiter scoped to a single store action (AddPeer /
/// RemovePeer), consulted by the operator controller before admitting a
/// step that would touch the store (spec.md §4.H).
#[derive(Debug, Clone)]
pub struct ActionRateLimiter {
    capacity: u32,
    tokens: u32,
    refill_interval: Duration,
    last_refill: SystemTime,
}

impl ActionRateLimiter {
    pub fn new(capacity: u32, refill_interval: Duration) -> Self {
        Self { capacity, tokens: capacity, refill_interval, last_refill: SystemTime::now() }
    }

    fn refill(&mut self) {
        let now = SystemTime::now();
        if let Ok(elapsed) = now.duration_since(self.last_refill) {
            if elapsed >= self.refill_interval {
                self.tokens = self.capacity;
                self.last_refill = now;
            }
        }
    }

    pub fn try_acquire(&mut self) -> bool {
        self.refill();
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    pub fn release(&mut self) {
        self.tokens = (self.tokens + 1).min(self.capacity);
    }

    pub fn in_use(&self) -> u32 {
        self.capacity.saturating_sub(self.tokens)
    }

    pub fn limit(&self) -> u32 {
        self.capacity
    }
}

#[derive(Debug, Clone)]
pub struct Store {
    pub id: StoreId,
    pub address: String,
    pub labels: BTreeMap<String, String>,
    pub state: StoreState,
    pub last_heartbeat: SystemTime,

    pub capacity_bytes: u64,
    pub used_bytes: u64,
    raw_available_bytes: u64,
    available_filter: MovingAverageFilter,

    pub region_count: u32,
    pub leader_count: u32,
    pub pending_peer_count: u32,
    pub learner_count: u32,
    pub region_size: u64,
    pub leader_size: u64,

    pub sending_snap_count: u32,
    pub receiving_snap_count: u32,
    pub applying_snap_count: u32,
    pub is_busy: bool,

    pub add_peer_limiter: ActionRateLimiter,
    pub remove_peer_limiter: ActionRateLimiter,
}

impl Store {
    pub fn new(id: StoreId, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
            labels: BTreeMap::new(),
            state: StoreState::Up,
            last_heartbeat: SystemTime::now(),
            capacity_bytes: 0,
            used_bytes: 0,
            raw_available_bytes: 0,
            available_filter: default_available_space_filter(),
            region_count: 0,
            leader_count: 0,
            pending_peer_count: 0,
            learner_count: 0,
            region_size: 0,
            leader_size: 0,
            sending_snap_count: 0,
            receiving_snap_count: 0,
            applying_snap_count: 0,
            is_busy: false,
            add_peer_limiter: ActionRateLimiter::new(8, Duration::from_secs(1)),
            remove_peer_limiter: ActionRateLimiter::new(8, Duration::from_secs(1)),
        }
    }

    pub fn is_up(&self) -> bool {
        matches!(self.state, StoreState::Up)
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self.state, StoreState::Tombstone)
    }

    /// Smoothed, non-negative available-space figure (spec.md §3 invariant).
    pub fn available_bytes(&self) -> u64 {
        self.raw_available_bytes
    }

    /// Feeds a new raw `available` reading from a store heartbeat through
    /// the smoothing filter and updates both the raw and smoothed figures.
    pub fn observe_available(&mut self, raw_available: u64) {
        self.raw_available_bytes = self.available_filter.update(raw_available as i64);
    }

    pub fn seconds_since_heartbeat(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.last_heartbeat)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tombstone_is_terminal() {
        assert!(StoreState::Offline.can_transition_to(StoreState::Tombstone));
        assert!(!StoreState::Tombstone.can_transition_to(StoreState::Up));
        assert!(!StoreState::Tombstone.can_transition_to(StoreState::Offline));
        assert!(StoreState::Up.can_transition_to(StoreState::Offline));
    }

    #[test]
    fn available_bytes_never_negative() {
        let mut f = MovingAverageFilter::new(3, 10);
        let smoothed = f.update(-500);
        assert_eq!(smoothed, 0);
    }

    #[test]
    fn rate_limiter_denies_when_exhausted() {
        let mut l = ActionRateLimiter::new(2, Duration::from_secs(60));
        assert!(l.try_acquire());
        assert!(l.try_acquire());
        assert!(!l.try_acquire());
        assert_eq!(l.in_use(), 2);
    }
}
