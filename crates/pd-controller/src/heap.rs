//! The dispatch heap and operator-history ring (spec.md §4.H): a min-heap
//! keyed by next-dispatch time, and a bounded ring of retired operators for
//! post-mortem inspection.

use pd_types::ids::RegionId;
use pd_types::operator::OperatorStatus;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::time::Instant;

/// The interval between successive dispatch attempts for a still-running
/// operator (spec.md §4.H `Dispatch` pushes "now + step_interval"; the exact
/// interval isn't named, chosen here to match the region heartbeat cadence
/// from spec.md §4.C so a step rarely goes more than one heartbeat unchecked).
pub const STEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeapEntry {
    due_at: Instant,
    region: RegionId,
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.due_at.cmp(&other.due_at).then_with(|| self.region.get().cmp(&other.region.get()))
    }
}

/// A min-heap by `due_at`, implemented with a max-heap of `Reverse` entries.
#[derive(Debug, Default)]
pub struct DispatchHeap {
    heap: BinaryHeap<Reverse<HeapEntry>>,
}

impl DispatchHeap {
    pub fn new() -> Self {
        Self { heap: BinaryHeap::new() }
    }

    pub fn push(&mut self, region: RegionId, due_at: Instant) {
        self.heap.push(Reverse(HeapEntry { due_at, region }));
    }

    /// Pops the head if it is due by `now`, signalling whether another
    /// entry is already due as well.
    pub fn pop_due(&mut self, now: Instant) -> Option<(RegionId, bool)> {
        let Reverse(head) = self.heap.peek()?;
        if head.due_at > now {
            return None;
        }
        let Reverse(popped) = self.heap.pop()?;
        let has_more = self.heap.peek().map(|Reverse(e)| e.due_at <= now).unwrap_or(false);
        Some((popped.region, has_more))
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub region: RegionId,
    pub description: String,
    pub status: OperatorStatus,
    pub finished_at: Instant,
}

/// A fixed-capacity ring of retired operators (spec.md §4.H
/// "operator-history ring").
#[derive(Debug)]
pub struct HistoryRing {
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
}

impl HistoryRing {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), entries: VecDeque::with_capacity(capacity.max(1)) }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn pop_due_returns_none_before_scheduled_time() {
        let mut heap = DispatchHeap::new();
        let now = Instant::now();
        heap.push(RegionId::new(1), now + Duration::from_secs(60));
        assert!(heap.pop_due(now).is_none());
    }

    #[test]
    fn pop_due_reports_more_when_another_entry_is_also_due() {
        let mut heap = DispatchHeap::new();
        let now = Instant::now();
        heap.push(RegionId::new(1), now);
        heap.push(RegionId::new(2), now);
        let (_region, has_more) = heap.pop_due(now).expect("first entry due");
        assert!(has_more);
    }

    #[test]
    fn history_ring_evicts_oldest_when_full() {
        let mut ring = HistoryRing::new(2);
        let now = Instant::now();
        for i in 1..=3u64 {
            ring.push(HistoryEntry {
                region: RegionId::new(i),
                description: format!("op-{i}"),
                status: OperatorStatus::Success,
                finished_at: now,
            });
        }
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.iter().next().unwrap().region, RegionId::new(2));
    }
}
