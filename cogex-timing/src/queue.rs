use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::time::Duration;

/// Handle returned when a delayed callback is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeoutId(u64);

impl fmt::Display for TimeoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timeout#{}", self.0)
    }
}

/// Deadline-ordered queue of pending delayed callbacks.
///
/// Entries fire in deadline order; entries sharing a deadline fire in the
/// order they were scheduled. Cancelled entries are dropped lazily from the
/// heap.
#[derive(Debug)]
pub struct TimeoutQueue<T> {
    heap: BinaryHeap<Reverse<(u64, u64)>>,
    pending: HashMap<u64, T>,
    next_seq: u64,
}

impl<T> TimeoutQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            pending: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn schedule(&mut self, now_ns: u64, delay: Duration, payload: T) -> TimeoutId {
        let seq = self.next_seq;
        self.next_seq += 1;
        let deadline = now_ns.saturating_add(delay.as_nanos() as u64);
        self.heap.push(Reverse((deadline, seq)));
        self.pending.insert(seq, payload);
        TimeoutId(seq)
    }

    pub fn cancel(&mut self, id: TimeoutId) -> Option<T> {
        self.pending.remove(&id.0)
    }

    /// Removes and returns the earliest entry whose deadline is `<= now_ns`.
    pub fn pop_due(&mut self, now_ns: u64) -> Option<(TimeoutId, T)> {
        while let Some(Reverse((deadline, seq))) = self.heap.peek().copied() {
            if !self.pending.contains_key(&seq) {
                self.heap.pop();
                continue;
            }
            if deadline > now_ns {
                return None;
            }
            self.heap.pop();
            return self.pending.remove(&seq).map(|p| (TimeoutId(seq), p));
        }
        None
    }

    pub fn next_deadline(&mut self) -> Option<u64> {
        while let Some(Reverse((deadline, seq))) = self.heap.peek().copied() {
            if self.pending.contains_key(&seq) {
                return Some(deadline);
            }
            self.heap.pop();
        }
        None
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<T> Default for TimeoutQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
