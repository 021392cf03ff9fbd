//! Bounded FIFO history
//!
//! Every in-memory history in the pipeline is capped; inserting past the cap
//! evicts the oldest entry first.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default cap for pipeline histories
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// A capped queue that drops its oldest entries on overflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundedHistory<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> Default for BoundedHistory<T> {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl<T> BoundedHistory<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, evicting from the front while over capacity
    pub fn push(&mut self, entry: T) {
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.entries.iter()
    }

    /// The last `n` entries, oldest first
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &T> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_evicts_oldest() {
        let mut history = BoundedHistory::new(100);
        for i in 0..150 {
            history.push(i);
        }
        assert_eq!(history.len(), 100);
        assert_eq!(history.iter().next(), Some(&50));
        assert_eq!(history.latest(), Some(&149));
        assert!(history.iter().all(|&v| v >= 50));
    }

    #[test]
    fn test_recent_returns_tail_in_order() {
        let mut history = BoundedHistory::new(10);
        for i in 0..6 {
            history.push(i);
        }
        let tail: Vec<_> = history.recent(3).copied().collect();
        assert_eq!(tail, vec![3, 4, 5]);

        let all: Vec<_> = history.recent(20).copied().collect();
        assert_eq!(all.len(), 6);
    }

    #[test]
    fn test_zero_capacity_stays_empty() {
        let mut history = BoundedHistory::new(0);
        history.push("x");
        assert!(history.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut history = BoundedHistory::new(5);
        history.push(1.0);
        history.push(2.0);
        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.capacity(), 5);
    }
}
