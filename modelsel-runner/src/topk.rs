//! Bounded top-k selection.
//!
//! Keeps the k highest-scoring items seen so far in a binary heap whose top is
//! the current worst entry, so each insertion is O(log k). Equal scores are
//! ordered by arrival: the earlier insertion ranks higher and survives
//! eviction.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Outcome of an insert operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// Entry is now in the top k.
    Inserted,
    /// NaN score, zero capacity, or not better than the current worst.
    Skipped,
}

#[derive(Debug)]
struct Entry<T> {
    score: f64,
    seq: u64,
    item: T,
}

impl<T> Entry<T> {
    /// `Greater` means worse: lower score, or equal score and later arrival.
    fn worseness(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.worseness(other) == Ordering::Equal
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.worseness(other)
    }
}

/// Capacity-bounded, score-ordered selection.
#[derive(Debug)]
pub struct BoundedTopK<T> {
    capacity: usize,
    heap: BinaryHeap<Entry<T>>,
    next_seq: u64,
}

impl<T> BoundedTopK<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity.saturating_add(1).min(1024)),
            next_seq: 0,
        }
    }

    /// Offer an item. NaN scores are never admitted.
    pub fn insert(&mut self, item: T, score: f64) -> InsertResult {
        if score.is_nan() || self.capacity == 0 {
            return InsertResult::Skipped;
        }
        // -0.0 and 0.0 tie, so both orderings below must agree.
        let score = score + 0.0;
        let seq = self.next_seq;
        self.next_seq += 1;

        if self.heap.len() == self.capacity {
            match self.heap.peek() {
                // Ties lose to the incumbent, which arrived earlier.
                Some(worst) if score <= worst.score => return InsertResult::Skipped,
                _ => {
                    self.heap.pop();
                }
            }
        }
        self.heap.push(Entry { score, seq, item });
        InsertResult::Inserted
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Lowest retained score, if any.
    pub fn threshold(&self) -> Option<f64> {
        self.heap.peek().map(|e| e.score)
    }

    /// Drain into (item, score) pairs, best first.
    pub fn into_sorted(self) -> Vec<(T, f64)> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|e| (e.item, e.score))
            .collect()
    }
}
