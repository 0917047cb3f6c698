//! Bounded selection of the most decisive tokens.
//!
//! A [`TokenHeap`] keeps the N tokens whose probabilities sit furthest from
//! the 0.5 midpoint. Entries are held sorted ascending by decisiveness, so
//! the weakest entry is always at the front and is the one evicted when a
//! stronger token arrives at capacity. Ties break toward higher message
//! frequency, then higher token complexity, and a new entry that ties an old
//! one on all three ranks displaces ahead of it.

/// One ranked token.
#[derive(Debug, Clone)]
pub struct HeapEntry {
    pub probability: f64,
    /// Distance from the 0.5 midpoint.
    pub delta: f64,
    pub key: u64,
    pub frequency: i64,
    pub complexity: u32,
}

/// Sorted, capacity-bounded collection of [`HeapEntry`].
#[derive(Debug)]
pub struct TokenHeap {
    capacity: usize,
    /// Ascending by (delta, frequency, complexity); index 0 is weakest.
    entries: Vec<HeapEntry>,
}

impl TokenHeap {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Offer a token. Returns whether it was retained.
    pub fn insert(&mut self, probability: f64, key: u64, frequency: i64, complexity: u32) -> bool {
        let delta = (0.5 - probability).abs();

        // Entries the newcomer outranks form a prefix of the sorted vec.
        let mut pos = 0;
        for entry in &self.entries {
            let outranks = delta > entry.delta
                || (delta == entry.delta
                    && (frequency > entry.frequency
                        || (frequency == entry.frequency && complexity >= entry.complexity)));
            if outranks {
                pos += 1;
            } else {
                break;
            }
        }

        if pos == 0 && self.entries.len() >= self.capacity {
            return false;
        }

        self.entries.insert(
            pos,
            HeapEntry {
                probability,
                delta,
                key,
                frequency,
                complexity,
            },
        );
        if self.entries.len() > self.capacity {
            self.entries.remove(0);
        }
        true
    }

    /// Entries from most to least decisive.
    pub fn iter_decisive(&self) -> impl Iterator<Item = &HeapEntry> {
        self.entries.iter().rev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(heap: &mut TokenHeap, probabilities: &[f64]) {
        for (i, &p) in probabilities.iter().enumerate() {
            heap.insert(p, i as u64, 1, 1);
        }
    }

    #[test]
    fn keeps_most_decisive() {
        let mut heap = TokenHeap::with_capacity(3);
        fill(&mut heap, &[0.6, 0.99, 0.45, 0.01, 0.92]);
        let kept: Vec<f64> = heap.iter_decisive().map(|e| e.probability).collect();
        assert_eq!(kept, vec![0.01, 0.99, 0.92]);
    }

    #[test]
    fn rejects_weaker_than_floor_at_capacity() {
        let mut heap = TokenHeap::with_capacity(2);
        assert!(heap.insert(0.99, 1, 1, 1));
        assert!(heap.insert(0.01, 2, 1, 1));
        assert!(!heap.insert(0.6, 3, 1, 1));
        assert_eq!(heap.len(), 2);
    }

    #[test]
    fn frequency_breaks_delta_ties() {
        let mut heap = TokenHeap::with_capacity(2);
        heap.insert(0.8, 1, 1, 1);
        heap.insert(0.8, 2, 5, 1);
        heap.insert(0.8, 3, 3, 1);
        let kept: Vec<u64> = heap.iter_decisive().map(|e| e.key).collect();
        // key 1 (frequency 1) was the weakest and got evicted
        assert_eq!(kept, vec![2, 3]);
    }

    #[test]
    fn newer_wins_full_tie() {
        let mut heap = TokenHeap::with_capacity(2);
        heap.insert(0.8, 1, 1, 1);
        heap.insert(0.8, 2, 1, 1);
        heap.insert(0.8, 3, 1, 1);
        let kept: Vec<u64> = heap.iter_decisive().map(|e| e.key).collect();
        assert_eq!(kept, vec![3, 2]);
    }

    #[test]
    fn both_extremes_rank_equally() {
        let mut heap = TokenHeap::with_capacity(4);
        fill(&mut heap, &[0.95, 0.05, 0.5, 0.3]);
        assert_eq!(heap.len(), 4);
        let deltas: Vec<f64> = heap.iter_decisive().map(|e| e.delta).collect();
        assert!((deltas[0] - 0.45).abs() < 1e-12);
        assert!((deltas[1] - 0.45).abs() < 1e-12);
    }
}
