//! Fixed-capacity top-k selection

use crate::index::types::DocId;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A scored document
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredDoc {
    pub doc_id: DocId,
    pub score: f32,
}

impl ScoredDoc {
    /// Rank order: higher score first, lower docID on ties
    fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then(self.doc_id.cmp(&other.doc_id))
    }
}

/// Heap entry ordered so the worst-ranked document sits at the top
#[derive(Debug, Clone, Copy)]
struct Worst(ScoredDoc);

impl PartialEq for Worst {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Worst {}

impl PartialOrd for Worst {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Worst {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.rank_cmp(&other.0)
    }
}

/// Min-heap of the k best documents seen so far
pub struct TopKHeap {
    heap: BinaryHeap<Worst>,
    capacity: usize,
}

impl TopKHeap {
    pub fn new(k: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(1 << 16)),
            capacity: k,
        }
    }

    /// Lowest score currently kept, once the heap is full
    #[inline]
    pub fn threshold(&self) -> Option<f32> {
        if self.is_full() {
            self.heap.peek().map(|w| w.0.score)
        } else {
            None
        }
    }

    /// Insert a document if it outranks the current minimum.
    /// Returns true if it was kept.
    pub fn try_insert(&mut self, doc: ScoredDoc) -> bool {
        if self.heap.len() < self.capacity {
            self.heap.push(Worst(doc));
            return true;
        }
        match self.heap.peek() {
            Some(worst) if doc.rank_cmp(&worst.0) == Ordering::Less => {
                self.heap.pop();
                self.heap.push(Worst(doc));
                true
            }
            _ => false,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.capacity
    }

    /// Entries by descending score, ascending docID on ties
    pub fn into_sorted_vec(self) -> Vec<ScoredDoc> {
        let mut docs: Vec<ScoredDoc> = self.heap.into_iter().map(|w| w.0).collect();
        docs.sort_by(ScoredDoc::rank_cmp);
        docs
    }
}
