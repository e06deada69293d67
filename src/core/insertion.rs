//! Deferred barrier insertion.
//!
//! Barriers are requested while a block is being walked but only handed to
//! the host after the walk completes, so instruction positions stay stable
//! during the walk.

use super::adaptor::IrAdaptor;
use super::ir::Edge;

/// Where an inserted node comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeOrigin<I> {
    /// The instruction the barrier services.
    pub semantic: I,
    /// Whether it is valid to OSR exit at the inserted node.
    pub exit_ok: bool,
}

impl<I> NodeOrigin<I> {
    pub fn new(semantic: I) -> Self {
        Self {
            semantic,
            exit_ok: true,
        }
    }

    pub fn with_invalid_exit(self) -> Self {
        Self {
            semantic: self.semantic,
            exit_ok: false,
        }
    }
}

/// A `FencedStoreBarrier` waiting to be spliced into a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BarrierInsertion<I> {
    /// Insert before the instruction currently at this position.
    pub index: usize,
    pub origin: NodeOrigin<I>,
    /// The barriered object, always with a known-cell use kind.
    pub base: Edge<I>,
}

/// Per-block queue of pending barriers.
#[derive(Debug)]
pub struct InsertionSet<I> {
    pending: Vec<BarrierInsertion<I>>,
}

impl<I> Default for InsertionSet<I> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
        }
    }
}

impl<I: Copy + Eq> InsertionSet<I> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a barrier. A second request for the same base at the same
    /// position is dropped; returns whether the request was queued.
    pub fn insert(&mut self, insertion: BarrierInsertion<I>) -> bool {
        let duplicate = self
            .pending
            .iter()
            .any(|p| p.index == insertion.index && p.base.node == insertion.base.node);
        if duplicate {
            return false;
        }
        self.pending.push(insertion);
        true
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Hand every queued barrier to the host and empty the queue. Returns the
    /// number of barriers applied.
    pub fn execute<A>(&mut self, adaptor: &mut A, block: A::BlockRef) -> usize
    where
        A: IrAdaptor<InstRef = I> + ?Sized,
    {
        if self.pending.is_empty() {
            return 0;
        }
        // Stable, so barriers requested for one position keep request order.
        self.pending.sort_by_key(|p| p.index);
        adaptor.insert_barriers(block, &self.pending);
        let count = self.pending.len();
        self.pending.clear();
        count
    }
}

#[cfg(test)]
impl<I> InsertionSet<I> {
    fn len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ir::UseKind;

    fn barrier(index: usize, base: u32) -> BarrierInsertion<u32> {
        BarrierInsertion {
            index,
            origin: NodeOrigin::new(index as u32),
            base: Edge::new(base, UseKind::KnownCell),
        }
    }

    #[test]
    fn test_duplicate_requests_are_dropped() {
        let mut set = InsertionSet::new();
        assert!(set.insert(barrier(3, 7)));
        assert!(!set.insert(barrier(3, 7)));
        assert!(set.insert(barrier(3, 8)));
        assert!(set.insert(barrier(5, 7)));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_origin_invalid_exit() {
        let origin = NodeOrigin::new(4u32);
        assert!(origin.exit_ok);
        let origin = origin.with_invalid_exit();
        assert!(!origin.exit_ok);
        assert_eq!(origin.semantic, 4);
    }
}
