//! The seam between the shared block walk and the two barrier algorithms.

use super::config::PhaseMode;
use super::walker::BlockWalker;
use crate::core::adaptor::IrAdaptor;
use crate::core::ir::Edge;

/// Mode-specific hooks called by [`BlockWalker`].
pub trait BarrierMode<A: IrAdaptor + ?Sized> {
    fn phase_mode(&self) -> PhaseMode;

    /// Whether barrier requests are queued for insertion. When false, a
    /// barrier decision only ages the base.
    fn really_insert(&self) -> bool;

    /// Prepare to walk `block`, after the walker reset its per-block state.
    /// Returning false skips the block.
    fn begin_block(&mut self, adaptor: &A, block: A::BlockRef, walker: &mut BlockWalker<A>) -> bool;

    /// Called before the barrier decision for `inst`.
    fn before_instruction(&mut self, _adaptor: &A, _inst: A::InstRef) {}

    /// Extra proof, beyond the constant and result checks, that the value on
    /// `edge` is not a cell.
    fn proves_not_cell(&self, _adaptor: &A, _edge: Edge<A::InstRef>) -> bool {
        false
    }

    /// Called after `inst` was fully processed. Returning false stops the
    /// walk; the block counts as unfinished.
    fn after_instruction(&mut self, _adaptor: &A, _index: usize, _inst: A::InstRef) -> bool {
        true
    }

    fn end_block(&mut self) {}
}
