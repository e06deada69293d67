//! Abstract interpreter interface used by the global barrier mode.
//!
//! The host's type inference runs alongside the barrier walk, one instruction
//! at a time, so that a store whose value is proven not to be a cell never gets
//! a barrier.

use super::adaptor::IrAdaptor;
use super::ir::Edge;

pub trait AbstractInterpreter<A: IrAdaptor + ?Sized> {
    /// Whether control flow analysis ever reached `block`.
    fn block_reached(&self, block: A::BlockRef) -> bool;

    /// Load the abstract state at the head of `block`.
    fn begin_basic_block(&mut self, adaptor: &A, block: A::BlockRef);

    /// Apply the type filters implied by an instruction's operand use kinds.
    /// Runs before the barrier decision for that instruction.
    fn execute_edges(&mut self, adaptor: &A, inst: A::InstRef);

    /// Whether the value on `edge` is proven not to be a cell at this point.
    fn is_not_cell(&self, adaptor: &A, edge: Edge<A::InstRef>) -> bool;

    /// Apply the full effects of the instruction at `index`. Returns false
    /// when the abstract state becomes bottom and the block cannot continue.
    fn execute_effects(&mut self, adaptor: &A, index: usize, inst: A::InstRef) -> bool;

    /// Drop per-block state.
    fn reset(&mut self);
}
