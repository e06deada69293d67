// This module defines the IrAdaptor trait, the bridge between the store barrier
// phase and the host compiler's graph. The phase never owns or reshapes IR
// storage: it walks blocks in natural and post order, reads each instruction's
// opcode, operand edges, constant and result classification, reported effects
// and GC behaviour, and in SSA form the per-block live-at-head/live-at-tail
// sets. The only mutation it requests is barrier insertion, handed back to the
// host through insert_barriers once a whole block has been walked.

//! IrAdaptor responsibilities.
//!
//! The adaptor is the glue between the phase and the host IR. It assumes:
//! - Each function has a single entry block.
//! - Every instruction has a dense local index usable as a side-table key.
//! - Blocks have a dense index in `0..block_count()`.
//! - In SSA form, liveness at block boundaries is available.

use super::heap::Effects;
use super::insertion::BarrierInsertion;
use super::ir::{ArrayMode, Constant, Edge, GraphForm, Opcode, ResultKind};
use core::fmt::Debug;
use core::hash::Hash;

/// Bridge between a host IR and the store barrier phase.
pub trait IrAdaptor {
    type InstRef: Copy + Eq + Hash + Debug;
    type BlockRef: Copy + Eq + Hash + Debug;

    const INVALID_INST_REF: Self::InstRef;
    const INVALID_BLOCK_REF: Self::BlockRef;

    /// Form of the current graph.
    fn graph_form(&self) -> GraphForm;

    /// Name of the function being compiled, for diagnostics.
    fn func_name(&self) -> &str {
        ""
    }

    /// Entry block of the function.
    fn entry_block(&self) -> Self::BlockRef;

    /// Number of blocks; block indices are `0..block_count()`.
    fn block_count(&self) -> usize;

    /// Dense index of a block.
    fn block_index(&self, block: Self::BlockRef) -> usize;

    /// Upper bound on instruction local indices.
    fn inst_count(&self) -> usize;

    /// Dense local index of an instruction.
    fn inst_index(&self, inst: Self::InstRef) -> usize;

    /// Blocks in natural (program) order.
    fn blocks(&self) -> Box<dyn Iterator<Item = Self::BlockRef> + '_>;

    /// Blocks reachable from the entry, in postorder.
    fn blocks_in_post_order(&self) -> Vec<Self::BlockRef> {
        super::analyzer::compute_post_order(self)
    }

    /// Successor blocks of a block.
    fn block_succs(&self, block: Self::BlockRef) -> Box<dyn Iterator<Item = Self::BlockRef> + '_>;

    /// Instructions of a block, in execution order.
    fn block_insts(&self, block: Self::BlockRef) -> Box<dyn Iterator<Item = Self::InstRef> + '_>;

    /// Values live on entry to a block (SSA only, phi shadows excluded).
    fn live_at_head(&self, block: Self::BlockRef) -> Box<dyn Iterator<Item = Self::InstRef> + '_>;

    /// Values live on exit from a block (SSA only, phi shadows excluded).
    fn live_at_tail(&self, block: Self::BlockRef) -> Box<dyn Iterator<Item = Self::InstRef> + '_>;

    fn inst_opcode(&self, inst: Self::InstRef) -> Opcode;

    /// Array mode of an indexed access.
    fn inst_array_mode(&self, _inst: Self::InstRef) -> ArrayMode {
        ArrayMode::Generic
    }

    /// Operand edges of an instruction.
    fn inst_operands(&self, inst: Self::InstRef) -> Box<dyn Iterator<Item = Edge<Self::InstRef>> + '_>;

    /// Constant value, if the instruction was constant-folded.
    fn inst_constant(&self, inst: Self::InstRef) -> Option<Constant>;

    /// Representation of the instruction's result.
    fn inst_result(&self, inst: Self::InstRef) -> ResultKind;

    /// The phi an upsilon feeds.
    fn upsilon_phi(&self, inst: Self::InstRef) -> Option<Self::InstRef>;

    /// Abstract heaps read and written by an instruction.
    fn inst_effects(&self, inst: Self::InstRef) -> Effects;

    /// Whether the instruction may trigger a garbage collection.
    fn does_gc(&self, inst: Self::InstRef) -> bool;

    /// Whether the instruction invalidates the state an OSR exit would restore.
    fn clobbers_exit_state(&self, inst: Self::InstRef) -> bool;

    /// Indexed stores that were compiled to the slow path, which runs its own
    /// barrier.
    fn is_slow_put_by_val(&self, _inst: Self::InstRef) -> bool {
        false
    }

    /// Splice barriers into a block. Positions refer to the block as it was
    /// walked; `insertions` is sorted by position.
    fn insert_barriers(
        &mut self,
        block: Self::BlockRef,
        insertions: &[BarrierInsertion<Self::InstRef>],
    );
}
