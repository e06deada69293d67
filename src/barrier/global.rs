// This module implements global barrier insertion for SSA graphs. It reuses
// the per-block epoch walk and adds a conservative merge rule at block
// boundaries: each block carries the set of values that may still need a
// barrier on entry (state at head) and on exit (state at tail). Starting from
// empty sets, blocks are walked in reverse postorder; every live-at-tail value
// whose epoch is not current joins the block's tail set, and a grown tail set is
// unioned into every successor's head set. The sets only grow, so the loop
// terminates. Once a sweep changes nothing, every block is walked once more in
// natural order, this time actually queueing barriers. The abstract
// interpreter runs alongside the walk to prove stored values are not cells and
// to tell which blocks are reachable.

use super::config::{BarrierConfig, PhaseMode};
use super::epoch::Epoch;
use super::mode::BarrierMode;
use super::stats::BarrierStats;
use super::walker::BlockWalker;
use crate::core::adaptor::IrAdaptor;
use crate::core::block_map::BlockMap;
use crate::core::error::{BarrierError, BarrierResult};
use crate::core::interpreter::AbstractInterpreter;
use crate::core::ir::{Edge, GraphForm};
use bumpalo::Bump;
use hashbrown::{DefaultHashBuilder, HashSet};
use log::debug;

type BoundarySet<'arena, I> = HashSet<I, DefaultHashBuilder, &'arena Bump>;

pub struct GlobalMode<'a, 'arena, A: IrAdaptor + ?Sized> {
    interpreter: &'a mut dyn AbstractInterpreter<A>,
    state_at_head: BlockMap<BoundarySet<'arena, A::InstRef>>,
    state_at_tail: BlockMap<BoundarySet<'arena, A::InstRef>>,
    converged: bool,
}

impl<'a, 'arena, A: IrAdaptor + ?Sized> GlobalMode<'a, 'arena, A> {
    pub fn new(
        interpreter: &'a mut dyn AbstractInterpreter<A>,
        arena: &'arena Bump,
        block_count: usize,
    ) -> Self {
        Self {
            interpreter,
            state_at_head: BlockMap::from_fn(block_count, |_| HashSet::new_in(arena)),
            state_at_tail: BlockMap::from_fn(block_count, |_| HashSet::new_in(arena)),
            converged: false,
        }
    }

    /// Values that may need a barrier on entry to the block.
    pub fn state_at_head(&self, block_index: usize) -> &BoundarySet<'arena, A::InstRef> {
        &self.state_at_head[block_index]
    }

    /// Values that may need a barrier on exit from the block.
    pub fn state_at_tail(&self, block_index: usize) -> &BoundarySet<'arena, A::InstRef> {
        &self.state_at_tail[block_index]
    }

    /// Fold the live-at-tail values that are not in the current epoch into
    /// the block's tail set and, if it grew, into its successors' head sets.
    /// Returns whether anything changed.
    fn propagate(&mut self, adaptor: &A, block: A::BlockRef, walker: &BlockWalker<A>) -> bool {
        let index = adaptor.block_index(block);
        let current = walker.current_epoch();
        let mut grew = false;
        for value in adaptor.live_at_tail(block) {
            if walker.epoch_of(adaptor, value) != current {
                grew |= self.state_at_tail[index].insert(value);
            }
        }
        if !grew {
            return false;
        }

        let tail: Vec<A::InstRef> = self.state_at_tail[index].iter().copied().collect();
        for succ in adaptor.block_succs(block) {
            let succ_index = adaptor.block_index(succ);
            self.state_at_head[succ_index].extend(tail.iter().copied());
        }
        true
    }
}

impl<'a, 'arena, A: IrAdaptor + ?Sized> BarrierMode<A> for GlobalMode<'a, 'arena, A> {
    fn phase_mode(&self) -> PhaseMode {
        PhaseMode::Global
    }

    fn really_insert(&self) -> bool {
        self.converged
    }

    fn begin_block(&mut self, adaptor: &A, block: A::BlockRef, walker: &mut BlockWalker<A>) -> bool {
        if !self.interpreter.block_reached(block) {
            return false;
        }
        self.interpreter.begin_basic_block(adaptor, block);

        let head = &self.state_at_head[adaptor.block_index(block)];
        let current = walker.current_epoch();
        for value in adaptor.live_at_head(block) {
            // Values a predecessor may have left unbarriered start out ancient.
            let epoch = if head.contains(&value) {
                Epoch::PRIMORDIAL
            } else {
                current
            };
            walker.set_epoch(adaptor, value, epoch);
        }
        true
    }

    fn before_instruction(&mut self, adaptor: &A, inst: A::InstRef) {
        self.interpreter.execute_edges(adaptor, inst);
    }

    fn proves_not_cell(&self, adaptor: &A, edge: Edge<A::InstRef>) -> bool {
        self.interpreter.is_not_cell(adaptor, edge)
    }

    fn after_instruction(&mut self, adaptor: &A, index: usize, inst: A::InstRef) -> bool {
        self.interpreter.execute_effects(adaptor, index, inst)
    }

    fn end_block(&mut self) {
        self.interpreter.reset();
    }
}

/// Sweep the blocks in reverse postorder until no tail set grows. Returns the
/// number of sweeps.
fn converge<A: IrAdaptor + ?Sized>(
    adaptor: &mut A,
    mode: &mut GlobalMode<'_, '_, A>,
    walker: &mut BlockWalker<A>,
) -> BarrierResult<usize> {
    let post_order = adaptor.blocks_in_post_order();
    let mut sweeps = 0;
    let mut changed = true;
    while changed {
        changed = false;
        sweeps += 1;

        for &block in post_order.iter().rev() {
            if !walker.handle_block(adaptor, block, mode)? {
                // An unfinished block cannot affect the fixpoint.
                continue;
            }
            changed |= mode.propagate(&*adaptor, block, walker);
        }
        debug!("global store barrier insertion: sweep {} changed={}", sweeps, changed);
    }
    Ok(sweeps)
}

pub(crate) fn run<A: IrAdaptor + ?Sized>(
    adaptor: &mut A,
    interpreter: &mut dyn AbstractInterpreter<A>,
    config: &BarrierConfig,
) -> BarrierResult<BarrierStats> {
    let form = adaptor.graph_form();
    if form != GraphForm::Ssa {
        return Err(BarrierError::FormMismatch {
            mode: PhaseMode::Global.name(),
            form,
        });
    }

    debug!("starting global store barrier insertion on {}", adaptor.func_name());

    let arena = Bump::new();
    let mut mode = GlobalMode::new(interpreter, &arena, adaptor.block_count());
    let mut walker = BlockWalker::<A>::new(adaptor.inst_count(), config.stack_escape_capacity);

    let sweeps = converge(adaptor, &mut mode, &mut walker)?;

    mode.converged = true;
    let blocks: Vec<_> = adaptor.blocks().collect();
    for block in blocks {
        walker.handle_block(adaptor, block, &mut mode)?;
    }

    let mut stats = walker.take_stats();
    stats.fixpoint_sweeps = sweeps;
    debug!(
        "global store barrier insertion on {} converged after {} sweeps, inserted {} barriers",
        adaptor.func_name(),
        sweeps,
        stats.barriers_inserted
    );
    Ok(stats)
}

/// Run only the fixpoint and report the converged boundary sets, sorted by
/// instruction index, as `(head, tail)` per block index. The graph is not
/// modified.
pub fn boundary_sets<A: IrAdaptor + ?Sized>(
    adaptor: &mut A,
    interpreter: &mut dyn AbstractInterpreter<A>,
    config: &BarrierConfig,
) -> BarrierResult<(Vec<(Vec<A::InstRef>, Vec<A::InstRef>)>, usize)> {
    let form = adaptor.graph_form();
    if form != GraphForm::Ssa {
        return Err(BarrierError::FormMismatch {
            mode: PhaseMode::Global.name(),
            form,
        });
    }

    let arena = Bump::new();
    let mut mode = GlobalMode::new(interpreter, &arena, adaptor.block_count());
    let mut walker = BlockWalker::<A>::new(adaptor.inst_count(), config.stack_escape_capacity);
    let sweeps = converge(adaptor, &mut mode, &mut walker)?;

    let sets = (0..adaptor.block_count())
        .map(|i| {
            (
                sorted_values(&*adaptor, mode.state_at_head(i)),
                sorted_values(&*adaptor, mode.state_at_tail(i)),
            )
        })
        .collect();
    Ok((sets, sweeps))
}

/// Walk `block` once, entering with `head` as its state at head, and return
/// its state at tail sorted by instruction index. This is one application of
/// the fixpoint's transfer function; nothing is inserted. An unreached block
/// has an empty tail.
pub fn block_transfer<A: IrAdaptor + ?Sized>(
    adaptor: &mut A,
    interpreter: &mut dyn AbstractInterpreter<A>,
    block: A::BlockRef,
    head: &[A::InstRef],
    config: &BarrierConfig,
) -> BarrierResult<Vec<A::InstRef>> {
    let form = adaptor.graph_form();
    if form != GraphForm::Ssa {
        return Err(BarrierError::FormMismatch {
            mode: PhaseMode::Global.name(),
            form,
        });
    }

    let arena = Bump::new();
    let mut mode = GlobalMode::new(interpreter, &arena, adaptor.block_count());
    let index = adaptor.block_index(block);
    mode.state_at_head[index].extend(head.iter().copied());

    let mut walker = BlockWalker::<A>::new(adaptor.inst_count(), config.stack_escape_capacity);
    if walker.handle_block(adaptor, block, &mut mode)? {
        mode.propagate(&*adaptor, block, &walker);
    }
    Ok(sorted_values(&*adaptor, mode.state_at_tail(index)))
}

fn sorted_values<A: IrAdaptor + ?Sized>(adaptor: &A, set: &BoundarySet<'_, A::InstRef>) -> Vec<A::InstRef> {
    let mut values: Vec<A::InstRef> = set.iter().copied().collect();
    values.sort_by_key(|&v| adaptor.inst_index(v));
    values
}
