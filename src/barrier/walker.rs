// This module implements the per-block walk shared by the fast and global
// barrier modes. For each instruction, in order, the walker considers a barrier
// for each base/value pair of a reference store, bumps the epoch at GC points,
// stamps the instruction's own value (allocations are fresh, everything else,
// including upsilons and their phis, is primordial), then replays the
// instruction's declared effects: reads of a pinned stack slot invalidate the
// pinned value, and writes to the heap or stack invalidate the operands that
// may have escaped. A fresh value written to exactly one precise stack slot is
// pinned in StackEscapes instead. Barriers are queued in an InsertionSet and
// applied once the block has been walked.

use super::epoch::{Epoch, EpochTable};
use super::escapes::StackEscapes;
use super::mode::BarrierMode;
use super::stats::BarrierStats;
use crate::core::adaptor::IrAdaptor;
use crate::core::error::{BarrierError, BarrierResult};
use crate::core::heap::AbstractHeap;
use crate::core::insertion::{BarrierInsertion, InsertionSet, NodeOrigin};
use crate::core::ir::{ArrayMode, Edge, Opcode, UseKind};
use log::{debug, trace};

/// The instruction currently being walked.
struct Step<'o, I> {
    index: usize,
    inst: I,
    opcode: Opcode,
    operands: &'o [Edge<I>],
}

/// Epoch state and pending barriers for walking one block at a time.
pub struct BlockWalker<A: IrAdaptor + ?Sized> {
    epochs: EpochTable,
    current: Epoch,
    /// Indices of values stamped fresh since the last block began.
    fresh: Vec<usize>,
    escapes: StackEscapes<A::InstRef>,
    insertions: InsertionSet<A::InstRef>,
    stats: BarrierStats,
    /// Decision counters are only kept for the walk that inserts.
    recording: bool,
}

impl<A: IrAdaptor + ?Sized> BlockWalker<A> {
    pub fn new(inst_count: usize, stack_escape_capacity: usize) -> Self {
        Self {
            epochs: EpochTable::with_capacity(inst_count),
            current: Epoch::first(),
            fresh: Vec::new(),
            escapes: StackEscapes::new(stack_escape_capacity),
            insertions: InsertionSet::new(),
            stats: BarrierStats::default(),
            recording: true,
        }
    }

    #[inline]
    pub fn current_epoch(&self) -> Epoch {
        self.current
    }

    #[inline]
    pub fn epoch_of(&self, adaptor: &A, inst: A::InstRef) -> Epoch {
        self.epochs.get(adaptor.inst_index(inst))
    }

    pub fn set_epoch(&mut self, adaptor: &A, inst: A::InstRef, epoch: Epoch) {
        let index = adaptor.inst_index(inst);
        if !epoch.is_primordial() {
            self.fresh.push(index);
        }
        self.epochs.set(index, epoch);
    }

    #[inline]
    pub fn is_fresh(&self, adaptor: &A, inst: A::InstRef) -> bool {
        self.epoch_of(adaptor, inst) == self.current
    }

    pub fn take_stats(&mut self) -> BarrierStats {
        std::mem::take(&mut self.stats)
    }

    /// Reset per-block state. Nothing stamped fresh in an earlier block stays
    /// fresh; the mode restamps whatever it knows about at block entry.
    pub fn begin_block(&mut self) {
        self.current = Epoch::first();
        self.escapes.clear();
        for index in self.fresh.drain(..) {
            self.epochs.set(index, Epoch::PRIMORDIAL);
        }
    }

    /// Walk `block` and, when the mode allows it, splice the barriers it
    /// needs. Returns whether the walk reached the end of the block.
    pub fn handle_block<M>(&mut self, adaptor: &mut A, block: A::BlockRef, mode: &mut M) -> BarrierResult<bool>
    where
        M: BarrierMode<A> + ?Sized,
    {
        debug!(
            "{} barrier insertion: dealing with block {:?}{}",
            mode.phase_mode(),
            block,
            if mode.really_insert() { " (really inserting)" } else { "" }
        );

        self.begin_block();
        self.recording = mode.really_insert();
        if !mode.begin_block(&*adaptor, block, self) {
            debug!("  block {:?} was never reached", block);
            self.stats.blocks_skipped += 1;
            return Ok(false);
        }

        let finished = self.walk_block(&*adaptor, block, mode)?;
        self.stats.blocks_walked += 1;
        if !finished {
            self.stats.blocks_skipped += 1;
        }

        if mode.really_insert() {
            let inserted = self.insertions.execute(adaptor, block);
            if inserted > 0 {
                debug!("  inserted {} barriers into block {:?}", inserted, block);
            }
            self.stats.barriers_inserted += inserted;
        } else {
            self.insertions.clear();
        }
        Ok(finished)
    }

    /// Walk every instruction of `block`. Returns false when the mode stopped
    /// the walk early.
    pub fn walk_block<M>(&mut self, adaptor: &A, block: A::BlockRef, mode: &mut M) -> BarrierResult<bool>
    where
        M: BarrierMode<A> + ?Sized,
    {
        let mut finished = true;
        for (index, inst) in adaptor.block_insts(block).enumerate() {
            let operands: Vec<Edge<A::InstRef>> = adaptor.inst_operands(inst).collect();
            let step = Step {
                index,
                inst,
                opcode: adaptor.inst_opcode(inst),
                operands: &operands,
            };
            trace!(
                "    {}: looking at {:?} {} with operands {}",
                self.current,
                inst,
                step.opcode,
                self.describe_operands(adaptor, &operands)
            );

            mode.before_instruction(adaptor, inst);
            self.step(adaptor, &step, &*mode)?;

            trace!(
                "    {}: done with {:?} ({}) with operands {}",
                self.current,
                inst,
                self.epoch_of(adaptor, inst),
                self.describe_operands(adaptor, &operands)
            );

            if !mode.after_instruction(adaptor, index, inst) {
                debug!("  block {:?} stopped at instruction {}", block, index);
                finished = false;
                break;
            }
        }

        for inst in self.escapes.drain() {
            self.escape(adaptor, inst);
        }
        mode.end_block();
        Ok(finished)
    }

    fn step<M>(&mut self, adaptor: &A, step: &Step<'_, A::InstRef>, mode: &M) -> BarrierResult<()>
    where
        M: BarrierMode<A> + ?Sized,
    {
        // The store is decided against the epoch it starts in; a collection it
        // may trigger only affects later instructions.
        self.consider_stores(adaptor, step, mode)?;

        if adaptor.does_gc(step.inst) {
            self.current.bump();
            self.escapes.clear();
        }

        if step.opcode.allocates() {
            let current = self.current;
            self.set_epoch(adaptor, step.inst, current);
        } else if step.opcode == Opcode::Upsilon {
            if let Some(phi) = adaptor.upsilon_phi(step.inst) {
                self.set_epoch(adaptor, phi, Epoch::PRIMORDIAL);
            }
            self.set_epoch(adaptor, step.inst, Epoch::PRIMORDIAL);
        } else {
            self.set_epoch(adaptor, step.inst, Epoch::PRIMORDIAL);
        }

        self.replay_effects(adaptor, step)
    }

    fn consider_stores<M>(&mut self, adaptor: &A, step: &Step<'_, A::InstRef>, mode: &M) -> BarrierResult<()>
    where
        M: BarrierMode<A> + ?Sized,
    {
        use Opcode::*;

        let operand = |i: usize| step.operands.get(i).copied();
        let speculated_cell =
            |edge: &Edge<A::InstRef>| matches!(edge.use_kind, UseKind::Cell | UseKind::KnownCell);

        match step.opcode {
            PutByVal | PutByValDirect | PutByValAlias => match adaptor.inst_array_mode(step.inst) {
                ArrayMode::Generic
                | ArrayMode::Float16Array
                | ArrayMode::BigInt64Array
                | ArrayMode::BigUint64Array => {
                    if let Some(base) = operand(0) {
                        if !adaptor.is_slow_put_by_val(step.inst) && speculated_cell(&base) {
                            self.consider_barrier(adaptor, step, mode, base, None)?;
                        }
                    }
                }
                ArrayMode::Contiguous | ArrayMode::ArrayStorage | ArrayMode::SlowPutArrayStorage => {
                    if let Some(base) = operand(0) {
                        self.consider_barrier(adaptor, step, mode, base, operand(2))?;
                    }
                }
                _ => {}
            },

            ArrayPush => match adaptor.inst_array_mode(step.inst) {
                ArrayMode::Contiguous
                | ArrayMode::ArrayStorage
                | ArrayMode::SlowPutArrayStorage
                | ArrayMode::ForceExit => {
                    if let Some(array) = operand(0) {
                        for &element in step.operands.iter().skip(1) {
                            self.consider_barrier(adaptor, step, mode, array, Some(element))?;
                        }
                    }
                }
                _ => {}
            },

            PutPrivateName => {
                if let Some(base) = operand(0) {
                    if !adaptor.is_slow_put_by_val(step.inst) && speculated_cell(&base) {
                        self.consider_barrier(adaptor, step, mode, base, None)?;
                    }
                }
            }

            PutPrivateNameById | SetPrivateBrand | PutById | PutByIdFlush | PutByIdDirect
            | PutStructure | PutByIdMegamorphic | RegExpTestInline | RecordRegExpCachedResult
            | EnumeratorPutByVal | PutByValMegamorphic | MultiPutByOffset | MultiDeleteByOffset
            | NukeStructureAndSetButterfly => {
                if let Some(base) = operand(0) {
                    self.consider_barrier(adaptor, step, mode, base, None)?;
                }
            }

            // Untyped bases take a generic path that barriers on its own.
            DeleteById | DeleteByVal => {
                if let Some(base) = operand(0) {
                    if base.use_kind.is_cell() {
                        self.consider_barrier(adaptor, step, mode, base, None)?;
                    }
                }
            }

            PutClosureVar | PutToArguments | SetRegExpObjectLastIndex | PutInternalField
            | PutGlobalVariable | SetFunctionName => {
                if let Some(base) = operand(0) {
                    self.consider_barrier(adaptor, step, mode, base, operand(1))?;
                }
            }

            // Operand 0 is the property storage.
            PutByOffset => {
                if let Some(base) = operand(1) {
                    self.consider_barrier(adaptor, step, mode, base, operand(2))?;
                }
            }

            _ => {}
        }
        Ok(())
    }

    /// Decide whether storing `value` into `base` at the current instruction
    /// needs a barrier, and request one if so.
    fn consider_barrier<M>(
        &mut self,
        adaptor: &A,
        step: &Step<'_, A::InstRef>,
        mode: &M,
        base: Edge<A::InstRef>,
        value: Option<Edge<A::InstRef>>,
    ) -> BarrierResult<()>
    where
        M: BarrierMode<A> + ?Sized,
    {
        trace!("        considering barrier on {:?} => {:?}", base.node, value.map(|v| v.node));

        if let Some(value) = value {
            if self.value_is_not_cell(adaptor, mode, value) {
                if self.recording {
                    self.stats.elided_non_cell += 1;
                }
                return Ok(());
            }
        }

        if self.is_fresh(adaptor, base.node) {
            trace!("            rejecting, base is in the current epoch");
            if self.recording {
                self.stats.elided_fresh += 1;
            }
            return Ok(());
        }

        trace!("            inserting barrier");
        self.insert_barrier(adaptor, step, mode, base)
    }

    fn value_is_not_cell<M>(&self, adaptor: &A, mode: &M, value: Edge<A::InstRef>) -> bool
    where
        M: BarrierMode<A> + ?Sized,
    {
        match adaptor.inst_constant(value.node) {
            Some(constant) if !constant.is_cell() => {
                trace!("            rejecting because of constant type");
                return true;
            }
            Some(_) => {}
            None => {
                if adaptor.inst_result(value.node).is_non_cell() {
                    trace!("            rejecting because of result type");
                    return true;
                }
            }
        }
        if mode.proves_not_cell(adaptor, value) {
            trace!("            rejecting because of abstract type");
            return true;
        }
        false
    }

    /// Age `base` and, once the mode allows it, queue a barrier on it right
    /// after the current instruction.
    fn insert_barrier<M>(
        &mut self,
        adaptor: &A,
        step: &Step<'_, A::InstRef>,
        mode: &M,
        base: Edge<A::InstRef>,
    ) -> BarrierResult<()>
    where
        M: BarrierMode<A> + ?Sized,
    {
        // A barrier proven necessary once stays necessary.
        self.set_epoch(adaptor, base.node, Epoch::PRIMORDIAL);

        if !mode.really_insert() {
            return Ok(());
        }

        if !base.use_kind.is_cell() {
            return Err(BarrierError::NotCell {
                inst: format!("{:?} ({})", step.inst, step.opcode),
                use_kind: base.use_kind,
            });
        }

        let mut origin = NodeOrigin::new(step.inst);
        if adaptor.clobbers_exit_state(step.inst) {
            origin = origin.with_invalid_exit();
        }
        self.insertions.insert(BarrierInsertion {
            index: step.index + 1,
            origin,
            base: base.with_use_kind(UseKind::KnownCell),
        });
        Ok(())
    }

    fn replay_effects(&mut self, adaptor: &A, step: &Step<'_, A::InstRef>) -> BarrierResult<()> {
        let effects = adaptor.inst_effects(step.inst);

        for read in &effects.reads {
            if !read.overlaps(&AbstractHeap::STACK) {
                continue;
            }
            for inst in self.escapes.remove_overlapping(read) {
                self.escape(adaptor, inst);
            }
        }

        let mut wrote_heap_or_stack = false;
        let mut precise_stack_writes = 0;
        let mut precise_stack_write = None;
        for write in &effects.writes {
            wrote_heap_or_stack |=
                write.overlaps(&AbstractHeap::HEAP) || write.overlaps(&AbstractHeap::STACK);
            if write.is_precise_stack() {
                precise_stack_writes += 1;
                precise_stack_write = Some(*write);
            }
        }

        if !wrote_heap_or_stack {
            return Ok(());
        }

        use Opcode::*;
        let operand = |i: usize| step.operands.get(i).map(|edge| edge.node);
        match step.opcode {
            PutStructure | MultiDeleteByOffset => {}
            PutInternalField | PutClosureVar | MultiPutByOffset | NukeStructureAndSetButterfly => {
                if let Some(value) = operand(1) {
                    self.escape(adaptor, value);
                }
            }
            PutByOffset => {
                if let Some(value) = operand(2) {
                    self.escape(adaptor, value);
                }
            }
            PutStack | SetLocal => {
                if let Some(value) = operand(0) {
                    self.escape_to_stack(adaptor, step, value, precise_stack_writes, precise_stack_write)?;
                }
            }
            _ => {
                for edge in step.operands {
                    self.escape(adaptor, edge.node);
                }
            }
        }
        Ok(())
    }

    /// The value may now be reachable by the marker.
    fn escape(&mut self, adaptor: &A, inst: A::InstRef) {
        if self.recording && !self.epoch_of(adaptor, inst).is_primordial() {
            self.stats.escapes_invalidated += 1;
        }
        self.set_epoch(adaptor, inst, Epoch::PRIMORDIAL);
    }

    fn escape_to_stack(
        &mut self,
        adaptor: &A,
        step: &Step<'_, A::InstRef>,
        value: A::InstRef,
        precise_stack_writes: usize,
        precise_stack_write: Option<AbstractHeap>,
    ) -> BarrierResult<()> {
        if !self.is_fresh(adaptor, value) {
            return Ok(());
        }
        let slot = match precise_stack_write {
            Some(slot) if precise_stack_writes == 1 => slot,
            _ => {
                return Err(BarrierError::StackEscape {
                    inst: format!("{:?} ({})", step.inst, step.opcode),
                    precise_writes: precise_stack_writes,
                })
            }
        };
        trace!("        pinning {:?} in {}", value, slot);
        if self.recording {
            self.stats.stack_pins += 1;
        }
        if let Some(evicted) = self.escapes.pin(slot, value) {
            self.escape(adaptor, evicted);
        }
        Ok(())
    }

    fn describe_operands(&self, adaptor: &A, operands: &[Edge<A::InstRef>]) -> String {
        operands
            .iter()
            .map(|edge| format!("{:?} ({})", edge.node, self.epoch_of(adaptor, edge.node)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
