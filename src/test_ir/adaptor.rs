//! IrAdaptor implementation over TestIR.
//!
//! One adaptor views one function. Instruction references are global value
//! indices and block references global block indices, so side tables sized by
//! `inst_count()` are shared by every function of a module.

use super::effects;
use super::{Operand, TestIR, Value};
use crate::core::analyzer::Analyzer;
use crate::core::heap::Effects;
use crate::core::insertion::BarrierInsertion;
use crate::core::ir::{ArrayMode, Constant, Edge, GraphForm, Opcode, ResultKind};
use crate::core::IrAdaptor;

pub struct TestIRAdaptor<'ir> {
    ir: &'ir mut TestIR,
    func: usize,
    live_in: Vec<Vec<u32>>,
    live_out: Vec<Vec<u32>>,
}

impl<'ir> TestIRAdaptor<'ir> {
    /// View function `func` of `ir`. Block liveness is computed up front.
    pub fn new(ir: &'ir mut TestIR, func: usize) -> Self {
        let mut adaptor = Self {
            ir,
            func,
            live_in: Vec::new(),
            live_out: Vec::new(),
        };
        adaptor.recompute_liveness();
        adaptor
    }

    fn recompute_liveness(&mut self) {
        let mut analyzer = Analyzer::<Self>::new();
        analyzer.analyze(self);
        let count = self.block_count();
        self.live_in = (0..count).map(|b| analyzer.live_in(b).to_vec()).collect();
        self.live_out = (0..count).map(|b| analyzer.live_out(b).to_vec()).collect();
    }

    pub fn ir(&self) -> &TestIR {
        &*self.ir
    }

    pub fn func(&self) -> usize {
        self.func
    }

    pub fn block_name(&self, block: u32) -> &str {
        &self.ir.blocks[block as usize].name
    }

    pub fn value_name(&self, value: u32) -> &str {
        &self.ir.values[value as usize].name
    }

    fn value(&self, inst: u32) -> &Value {
        &self.ir.values[inst as usize]
    }

    fn begin(&self) -> u32 {
        self.ir.functions[self.func].block_begin_idx
    }
}

impl<'ir> IrAdaptor for TestIRAdaptor<'ir> {
    type InstRef = u32;
    type BlockRef = u32;

    const INVALID_INST_REF: u32 = u32::MAX;
    const INVALID_BLOCK_REF: u32 = u32::MAX;

    fn graph_form(&self) -> GraphForm {
        self.ir.functions[self.func].form
    }

    fn func_name(&self) -> &str {
        &self.ir.functions[self.func].name
    }

    fn entry_block(&self) -> u32 {
        self.begin()
    }

    fn block_count(&self) -> usize {
        self.ir.function_blocks(self.func).len()
    }

    fn block_index(&self, block: u32) -> usize {
        (block - self.begin()) as usize
    }

    fn inst_count(&self) -> usize {
        self.ir.values.len()
    }

    fn inst_index(&self, inst: u32) -> usize {
        inst as usize
    }

    fn blocks(&self) -> Box<dyn Iterator<Item = u32> + '_> {
        Box::new(self.ir.function_blocks(self.func))
    }

    fn block_succs(&self, block: u32) -> Box<dyn Iterator<Item = u32> + '_> {
        Box::new(self.ir.blocks[block as usize].succs.iter().copied())
    }

    fn block_insts(&self, block: u32) -> Box<dyn Iterator<Item = u32> + '_> {
        Box::new(self.ir.blocks[block as usize].insts.iter().copied())
    }

    fn live_at_head(&self, block: u32) -> Box<dyn Iterator<Item = u32> + '_> {
        let idx = self.block_index(block);
        Box::new(self.live_in.get(idx).into_iter().flatten().copied())
    }

    fn live_at_tail(&self, block: u32) -> Box<dyn Iterator<Item = u32> + '_> {
        let idx = self.block_index(block);
        Box::new(self.live_out.get(idx).into_iter().flatten().copied())
    }

    fn inst_opcode(&self, inst: u32) -> Opcode {
        self.value(inst).op
    }

    fn inst_array_mode(&self, inst: u32) -> ArrayMode {
        self.value(inst).array_mode
    }

    fn inst_operands(&self, inst: u32) -> Box<dyn Iterator<Item = Edge<u32>> + '_> {
        Box::new(
            self.value(inst)
                .operands
                .iter()
                .map(|op| Edge::new(op.value, op.use_kind)),
        )
    }

    fn inst_constant(&self, inst: u32) -> Option<Constant> {
        self.value(inst).constant
    }

    fn inst_result(&self, inst: u32) -> ResultKind {
        effects::result_kind(self.value(inst))
    }

    fn upsilon_phi(&self, inst: u32) -> Option<u32> {
        self.value(inst).phi
    }

    fn inst_effects(&self, inst: u32) -> Effects {
        effects::effects(self.value(inst))
    }

    fn does_gc(&self, inst: u32) -> bool {
        effects::does_gc(self.value(inst))
    }

    fn clobbers_exit_state(&self, inst: u32) -> bool {
        effects::clobbers_exit_state(self.value(inst))
    }

    fn is_slow_put_by_val(&self, inst: u32) -> bool {
        self.value(inst).slow_put
    }

    fn insert_barriers(&mut self, block: u32, insertions: &[BarrierInsertion<u32>]) {
        let mut pending = insertions.iter().peekable();
        let old = std::mem::take(&mut self.ir.blocks[block as usize].insts);
        let mut insts = Vec::with_capacity(old.len() + insertions.len());

        for (position, inst) in old.into_iter().enumerate() {
            while let Some(insertion) = pending.next_if(|p| p.index <= position) {
                insts.push(push_barrier(self.ir, insertion));
            }
            insts.push(inst);
        }
        for insertion in pending {
            insts.push(push_barrier(self.ir, insertion));
        }

        self.ir.blocks[block as usize].insts = insts;
    }
}

fn push_barrier(ir: &mut TestIR, insertion: &BarrierInsertion<u32>) -> u32 {
    let mut barrier = Value::new("", Opcode::FencedStoreBarrier);
    barrier.operands.push(Operand {
        value: insertion.base.node,
        use_kind: insertion.base.use_kind,
    });
    barrier.exit_ok = insertion.origin.exit_ok;
    barrier.origin = Some(insertion.origin.semantic);
    let idx = ir.values.len() as u32;
    ir.values.push(barrier);
    idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::insertion::NodeOrigin;
    use crate::core::ir::UseKind;

    const LOOP: &str = r#"
f(%o) ssa {
entry:
    %a = new_object
    jump ^head
head:
    %x = get_by_offset %a
    branch %x, ^head, ^exit
exit:
    put_by_offset %o, %o, %x
    return
}
"#;

    #[test]
    fn test_liveness() {
        let mut ir = TestIR::parse(LOOP).unwrap();
        let o = ir.value_by_name(0, "o").unwrap();
        let a = ir.value_by_name(0, "a").unwrap();
        let x = ir.value_by_name(0, "x").unwrap();
        let adaptor = TestIRAdaptor::new(&mut ir, 0);

        let head: Vec<u32> = adaptor.live_at_head(1).collect();
        assert_eq!(head, vec![o, a]);
        let tail: Vec<u32> = adaptor.live_at_tail(1).collect();
        assert_eq!(tail, vec![o, a, x]);
        assert_eq!(adaptor.live_at_head(0).count(), 0);
        assert_eq!(adaptor.blocks_in_post_order(), vec![2, 1, 0]);
    }

    #[test]
    fn test_insert_barriers() {
        let mut ir = TestIR::parse(LOOP).unwrap();
        let o = ir.value_by_name(0, "o").unwrap();
        let store = ir.blocks[2].insts[0];
        {
            let mut adaptor = TestIRAdaptor::new(&mut ir, 0);
            let insertion = BarrierInsertion {
                index: 1,
                origin: NodeOrigin::new(store).with_invalid_exit(),
                base: Edge::new(o, UseKind::KnownCell),
            };
            adaptor.insert_barriers(2, &[insertion]);
        }
        assert_eq!(
            ir.block_ops(2),
            vec!["put_by_offset", "fenced_store_barrier", "return"]
        );
        let barrier = &ir.values[ir.blocks[2].insts[1] as usize];
        assert_eq!(barrier.origin, Some(store));
        assert!(!barrier.exit_ok);
        assert!(ir.print().contains("fenced_store_barrier %o !invalid_exit"));
    }
}
