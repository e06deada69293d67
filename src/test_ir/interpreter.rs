//! A deliberately small abstract interpreter for TIR.
//!
//! It tracks two facts: which blocks control flow can reach (a `force_exit`
//! ends its block, so its successors are only reached through other edges)
//! and, within a block, which values were proven not to be cells by a
//! non-cell use kind or a `check_not_cell`.

use super::adaptor::TestIRAdaptor;
use crate::core::interpreter::AbstractInterpreter;
use crate::core::ir::{Edge, Opcode};
use crate::core::IrAdaptor;
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Default)]
pub struct TestInterpreter {
    reached: HashSet<u32>,
    not_cell: HashSet<u32>,
}

impl TestInterpreter {
    pub fn new(adaptor: &TestIRAdaptor<'_>) -> Self {
        let mut reached = HashSet::new();
        let mut queue = VecDeque::new();
        let entry = adaptor.entry_block();
        reached.insert(entry);
        queue.push_back(entry);

        while let Some(block) = queue.pop_front() {
            let exits = adaptor
                .block_insts(block)
                .any(|inst| adaptor.inst_opcode(inst) == Opcode::ForceExit);
            if exits {
                continue;
            }
            for succ in adaptor.block_succs(block) {
                if reached.insert(succ) {
                    queue.push_back(succ);
                }
            }
        }

        Self {
            reached,
            not_cell: HashSet::new(),
        }
    }
}

impl<'ir> AbstractInterpreter<TestIRAdaptor<'ir>> for TestInterpreter {
    fn block_reached(&self, block: u32) -> bool {
        self.reached.contains(&block)
    }

    fn begin_basic_block(&mut self, _adaptor: &TestIRAdaptor<'ir>, _block: u32) {
        self.not_cell.clear();
    }

    fn execute_edges(&mut self, adaptor: &TestIRAdaptor<'ir>, inst: u32) {
        let checks = adaptor.inst_opcode(inst) == Opcode::CheckNotCell;
        for edge in adaptor.inst_operands(inst) {
            if checks || edge.use_kind.is_known_non_cell() {
                self.not_cell.insert(edge.node);
            }
        }
    }

    fn is_not_cell(&self, adaptor: &TestIRAdaptor<'ir>, edge: Edge<u32>) -> bool {
        if let Some(constant) = adaptor.inst_constant(edge.node) {
            return !constant.is_cell();
        }
        adaptor.inst_result(edge.node).is_non_cell()
            || edge.use_kind.is_known_non_cell()
            || self.not_cell.contains(&edge.node)
    }

    fn execute_effects(&mut self, adaptor: &TestIRAdaptor<'ir>, _index: usize, inst: u32) -> bool {
        adaptor.inst_opcode(inst) != Opcode::ForceExit
    }

    fn reset(&mut self) {
        self.not_cell.clear();
    }
}
