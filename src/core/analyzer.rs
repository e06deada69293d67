// This module implements the Analyzer, which computes the block order and
// block-boundary liveness the store barrier phase consumes. Block order comes
// from an iterative depth-first search from the entry block producing a
// postorder (and its reverse, the RPO used by the global fixpoint). Liveness is
// the classic backward dataflow: live-in is the block's upward-exposed uses plus
// everything live-out that the block does not define, and live-out is the union
// of successor live-ins, iterated until nothing changes. Upsilons count as a use
// of the value they feed; the phi they target is defined in the phi's block, so
// phi shadows never show up in a predecessor's live-out.

use super::adaptor::IrAdaptor;
use std::collections::HashSet;

/// Blocks reachable from the entry, in postorder.
pub fn compute_post_order<A: IrAdaptor + ?Sized>(adaptor: &A) -> Vec<A::BlockRef> {
    let mut post = Vec::new();
    let mut stack = vec![(adaptor.entry_block(), false)];
    let mut visited = HashSet::new();
    while let Some((block, processed)) = stack.pop() {
        if processed {
            post.push(block);
            continue;
        }
        if !visited.insert(block) {
            continue;
        }
        stack.push((block, true));
        // Reversed so the first successor is explored first.
        let succs: Vec<_> = adaptor.block_succs(block).collect();
        for succ in succs.into_iter().rev() {
            if !visited.contains(&succ) {
                stack.push((succ, false));
            }
        }
    }
    post
}

/// Block order and boundary liveness for one function.
pub struct Analyzer<A: IrAdaptor + ?Sized> {
    post_order: Vec<A::BlockRef>,
    live_in: Vec<Vec<A::InstRef>>,
    live_out: Vec<Vec<A::InstRef>>,
    iterations: usize,
}

impl<A: IrAdaptor + ?Sized> Default for Analyzer<A> {
    fn default() -> Self {
        Self {
            post_order: Vec::new(),
            live_in: Vec::new(),
            live_out: Vec::new(),
            iterations: 0,
        }
    }
}

impl<A: IrAdaptor + ?Sized> Analyzer<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reachable blocks in postorder.
    pub fn post_order(&self) -> &[A::BlockRef] {
        &self.post_order
    }

    /// Reachable blocks in reverse postorder.
    pub fn reverse_post_order(&self) -> Vec<A::BlockRef> {
        self.post_order.iter().rev().copied().collect()
    }

    /// Values live on entry to the block with the given index, sorted by
    /// instruction index.
    pub fn live_in(&self, block_index: usize) -> &[A::InstRef] {
        self.live_in.get(block_index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Values live on exit from the block with the given index.
    pub fn live_out(&self, block_index: usize) -> &[A::InstRef] {
        self.live_out.get(block_index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of sweeps the liveness fixpoint needed.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Compute block order and liveness for the adaptor's current function.
    pub fn analyze(&mut self, adaptor: &A) {
        self.post_order = compute_post_order(adaptor);

        let block_count = adaptor.block_count();
        let mut uses: Vec<HashSet<A::InstRef>> = vec![HashSet::new(); block_count];
        let mut defs: Vec<HashSet<A::InstRef>> = vec![HashSet::new(); block_count];
        let mut succs: Vec<Vec<usize>> = vec![Vec::new(); block_count];

        for block in adaptor.blocks() {
            let idx = adaptor.block_index(block);
            succs[idx] = adaptor
                .block_succs(block)
                .map(|s| adaptor.block_index(s))
                .collect();
            for inst in adaptor.block_insts(block) {
                for edge in adaptor.inst_operands(inst) {
                    if !defs[idx].contains(&edge.node) {
                        uses[idx].insert(edge.node);
                    }
                }
                if adaptor.inst_opcode(inst).has_result() {
                    defs[idx].insert(inst);
                }
            }
        }

        let mut live_in: Vec<HashSet<A::InstRef>> = vec![HashSet::new(); block_count];
        let mut live_out: Vec<HashSet<A::InstRef>> = vec![HashSet::new(); block_count];

        // Postorder first so most blocks see their successors' final state
        // on the first sweep; unreachable blocks follow.
        let mut order: Vec<usize> = self
            .post_order
            .iter()
            .map(|&b| adaptor.block_index(b))
            .collect();
        let mut seen: HashSet<usize> = order.iter().copied().collect();
        for block in adaptor.blocks() {
            let idx = adaptor.block_index(block);
            if seen.insert(idx) {
                order.push(idx);
            }
        }

        self.iterations = 0;
        let mut changed = true;
        while changed {
            changed = false;
            self.iterations += 1;
            for &idx in &order {
                let mut out = HashSet::new();
                for &succ in &succs[idx] {
                    out.extend(live_in[succ].iter().copied());
                }
                let mut inn: HashSet<A::InstRef> = uses[idx].clone();
                inn.extend(out.iter().copied().filter(|v| !defs[idx].contains(v)));
                if out.len() != live_out[idx].len() || inn.len() != live_in[idx].len() {
                    changed = true;
                }
                live_out[idx] = out;
                live_in[idx] = inn;
            }
        }

        let sorted = |set: &HashSet<A::InstRef>| {
            let mut values: Vec<A::InstRef> = set.iter().copied().collect();
            values.sort_by_key(|&v| adaptor.inst_index(v));
            values
        };
        self.live_in = live_in.iter().map(|s| sorted(s)).collect();
        self.live_out = live_out.iter().map(|s| sorted(s)).collect();
    }
}
