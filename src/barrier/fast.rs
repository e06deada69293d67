//! Fast barrier insertion.
//!
//! One pass over the blocks in natural order with no state carried between
//! blocks: anything live into a block is assumed to need a barrier. Only valid
//! before SSA conversion.

use super::config::{BarrierConfig, PhaseMode};
use super::mode::BarrierMode;
use super::stats::BarrierStats;
use super::walker::BlockWalker;
use crate::core::adaptor::IrAdaptor;
use crate::core::error::{BarrierError, BarrierResult};
use crate::core::ir::GraphForm;
use log::debug;

#[derive(Debug, Default, Clone, Copy)]
pub struct FastMode;

impl<A: IrAdaptor + ?Sized> BarrierMode<A> for FastMode {
    fn phase_mode(&self) -> PhaseMode {
        PhaseMode::Fast
    }

    fn really_insert(&self) -> bool {
        true
    }

    fn begin_block(&mut self, _adaptor: &A, _block: A::BlockRef, _walker: &mut BlockWalker<A>) -> bool {
        true
    }
}

pub(crate) fn run<A: IrAdaptor + ?Sized>(adaptor: &mut A, config: &BarrierConfig) -> BarrierResult<BarrierStats> {
    let form = adaptor.graph_form();
    if form == GraphForm::Ssa {
        return Err(BarrierError::FormMismatch {
            mode: PhaseMode::Fast.name(),
            form,
        });
    }

    debug!("starting fast store barrier insertion on {}", adaptor.func_name());

    let mut walker = BlockWalker::<A>::new(adaptor.inst_count(), config.stack_escape_capacity);
    let mut mode = FastMode;
    let blocks: Vec<_> = adaptor.blocks().collect();
    for block in blocks {
        walker.handle_block(adaptor, block, &mut mode)?;
    }

    let stats = walker.take_stats();
    debug!(
        "fast store barrier insertion on {} inserted {} barriers",
        adaptor.func_name(),
        stats.barriers_inserted
    );
    Ok(stats)
}
