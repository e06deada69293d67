//! Phase driver: picks a mode from the configuration and the graph form, runs
//! it, and keeps running totals across functions.

use super::config::{BarrierConfig, PhaseMode};
use super::stats::BarrierStats;
use super::{fast, global};
use crate::core::adaptor::IrAdaptor;
use crate::core::error::{BarrierError, BarrierResult};
use crate::core::interpreter::AbstractInterpreter;

#[derive(Debug, Default)]
pub struct StoreBarrierInsertion {
    config: BarrierConfig,
    totals: BarrierStats,
}

impl StoreBarrierInsertion {
    pub fn new(config: BarrierConfig) -> Self {
        Self {
            config,
            totals: BarrierStats::default(),
        }
    }

    pub fn config(&self) -> &BarrierConfig {
        &self.config
    }

    /// Totals over every successful run.
    pub fn stats(&self) -> &BarrierStats {
        &self.totals
    }

    /// The mode a graph of the adaptor's form will be processed in.
    pub fn mode_for<A: IrAdaptor + ?Sized>(&self, adaptor: &A) -> PhaseMode {
        self.config.mode.resolve(adaptor.graph_form())
    }

    /// Insert barriers into the adaptor's function. Global mode needs the
    /// host's abstract interpreter. On error the function's graph must be
    /// discarded.
    pub fn run<A: IrAdaptor + ?Sized>(
        &mut self,
        adaptor: &mut A,
        interpreter: Option<&mut dyn AbstractInterpreter<A>>,
    ) -> BarrierResult<BarrierStats> {
        let mut stats = match self.mode_for(adaptor) {
            PhaseMode::Fast => fast::run(adaptor, &self.config)?,
            PhaseMode::Global => {
                let interpreter = interpreter.ok_or(BarrierError::MissingInterpreter)?;
                global::run(adaptor, interpreter, &self.config)?
            }
        };
        stats.functions = 1;
        self.totals.merge(&stats);
        Ok(stats)
    }
}

/// Run fast barrier insertion with the default configuration.
pub fn perform_fast_store_barrier_insertion<A: IrAdaptor + ?Sized>(
    adaptor: &mut A,
) -> BarrierResult<BarrierStats> {
    let mut stats = fast::run(adaptor, &BarrierConfig::default())?;
    stats.functions = 1;
    Ok(stats)
}

/// Run global barrier insertion with the default configuration.
pub fn perform_global_store_barrier_insertion<A: IrAdaptor + ?Sized>(
    adaptor: &mut A,
    interpreter: &mut dyn AbstractInterpreter<A>,
) -> BarrierResult<BarrierStats> {
    let mut stats = global::run(adaptor, interpreter, &BarrierConfig::default())?;
    stats.functions = 1;
    Ok(stats)
}
