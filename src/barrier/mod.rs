// This module holds the store barrier phase proper. Epochs and the side table
// that stores them live in epoch; escapes tracks fresh values parked in precise
// stack slots; walker is the per-block walk both algorithms share; fast and
// global implement the two BarrierMode strategies (per-block for CPS graphs,
// a reverse-postorder fixpoint over boundary sets for SSA graphs); phase is the
// driver that picks between them from the BarrierConfig and the graph form and
// accumulates BarrierStats across functions.

//! Store barrier insertion and elimination.
//!
//! A write barrier is needed after a store of a possibly-cell value into a
//! base that is not fresh. A base is fresh when it was allocated, or already
//! barriered, since the last point where a collection could have started.

pub mod config;
pub mod epoch;
pub mod escapes;
pub mod fast;
pub mod global;
pub mod mode;
pub mod phase;
pub mod stats;
pub mod walker;

pub use config::{BarrierConfig, ModeSelection, PhaseMode, DEFAULT_STACK_ESCAPE_CAPACITY};
pub use epoch::{Epoch, EpochTable};
pub use escapes::StackEscapes;
pub use fast::FastMode;
pub use global::{block_transfer, boundary_sets, GlobalMode};
pub use mode::BarrierMode;
pub use phase::{
    perform_fast_store_barrier_insertion, perform_global_store_barrier_insertion,
    StoreBarrierInsertion,
};
pub use stats::BarrierStats;
pub use walker::BlockWalker;
