//! Store barrier insertion and elimination for a JIT compiler's IR.
//!
//! A generational or concurrent collector needs a write barrier after any
//! store of a cell into an object that might already have been scanned. This
//! crate decides, per store, whether that barrier is provably redundant, and
//! asks the host to insert a `FencedStoreBarrier` where it is not.
//!
//! # Primary Usage
//!
//! ```ignore
//! use store_barrier::barrier::{BarrierConfig, StoreBarrierInsertion};
//!
//! let mut phase = StoreBarrierInsertion::new(BarrierConfig::default());
//! // Fast mode (CPS graphs) needs no interpreter.
//! let stats = phase.run(&mut adaptor, None)?;
//! // Global mode (SSA graphs) runs the host's abstract interpreter alongside.
//! let stats = phase.run(&mut ssa_adaptor, Some(&mut interpreter))?;
//! ```
//!
//! # Architecture
//!
//! - [`core`] - IR contract types, the [`IrAdaptor`] and
//!   [`AbstractInterpreter`] traits, block order and liveness
//! - [`barrier`] - epochs, the per-block walk, fast and global modes, driver
//! - [`test_ir`] - a textual test IR implementing the host side

pub mod barrier;
pub mod core;
pub mod test_ir;

pub use barrier::{
    perform_fast_store_barrier_insertion, perform_global_store_barrier_insertion, BarrierConfig,
    BarrierStats, ModeSelection, PhaseMode, StoreBarrierInsertion,
};
pub use core::{
    AbstractHeap, AbstractInterpreter, BarrierError, BarrierResult, Edge, Effects, GraphForm,
    IrAdaptor, Opcode, UseKind,
};
