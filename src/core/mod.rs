// This module gathers the host-facing infrastructure the store barrier phase is
// built on: the IR contract types (opcodes, operand edges and use kinds, result
// and constant classification, array modes), abstract heaps and effects, the
// IrAdaptor trait through which the phase reads and mutates the host graph, the
// AbstractInterpreter trait used by the global mode, deferred barrier
// insertion, dense per-block maps, block order and liveness analysis, and the
// error type shared by everything.

//! Core infrastructure shared by the phase and its hosts.

pub mod adaptor;
pub mod analyzer;
pub mod block_map;
pub mod error;
pub mod heap;
pub mod insertion;
pub mod interpreter;
pub mod ir;

pub use adaptor::IrAdaptor;
pub use analyzer::Analyzer;
pub use block_map::BlockMap;
pub use error::{BarrierError, BarrierResult};
pub use heap::{AbstractHeap, Effects, HeapKind};
pub use insertion::{BarrierInsertion, InsertionSet, NodeOrigin};
pub use interpreter::AbstractInterpreter;
pub use ir::{ArrayMode, Constant, Edge, GraphForm, Opcode, ResultKind, UseKind};
