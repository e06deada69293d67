// This module defines the error types for the store barrier phase using the
// thiserror crate. BarrierError covers the ways a run can fail: the graph is in
// the wrong form for the selected mode, the global mode was asked to run
// without an abstract interpreter, a barrier was requested on a base that is
// not speculated to be a cell, a value escaped to the stack through an
// imprecise write, or (for the textual test IR) parsing and FileCheck
// verification failed. The internal-invariant variants mean the host graph is
// inconsistent; the caller must discard the function rather than keep the
// partially rewritten graph. BarrierResult<T> is the usual alias.

//! Error types for the store barrier phase.

use super::ir::{GraphForm, UseKind};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BarrierError {
    #[error("{mode} barrier insertion cannot run on a {form} graph")]
    FormMismatch {
        mode: &'static str,
        form: GraphForm,
    },

    #[error("global barrier insertion requires an abstract interpreter")]
    MissingInterpreter,

    #[error("barrier base {inst} has non-cell use kind {}", use_kind.name())]
    NotCell { inst: String, use_kind: UseKind },

    #[error("value escaped to the stack at {inst} with {precise_writes} precise stack writes")]
    StackEscape { inst: String, precise_writes: usize },

    #[error("parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("check failed: {0}")]
    Check(String),
}

/// Result type alias for barrier operations.
pub type BarrierResult<T> = Result<T, BarrierError>;
