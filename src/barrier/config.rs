//! Phase configuration.

use crate::core::ir::GraphForm;
use std::fmt;

/// Which barrier algorithm to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModeSelection {
    /// Global on SSA graphs, fast otherwise.
    #[default]
    Auto,
    Fast,
    Global,
}

impl ModeSelection {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(ModeSelection::Auto),
            "fast" => Some(ModeSelection::Fast),
            "global" => Some(ModeSelection::Global),
            _ => None,
        }
    }

    /// Resolve to a concrete mode for a graph of the given form.
    pub fn resolve(self, form: GraphForm) -> PhaseMode {
        match self {
            ModeSelection::Auto if form == GraphForm::Ssa => PhaseMode::Global,
            ModeSelection::Auto | ModeSelection::Fast => PhaseMode::Fast,
            ModeSelection::Global => PhaseMode::Global,
        }
    }
}

/// A concrete barrier algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseMode {
    /// Per-block, no inter-block state, CPS form.
    Fast,
    /// Fixpoint over the CFG using liveness and the abstract interpreter, SSA form.
    Global,
}

impl PhaseMode {
    pub fn name(self) -> &'static str {
        match self {
            PhaseMode::Fast => "fast",
            PhaseMode::Global => "global",
        }
    }
}

impl fmt::Display for PhaseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub const DEFAULT_STACK_ESCAPE_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierConfig {
    pub mode: ModeSelection,
    /// Number of stack slots that may hold a fresh value at once.
    pub stack_escape_capacity: usize,
}

impl Default for BarrierConfig {
    fn default() -> Self {
        Self {
            mode: ModeSelection::Auto,
            stack_escape_capacity: DEFAULT_STACK_ESCAPE_CAPACITY,
        }
    }
}

impl BarrierConfig {
    pub fn with_mode(mut self, mode: ModeSelection) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_stack_escape_capacity(mut self, capacity: usize) -> Self {
        self.stack_escape_capacity = capacity;
        self
    }
}
