use std::fmt;

/// Counters collected over one or more phase runs.
///
/// Block counts include fixpoint sweeps; the decision counters only cover the
/// walk that inserts barriers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BarrierStats {
    /// Functions the phase ran on.
    pub functions: usize,

    /// Block walks, including fixpoint sweeps.
    pub blocks_walked: usize,

    /// Blocks skipped because they were unreached or did not finish.
    pub blocks_skipped: usize,

    /// Sweeps the global fixpoint needed to converge.
    pub fixpoint_sweeps: usize,

    /// Barriers handed to the host.
    pub barriers_inserted: usize,

    /// Stores whose base was fresh.
    pub elided_fresh: usize,

    /// Stores whose value was proven not to be a cell.
    pub elided_non_cell: usize,

    /// Values invalidated because they escaped.
    pub escapes_invalidated: usize,

    /// Fresh values parked in a precise stack slot.
    pub stack_pins: usize,
}

impl BarrierStats {
    pub fn merge(&mut self, other: &BarrierStats) {
        self.functions += other.functions;
        self.blocks_walked += other.blocks_walked;
        self.blocks_skipped += other.blocks_skipped;
        self.fixpoint_sweeps += other.fixpoint_sweeps;
        self.barriers_inserted += other.barriers_inserted;
        self.elided_fresh += other.elided_fresh;
        self.elided_non_cell += other.elided_non_cell;
        self.escapes_invalidated += other.escapes_invalidated;
        self.stack_pins += other.stack_pins;
    }
}

impl fmt::Display for BarrierStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Store Barrier Statistics:")?;
        writeln!(f, "  Functions: {}", self.functions)?;
        writeln!(f, "  Blocks walked: {}", self.blocks_walked)?;
        writeln!(f, "  Blocks skipped: {}", self.blocks_skipped)?;
        if self.fixpoint_sweeps > 0 {
            writeln!(f, "  Fixpoint sweeps: {}", self.fixpoint_sweeps)?;
        }
        writeln!(f, "  Barriers inserted: {}", self.barriers_inserted)?;
        writeln!(f, "  Elided (fresh base): {}", self.elided_fresh)?;
        writeln!(f, "  Elided (non-cell value): {}", self.elided_non_cell)?;
        writeln!(f, "  Escapes invalidated: {}", self.escapes_invalidated)?;
        writeln!(f, "  Stack pins: {}", self.stack_pins)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_and_display() {
        let mut total = BarrierStats::default();
        let run = BarrierStats {
            functions: 1,
            barriers_inserted: 2,
            fixpoint_sweeps: 3,
            ..Default::default()
        };
        total.merge(&run);
        total.merge(&run);
        assert_eq!(total.barriers_inserted, 4);
        assert_eq!(total.functions, 2);
        let text = total.to_string();
        assert!(text.contains("Barriers inserted: 4"));
        assert!(text.contains("Fixpoint sweeps: 6"));
        assert!(!BarrierStats::default().to_string().contains("Fixpoint"));
    }
}
