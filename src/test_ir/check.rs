//! FileCheck-style test validation for TIR files.
//!
//! A test file is TIR with `; RUN:` and `; CHECK...:` comment lines. Each RUN
//! line runs the barrier phase over a fresh copy of the module with the given
//! options; the combined output must satisfy the CHECK directives in order.
//!
//! RUN options:
//! - `--mode fast|global|auto`
//! - `--stack-escape-capacity N`
//! - `--print-rpo`, `--print-liveness`, `--print-boundary` (before the pass)
//! - `--print-ir`, `--print-stats` (after the pass)

use super::{TestIR, TestIRAdaptor, TestInterpreter};
use crate::barrier::{self, BarrierConfig, BarrierStats, ModeSelection, PhaseMode, StoreBarrierInsertion};
use crate::core::error::{BarrierError, BarrierResult};
use crate::core::interpreter::AbstractInterpreter;
use crate::core::{Analyzer, IrAdaptor};
use log::debug;

/// A CHECK directive extracted from a TIR file
#[derive(Debug, Clone, PartialEq)]
pub enum CheckDirective {
    /// CHECK: pattern - Match exact pattern
    Check(String),
    /// CHECK-LABEL: pattern - Label for a section
    CheckLabel(String),
    /// CHECK-NEXT: pattern - Match on the next line
    CheckNext(String),
    /// CHECK-NOT: pattern - Must not appear before the next match
    CheckNot(String),
    /// CHECK-EMPTY - Match empty line
    CheckEmpty,
    /// COM: comment - Comment, ignored
    Comment(String),
}

/// A RUN directive specifying how to execute the test
#[derive(Debug, Clone)]
pub struct RunDirective {
    pub command: String,
    pub args: Vec<String>,
}

/// RUN and CHECK lines plus the module text of a TIR test file
#[derive(Debug)]
pub struct TestSpec {
    pub run_directives: Vec<RunDirective>,
    pub check_directives: Vec<CheckDirective>,
    pub tir_content: String,
}

impl TestSpec {
    /// Split a TIR test file into its directives and module text
    pub fn parse(content: &str) -> BarrierResult<Self> {
        let mut run_directives = Vec::new();
        let mut check_directives = Vec::new();
        let mut tir_lines = Vec::new();

        for line in content.lines() {
            let trimmed = line.trim();

            if let Some(run_cmd) = trimmed.strip_prefix("; RUN:") {
                let mut parts = run_cmd.split_whitespace();
                if let Some(command) = parts.next() {
                    run_directives.push(RunDirective {
                        command: command.to_string(),
                        args: parts.map(str::to_string).collect(),
                    });
                }
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-LABEL:") {
                check_directives.push(CheckDirective::CheckLabel(pattern.trim().to_string()));
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-NEXT:") {
                check_directives.push(CheckDirective::CheckNext(pattern.trim().to_string()));
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-NOT:") {
                check_directives.push(CheckDirective::CheckNot(pattern.trim().to_string()));
            } else if trimmed.starts_with("; CHECK-EMPTY") {
                check_directives.push(CheckDirective::CheckEmpty);
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK:") {
                check_directives.push(CheckDirective::Check(pattern.trim().to_string()));
            } else if let Some(comment) = trimmed.strip_prefix("; COM:") {
                check_directives.push(CheckDirective::Comment(comment.trim().to_string()));
            } else if trimmed.starts_with("; CHECK") {
                return Err(BarrierError::Check(format!("unknown directive: {}", trimmed)));
            } else {
                // Regular TIR content
                tir_lines.push(line);
            }
        }

        Ok(TestSpec {
            run_directives,
            check_directives,
            tir_content: tir_lines.join("\n"),
        })
    }
}

/// Options of one RUN line.
#[derive(Debug, Clone, Default)]
struct RunOptions {
    config: BarrierConfig,
    print_ir: bool,
    print_stats: bool,
    print_rpo: bool,
    print_liveness: bool,
    print_boundary: bool,
}

impl RunOptions {
    fn parse(args: &[String]) -> BarrierResult<Self> {
        let mut options = Self::default();
        let mut args = args.iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--print-ir" => options.print_ir = true,
                "--print-stats" => options.print_stats = true,
                "--print-rpo" => options.print_rpo = true,
                "--print-liveness" => options.print_liveness = true,
                "--print-boundary" => options.print_boundary = true,
                "--mode" => {
                    let mode = args
                        .next()
                        .and_then(|m| ModeSelection::parse(m))
                        .ok_or_else(|| BarrierError::Check("--mode needs fast, global or auto".into()))?;
                    options.config = options.config.with_mode(mode);
                }
                "--stack-escape-capacity" => {
                    let capacity = args
                        .next()
                        .and_then(|c| c.parse().ok())
                        .ok_or_else(|| BarrierError::Check("--stack-escape-capacity needs a number".into()))?;
                    options.config = options.config.with_stack_escape_capacity(capacity);
                }
                // %s and friends
                _ => {}
            }
        }
        Ok(options)
    }
}

/// Run the store barrier phase over every function of `ir`, stopping at the
/// first failure. Functions in SSA form get a [`TestInterpreter`].
pub fn run_module(ir: &mut TestIR, config: &BarrierConfig) -> BarrierResult<BarrierStats> {
    let mut phase = StoreBarrierInsertion::new(*config);
    for func in 0..ir.functions.len() {
        run_function(&mut phase, ir, func)?;
    }
    Ok(phase.stats().clone())
}

/// Run the phase over every function of `ir`, dropping the changes to any
/// function it fails on. Failures come back with the function's name; the
/// remaining functions are still processed.
pub fn run_module_keep_going(
    ir: &mut TestIR,
    config: &BarrierConfig,
) -> (BarrierStats, Vec<(String, BarrierError)>) {
    let mut phase = StoreBarrierInsertion::new(*config);
    let mut failures = Vec::new();
    for func in 0..ir.functions.len() {
        if let Err(e) = run_function_or_restore(&mut phase, ir, func) {
            failures.push((ir.functions[func].name.clone(), e));
        }
    }
    (phase.stats().clone(), failures)
}

/// A failed run leaves the function as it was.
fn run_function_or_restore(phase: &mut StoreBarrierInsertion, ir: &mut TestIR, func: usize) -> BarrierResult<()> {
    let backup = ir.clone();
    match run_function(phase, ir, func) {
        Ok(_) => Ok(()),
        Err(e) => {
            *ir = backup;
            Err(e)
        }
    }
}

fn run_function(
    phase: &mut StoreBarrierInsertion,
    ir: &mut TestIR,
    func: usize,
) -> BarrierResult<BarrierStats> {
    let mut adaptor = TestIRAdaptor::new(ir, func);
    match phase.mode_for(&adaptor) {
        PhaseMode::Fast => phase.run(&mut adaptor, None),
        PhaseMode::Global => {
            let mut interpreter = TestInterpreter::new(&adaptor);
            let interpreter: &mut dyn AbstractInterpreter<TestIRAdaptor<'_>> = &mut interpreter;
            phase.run(&mut adaptor, Some(interpreter))
        }
    }
}

/// Lines in `range`, and the text `before` the next match on its own line,
/// must not contain any pending CHECK-NOT pattern.
fn check_not(
    lines: &[&str],
    pending: &mut Vec<&str>,
    range: std::ops::Range<usize>,
    before: &str,
) -> BarrierResult<()> {
    for pattern in pending.drain(..) {
        let found = lines[range.clone()]
            .iter()
            .copied()
            .chain(std::iter::once(before))
            .find(|l| l.contains(pattern));
        if let Some(line) = found {
            return Err(BarrierError::Check(format!(
                "CHECK-NOT: pattern '{}' found in '{}'",
                pattern, line
            )));
        }
    }
    Ok(())
}

fn format_values(adaptor: &TestIRAdaptor<'_>, values: &[u32]) -> String {
    let names: Vec<String> = values
        .iter()
        .map(|&v| format!("%{}", adaptor.value_name(v)))
        .collect();
    format!("[{}]", names.join(", "))
}

/// Test runner that executes TIR tests
#[derive(Debug, Default)]
pub struct TestRunner;

impl TestRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run a TIR test and validate output
    pub fn run_test(&self, spec: &TestSpec) -> BarrierResult<()> {
        let ir = TestIR::parse(&spec.tir_content)?;
        if spec.run_directives.is_empty() {
            return Err(BarrierError::Check("test has no RUN line".into()));
        }

        for run_dir in &spec.run_directives {
            let output = self.execute_command(&ir, run_dir)?;
            debug!("output of {} {:?}:\n{}", run_dir.command, run_dir.args, output);
            self.validate_output(&output, &spec.check_directives)?;
        }

        Ok(())
    }

    /// Execute a test command on a copy of `ir` and return the output
    pub fn execute_command(&self, ir: &TestIR, run_dir: &RunDirective) -> BarrierResult<String> {
        let options = RunOptions::parse(&run_dir.args)?;
        let mut ir = ir.clone();
        let mut phase = StoreBarrierInsertion::new(options.config);
        let mut output = Vec::new();

        for func in 0..ir.functions.len() {
            let func_name = ir.functions[func].name.clone();
            self.print_analysis(&mut ir, func, &options, &mut output);

            if let Err(e) = run_function_or_restore(&mut phase, &mut ir, func) {
                output.push(format!("error in {}: {}", func_name, e));
            }
        }

        if options.print_ir {
            output.push("Printing IR".to_string());
            output.push(ir.print());
        }
        if options.print_stats {
            output.push(phase.stats().to_string());
        }

        Ok(output.join("\n"))
    }

    fn print_analysis(&self, ir: &mut TestIR, func: usize, options: &RunOptions, output: &mut Vec<String>) {
        let func_name = ir.functions[func].name.clone();
        let mut adaptor = TestIRAdaptor::new(ir, func);

        if options.print_rpo || options.print_liveness {
            let mut analyzer = Analyzer::new();
            analyzer.analyze(&adaptor);

            if options.print_rpo {
                output.push(format!("RPO for func {}", func_name));
                for (idx, block) in analyzer.reverse_post_order().into_iter().enumerate() {
                    output.push(format!("{}: {}", idx, adaptor.block_name(block)));
                }
                output.push("End RPO".to_string());
            }

            if options.print_liveness {
                output.push(format!("Liveness for {}", func_name));
                for block in adaptor.blocks() {
                    let idx = adaptor.block_index(block);
                    output.push(format!(
                        "{}: in {} out {}",
                        adaptor.block_name(block),
                        format_values(&adaptor, analyzer.live_in(idx)),
                        format_values(&adaptor, analyzer.live_out(idx))
                    ));
                }
                output.push("End Liveness".to_string());
            }
        }

        if options.print_boundary {
            let mut interpreter = TestInterpreter::new(&adaptor);
            let interpreter: &mut dyn AbstractInterpreter<TestIRAdaptor<'_>> = &mut interpreter;
            match barrier::boundary_sets(&mut adaptor, interpreter, &options.config) {
                Ok((sets, sweeps)) => {
                    output.push(format!("Boundary sets for {} after {} sweeps", func_name, sweeps));
                    let blocks: Vec<u32> = adaptor.blocks().collect();
                    for (block, (head, tail)) in blocks.into_iter().zip(sets) {
                        output.push(format!(
                            "{}: head {} tail {}",
                            adaptor.block_name(block),
                            format_values(&adaptor, &head),
                            format_values(&adaptor, &tail)
                        ));
                    }
                    output.push("End Boundary sets".to_string());
                }
                Err(e) => output.push(format!("error in {}: {}", func_name, e)),
            }
        }
    }

    /// Validate output against CHECK directives
    pub fn validate_output(&self, output: &str, directives: &[CheckDirective]) -> BarrierResult<()> {
        let output_lines: Vec<&str> = output.lines().collect();
        let mut line_idx = 0;
        let mut pending_not: Vec<&str> = Vec::new();

        for directive in directives {
            match directive {
                CheckDirective::Comment(_) => continue,

                CheckDirective::CheckNot(pattern) => pending_not.push(pattern.as_str()),

                CheckDirective::Check(pattern) | CheckDirective::CheckLabel(pattern) => {
                    let found = output_lines
                        .iter()
                        .skip(line_idx)
                        .enumerate()
                        .find_map(|(idx, &line)| line.find(pattern.as_str()).map(|col| (idx, &line[..col])));

                    match found {
                        Some((idx, before)) => {
                            check_not(&output_lines, &mut pending_not, line_idx..line_idx + idx, before)?;
                            line_idx += idx + 1;
                            debug!("CHECK: '{}' found at line {}", pattern, line_idx - 1);
                        }
                        None => {
                            return Err(BarrierError::Check(format!(
                                "pattern '{}' not found in output",
                                pattern
                            )));
                        }
                    }
                }

                CheckDirective::CheckNext(pattern) => {
                    let Some(line) = output_lines.get(line_idx) else {
                        return Err(BarrierError::Check(format!(
                            "CHECK-NEXT: no more lines, expected '{}'",
                            pattern
                        )));
                    };
                    let Some(col) = line.find(pattern.as_str()) else {
                        return Err(BarrierError::Check(format!(
                            "CHECK-NEXT: expected '{}' but got '{}'",
                            pattern, line
                        )));
                    };
                    check_not(&output_lines, &mut pending_not, line_idx..line_idx, &line[..col])?;
                    line_idx += 1;
                }

                CheckDirective::CheckEmpty => {
                    // End of output counts as empty
                    if let Some(line) = output_lines.get(line_idx) {
                        if !line.trim().is_empty() {
                            return Err(BarrierError::Check(format!(
                                "CHECK-EMPTY: expected empty line but got '{}'",
                                line
                            )));
                        }
                        line_idx += 1;
                    }
                }
            }
        }

        check_not(&output_lines, &mut pending_not, line_idx..output_lines.len(), "")
    }
}
