//! Test IR (TIR) for exercising the store barrier phase.
//!
//! A small textual IR that maps directly onto the opcodes, operand edges and
//! effects the phase understands, so tests can be written without a real JIT
//! graph.
//!
//! # TIR Format
//!
//! ```text
//! ; Comments start with semicolon
//! store_into_arg(%obj) cps {
//! entry:
//!     %a = new_object
//!     %c = const 42
//!     put_by_offset %a, %a, %c
//!     put_by_offset %obj, %obj, %a
//!     %r = call %a
//!     put_stack %a, $1
//!     put_by_val.contiguous %a, %c, %r
//!     branch %c, ^left, ^right
//! left:
//!     %p = phi
//!     return %p
//! right:
//!     upsilon %a, %p
//!     jump ^left
//! }
//! ```
//!
//! - The word after the argument list is the graph form: `cps` (default),
//!   `ssa` or `load_store`.
//! - `%v:kind` gives an operand's use kind (`cell`, `known_cell`, `int32`,
//!   ...). Store bases default to `cell`, everything else to `untyped`.
//! - `op.mode` selects an array mode, `op.slow` marks a slow-path indexed
//!   store.
//! - `$n` is a stack slot immediate for `get_stack`, `put_stack`,
//!   `get_local` and `set_local`.
//! - A trailing `!invalid_exit` marks a node at which OSR exit is invalid.

use crate::core::error::BarrierResult;
use crate::core::ir::{ArrayMode, Constant, GraphForm, Opcode, UseKind};
use std::fmt::Write as _;

pub mod adaptor;
pub mod check;
pub mod effects;
pub mod interpreter;
pub mod parser;

pub use adaptor::TestIRAdaptor;
pub use check::{run_module, run_module_keep_going, CheckDirective, RunDirective, TestRunner, TestSpec};
pub use interpreter::TestInterpreter;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TestIR {
    pub functions: Vec<Function>,
    pub blocks: Vec<Block>,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub form: GraphForm,
    pub args: Vec<u32>,
    pub block_begin_idx: u32,
    pub block_end_idx: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub name: String,
    /// Instructions in execution order. The entry block starts with the
    /// function's arguments.
    pub insts: Vec<u32>,
    pub succs: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand {
    pub value: u32,
    pub use_kind: UseKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    /// Empty for instructions that define nothing.
    pub name: String,
    pub op: Opcode,
    pub operands: Vec<Operand>,
    pub array_mode: ArrayMode,
    pub slow_put: bool,
    pub slot: Option<i32>,
    pub constant: Option<Constant>,
    /// For upsilons: the phi fed.
    pub phi: Option<u32>,
    pub exit_ok: bool,
    /// For inserted barriers: the store they service.
    pub origin: Option<u32>,
}

impl Value {
    pub fn new(name: impl Into<String>, op: Opcode) -> Self {
        Self {
            name: name.into(),
            op,
            operands: Vec::new(),
            array_mode: ArrayMode::Generic,
            slow_put: false,
            slot: None,
            constant: None,
            phi: None,
            exit_ok: true,
            origin: None,
        }
    }
}

/// Use kind an operand gets when the text does not spell one out.
pub fn default_use_kind(op: Opcode, position: usize) -> UseKind {
    use Opcode::*;
    match (op, position) {
        (FencedStoreBarrier, 0) => UseKind::KnownCell,
        (PutByOffset, 1) => UseKind::Cell,
        (PutByOffset, _) => UseKind::Untyped,
        (
            PutByVal | PutByValDirect | PutByValAlias | ArrayPush | PutPrivateName
            | PutPrivateNameById | SetPrivateBrand | PutById | PutByIdFlush | PutByIdDirect
            | PutByIdMegamorphic | PutStructure | DeleteById | DeleteByVal | RegExpTestInline
            | RecordRegExpCachedResult | PutClosureVar | PutToArguments
            | SetRegExpObjectLastIndex | PutInternalField | EnumeratorPutByVal
            | PutByValMegamorphic | MultiPutByOffset | MultiDeleteByOffset | PutGlobalVariable
            | SetFunctionName | NukeStructureAndSetButterfly,
            0,
        ) => UseKind::Cell,
        _ => UseKind::Untyped,
    }
}

impl TestIR {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> BarrierResult<Self> {
        parser::parse_ir(text)
    }

    pub fn function_index(&self, name: &str) -> Option<usize> {
        self.functions.iter().position(|f| f.name == name)
    }

    /// Blocks of a function, as global block indices.
    pub fn function_blocks(&self, func: usize) -> std::ops::Range<u32> {
        let f = &self.functions[func];
        f.block_begin_idx..f.block_end_idx
    }

    /// Number of instructions with the given opcode in a function.
    pub fn count_ops(&self, func: usize, op: Opcode) -> usize {
        self.function_blocks(func)
            .flat_map(|b| self.blocks[b as usize].insts.iter())
            .filter(|&&v| self.values[v as usize].op == op)
            .count()
    }

    /// Opcode names of a block's instructions, arguments excluded.
    pub fn block_ops(&self, block: u32) -> Vec<&'static str> {
        self.blocks[block as usize]
            .insts
            .iter()
            .map(|&v| self.values[v as usize].op)
            .filter(|&op| op != Opcode::Argument)
            .map(Opcode::name)
            .collect()
    }

    pub fn block_by_name(&self, func: usize, name: &str) -> Option<u32> {
        self.function_blocks(func)
            .find(|&b| self.blocks[b as usize].name == name)
    }

    pub fn value_by_name(&self, func: usize, name: &str) -> Option<u32> {
        let f = &self.functions[func];
        f.args
            .iter()
            .copied()
            .chain(
                self.function_blocks(func)
                    .flat_map(|b| self.blocks[b as usize].insts.iter().copied()),
            )
            .find(|&v| self.values[v as usize].name == name)
    }

    pub fn print(&self) -> String {
        let mut output = String::new();
        for func in 0..self.functions.len() {
            self.print_function(func, &mut output);
        }
        output
    }

    pub fn print_function(&self, func: usize, output: &mut String) {
        let f = &self.functions[func];
        let args: Vec<String> = f
            .args
            .iter()
            .map(|&a| format!("%{}", self.values[a as usize].name))
            .collect();
        let _ = writeln!(output, "{}({}) {} {{", f.name, args.join(", "), f.form);

        for block_idx in self.function_blocks(func) {
            let block = &self.blocks[block_idx as usize];
            let _ = writeln!(output, "{}:", block.name);
            for &inst in &block.insts {
                let value = &self.values[inst as usize];
                if value.op == Opcode::Argument {
                    continue;
                }
                let _ = writeln!(output, "    {}", self.format_value(value, block));
            }
        }
        output.push_str("}\n");
    }

    fn format_value(&self, value: &Value, block: &Block) -> String {
        let mut text = String::new();
        if value.op.has_result() && !value.name.is_empty() {
            let _ = write!(text, "%{} = ", value.name);
        }
        text.push_str(value.op.name());
        if value.array_mode != ArrayMode::Generic {
            let _ = write!(text, ".{}", value.array_mode.name());
        }
        if value.slow_put {
            text.push_str(".slow");
        }

        let mut parts: Vec<String> = Vec::new();
        if let Some(constant) = value.constant {
            parts.push(constant.to_string());
        }
        for (position, operand) in value.operands.iter().enumerate() {
            let name = &self.values[operand.value as usize].name;
            if operand.use_kind == default_use_kind(value.op, position) {
                parts.push(format!("%{}", name));
            } else {
                parts.push(format!("%{}:{}", name, operand.use_kind.name()));
            }
        }
        if let Some(phi) = value.phi {
            parts.push(format!("%{}", self.values[phi as usize].name));
        }
        if let Some(slot) = value.slot {
            parts.push(format!("${}", slot));
        }
        if value.op.is_terminator() {
            parts.extend(
                block
                    .succs
                    .iter()
                    .map(|&succ| format!("^{}", self.blocks[succ as usize].name)),
            );
        }
        if !parts.is_empty() {
            text.push(' ');
            text.push_str(&parts.join(", "));
        }
        if !value.exit_ok {
            text.push_str(" !invalid_exit");
        }
        text
    }
}

impl std::fmt::Display for TestIR {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.print())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
store(%obj) cps {
entry:
    %a = new_object
    %c = const 42
    put_by_offset %a, %a, %c:int32
    put_by_val.contiguous.slow %obj, %c, %a
    put_stack %a, $3
    branch %c, ^left, ^right
left:
    return %a
right:
    return
}
"#;

    #[test]
    fn test_print_round_trip() {
        let ir = TestIR::parse(SAMPLE).unwrap();
        let printed = ir.print();
        let reparsed = TestIR::parse(&printed).unwrap();
        assert_eq!(printed, reparsed.print());
        assert!(printed.contains("store(%obj) cps {"));
        assert!(printed.contains("put_by_offset %a, %a, %c:int32"));
        assert!(printed.contains("put_by_val.contiguous.slow %obj, %c, %a"));
        assert!(printed.contains("put_stack %a, $3"));
        assert!(printed.contains("branch %c, ^left, ^right"));
    }

    #[test]
    fn test_queries() {
        let ir = TestIR::parse(SAMPLE).unwrap();
        let func = ir.function_index("store").unwrap();
        assert_eq!(ir.count_ops(func, Opcode::NewObject), 1);
        let entry = ir.block_by_name(func, "entry").unwrap();
        assert_eq!(ir.block_ops(entry)[0], "new_object");
        assert!(ir.value_by_name(func, "obj").is_some());
        assert_eq!(default_use_kind(Opcode::PutByOffset, 1), UseKind::Cell);
        assert_eq!(default_use_kind(Opcode::PutByOffset, 0), UseKind::Untyped);
    }
}
