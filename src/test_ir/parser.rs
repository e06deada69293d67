//! TIR (Test IR) parser implementation.
//!
//! Forward references to values and blocks are recorded as placeholders and
//! patched once the whole function has been read.

use super::*;
use crate::core::error::BarrierError;
use std::collections::HashMap;

pub fn parse_ir(text: &str) -> BarrierResult<TestIR> {
    let parser = Parser::new(text);
    parser.parse()
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
    ir: TestIR,

    // Per-function maps
    blocks: HashMap<&'a str, u32>,
    values: HashMap<&'a str, u32>,
    block_resolves: Vec<Resolve<'a>>,
    value_resolves: Vec<Resolve<'a>>,
}

/// Where a not-yet-resolved name has to be patched in.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Operand { value: u32, position: usize },
    Phi { value: u32 },
    Succ { block: u32, position: usize },
}

#[derive(Debug)]
struct Resolve<'a> {
    name: &'a str,
    slot: Slot,
    pos: usize,
}

const PLACEHOLDER: u32 = u32::MAX;

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            ir: TestIR::new(),
            blocks: HashMap::new(),
            values: HashMap::new(),
            block_resolves: Vec::new(),
            value_resolves: Vec::new(),
        }
    }

    fn parse(mut self) -> BarrierResult<TestIR> {
        self.skip_whitespace(true);
        while !self.is_eof() {
            self.parse_function()?;
            self.skip_whitespace(true);
        }
        Ok(self.ir)
    }

    fn error_at(&self, pos: usize, message: impl Into<String>) -> BarrierError {
        let line = self.text[..pos.min(self.text.len())]
            .bytes()
            .filter(|&b| b == b'\n')
            .count()
            + 1;
        BarrierError::Parse {
            line,
            message: message.into(),
        }
    }

    fn error(&self, message: impl Into<String>) -> BarrierError {
        self.error_at(self.pos, message)
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn current_char(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.pos += ch.len_utf8();
        }
    }

    fn skip_whitespace(&mut self, skip_newlines: bool) {
        while let Some(ch) = self.current_char() {
            if ch == ';' {
                while let Some(ch) = self.current_char() {
                    if ch == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else if ch.is_whitespace() {
                if ch == '\n' && !skip_newlines {
                    break;
                }
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Skip spaces and comments on the current line only.
    fn skip_inline(&mut self) {
        self.skip_whitespace(false);
    }

    fn try_read(&mut self, ch: char) -> bool {
        self.skip_inline();
        if self.current_char() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> BarrierResult<()> {
        if !self.try_read(ch) {
            return Err(self.error(format!(
                "expected '{}' but found {:?}",
                ch,
                self.current_char()
            )));
        }
        Ok(())
    }

    fn at_line_end(&mut self) -> bool {
        self.skip_inline();
        matches!(self.current_char(), None | Some('\n') | Some('}'))
    }

    fn read_identifier(&mut self) -> BarrierResult<&'a str> {
        self.skip_inline();
        let start = self.pos;
        match self.current_char() {
            Some(ch) if ch.is_alphabetic() || ch == '_' => {}
            Some(ch) => return Err(self.error(format!("expected identifier but found '{}'", ch))),
            None => return Err(self.error("expected identifier but found end of input")),
        }
        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
        Ok(&self.text[start..self.pos])
    }

    fn read_value_name(&mut self) -> BarrierResult<&'a str> {
        self.expect('%')?;
        self.read_identifier()
    }

    fn read_block_name(&mut self) -> BarrierResult<&'a str> {
        self.expect('^')?;
        self.read_identifier()
    }

    /// A signed decimal literal, possibly with a fraction.
    fn read_number_token(&mut self) -> BarrierResult<&'a str> {
        self.skip_inline();
        let start = self.pos;
        if self.current_char() == Some('-') {
            self.advance();
        }
        while let Some(ch) = self.current_char() {
            if ch.is_ascii_digit() || ch == '.' {
                self.advance();
            } else {
                break;
            }
        }
        let token = &self.text[start..self.pos];
        if token.is_empty() || token == "-" {
            return Err(self.error_at(start, "expected number"));
        }
        Ok(token)
    }

    fn read_slot(&mut self) -> BarrierResult<i32> {
        self.expect('$')?;
        let start = self.pos;
        let token = self.read_number_token()?;
        token
            .parse()
            .map_err(|e| self.error_at(start, format!("invalid stack slot '{}': {}", token, e)))
    }

    fn parse_function(&mut self) -> BarrierResult<()> {
        let name_pos = self.pos;
        let func_name = self.read_identifier()?;
        if self.ir.function_index(func_name).is_some() {
            return Err(self.error_at(
                name_pos,
                format!("duplicate function definition: '{}'", func_name),
            ));
        }

        self.blocks.clear();
        self.values.clear();
        self.block_resolves.clear();
        self.value_resolves.clear();

        self.expect('(')?;
        let mut args = Vec::new();
        while !self.try_read(')') {
            let arg_name = self.read_value_name()?;
            let arg_idx = self.define_value(arg_name, Value::new(arg_name, Opcode::Argument))?;
            args.push(arg_idx);
            if !self.try_read(',') && self.current_char() != Some(')') {
                return Err(self.error("expected ',' or ')' in argument list"));
            }
        }

        self.skip_whitespace(true);
        let form = if self.current_char() == Some('{') {
            GraphForm::ThreadedCps
        } else {
            let form_pos = self.pos;
            let word = self.read_identifier()?;
            GraphForm::parse(word)
                .ok_or_else(|| self.error_at(form_pos, format!("unknown graph form '{}'", word)))?
        };

        self.skip_whitespace(true);
        self.expect('{')?;
        let block_begin_idx = self.ir.blocks.len() as u32;
        loop {
            self.skip_whitespace(true);
            if self.try_read('}') {
                break;
            }
            if self.is_eof() {
                return Err(self.error(format!("unterminated function '{}'", func_name)));
            }
            self.parse_block()?;
        }
        let block_end_idx = self.ir.blocks.len() as u32;
        if block_begin_idx == block_end_idx {
            return Err(self.error_at(name_pos, format!("function '{}' has no blocks", func_name)));
        }

        // Arguments execute first in the entry block.
        let entry = &mut self.ir.blocks[block_begin_idx as usize];
        let body = std::mem::take(&mut entry.insts);
        entry.insts = args.iter().copied().chain(body).collect();

        self.resolve_function_references()?;

        self.ir.functions.push(Function {
            name: func_name.to_string(),
            form,
            args,
            block_begin_idx,
            block_end_idx,
        });
        Ok(())
    }

    fn parse_block(&mut self) -> BarrierResult<()> {
        let name_pos = self.pos;
        let block_name = self.read_identifier()?;
        self.expect(':')?;

        let block_idx = self.ir.blocks.len() as u32;
        if self.blocks.insert(block_name, block_idx).is_some() {
            return Err(self.error_at(name_pos, format!("duplicate block '{}'", block_name)));
        }
        self.ir.blocks.push(Block {
            name: block_name.to_string(),
            insts: Vec::new(),
            succs: Vec::new(),
        });

        loop {
            self.skip_whitespace(true);
            if self.is_eof() || self.current_char() == Some('}') || self.at_block_label() {
                break;
            }
            self.parse_instruction(block_idx)?;
        }
        Ok(())
    }

    /// Whether the next line is `name:`.
    fn at_block_label(&self) -> bool {
        let rest = &self.text[self.pos..];
        let ident_len = rest
            .char_indices()
            .find(|&(_, ch)| !(ch.is_alphanumeric() || ch == '_'))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        ident_len > 0 && rest[ident_len..].trim_start_matches([' ', '\t']).starts_with(':')
    }

    fn parse_instruction(&mut self, block_idx: u32) -> BarrierResult<()> {
        let inst_pos = self.pos;

        let mut def_name = None;
        if self.current_char() == Some('%') {
            def_name = Some(self.read_value_name()?);
            self.expect('=')?;
        }

        let op_pos = self.pos;
        let op_name = self.read_identifier()?;
        let op = Opcode::parse(op_name)
            .ok_or_else(|| self.error_at(op_pos, format!("unknown opcode '{}'", op_name)))?;
        let mut value = Value::new(def_name.unwrap_or(""), op);

        while self.current_char() == Some('.') {
            self.advance();
            let modifier_pos = self.pos;
            let modifier = self.read_identifier()?;
            if modifier == "slow" {
                value.slow_put = true;
            } else if let Some(mode) = ArrayMode::parse(modifier) {
                value.array_mode = mode;
            } else {
                return Err(self.error_at(modifier_pos, format!("unknown modifier '{}'", modifier)));
            }
        }

        if def_name.is_some() && !op.has_result() {
            return Err(self.error_at(inst_pos, format!("'{}' does not define a value", op)));
        }

        let inst_idx = self.ir.values.len() as u32;
        let mut value_refs: Vec<(&'a str, UseKind, usize)> = Vec::new();
        let mut succ_refs: Vec<(&'a str, usize)> = Vec::new();

        if op == Opcode::Const {
            value.constant = Some(self.parse_constant()?);
        }

        let mut first = true;
        while !self.at_line_end() {
            if self.current_char() == Some('!') {
                break;
            }
            if !first {
                self.expect(',')?;
            }
            first = false;

            self.skip_inline();
            let arg_pos = self.pos;
            match self.current_char() {
                Some('%') => {
                    let name = self.read_value_name()?;
                    let use_kind = if self.current_char() == Some(':') {
                        self.advance();
                        let kind_pos = self.pos;
                        let kind = self.read_identifier()?;
                        Some(UseKind::parse(kind).ok_or_else(|| {
                            self.error_at(kind_pos, format!("unknown use kind '{}'", kind))
                        })?)
                    } else {
                        None
                    };
                    let position = value_refs.len();
                    value_refs.push((
                        name,
                        use_kind.unwrap_or_else(|| default_use_kind(op, position)),
                        arg_pos,
                    ));
                }
                Some('^') => {
                    let name = self.read_block_name()?;
                    succ_refs.push((name, arg_pos));
                }
                Some('$') => {
                    value.slot = Some(self.read_slot()?);
                }
                other => {
                    return Err(self.error(format!("unexpected {:?} in operand list", other)));
                }
            }
        }

        if self.try_read('!') {
            let flag_pos = self.pos;
            let flag = self.read_identifier()?;
            if flag != "invalid_exit" {
                return Err(self.error_at(flag_pos, format!("unknown flag '!{}'", flag)));
            }
            value.exit_ok = false;
        }

        if op == Opcode::Upsilon {
            // upsilon %value, %phi
            if value_refs.len() != 2 {
                return Err(self.error_at(inst_pos, "upsilon takes a value and a phi"));
            }
            if let Some((phi_name, _, phi_pos)) = value_refs.pop() {
                value.phi = Some(PLACEHOLDER);
                self.value_resolves.push(Resolve {
                    name: phi_name,
                    slot: Slot::Phi { value: inst_idx },
                    pos: phi_pos,
                });
            }
        }

        if !succ_refs.is_empty() && !op.is_terminator() {
            return Err(self.error_at(inst_pos, format!("'{}' cannot have successors", op)));
        }

        for (position, &(name, use_kind, pos)) in value_refs.iter().enumerate() {
            value.operands.push(Operand {
                value: PLACEHOLDER,
                use_kind,
            });
            self.value_resolves.push(Resolve {
                name,
                slot: Slot::Operand {
                    value: inst_idx,
                    position,
                },
                pos,
            });
        }

        for &(name, pos) in &succ_refs {
            let block = &mut self.ir.blocks[block_idx as usize];
            let position = block.succs.len();
            block.succs.push(PLACEHOLDER);
            self.block_resolves.push(Resolve {
                name,
                slot: Slot::Succ {
                    block: block_idx,
                    position,
                },
                pos,
            });
        }

        match def_name {
            Some(name) => {
                self.define_value(name, value)?;
            }
            None => self.ir.values.push(value),
        }
        self.ir.blocks[block_idx as usize].insts.push(inst_idx);
        Ok(())
    }

    fn parse_constant(&mut self) -> BarrierResult<Constant> {
        self.skip_inline();
        let pos = self.pos;
        match self.current_char() {
            Some(ch) if ch.is_ascii_digit() || ch == '-' => {
                let token = self.read_number_token()?;
                if token.contains('.') {
                    token
                        .parse()
                        .map(Constant::Double)
                        .map_err(|e| self.error_at(pos, format!("invalid double '{}': {}", token, e)))
                } else {
                    token
                        .parse()
                        .map(Constant::Int32)
                        .map_err(|e| self.error_at(pos, format!("invalid int32 '{}': {}", token, e)))
                }
            }
            _ => match self.read_identifier()? {
                "true" => Ok(Constant::Boolean(true)),
                "false" => Ok(Constant::Boolean(false)),
                "null" => Ok(Constant::Null),
                "undefined" => Ok(Constant::Undefined),
                "cell" => Ok(Constant::Cell),
                other => Err(self.error_at(pos, format!("unknown constant '{}'", other))),
            },
        }
    }

    fn define_value(&mut self, name: &'a str, value: Value) -> BarrierResult<u32> {
        let idx = self.ir.values.len() as u32;
        if self.values.insert(name, idx).is_some() {
            return Err(self.error(format!("value '%{}' defined twice", name)));
        }
        self.ir.values.push(value);
        Ok(idx)
    }

    fn resolve_function_references(&mut self) -> BarrierResult<()> {
        for resolve in std::mem::take(&mut self.value_resolves) {
            let target = *self.values.get(resolve.name).ok_or_else(|| {
                self.error_at(resolve.pos, format!("undefined value '%{}'", resolve.name))
            })?;
            match resolve.slot {
                Slot::Operand { value, position } => {
                    self.ir.values[value as usize].operands[position].value = target;
                }
                Slot::Phi { value } => {
                    if self.ir.values[target as usize].op != Opcode::Phi {
                        return Err(self.error_at(
                            resolve.pos,
                            format!("upsilon target '%{}' is not a phi", resolve.name),
                        ));
                    }
                    self.ir.values[value as usize].phi = Some(target);
                }
                Slot::Succ { .. } => {}
            }
        }

        for resolve in std::mem::take(&mut self.block_resolves) {
            let target = *self.blocks.get(resolve.name).ok_or_else(|| {
                self.error_at(resolve.pos, format!("undefined block '^{}'", resolve.name))
            })?;
            if let Slot::Succ { block, position } = resolve.slot {
                self.ir.blocks[block as usize].succs[position] = target;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_function() {
        let ir = parse_ir(
            r#"
; leading comment
f(%x, %y) ssa {
entry:
    %a = new_object
    %c = const -3
    put_by_offset %a, %a, %x:int32 ; trailing comment
    jump ^exit
exit:
    return %a
}
"#,
        )
        .unwrap();

        assert_eq!(ir.functions.len(), 1);
        let f = &ir.functions[0];
        assert_eq!(f.form, GraphForm::Ssa);
        assert_eq!(f.args.len(), 2);

        let entry = &ir.blocks[f.block_begin_idx as usize];
        // Two arguments, then four instructions.
        assert_eq!(entry.insts.len(), 6);
        assert_eq!(entry.succs, vec![f.block_begin_idx + 1]);

        let store = &ir.values[entry.insts[4] as usize];
        assert_eq!(store.op, Opcode::PutByOffset);
        assert_eq!(store.operands[0].use_kind, UseKind::Untyped);
        assert_eq!(store.operands[1].use_kind, UseKind::Cell);
        assert_eq!(store.operands[2].use_kind, UseKind::Int32);
        assert_eq!(store.operands[2].value, f.args[0]);

        let constant = &ir.values[entry.insts[3] as usize];
        assert_eq!(constant.constant, Some(Constant::Int32(-3)));
    }

    #[test]
    fn test_parse_defaults_to_cps() {
        let ir = parse_ir("g() {\nentry:\n    return\n}\n").unwrap();
        assert_eq!(ir.functions[0].form, GraphForm::ThreadedCps);
    }

    #[test]
    fn test_parse_phi_and_upsilon() {
        let ir = parse_ir(
            r#"
h() ssa {
entry:
    %a = new_object
    upsilon %a, %p
    jump ^join
join:
    %p = phi
    return %p
}
"#,
        )
        .unwrap();
        let entry = &ir.blocks[0];
        let upsilon = &ir.values[entry.insts[1] as usize];
        assert_eq!(upsilon.op, Opcode::Upsilon);
        assert_eq!(upsilon.operands.len(), 1);
        let phi = upsilon.phi.unwrap();
        assert_eq!(ir.values[phi as usize].op, Opcode::Phi);
    }

    #[test]
    fn test_parse_modifiers_and_slots() {
        let ir = parse_ir(
            r#"
k(%o) {
entry:
    put_by_val.array_storage.slow %o, %o, %o
    put_stack %o, $-2
    %v = get_stack $-2
    fenced_store_barrier %o !invalid_exit
    return
}
"#,
        )
        .unwrap();
        let insts = &ir.blocks[0].insts;
        let put = &ir.values[insts[1] as usize];
        assert_eq!(put.array_mode, ArrayMode::ArrayStorage);
        assert!(put.slow_put);
        assert_eq!(ir.values[insts[2] as usize].slot, Some(-2));
        let barrier = &ir.values[insts[4] as usize];
        assert!(!barrier.exit_ok);
        assert_eq!(barrier.operands[0].use_kind, UseKind::KnownCell);
    }

    #[test]
    fn test_parse_errors() {
        let undefined = parse_ir("f() {\nentry:\n    return %nope\n}\n").unwrap_err();
        assert!(matches!(undefined, BarrierError::Parse { line: 3, .. }));

        let bad_op = parse_ir("f() {\nentry:\n    frobnicate\n}\n").unwrap_err();
        assert!(bad_op.to_string().contains("unknown opcode"));

        let dup = parse_ir("f() {\nentry:\n    return\n}\nf() {\nentry:\n    return\n}\n");
        assert!(dup.is_err());

        let no_result = parse_ir("f(%o) {\nentry:\n    %x = put_stack %o, $1\n    return\n}\n");
        assert!(no_result.is_err());

        let bad_target = parse_ir("f(%o) {\nentry:\n    upsilon %o, %o\n    return\n}\n");
        assert!(bad_target.unwrap_err().to_string().contains("not a phi"));
    }
}
