//! Stage 5: pass 2, emission. Walks the same expanded line stream again,
//! this time writing bytes, updating `.var` reassignments, running
//! `.print`/`.error`, and recording the per-line address map and data
//! spans the debug writer needs.
//!
//! Grounded on `generator.rs`'s `push_byte!`/`push_sized_number!` emission
//! helpers and its deferred label-patch idea - except here pass 1 has
//! already fixed every address, so there is nothing left to patch: every
//! label reference resolves immediately against the symbol table pass 1
//! already finished populating.

use asm_support::origin::Origin;
use asm_support::Address;

use crate::data::{self, Item};
use crate::directive::{classify, DataUnit, Stmt};
use crate::encoding::EncodingState;
use crate::error::{err, AssembleError};
use crate::expr::Evaluator;
use crate::if_stack::IfStack;
use crate::instructions::{self, Cpu};
use crate::line::Line;
use crate::line_syntax;
use crate::pass1::{self, LineKind, LineLayout};
use crate::symbol_table::{LineContext, SymbolTable};

#[derive(Debug, Clone)]
pub struct PrintMessage {
    pub text: String,
    pub origin: Origin,
}

#[derive(Debug, Clone)]
pub struct LineAddress {
    pub file_basename: String,
    pub line: usize,
    pub address: Address,
}

#[derive(Debug, Clone)]
pub struct DataSpan {
    pub file_basename: String,
    pub line: usize,
    pub start: Address,
    pub byte_length: u16,
    pub unit_bytes: u8,
}

#[derive(Default)]
pub struct Pass2Output {
    pub rom: Vec<u8>,
    pub line_addresses: Vec<LineAddress>,
    pub data_spans: Vec<DataSpan>,
    pub prints: Vec<PrintMessage>,
    pub warnings: Vec<AssembleError>,
    pub aborted: bool,
}

fn write_at(rom: &mut Vec<u8>, address: Address, bytes: &[u8]) {
    let end = address as usize + bytes.len();
    if rom.len() < end {
        rom.resize(end, 0);
    }
    rom[address as usize..end].copy_from_slice(bytes);
}

fn zero_fill(rom: &mut Vec<u8>, address: Address, len: u16) {
    write_at(rom, address, &vec![0u8; len as usize]);
}

/// Encodes a signed value as the emitter would show it in a diagnostic:
/// `-0x12` or `0x34`.
fn signed_hex(value: i64) -> String {
    if value < 0 {
        format!("-0x{:X}", -value)
    } else {
        format!("0x{:X}", value)
    }
}

/// Truncates `value` to `imm_size` little-endian bytes, returning a
/// warning message when it falls outside the accepted signed/unsigned
/// combined range: out-of-range immediates are warnings, not fatal - the
/// emitter truncates and keeps going.
fn encode_immediate(value: i64, imm_size: u8) -> (Vec<u8>, Option<String>) {
    match imm_size {
        0 => (Vec::new(), None),
        1 => {
            let in_range = (-0x80..=0xFF).contains(&value);
            let byte = (value & 0xFF) as u8;
            let warning = (!in_range).then(|| format!("Value {} out of range for an 8-bit operand; truncated", signed_hex(value)));
            (vec![byte], warning)
        }
        2 => {
            let in_range = (-0x8000..=0xFFFF).contains(&value);
            let word = (value & 0xFFFF) as u16;
            let warning = (!in_range).then(|| format!("Value {} out of range for a 16-bit operand; truncated", signed_hex(value)));
            (word.to_le_bytes().to_vec(), warning)
        }
        _ => unreachable!("instruction table never declares an imm_size outside {{0,1,2}}"),
    }
}

struct Pass2<'a> {
    symbols: &'a SymbolTable,
    cpu: Cpu,
    errors: Vec<AssembleError>,
    encoding: EncodingState,
    out: Pass2Output,
}

impl<'a> Pass2<'a> {
    fn eval(&self, expr: &str, scope_key: &str, index: usize, address: Address, origin: &Origin) -> Result<i64, AssembleError> {
        let ctx = LineContext { table: self.symbols, scope_key, line: index, location_counter: Some(address as i64) };
        Evaluator::new(&ctx).eval(expr, origin)
    }

    fn record_line_address(&mut self, origin: &Origin, address: Address) {
        self.out.line_addresses.push(LineAddress { file_basename: origin.file.basename().to_ascii_lowercase(), line: origin.line, address });
    }

    fn record_data_span(&mut self, origin: &Origin, start: Address, byte_length: u16, unit_bytes: u8) {
        self.out.data_spans.push(DataSpan { file_basename: origin.file.basename().to_ascii_lowercase(), line: origin.line, start, byte_length, unit_bytes });
    }

    fn run(&mut self, lines: &[Line], scope_keys: &[String], layouts: &[Option<LineLayout>]) {
        let mut if_stack = IfStack::new();

        for (i, line) in lines.iter().enumerate() {
            let scope_key = &scope_keys[i];
            let origin = &line.origin;
            let statement = classify(&line.text);

            if let Stmt::EndIf = statement.kind {
                if_stack.pop();
                continue;
            }
            if let Stmt::If { expr } = &statement.kind {
                let was_active = if_stack.is_active();
                let layout_address = layouts[i].map(|l| l.address).unwrap_or(0);
                let ctx = LineContext { table: self.symbols, scope_key, line: i, location_counter: Some(layout_address as i64) };
                let ev = if was_active { Evaluator::new(&ctx) } else { Evaluator::syntax_check(&ctx) };
                let condition = ev.eval(expr, origin).map(|v| v != 0).unwrap_or(false);
                if_stack.push(condition);
                continue;
            }
            if !if_stack.is_active() {
                continue;
            }
            if matches!(statement.kind, Stmt::Blank) {
                continue;
            }

            let Some(layout) = layouts[i] else { continue };
            self.record_line_address(origin, layout.address);

            match &statement.kind {
                Stmt::Blank | Stmt::EndIf | Stmt::If { .. } => {}

                Stmt::Assignment { name, expr } => {
                    if self.symbols.is_variable(name) {
                        match self.eval(expr, scope_key, i, layout.address, origin) {
                            Ok(value) => self.symbols.reassign_var(name, value, origin),
                            Err(e) => self.errors.push(e),
                        }
                    }
                }

                Stmt::VarDecl { .. } => {}

                Stmt::Print { args } => match self.stringify_args(args, scope_key, i, layout.address, origin) {
                    Ok(text) => {
                        println!("{}", text);
                        self.out.prints.push(PrintMessage { text, origin: origin.clone() });
                    }
                    Err(e) => self.errors.push(e),
                },

                Stmt::Error { args } => {
                    let text = self.stringify_args(args, scope_key, i, layout.address, origin).unwrap_or_default();
                    self.errors.push(err!(UserRaised, origin, "{}", text));
                    self.out.aborted = true;
                    return;
                }

                Stmt::Encoding { args } => {
                    if let Err(e) = self.encoding.apply_directive(args, origin) {
                        self.errors.push(e);
                    }
                }

                Stmt::Org { .. } | Stmt::Align { .. } => {
                    if matches!(layout.kind, LineKind::Align) {
                        zero_fill(&mut self.out.rom, layout.address, layout.byte_len);
                    }
                }

                Stmt::Incbin { args } => {
                    self.emit_incbin(args, scope_key, i, layout, origin);
                }

                Stmt::Data { unit, args } => {
                    self.emit_data(*unit, args, scope_key, i, layout, origin);
                }

                Stmt::Ds { .. } => {
                    zero_fill(&mut self.out.rom, layout.address, layout.byte_len);
                    self.record_data_span(origin, layout.address, layout.byte_len, 1);
                }

                Stmt::Instruction { mnemonic, operands } => {
                    self.emit_instruction(mnemonic, operands, scope_key, i, layout, origin);
                }
            }
        }

        if if_stack.has_unclosed() {
            self.errors.push(AssembleError::new(crate::error::ErrorKind::Structure, None, "Unclosed .if at end of source"));
        }
    }

    fn stringify_args(&self, args: &str, scope_key: &str, index: usize, address: Address, origin: &Origin) -> Result<String, AssembleError> {
        let mut out = String::new();
        for part in line_syntax::split_top_level_commas(args) {
            let trimmed = part.trim();
            if trimmed.starts_with('\'') || trimmed.starts_with('"') {
                let (bytes, _) = line_syntax::parse_string_literal(trimmed).map_err(|e| err!(Syntax, origin, "{}", e))?;
                out.push_str(&String::from_utf8_lossy(&bytes));
            } else if !trimmed.is_empty() {
                let value = self.eval(trimmed, scope_key, index, address, origin)?;
                out.push_str(&value.to_string());
            }
        }
        Ok(out)
    }

    fn emit_data(&mut self, unit: DataUnit, args: &str, scope_key: &str, index: usize, layout: LineLayout, origin: &Origin) {
        let items = match data::parse_items(args) {
            Ok(items) => items,
            Err(message) => {
                self.errors.push(err!(Syntax, origin, "{}", message));
                zero_fill(&mut self.out.rom, layout.address, layout.byte_len);
                return;
            }
        };

        let mut bytes = Vec::with_capacity(layout.byte_len as usize);
        for item in &items {
            match item {
                Item::Str(s) => {
                    for c in s.chars() {
                        match unit {
                            DataUnit::Word => bytes.extend_from_slice(&(self.encoding.encode_char(c) as u16).to_le_bytes()),
                            _ => bytes.push(self.encoding.encode_char(c)),
                        }
                    }
                }
                Item::Expr(expr) => match self.eval(expr, scope_key, index, layout.address, origin) {
                    Ok(value) => match unit {
                        DataUnit::Word => {
                            let (b, warning) = encode_immediate(value, 2);
                            bytes.extend_from_slice(&b);
                            if let Some(w) = warning {
                                self.out.warnings.push(err!(Range, origin, "{}", w));
                            }
                        }
                        _ => {
                            let (b, warning) = encode_immediate(value, 1);
                            bytes.extend_from_slice(&b);
                            if let Some(w) = warning {
                                self.out.warnings.push(err!(Range, origin, "{}", w));
                            }
                        }
                    },
                    Err(e) => {
                        self.errors.push(e);
                        match unit {
                            DataUnit::Word => bytes.extend_from_slice(&[0, 0]),
                            _ => bytes.push(0),
                        }
                    }
                },
            }
        }

        bytes.resize(layout.byte_len as usize, 0);
        write_at(&mut self.out.rom, layout.address, &bytes);
        let unit_bytes = if matches!(unit, DataUnit::Word) { 2 } else { 1 };
        self.record_data_span(origin, layout.address, layout.byte_len, unit_bytes);
    }

    fn emit_incbin(&mut self, args: &str, scope_key: &str, index: usize, layout: LineLayout, origin: &Origin) {
        let Ok((path, offset_expr, length_expr)) = pass1::parse_incbin_args(args, origin) else {
            zero_fill(&mut self.out.rom, layout.address, layout.byte_len);
            return;
        };

        let offset = match &offset_expr {
            Some(e) => self.eval(e, scope_key, index, layout.address, origin).unwrap_or(0),
            None => 0,
        } as u64;

        let contents = match std::fs::read(&path) {
            Ok(c) => c,
            Err(e) => {
                self.errors.push(err!(Io, origin, "Could not read .incbin file '{}': {}", path, e));
                zero_fill(&mut self.out.rom, layout.address, layout.byte_len);
                return;
            }
        };

        let length = length_expr
            .as_ref()
            .and_then(|e| self.eval(e, scope_key, index, layout.address, origin).ok())
            .map(|v| v as u64)
            .unwrap_or(layout.byte_len as u64);

        let start = offset.min(contents.len() as u64) as usize;
        let end = (start + length as usize).min(contents.len());
        let mut slice = contents[start..end].to_vec();
        slice.resize(layout.byte_len as usize, 0);
        write_at(&mut self.out.rom, layout.address, &slice);
        self.record_data_span(origin, layout.address, layout.byte_len, 1);
    }

    fn emit_instruction(&mut self, mnemonic: &str, operands: &str, scope_key: &str, index: usize, layout: LineLayout, origin: &Origin) {
        let shape = instructions::operand_shape(self.cpu, operands);
        let Some(info) = instructions::lookup(self.cpu, mnemonic, &shape) else {
            self.errors.push(err!(Semantic, origin, "Unknown instruction '{} {}'", mnemonic, operands));
            zero_fill(&mut self.out.rom, layout.address, layout.byte_len);
            return;
        };

        let operand_parts = line_syntax::split_top_level_commas(operands);
        let shape_parts: Vec<&str> = if shape.is_empty() { Vec::new() } else { shape.split(',').collect() };

        if mnemonic.eq_ignore_ascii_case("RST") {
            let n_index = shape_parts.iter().position(|p| *p == "N").unwrap_or(0);
            let value = operand_parts.get(n_index).and_then(|e| self.eval(e, scope_key, index, layout.address, origin).ok());
            match value {
                Some(n) if (0..=7).contains(&n) => {
                    write_at(&mut self.out.rom, layout.address, &[0xC7 | ((n as u8) << 3)]);
                }
                Some(n) => {
                    self.errors.push(err!(Range, origin, "RST operand {} out of range [0,7]", n));
                    zero_fill(&mut self.out.rom, layout.address, layout.byte_len);
                }
                None => zero_fill(&mut self.out.rom, layout.address, layout.byte_len),
            }
            return;
        }

        let mut bytes = vec![info.opcode];
        if info.imm_size > 0 {
            let n_index = shape_parts.iter().position(|p| *p == "N").unwrap_or(0);
            match operand_parts.get(n_index) {
                Some(expr) => match self.eval(expr, scope_key, index, layout.address, origin) {
                    Ok(value) => {
                        let (imm_bytes, warning) = encode_immediate(value, info.imm_size);
                        bytes.extend_from_slice(&imm_bytes);
                        if let Some(w) = warning {
                            self.out.warnings.push(err!(Range, origin, "{}", w));
                        }
                    }
                    Err(e) => {
                        self.errors.push(e);
                        bytes.resize(1 + info.imm_size as usize, 0);
                    }
                },
                None => {
                    self.errors.push(err!(Semantic, origin, "Missing operand for '{}'", mnemonic));
                    bytes.resize(1 + info.imm_size as usize, 0);
                }
            }
        }

        bytes.resize(layout.byte_len as usize, 0);
        write_at(&mut self.out.rom, layout.address, &bytes);
    }
}

/// Runs pass 2 over the same expanded stream and layouts pass 1 computed.
pub fn run_pass2(lines: &[Line], scope_keys: &[String], layouts: &[Option<LineLayout>], symbols: &SymbolTable, cpu: Cpu) -> (Pass2Output, Vec<AssembleError>) {
    let mut pass = Pass2 { symbols, cpu, errors: Vec::new(), encoding: EncodingState::default(), out: Pass2Output::default() };
    pass.run(lines, scope_keys, layouts);
    (pass.out, pass.errors)
}
