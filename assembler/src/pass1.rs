//! Stage 4: pass 1, layout. Walks the fully expanded line stream once,
//! assigning addresses, registering labels and constants, and sizing
//! every instruction/data/alignment directive without emitting any
//! bytes.
//!
//! Grounded on `generator.rs`'s `generate_bytecode` walk shape (one pass
//! over the node stream advancing a running address), split apart from
//! emission: this pass only ever sizes lines.

use asm_support::Address;

use crate::data;
use crate::directive::{classify, DataUnit, Stmt};
use crate::encoding::EncodingState;
use crate::error::{err, AssembleError};
use crate::expr::Evaluator;
use crate::if_stack::IfStack;
use crate::instructions::{self, Cpu};
use crate::line::Line;
use crate::line_syntax::LeadingLabel;
use crate::symbol_table::{LineContext, SymbolTable};

#[derive(Debug, Clone, Copy)]
pub enum LineKind {
    /// No bytes at this line (label-only, assignment, `.org`, `.if`, ...).
    Other,
    /// `DB`/`.byte`, `DW`/`.word`, `.text`, `.incbin`, `DS`: `unit_bytes`
    /// is the per-item width the debug writer reports.
    Data { unit_bytes: u8 },
    /// `.align` padding; `byte_len` zero bytes to emit.
    Align,
    Instruction,
}

#[derive(Debug, Clone, Copy)]
pub struct LineLayout {
    pub address: Address,
    pub byte_len: u16,
    pub kind: LineKind,
}

pub struct Pass1Output {
    /// One entry per line in the expanded stream; `None` for lines
    /// skipped by an inactive `.if`.
    pub layouts: Vec<Option<LineLayout>>,
    pub rom_len: u32,
}

fn advance(origin: &asm_support::origin::Origin, address: Address, len: u32) -> Result<Address, AssembleError> {
    let end = address as u32 + len;
    if end > 0x10000 {
        return Err(err!(Range, origin, "Address space exceeded: would reach 0x{:X}", end));
    }
    Ok(end as Address)
}

struct Pass1<'a> {
    symbols: &'a SymbolTable,
    cpu: Cpu,
    errors: Vec<AssembleError>,
    encoding: EncodingState,
}

impl<'a> Pass1<'a> {
    fn eval(&self, expr: &str, scope_key: &str, index: usize, address: Address, origin: &asm_support::origin::Origin) -> Result<i64, AssembleError> {
        let ctx = LineContext { table: self.symbols, scope_key, line: index, location_counter: Some(address as i64) };
        Evaluator::new(&ctx).eval(expr, origin)
    }

    fn address_from(&self, value: i64, origin: &asm_support::origin::Origin) -> Result<Address, AssembleError> {
        if value < 0 || value > 0xFFFF {
            return Err(err!(Range, origin, "Address 0x{:X} out of range [0, 0x10000)", value));
        }
        Ok(value as Address)
    }

    /// Registers `label` at `address`, immediately.
    fn declare_label(&mut self, label: &LeadingLabel, scope_key: &str, index: usize, address: Address, origin: &asm_support::origin::Origin) {
        match label {
            LeadingLabel::Global(name) => {
                if let Err(existing) = self.symbols.declare_global_label(name, address, origin) {
                    self.errors.push(err!(Semantic, origin, "Label '{}' already defined at {}:{}", name, existing.origin.file, existing.origin.line));
                }
            }
            LeadingLabel::Local(name) => {
                self.symbols.declare_local_label(scope_key, name, index, address);
            }
        }
    }

    fn run(&mut self, lines: &[Line], scope_keys: &[String]) -> Vec<Option<LineLayout>> {
        let mut address: Address = 0;
        let mut if_stack = IfStack::new();
        let mut layouts = Vec::with_capacity(lines.len());

        for (i, line) in lines.iter().enumerate() {
            let scope_key = &scope_keys[i];
            let origin = &line.origin;
            let statement = classify(&line.text);

            if let Stmt::EndIf = statement.kind {
                if statement.label.is_some() {
                    self.errors.push(err!(Semantic, origin, "A label is not allowed on this directive"));
                }
                if !if_stack.pop() {
                    self.errors.push(err!(Structure, origin, "Unmatched .endif"));
                }
                layouts.push(None);
                continue;
            }

            if let Stmt::If { expr } = &statement.kind {
                if statement.label.is_some() {
                    self.errors.push(err!(Semantic, origin, "A label is not allowed on this directive"));
                }
                let was_active = if_stack.is_active();
                let ctx = LineContext { table: self.symbols, scope_key, line: i, location_counter: Some(address as i64) };
                let ev = if was_active { Evaluator::new(&ctx) } else { Evaluator::syntax_check(&ctx) };
                let condition = match ev.eval(expr, origin) {
                    Ok(v) => v != 0,
                    Err(e) => {
                        self.errors.push(e);
                        false
                    }
                };
                if_stack.push(condition);
                layouts.push(None);
                continue;
            }

            if !if_stack.is_active() {
                layouts.push(None);
                continue;
            }

            if crate::directive::forbids_label(&statement.kind) && statement.label.is_some() {
                self.errors.push(err!(Semantic, origin, "A label is not allowed on this directive"));
            }

            let defers_label = matches!(statement.kind, Stmt::Org { .. } | Stmt::Align { .. });
            if let Some(label) = &statement.label {
                if !defers_label {
                    self.declare_label(label, scope_key, i, address, origin);
                }
            }

            let layout = match &statement.kind {
                Stmt::Blank | Stmt::EndIf | Stmt::If { .. } => None,

                Stmt::Assignment { name, expr } => {
                    if !self.symbols.is_variable(name) {
                        match self.eval(expr, scope_key, i, address, origin) {
                            Ok(value) => {
                                if let Err(existing) = self.symbols.declare_const(name, value, origin) {
                                    self.errors.push(err!(
                                        Semantic,
                                        origin,
                                        "Constant '{}' already defined at {}:{}",
                                        name,
                                        existing.origin.file,
                                        existing.origin.line
                                    ));
                                }
                            }
                            Err(e) => self.errors.push(e),
                        }
                    }
                    Some(LineLayout { address, byte_len: 0, kind: LineKind::Other })
                }

                Stmt::VarDecl { name, expr } => {
                    match self.eval(expr, scope_key, i, address, origin) {
                        Ok(value) => self.symbols.declare_var(name, value, origin),
                        Err(e) => self.errors.push(e),
                    }
                    Some(LineLayout { address, byte_len: 0, kind: LineKind::Other })
                }

                Stmt::Print { .. } | Stmt::Error { .. } => Some(LineLayout { address, byte_len: 0, kind: LineKind::Other }),

                Stmt::Encoding { args } => {
                    if let Err(e) = self.encoding.apply_directive(args, origin) {
                        self.errors.push(e);
                    }
                    Some(LineLayout { address, byte_len: 0, kind: LineKind::Other })
                }

                Stmt::Org { expr } => match self.eval(expr, scope_key, i, address, origin).and_then(|v| self.address_from(v, origin)) {
                    Ok(new_address) => {
                        address = new_address;
                        if let Some(label) = &statement.label {
                            self.declare_label(label, scope_key, i, address, origin);
                        }
                        Some(LineLayout { address, byte_len: 0, kind: LineKind::Other })
                    }
                    Err(e) => {
                        self.errors.push(e);
                        None
                    }
                },

                Stmt::Align { expr } => match self.eval(expr, scope_key, i, address, origin) {
                    Ok(n) => {
                        if n <= 0 || (n & (n - 1)) != 0 {
                            self.errors.push(err!(Range, origin, ".align value {} is not a positive power of two", n));
                            None
                        } else {
                            let n = n as u32;
                            let pad = (n - (address as u32 % n)) % n;
                            match advance(origin, address, pad) {
                                Ok(new_address) => {
                                    let entry_address = address;
                                    address = new_address;
                                    if let Some(label) = &statement.label {
                                        self.declare_label(label, scope_key, i, address, origin);
                                    }
                                    Some(LineLayout { address: entry_address, byte_len: pad as u16, kind: LineKind::Align })
                                }
                                Err(e) => {
                                    self.errors.push(e);
                                    None
                                }
                            }
                        }
                    }
                    Err(e) => {
                        self.errors.push(e);
                        None
                    }
                },

                Stmt::Incbin { args } => match parse_incbin_args(args, origin) {
                    Ok((path, offset_expr, length_expr)) => {
                        let offset = match &offset_expr {
                            Some(e) => self.eval(e, scope_key, i, address, origin),
                            None => Ok(0),
                        };
                        let explicit_length = length_expr.as_ref().map(|e| self.eval(e, scope_key, i, address, origin));
                        match (offset, explicit_length.transpose()) {
                            (Ok(offset), Ok(explicit_length)) => match incbin_len(&path, offset as u64, explicit_length.map(|v| v as u64), origin) {
                                Ok(len) => match advance(origin, address, len as u32) {
                                    Ok(new_address) => {
                                        let entry = address;
                                        address = new_address;
                                        Some(LineLayout { address: entry, byte_len: len as u16, kind: LineKind::Data { unit_bytes: 1 } })
                                    }
                                    Err(e) => {
                                        self.errors.push(e);
                                        None
                                    }
                                },
                                Err(e) => {
                                    self.errors.push(e);
                                    None
                                }
                            },
                            (offset_res, length_res) => {
                                if let Err(e) = offset_res {
                                    self.errors.push(e);
                                }
                                if let Err(e) = length_res {
                                    self.errors.push(e);
                                }
                                None
                            }
                        }
                    }
                    Err(e) => {
                        self.errors.push(e);
                        None
                    }
                },

                Stmt::Data { unit, args } => match data::parse_items(args) {
                    Ok(items) => {
                        let len = data::byte_count(*unit, &items);
                        match advance(origin, address, len) {
                            Ok(new_address) => {
                                let entry = address;
                                address = new_address;
                                let unit_bytes = if matches!(unit, DataUnit::Word) { 2 } else { 1 };
                                Some(LineLayout { address: entry, byte_len: len as u16, kind: LineKind::Data { unit_bytes } })
                            }
                            Err(e) => {
                                self.errors.push(e);
                                None
                            }
                        }
                    }
                    Err(message) => {
                        self.errors.push(err!(Syntax, origin, "{}", message));
                        None
                    }
                },

                Stmt::Ds { expr } => match self.eval(expr, scope_key, i, address, origin) {
                    Ok(n) if n >= 0 => match advance(origin, address, n as u32) {
                        Ok(new_address) => {
                            let entry = address;
                            address = new_address;
                            Some(LineLayout { address: entry, byte_len: n as u16, kind: LineKind::Data { unit_bytes: 1 } })
                        }
                        Err(e) => {
                            self.errors.push(e);
                            None
                        }
                    },
                    Ok(n) => {
                        self.errors.push(err!(Range, origin, "DS count {} may not be negative", n));
                        None
                    }
                    Err(e) => {
                        self.errors.push(e);
                        None
                    }
                },

                Stmt::Instruction { mnemonic, operands } => {
                    let shape = instructions::operand_shape(self.cpu, operands);
                    match instructions::lookup(self.cpu, mnemonic, &shape) {
                        Some(info) => match advance(origin, address, info.size as u32) {
                            Ok(new_address) => {
                                let entry = address;
                                address = new_address;
                                Some(LineLayout { address: entry, byte_len: info.size as u16, kind: LineKind::Instruction })
                            }
                            Err(e) => {
                                self.errors.push(e);
                                None
                            }
                        },
                        None => {
                            self.errors.push(err!(Semantic, origin, "Unknown instruction '{} {}'", mnemonic, operands));
                            None
                        }
                    }
                }
            };

            layouts.push(layout);
        }

        if if_stack.has_unclosed() {
            self.errors.push(AssembleError::new(crate::error::ErrorKind::Structure, None, "Unclosed .if at end of source"));
        }

        layouts
    }
}

/// Parses `"path"[, offset[, length]]` for `.incbin`.
pub fn parse_incbin_args(args: &str, origin: &asm_support::origin::Origin) -> Result<(String, Option<String>, Option<String>), AssembleError> {
    let parts = crate::line_syntax::split_top_level_commas(args);
    let path_part = parts.first().ok_or_else(|| err!(Syntax, origin, ".incbin requires a quoted path"))?;
    let (bytes, _) = crate::line_syntax::parse_string_literal(path_part.trim()).map_err(|e| err!(Syntax, origin, "Invalid .incbin path: {}", e))?;
    let path = String::from_utf8_lossy(&bytes).into_owned();
    let offset = parts.get(1).cloned();
    let length = parts.get(2).cloned();
    Ok((path, offset, length))
}

/// Resolves the byte length `.incbin "path"[, offset[, length]]`
/// contributes: `length` if given, else the file's size minus `offset`.
pub fn incbin_len(path: &str, offset: u64, explicit_length: Option<u64>, origin: &asm_support::origin::Origin) -> Result<u64, AssembleError> {
    if let Some(length) = explicit_length {
        return Ok(length);
    }
    let metadata = std::fs::metadata(path).map_err(|e| err!(Io, origin, "Could not read .incbin file '{}': {}", path, e))?;
    Ok(metadata.len().saturating_sub(offset))
}

/// Runs pass 1 over the fully expanded line stream, assigning addresses
/// and populating `symbols`.
pub fn run_pass1(lines: &[Line], scope_keys: &[String], symbols: &SymbolTable, cpu: Cpu) -> (Pass1Output, Vec<AssembleError>) {
    let mut pass = Pass1 { symbols, cpu, errors: Vec::new(), encoding: EncodingState::default() };
    let layouts = pass.run(lines, scope_keys);
    let rom_len = layouts.iter().flatten().map(|l| l.address as u32 + l.byte_len as u32).max().unwrap_or(0);
    (Pass1Output { layouts, rom_len }, pass.errors)
}
