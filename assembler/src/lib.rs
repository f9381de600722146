//! The compiler pipeline: preprocess, expand macros, expand loops, compute
//! scope keys, lay out (pass 1), emit (pass 2), then render the debug map.
//!
//! Grounded on the teacher's `assembler.rs`, which likewise drove a fixed
//! stage order (tokenize, parse, generate) from one entry point; this
//! pipeline has more stages because macro/loop expansion and the two-pass
//! split are native to this assembler's design rather than the teacher's
//! single-pass one.

pub mod cli;
pub mod config;
pub mod data;
pub mod debug_writer;
pub mod directive;
pub mod encoding;
pub mod error;
pub mod expr;
pub mod if_stack;
pub mod instructions;
pub mod line;
pub mod line_syntax;
pub mod loops;
pub mod macros;
pub mod module_manager;
pub mod pass1;
pub mod pass2;
pub mod preprocessor;
pub mod scope;
pub mod symbol_table;

use std::path::{Path, PathBuf};

use asm_support::debug_schema::DebugMap;
use asm_support::Address;

pub use instructions::Cpu;

use error::AssembleError;
use module_manager::ModuleManager;
use pass2::{DataSpan, LineAddress, PrintMessage};
use symbol_table::SymbolTable;

/// Everything a caller needs out of one assemble run: whether it
/// succeeded, the ROM bytes produced so far (partial on failure, since
/// pass 2 only aborts outright on `.error`), and every diagnostic surface
/// the pipeline collected along the way.
pub struct AssembleResult {
    pub success: bool,
    pub rom: Vec<u8>,
    pub errors: Vec<AssembleError>,
    pub warnings: Vec<AssembleError>,
    pub prints: Vec<PrintMessage>,
    pub line_addresses: Vec<LineAddress>,
    pub data_spans: Vec<DataSpan>,
    pub debug_map: DebugMap,
}

impl AssembleResult {
    pub fn rom_address_range(&self) -> std::ops::Range<Address> {
        0..self.rom.len() as Address
    }
}

/// Assembles `source` (attributed to `source_path`, when given a real
/// on-disk file, for `.include` resolution and diagnostics) for `cpu`,
/// searching `include_paths` in addition to the `ASM8080_INCLUDE_PATH`
/// environment variable's directories.
///
/// Runs every stage even after earlier ones report errors, except pass 2,
/// which is skipped entirely when pass 1 failed (its addresses would be
/// meaningless) - matching the stage order `preprocess -> macros -> loops
/// -> scope keys -> pass 1 -> pass 2 -> debug map`.
pub fn assemble(source: &str, source_path: Option<&Path>, include_paths: Vec<PathBuf>, cpu: Cpu) -> AssembleResult {
    let module_manager = ModuleManager::new(include_paths);
    let (lines, mut errors) = preprocessor::preprocess(source, source_path, &module_manager);

    let (lines, macro_defs, macro_errors) = macros::collect_macros(lines);
    errors.extend(macro_errors);

    let (lines, expand_errors) = macros::expand_macros(lines, &macro_defs);
    errors.extend(expand_errors);

    let (lines, loop_errors) = loops::expand_loops(lines);
    errors.extend(loop_errors);

    let scope_keys = scope::compute_scope_keys(&lines);

    let symbols = SymbolTable::new();
    let (pass1_output, pass1_errors) = pass1::run_pass1(&lines, &scope_keys, &symbols, cpu);
    let pass1_failed = !pass1_errors.is_empty();
    errors.extend(pass1_errors);

    if pass1_failed {
        let debug_map = debug_writer::build_debug_map(&symbols, &pass2::Pass2Output::default());
        return AssembleResult {
            success: false,
            rom: Vec::new(),
            errors,
            warnings: Vec::new(),
            prints: Vec::new(),
            line_addresses: Vec::new(),
            data_spans: Vec::new(),
            debug_map,
        };
    }

    let (pass2_output, pass2_errors) = pass2::run_pass2(&lines, &scope_keys, &pass1_output.layouts, &symbols, cpu);
    errors.extend(pass2_errors);

    let debug_map = debug_writer::build_debug_map(&symbols, &pass2_output);
    let success = errors.is_empty() && !pass2_output.aborted;

    AssembleResult {
        success,
        rom: pass2_output.rom,
        errors,
        warnings: pass2_output.warnings,
        prints: pass2_output.prints,
        line_addresses: pass2_output.line_addresses,
        data_spans: pass2_output.data_spans,
        debug_map,
    }
}

/// Assembles `source`, writes the ROM to `rom_path`, then writes its debug
/// JSON companion (at `debug_path` when given, else derived from
/// `rom_path`). A debug-file write failure is logged to `errors` but does
/// not flip `success`, since the ROM itself already landed successfully -
/// only a failure to write the ROM does that.
pub fn assemble_and_write(
    source: &str,
    rom_path: &Path,
    source_path: Option<&Path>,
    include_paths: Vec<PathBuf>,
    cpu: Cpu,
    debug_path: Option<&Path>,
) -> AssembleResult {
    let mut result = assemble(source, source_path, include_paths, cpu);

    if !result.success {
        return result;
    }

    if let Err(e) = std::fs::write(rom_path, &result.rom) {
        result.errors.push(AssembleError::io(format!("Could not write '{}': {}", rom_path.display(), e)));
        result.success = false;
        return result;
    }

    let write_result = match debug_path {
        Some(path) => debug_writer::render(&result.debug_map).and_then(|json| {
            std::fs::write(path, json).map_err(|e| AssembleError::io(format!("Could not write '{}': {}", path.display(), e)))
        }),
        None => debug_writer::write_debug_json(&result.debug_map, rom_path),
    };
    if let Err(e) = write_result {
        eprintln!("warning: {}", e.message);
        result.errors.push(e);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assemble_ok(source: &str) -> AssembleResult {
        let result = assemble(source, None, Vec::new(), Cpu::I8080);
        assert!(result.errors.is_empty(), "unexpected errors: {:?}", result.errors.iter().map(|e| e.message.clone()).collect::<Vec<_>>());
        assert!(result.success);
        result
    }

    #[test]
    fn mvi_and_hlt() {
        let result = assemble_ok("MVI A, 0x12\nHLT\n");
        assert_eq!(result.rom, vec![0x3E, 0x12, 0x76]);
        assert_eq!(result.line_addresses.iter().find(|l| l.line == 1).unwrap().address, 0);
        assert_eq!(result.line_addresses.iter().find(|l| l.line == 2).unwrap().address, 2);
    }

    #[test]
    fn org_and_label_reference() {
        let result = assemble_ok("start: .org 0x100\nJMP start\n");
        assert_eq!(result.rom[0x100..0x103], [0xC3, 0x00, 0x01]);
        assert_eq!(result.debug_map.labels.get("start").unwrap().addr, "0x0100");
    }

    #[test]
    fn loop_expands_body_n_times() {
        let result = assemble_ok("N = 3\n.loop N\n  NOP\n.endloop\n");
        assert_eq!(result.rom, vec![0x00, 0x00, 0x00]);
    }

    #[test]
    fn macro_call_expands_body() {
        let result = assemble_ok(".macro INC2()\nINR A\nINR A\n.endmacro\nINC2()\n");
        assert_eq!(result.rom, vec![0x3C, 0x3C]);
    }

    #[test]
    fn var_reassignment_is_seen_in_source_order() {
        let result = assemble_ok("val .var 0\nval = val + 1\n  DB val\nval = val + 1\n  DB val\n");
        assert_eq!(result.rom, vec![0x01, 0x02]);
    }

    #[test]
    fn string_data_and_labels() {
        let result = assemble_ok("data: DB \"AB\", 0\nend:\n");
        assert_eq!(result.rom, vec![0x41, 0x42, 0x00]);
        assert_eq!(result.debug_map.labels.get("data").unwrap().addr, "0x0000");
        assert_eq!(result.debug_map.labels.get("end").unwrap().addr, "0x0003");
        let span = result.data_spans.iter().find(|s| s.line == 1).unwrap();
        assert_eq!((span.start, span.byte_length, span.unit_bytes), (0, 3, 1));
    }

    #[test]
    fn duplicate_global_label_is_an_error() {
        let result = assemble("a: NOP\na: NOP\n", None, Vec::new(), Cpu::I8080);
        assert!(!result.success);
        assert!(!result.errors.is_empty());
    }

    #[test]
    fn label_on_if_or_endif_is_rejected() {
        let result = assemble("foo: .if 1\nNOP\n.endif\n", None, Vec::new(), Cpu::I8080);
        assert!(!result.success);
        assert!(result.errors.iter().any(|e| e.message.contains("not allowed")));

        let result = assemble(".if 1\nNOP\nbar: .endif\n", None, Vec::new(), Cpu::I8080);
        assert!(!result.success);
        assert!(result.errors.iter().any(|e| e.message.contains("not allowed")));
    }

    #[test]
    fn error_directive_aborts_emission() {
        let result = assemble("NOP\n.error \"stop\"\nNOP\n", None, Vec::new(), Cpu::I8080);
        assert!(!result.success);
        assert!(result.errors.iter().any(|e| e.message.contains("stop")));
    }
}
