//! Assembles the final `asm_support::debug_schema::DebugMap` from the
//! symbol table pass 1 populated and the address/data-span records pass 2
//! collected, then serializes it to the `.debug.json` path.
//!
//! Grounded on `debug_info.rs`'s label/line-map writer, retargeted at the
//! richer schema `asm_support::debug_schema` pins (labels, consts, per-file
//! line addresses, per-file data-line spans) instead of a flat label list.

use std::path::Path;

use asm_support::debug_schema::{format_addr, format_const_hex, ConstEntry, DataLineEntry, DebugMap, LabelEntry};

use crate::error::AssembleError;
use crate::pass2::Pass2Output;
use crate::symbol_table::SymbolTable;

/// Builds the debug map in memory; does not touch the filesystem.
pub fn build_debug_map(symbols: &SymbolTable, pass2: &Pass2Output) -> DebugMap {
    let mut map = DebugMap::default();

    for (name, def) in symbols.labels() {
        map.labels.insert(
            name,
            LabelEntry { addr: format_addr(def.address), src: def.origin.file.basename(), line: def.origin.line },
        );
    }

    for (name, def) in symbols.consts() {
        map.consts.insert(name, ConstEntry { value: def.value, hex: format_const_hex(def.value) });
    }

    for entry in &pass2.line_addresses {
        map.line_addresses
            .entry(entry.file_basename.clone())
            .or_default()
            .insert(entry.line.to_string(), format_addr(entry.address));
    }

    for span in &pass2.data_spans {
        map.data_lines.entry(span.file_basename.clone()).or_default().insert(
            span.line.to_string(),
            DataLineEntry { addr: format_addr(span.start), byte_length: span.byte_length as usize, unit_bytes: span.unit_bytes as usize },
        );
    }

    map
}

/// Serializes `map` to pretty-printed JSON.
pub fn render(map: &DebugMap) -> Result<String, AssembleError> {
    serde_json::to_string_pretty(map).map_err(|e| AssembleError::io(format!("Could not serialize debug map: {}", e)))
}

/// Writes the debug map for `path`'s companion `.debug.json` file.
pub fn write_debug_json(map: &DebugMap, rom_path: &Path) -> Result<(), AssembleError> {
    let json = render(map)?;
    let debug_path = debug_json_path(rom_path);
    std::fs::write(&debug_path, json).map_err(|e| AssembleError::io(format!("Could not write '{}': {}", debug_path.display(), e)))
}

/// Derives `<rom>.debug.json` from the ROM output path, per the `.debug.json`
/// companion-file convention: `out.bin` becomes `out.debug.json`, preserving
/// any other extension-like suffixes in the stem.
pub fn debug_json_path(rom_path: &Path) -> std::path::PathBuf {
    let mut name = rom_path.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "out".to_string());
    if let Some(dot) = name.rfind('.') {
        name.truncate(dot);
    }
    name.push_str(".debug.json");
    rom_path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn derives_companion_json_path() {
        assert_eq!(debug_json_path(&PathBuf::from("/tmp/out.bin")), PathBuf::from("/tmp/out.debug.json"));
        assert_eq!(debug_json_path(&PathBuf::from("rom")), PathBuf::from("rom.debug.json"));
    }

    #[test]
    fn empty_symbol_table_renders_valid_json() {
        let symbols = SymbolTable::new();
        let pass2 = Pass2Output::default();
        let map = build_debug_map(&symbols, &pass2);
        let json = render(&map).unwrap();
        assert!(json.contains("\"labels\""));
        assert!(json.contains("\"lineAddresses\""));
    }
}
