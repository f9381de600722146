//! JSON shape of the debug map written alongside a ROM image.
//!
//! Field names and the hex formatting of addresses are part of the public
//! contract consumed by external tooling (editor integration, emulator,
//! etc.), so they are pinned here rather than left to `serde`'s defaults.

use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct LabelEntry {
    pub addr: String,
    pub src: String,
    pub line: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConstEntry {
    pub value: i64,
    pub hex: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataLineEntry {
    pub addr: String,
    #[serde(rename = "byteLength")]
    pub byte_length: usize,
    #[serde(rename = "unitBytes")]
    pub unit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct DebugMap {
    pub labels: BTreeMap<String, LabelEntry>,
    pub consts: BTreeMap<String, ConstEntry>,
    #[serde(rename = "lineAddresses")]
    pub line_addresses: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(rename = "dataLines")]
    pub data_lines: BTreeMap<String, BTreeMap<String, DataLineEntry>>,
}

/// Formats an address the way every section of the debug map expects it:
/// a 4-digit, upper-case, `0x`-prefixed hex literal.
pub fn format_addr(addr: u16) -> String {
    format!("0x{:04X}", addr)
}

/// Formats a constant's value as a signed-looking 16-bit hex literal, for
/// the `consts` section.
pub fn format_const_hex(value: i64) -> String {
    format!("0x{:04X}", (value as i64 & 0xFFFF) as u16)
}
