//! Stage 6 (size) / stage 7 (opcode) shared table: the instruction-info map
//! keyed by "MNEMONIC OPERAND-SHAPE" producing `(opcode, total size, imm
//! size)`, per the instruction-encoding component design.
//!
//! Built the same way a `declare_asm_instructions!`-style declarative
//! macro would: one declarative place defining the whole instruction set
//! instead of a long chain of `match` branches. The 8080 table has too
//! much combinatorial structure (every register×register `MOV`, every
//! register-pair `LXI`/`PUSH`/`DAD`, every condition-code branch) to spell
//! out as literal macro rows without the macro invocation itself becoming
//! an unreadable 250-line wall; those families are instead generated by
//! small loops over the same register/condition code tables the encoder
//! needs anyway, built once into a static map. The single no-operand and
//! single-register opcodes, which have no such structure, are declared
//! directly: one literal row per mnemonic.

use std::collections::HashMap;

use lazy_static::lazy_static;

#[derive(Debug, Clone, Copy)]
pub struct InstrInfo {
    pub opcode: u8,
    pub size: u8,
    pub imm_size: u8,
}

/// CPU=8080 and CPU=Z80 share the same 8080-mnemonic key space; the Z80
/// table below simply maps its own mnemonics onto the identical
/// `InstrInfo` values, per "the Z80 table mirrors the same semantics with
/// Z80 mnemonics... the compiler may additionally normalise some Z80 `LD`
/// forms into the 8080 key space."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cpu {
    I8080,
    Z80,
}

const REGISTERS: [(&str, u8); 8] = [("B", 0), ("C", 1), ("D", 2), ("E", 3), ("H", 4), ("L", 5), ("M", 6), ("A", 7)];
const REG_PAIRS: [(&str, u8); 4] = [("B", 0), ("D", 1), ("H", 2), ("SP", 3)];
const PUSH_POP_PAIRS: [(&str, u8); 4] = [("B", 0), ("D", 1), ("H", 2), ("PSW", 3)];
const CONDITIONS: [(&str, u8); 8] = [("NZ", 0), ("Z", 1), ("NC", 2), ("C", 3), ("PO", 4), ("PE", 5), ("P", 6), ("M", 7)];

/// Mnemonic, operand-code (OOO in `10OOOSSS` / `11OOO110`), base opcode for
/// the register form.
const ALU_OPS: [(&str, u8); 8] =
    [("ADD", 0), ("ADC", 1), ("SUB", 2), ("SBB", 3), ("ANA", 4), ("XRA", 5), ("ORA", 6), ("CMP", 7)];
/// Immediate-form mnemonic for the same operation code.
const ALU_IMMEDIATE: [&str; 8] = ["ADI", "ACI", "SUI", "SBI", "ANI", "XRI", "ORI", "CPI"];

fn insert(table: &mut HashMap<(String, String), InstrInfo>, mnemonic: &str, shape: &str, opcode: u8, size: u8, imm_size: u8) {
    table.insert((mnemonic.to_string(), shape.to_string()), InstrInfo { opcode, size, imm_size });
}

macro_rules! fixed_opcodes {
    ($table:expr, { $($mnemonic:literal => $opcode:literal),+ $(,)? }) => {
        $(insert($table, $mnemonic, "", $opcode, 1, 0);)+
    };
}

fn build_8080_table() -> HashMap<(String, String), InstrInfo> {
    let mut table = HashMap::new();

    // No-operand, single-byte instructions.
    fixed_opcodes!(&mut table, {
        "NOP" => 0x00, "RLC" => 0x07, "RAL" => 0x17, "RAR" => 0x1F,
        "DAA" => 0x27, "CMA" => 0x2F, "STC" => 0x37, "CMC" => 0x3F,
        "HLT" => 0x76, "RET" => 0xC9, "XTHL" => 0xE3, "PCHL" => 0xE9,
        "XCHG" => 0xEB, "DI" => 0xF3, "SPHL" => 0xF9, "EI" => 0xFB,
        "RRC" => 0x0F,
    });

    // MOV r1,r2 - 0b01DDDSSS. MOV M,M collides with HLT and must be
    // rejected even though the bit pattern is otherwise valid.
    for &(dname, dcode) in &REGISTERS {
        for &(sname, scode) in &REGISTERS {
            if dname == "M" && sname == "M" {
                continue;
            }
            let opcode = 0b0100_0000 | (dcode << 3) | scode;
            insert(&mut table, "MOV", &format!("{},{}", dname, sname), opcode, 1, 0);
        }
    }

    // MVI r,N / INR r / DCR r - 0b00DDD110 / 0b00DDD100 / 0b00DDD101.
    for &(name, code) in &REGISTERS {
        insert(&mut table, "MVI", &format!("{},N", name), 0b0000_0110 | (code << 3), 2, 1);
        insert(&mut table, "INR", name, 0b0000_0100 | (code << 3), 1, 0);
        insert(&mut table, "DCR", name, 0b0000_0101 | (code << 3), 1, 0);
    }

    // Register-form and immediate-form ALU ops.
    for &(mnemonic, op) in &ALU_OPS {
        for &(name, code) in &REGISTERS {
            insert(&mut table, mnemonic, name, 0b1000_0000 | (op << 3) | code, 1, 0);
        }
    }
    for (i, &imm_mnemonic) in ALU_IMMEDIATE.iter().enumerate() {
        insert(&mut table, imm_mnemonic, "N", 0b1100_0110 | ((i as u8) << 3), 2, 1);
    }

    // Register-pair instructions: LXI/INX/DCX/DAD use B/D/H/SP encoding;
    // PUSH/POP use B/D/H/PSW encoding.
    for &(name, code) in &REG_PAIRS {
        insert(&mut table, "LXI", &format!("{},N", name), 0b0000_0001 | (code << 4), 3, 2);
        insert(&mut table, "INX", name, 0b0000_0011 | (code << 4), 1, 0);
        insert(&mut table, "DCX", name, 0b0000_1011 | (code << 4), 1, 0);
        insert(&mut table, "DAD", name, 0b0000_1001 | (code << 4), 1, 0);
    }
    for &(name, code) in &PUSH_POP_PAIRS {
        insert(&mut table, "PUSH", name, 0b1100_0101 | (code << 4), 1, 0);
        insert(&mut table, "POP", name, 0b1100_0001 | (code << 4), 1, 0);
    }
    // STAX/LDAX only accept BC or DE.
    for &(name, code) in &[("B", 0u8), ("D", 1u8)] {
        insert(&mut table, "STAX", name, 0b0000_0010 | (code << 4), 1, 0);
        insert(&mut table, "LDAX", name, 0b0000_1010 | (code << 4), 1, 0);
    }

    // Direct/extended addressing.
    insert(&mut table, "SHLD", "N", 0x22, 3, 2);
    insert(&mut table, "LHLD", "N", 0x2A, 3, 2);
    insert(&mut table, "STA", "N", 0x32, 3, 2);
    insert(&mut table, "LDA", "N", 0x3A, 3, 2);

    // I/O.
    insert(&mut table, "IN", "N", 0xDB, 2, 1);
    insert(&mut table, "OUT", "N", 0xD3, 2, 1);

    // Unconditional and conditional control transfer.
    insert(&mut table, "JMP", "N", 0xC3, 3, 2);
    insert(&mut table, "CALL", "N", 0xCD, 3, 2);
    for &(name, code) in &CONDITIONS {
        insert(&mut table, &format!("J{}", name), "N", 0b1100_0010 | (code << 3), 3, 2);
        insert(&mut table, &format!("C{}", name), "N", 0b1100_0100 | (code << 3), 3, 2);
        insert(&mut table, &format!("R{}", name), "", 0b1100_0000 | (code << 3), 1, 0);
    }

    // RST n, n in [0,7]: opcode 0xC7 | (n << 3).
    for n in 0u8..8 {
        insert(&mut table, "RST", "N", 0xC7 | (n << 3), 1, 0);
    }

    table
}

/// Z80 mnemonics that alias directly onto an identical 8080 encoding and
/// semantics (the CPU=Z80 subset that matches 8080 mnemonics this assembler scopes
/// in). `LD` is normalised onto the matching `MOV`/`MVI`/`LXI`/`LDA`/`STA`/
/// `LDAX`/`STAX`/`LHLD`/`SHLD` key depending on operand shape; the other
/// renamed mnemonics map one-to-one.
fn build_z80_table(base: &HashMap<(String, String), InstrInfo>) -> HashMap<(String, String), InstrInfo> {
    let mut table = HashMap::new();

    let alias = |mnemonic: &str, shape: &str, onto_mnemonic: &str, onto_shape: &str, table: &mut HashMap<(String, String), InstrInfo>| {
        if let Some(info) = base.get(&(onto_mnemonic.to_string(), onto_shape.to_string())) {
            table.insert((mnemonic.to_string(), shape.to_string()), *info);
        }
    };

    for &(dname, _) in &REGISTERS {
        for &(sname, _) in &REGISTERS {
            if dname == "M" && sname == "M" {
                continue;
            }
            let (z_d, z_s) = (z80_register_name(dname), z80_register_name(sname));
            alias("LD", &format!("{},{}", z_d, z_s), "MOV", &format!("{},{}", dname, sname), &mut table);
        }
        alias("LD", &format!("{},N", z80_register_name(dname)), "MVI", &format!("{},N", dname), &mut table);
    }
    for &(name, _) in &REG_PAIRS {
        alias("LD", &format!("{},N", name), "LXI", &format!("{},N", name), &mut table);
    }
    alias("LD", "A,N", "LDA", "N", &mut table);
    alias("LD", "N,A", "STA", "N", &mut table);
    alias("LD", "HL,N", "LHLD", "N", &mut table);

    let one_to_one = [
        ("JP", "JMP"), ("CALL", "CALL"), ("RET", "RET"), ("NOP", "NOP"), ("HALT", "HLT"),
        ("EX", "XCHG"), ("DI", "DI"), ("EI", "EI"), ("RST", "RST"), ("PUSH", "PUSH"), ("POP", "POP"),
        ("INC", "INR"), ("DEC", "DCR"), ("ADD", "ADD"), ("ADC", "ADC"), ("SUB", "SUB"), ("SBC", "SBB"),
        ("AND", "ANA"), ("XOR", "XRA"), ("OR", "ORA"), ("CP", "CMP"),
        ("ADI_", "ADI"), ("RLCA", "RLC"), ("RRCA", "RRC"), ("RLA", "RAL"), ("RRA", "RAR"),
        ("CPL", "CMA"), ("SCF", "STC"), ("CCF", "CMC"),
    ];
    for (z_mnemonic, base_mnemonic) in one_to_one {
        for ((m, shape), info) in base.iter() {
            if m == base_mnemonic {
                table.entry((z_mnemonic.to_string(), shape.clone())).or_insert(*info);
            }
        }
    }

    for &(name, code) in &CONDITIONS {
        alias(&format!("JP{}", z80_condition_name(name)), "N", &format!("J{}", name), "N", &mut table);
        alias(&format!("CALL{}", z80_condition_name(name)), "N", &format!("C{}", name), "N", &mut table);
        alias(&format!("RET{}", z80_condition_name(name)), "", &format!("R{}", name), "", &mut table);
    }

    table
}

fn z80_register_name(name8080: &str) -> &'static str {
    match name8080 {
        "M" => "(HL)",
        other => match other {
            "B" => "B", "C" => "C", "D" => "D", "E" => "E", "H" => "H", "L" => "L", "A" => "A",
            _ => unreachable!(),
        },
    }
}

fn z80_condition_name(cond8080: &str) -> &'static str {
    match cond8080 {
        "NZ" => "NZ", "Z" => "Z", "NC" => "NC", "C" => "C", "PO" => "PO", "PE" => "PE", "P" => "P", "M" => "M",
        _ => unreachable!(),
    }
}

lazy_static! {
    static ref TABLE_8080: HashMap<(String, String), InstrInfo> = build_8080_table();
    static ref TABLE_Z80: HashMap<(String, String), InstrInfo> = build_z80_table(&TABLE_8080);
}

/// Whether `token` names a register/register-pair operand under `cpu`,
/// rather than a value expression. Used to build the "operand shape" key
/// (uppercase register tokens, replace every other operand with the
/// literal `N`).
pub fn is_register_token(cpu: Cpu, token: &str) -> bool {
    let up = token.trim().to_ascii_uppercase();
    match cpu {
        Cpu::I8080 => matches!(up.as_str(), "B" | "C" | "D" | "E" | "H" | "L" | "M" | "A" | "SP" | "PSW"),
        Cpu::Z80 => matches!(up.as_str(), "B" | "C" | "D" | "E" | "H" | "L" | "A" | "SP" | "(HL)"),
    }
}

/// Builds the operand-shape key for a comma-separated operand list:
/// register tokens pass through upper-cased, everything else becomes the
/// literal token `N`.
pub fn operand_shape(cpu: Cpu, operands: &str) -> String {
    if operands.trim().is_empty() {
        return String::new();
    }
    crate::line_syntax::split_top_level_commas(operands)
        .iter()
        .map(|tok| if is_register_token(cpu, tok) { tok.trim().to_ascii_uppercase() } else { "N".to_string() })
        .collect::<Vec<_>>()
        .join(",")
}

/// Looks up the info for `mnemonic` with the given operand shape, under
/// the requested CPU's key space.
pub fn lookup(cpu: Cpu, mnemonic: &str, shape: &str) -> Option<InstrInfo> {
    let mnemonic = mnemonic.to_ascii_uppercase();
    let table = match cpu {
        Cpu::I8080 => &*TABLE_8080,
        Cpu::Z80 => &*TABLE_Z80,
    };
    table.get(&(mnemonic, shape.to_string())).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mov_b_c_encodes_correctly() {
        let info = lookup(Cpu::I8080, "MOV", "B,C").unwrap();
        assert_eq!(info.opcode, 0x41);
        assert_eq!(info.size, 1);
    }

    #[test]
    fn mov_m_m_is_rejected() {
        assert!(lookup(Cpu::I8080, "MOV", "M,M").is_none());
    }

    #[test]
    fn mvi_a_encodes_correctly() {
        let info = lookup(Cpu::I8080, "MVI", "A,N").unwrap();
        assert_eq!(info.opcode, 0x3E);
        assert_eq!(info.size, 2);
        assert_eq!(info.imm_size, 1);
    }

    #[test]
    fn hlt_opcode() {
        let info = lookup(Cpu::I8080, "HLT", "").unwrap();
        assert_eq!(info.opcode, 0x76);
    }

    #[test]
    fn rst_encodes_n_shifted() {
        let info = lookup(Cpu::I8080, "RST", "N").unwrap();
        // All RST rows share the same key ("RST","N") in this map, which
        // only needs to report size/imm_size correctly; the concrete
        // opcode for a given n is computed in the emitter from the
        // evaluated operand, not looked up here.
        assert_eq!(info.size, 1);
    }

    #[test]
    fn jmp_encodes_correctly() {
        let info = lookup(Cpu::I8080, "JMP", "N").unwrap();
        assert_eq!(info.opcode, 0xC3);
        assert_eq!(info.size, 3);
        assert_eq!(info.imm_size, 2);
    }

    #[test]
    fn z80_ld_aliases_onto_mov() {
        let info = lookup(Cpu::Z80, "LD", "B,C").unwrap();
        assert_eq!(info.opcode, 0x41);
    }
}
