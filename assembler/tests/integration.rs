//! Full source-to-ROM scenarios, run against fixture files on disk rather
//! than inline strings so `.include` resolution exercises the real
//! filesystem path. Mirrors the fixture-directory + full-program
//! byte-comparison pattern used by the pack's `spcasm` crate (`tests/`
//! holding complete programs, `tests/errors/` holding sources that must
//! fail to assemble).

use std::path::{Path, PathBuf};

use assembler::{assemble, assemble_and_write, Cpu};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn read_fixture(name: &str) -> (String, PathBuf) {
    let path = fixture(name);
    let source = std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("could not read fixture {}: {}", path.display(), e));
    (source, path)
}

#[test]
fn main_program_with_include_and_call() {
    let (source, path) = read_fixture("main.asm");
    let result = assemble(&source, Some(&path), Vec::new(), Cpu::I8080);

    assert!(result.success, "expected success, got errors: {:?}", result.errors.iter().map(|e| &e.message).collect::<Vec<_>>());
    assert_eq!(result.rom, vec![0x31, 0x00, 0xFF, 0xCD, 0x07, 0x00, 0x76, 0x3E, 0x01, 0xC9]);

    let start = result.debug_map.labels.get("start").unwrap();
    assert_eq!(start.addr, "0x0000");
    let routine = result.debug_map.labels.get("routine").unwrap();
    assert_eq!(routine.addr, "0x0007");
    assert_eq!(result.debug_map.consts.get("STACK_TOP").unwrap().hex, "0xFF00");
}

#[test]
fn assemble_and_write_produces_rom_and_debug_json() {
    let (source, path) = read_fixture("main.asm");
    let out_dir = std::env::temp_dir().join(format!("assembler-integration-{}", std::process::id()));
    std::fs::create_dir_all(&out_dir).unwrap();
    let rom_path = out_dir.join("main.rom");

    let result = assemble_and_write(&source, &rom_path, Some(&path), Vec::new(), Cpu::I8080, None);
    assert!(result.success);

    let written_rom = std::fs::read(&rom_path).unwrap();
    assert_eq!(written_rom, result.rom);

    let debug_json_path = out_dir.join("main.debug.json");
    let debug_json = std::fs::read_to_string(&debug_json_path).unwrap();
    assert!(debug_json.contains("\"start\""));
    assert!(debug_json.contains("STACK_TOP"));

    std::fs::remove_dir_all(&out_dir).ok();
}

#[test]
fn error_fixtures_all_fail_to_assemble() {
    let error_dir = fixture("errors");
    let entries = std::fs::read_dir(&error_dir).unwrap_or_else(|e| panic!("could not read {}: {}", error_dir.display(), e));

    let mut checked = 0;
    for entry in entries {
        let path = entry.unwrap().path();
        if path.extension().and_then(|e| e.to_str()) != Some("asm") {
            continue;
        }
        let source = std::fs::read_to_string(&path).unwrap();
        let result = assemble(&source, Some(&path), Vec::new(), Cpu::I8080);
        assert!(!result.success, "expected {} to fail to assemble, but it succeeded", path.display());
        assert!(!result.errors.is_empty(), "{} failed but reported no errors", path.display());
        checked += 1;
    }
    assert!(checked >= 3, "expected at least 3 error fixtures, found {}", checked);
}

#[test]
fn z80_ld_alias_matches_8080_mov_encoding() {
    let result = assemble("LD B,C\n", None, Vec::new(), Cpu::Z80);
    assert!(result.success, "{:?}", result.errors.iter().map(|e| &e.message).collect::<Vec<_>>());
    // MOV B,C on 8080 is 0x41; the Z80 LD alias must produce the same byte.
    assert_eq!(result.rom, vec![0x41]);
}

#[test]
fn check_mode_reports_failure_without_writing_anything() {
    let out_dir = std::env::temp_dir().join(format!("assembler-integration-check-{}", std::process::id()));
    std::fs::create_dir_all(&out_dir).unwrap();
    let rom_path = out_dir.join("bad.rom");

    let result = assemble("JMP nowhere\n", None, Vec::new(), Cpu::I8080);
    assert!(!result.success);
    assert!(!rom_path.exists());

    std::fs::remove_dir_all(&out_dir).ok();
}
