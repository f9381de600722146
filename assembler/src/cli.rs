//! Command-line surface.
//!
//! Grounded on the teacher's `cli_parser.rs` (`clap::Parser` derive over a
//! flat struct with short flags for the common cases), extended with the
//! flags this assembler's extra stages need: a CPU selector, repeatable
//! include directories, and a debug-JSON path override.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(author, version, about = "Assembler for the Intel 8080 / Z80 instruction set")]
pub struct Cli {
    /// The input assembly file to compile.
    pub input_file: PathBuf,

    /// Output ROM path. Defaults to the input file with its extension
    /// replaced by `.rom`.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Override path for the debug JSON file. Defaults to the ROM path
    /// with its extension replaced by `.debug.json`.
    #[arg(long = "debug-json")]
    pub debug_json: Option<PathBuf>,

    /// Target instruction set.
    #[arg(long = "cpu", default_value = "8080")]
    pub cpu: CpuArg,

    /// Extra directories to search for `.include` targets, in addition to
    /// `ASM8080_INCLUDE_PATH`. May be given more than once.
    #[arg(short = 'I', long = "include")]
    pub include: Vec<PathBuf>,

    /// Check the source for errors without writing any output files.
    #[arg(short = 'c', long = "check")]
    pub check: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum CpuArg {
    #[value(name = "8080")]
    I8080,
    Z80,
}

impl From<CpuArg> for crate::instructions::Cpu {
    fn from(arg: CpuArg) -> Self {
        match arg {
            CpuArg::I8080 => crate::instructions::Cpu::I8080,
            CpuArg::Z80 => crate::instructions::Cpu::Z80,
        }
    }
}
