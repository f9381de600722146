use std::process::ExitCode;

use clap::Parser;

use assembler::cli::Cli;
use assembler::error;

fn main() -> ExitCode {
    let args = Cli::parse();

    let source = match std::fs::read_to_string(&args.input_file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Could not read '{}': {}", args.input_file.display(), e);
            return ExitCode::FAILURE;
        }
    };

    if args.input_file.extension().and_then(|e| e.to_str()) != Some("asm") {
        eprintln!("warning: input file extension is not '.asm'");
    }

    let cpu = args.cpu.into();

    if args.check {
        let result = assembler::assemble(&source, Some(&args.input_file), args.include.clone(), cpu);
        print_diagnostics(&result.warnings, &result.errors);
        return if result.success { ExitCode::SUCCESS } else { ExitCode::FAILURE };
    }

    let output_path = args.output.clone().unwrap_or_else(|| args.input_file.with_extension("rom"));
    let result =
        assembler::assemble_and_write(&source, &output_path, Some(&args.input_file), args.include.clone(), cpu, args.debug_json.as_deref());
    print_diagnostics(&result.warnings, &result.errors);

    if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_diagnostics(warnings: &[error::AssembleError], errors: &[error::AssembleError]) {
    if !warnings.is_empty() {
        eprintln!("{}", error::render_errors(warnings));
    }
    if !errors.is_empty() {
        eprintln!("{}", error::render_errors(errors));
    }
}
