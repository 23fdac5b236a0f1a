//! `aw compile` subcommand

use crate::exit;
use aw_core::assemble::WriteOutcome;
use aw_core::{CompileOptions, Compiler};
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct CompileArgs {
    /// Workflow markdown files to compile
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Promote the defined warning subset to errors
    #[arg(long)]
    pub strict: bool,

    /// Validate and assemble without writing lock files
    #[arg(long)]
    pub no_emit: bool,
}

pub fn run(args: CompileArgs) -> i32 {
    let mut compiler = Compiler::new(CompileOptions {
        strict: args.strict,
        no_emit: args.no_emit,
        compile_time: None,
    });

    let mut failed = false;
    for file in &args.files {
        if !file.exists() {
            eprintln!("error: {} does not exist", file.display());
            return exit::INFRA_ERROR;
        }
        match compiler.compile(file) {
            Ok(result) => {
                let status = match result.outcome {
                    WriteOutcome::Written => "wrote",
                    WriteOutcome::Unchanged if args.no_emit => "checked",
                    WriteOutcome::Unchanged => "unchanged",
                };
                let warnings = match result.warning_count {
                    0 => String::new(),
                    1 => " (1 warning)".to_string(),
                    n => format!(" ({n} warnings)"),
                };
                println!("{status} {}{warnings}", result.lock_path.display());
            }
            Err(error) => {
                eprintln!("error[{}]: {error}", error.kind().as_str());
                failed = true;
            }
        }
    }

    if failed {
        exit::COMPILE_FAILED
    } else {
        exit::SUCCESS
    }
}
