//! `aw` command-line front end
//!
//! A thin adapter over [`aw_core`]: argument parsing, logging setup and
//! exit-code mapping live here; everything else is the compiler's job.

pub mod compile_cmd;

/// Process exit codes.
pub mod exit {
    /// Compilation succeeded (warnings allowed).
    pub const SUCCESS: i32 = 0;
    /// At least one file failed to compile.
    pub const COMPILE_FAILED: i32 = 1;
    /// Infrastructure problem outside compilation (bad arguments, I/O).
    pub const INFRA_ERROR: i32 = 3;
}

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "aw", about = "Compile agentic workflow markdown into lock files", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose logging (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile one or more workflow markdown files
    Compile(compile_cmd::CompileArgs),
}

/// Run the CLI; returns the process exit code.
pub fn run(cli: Cli) -> i32 {
    init_logging(cli.verbose);
    match cli.command {
        Command::Compile(args) => compile_cmd::run(args),
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .try_init();
}
