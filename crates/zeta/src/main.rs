//! Zeta CLI entry point.
//!
//! Dispatch mirrors the language's file extensions: a `.zeta` positional
//! compiles to a `.ze` artifact next to it, a `.ze` positional runs on the
//! VM, no arguments starts the REPL, and the `release` subcommand packages
//! a program into a standalone binary. A release binary detects its own
//! embedded payload at startup and runs it before any argument parsing.

mod commands;
mod release;
mod repl;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;

#[derive(Parser)]
#[command(
    name = "zeta",
    version = zeta_core::VERSION,
    about = "zeta - an open source, secure by default programming language",
    args_conflicts_with_subcommands = true
)]
struct Args {
    /// A `.zeta` source file to compile, or a `.ze` artifact to run.
    /// Starts the REPL when omitted.
    file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a source file into a standalone, independent binary.
    Release {
        /// Path to the `.zeta` source file.
        #[arg(long)]
        src: PathBuf,

        /// Target operating system: darwin | linux | windows.
        #[arg(long)]
        os: Option<String>,

        /// Target architecture: amd64 | arm64 | arm | 386.
        #[arg(long)]
        arch: Option<String>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    // A release binary carries its program behind a footer trailer; run it
    // and ignore the CLI surface entirely.
    match release::embedded_payload() {
        Ok(Some(payload)) => {
            debug!(bytes = payload.len(), "running embedded program");
            if let Err(error) = zeta_core::pipeline::run_artifact(&payload) {
                eprint!("{}", error.report());
                return ExitCode::FAILURE;
            }
            return ExitCode::SUCCESS;
        }
        Ok(None) => {}
        Err(error) => {
            eprintln!("{}", error);
            return ExitCode::FAILURE;
        }
    }

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{:#}", error);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    if let Some(command) = args.command {
        return match command {
            Command::Release { src, os, arch } => {
                println!("Compiling Release Build....");
                release::build(&src, os.as_deref(), arch.as_deref())
            }
        };
    }

    match args.file {
        None => repl::start(),
        Some(file) => {
            let name = file.to_string_lossy();
            if name.ends_with(zeta_core::SOURCE_EXTENSION) {
                commands::compile_file(&file)
            } else if name.ends_with(zeta_core::ARTIFACT_EXTENSION) {
                commands::run_file(&file)
            } else {
                anyhow::bail!(
                    "unrecognized file extension: {} (expected {} or {})",
                    name,
                    zeta_core::SOURCE_EXTENSION,
                    zeta_core::ARTIFACT_EXTENSION
                );
            }
        }
    }
}
