// Weft - weftd
// Module: driver entry point
//
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Command-line driver for the Weft interpreter.
//!
//! ```bash
//! weftd module.wasm --invoke "add 1 2"
//! weftd --repl
//! ```
//!
//! With a file argument the module is loaded, its start function run,
//! and the `--invoke` function (if any) called; without one, or with
//! `--repl`, commands are read from stdin. A guest that calls
//! `weft.exit` sets the process exit code.

mod repl;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use weft_decoder::DecodeConfig;
use weft_runtime::EngineConfig;

use repl::{Repl, Status};

#[derive(Parser, Debug)]
#[command(name = "weftd", version, about = "Weft WebAssembly interpreter")]
struct Args {
    /// Module to load and start
    wasm_file: Option<String>,

    /// Function to invoke after loading, e.g. "add 1 2"
    #[arg(long)]
    invoke: Option<String>,

    /// Read commands from stdin
    #[arg(long)]
    repl: bool,

    /// Keep an instance whose start function trapped
    #[arg(long)]
    trap_ok: bool,

    /// Decode without the precomputed branch-target table
    #[arg(long)]
    no_jump_table: bool,

    /// Maximum call depth
    #[arg(long, default_value_t = EngineConfig::default().max_frames)]
    max_frames: usize,

    /// Maximum operand-stack slots
    #[arg(long, default_value_t = EngineConfig::default().max_values)]
    max_values: usize,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    debug!("args: {args:?}");

    let decode = DecodeConfig {
        generate_jump_table: !args.no_jump_table,
    };
    let engine = EngineConfig {
        max_frames: args.max_frames,
        max_values: args.max_values,
    };
    let mut repl = Repl::new(decode, engine, args.trap_ok);

    if let Some(path) = &args.wasm_file {
        let bytes =
            std::fs::read(path).with_context(|| format!("failed to read {path}"))?;
        repl.load_bytes(None, &bytes)?;
        if let Some(cmd) = &args.invoke {
            if let Status::Exit(code) = repl.invoke(None, cmd)? {
                return Ok(ExitCode::from(code as u8));
            }
        }
        if !args.repl {
            return Ok(ExitCode::SUCCESS);
        }
    }

    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    match repl.run(&mut input)? {
        Status::Exit(code) => Ok(ExitCode::from(code as u8)),
        Status::Ready => Ok(ExitCode::SUCCESS),
    }
}
