//! `rv64sim` — runs a 64-bit little-endian RISC-V object file on the
//! `rv64sim` library's single-hart RV64I emulator.
//!
//! Exit codes: 0 on clean termination (hart halted or instruction budget
//! exhausted), 1 on load failure, 2 on argument-parsing failure (handled by
//! `clap` itself before `main`'s body runs).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use rv64sim::{MachineConfig, StopReason, DEFAULT_MAX_INSNS, DEFAULT_RAM_BASE, DEFAULT_RAM_SIZE};

/// Parses a decimal or `0x`/`0X`-prefixed hexadecimal integer.
fn parse_int(s: &str) -> Result<u64, std::num::ParseIntError> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        s.parse::<u64>()
    }
}

/// A minimal RV64I user/supervisor system emulator.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the object file to load and run.
    object: PathBuf,

    /// Instruction budget; decimal or `0x`-prefixed hex.
    #[arg(value_parser = parse_int, default_value_t = DEFAULT_MAX_INSNS)]
    max_insns: u64,

    /// Increase logging verbosity (repeatable: -v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Override the RAM size in bytes (decimal or `0x`-prefixed hex).
    #[arg(long, value_parser = parse_int, default_value_t = DEFAULT_RAM_SIZE as u64)]
    ram_size: u64,

    /// Override the RAM base physical address (decimal or `0x`-prefixed hex).
    #[arg(long, value_parser = parse_int, default_value_t = DEFAULT_RAM_BASE)]
    ram_base: u64,
}

fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = MachineConfig {
        ram_base: args.ram_base,
        ram_size: args.ram_size as usize,
        uart_base: rv64sim::DEFAULT_UART_BASE,
    };
    let mut machine = rv64sim::Machine::new(config);

    log::info!(
        "loading {} (ram_base={:#x} ram_size={:#x})",
        args.object.display(),
        config.ram_base,
        config.ram_size
    );

    if let Err(err) = machine.load(&args.object) {
        eprintln!("rv64sim: {err}");
        return ExitCode::from(1);
    }

    let (retired, reason) = machine.run(args.max_insns);
    log::info!(
        "stopped after {retired} instruction(s): {}",
        match reason {
            StopReason::Halted => "halted",
            StopReason::BudgetExhausted => "instruction budget exhausted",
        }
    );

    ExitCode::SUCCESS
}
