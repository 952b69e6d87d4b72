//! Memory hierarchy simulator CLI.
//!
//! This binary replays an access trace against a configured hierarchy. It performs:
//! 1. **Configuration:** Loads the top-level descriptor and the per-cache files it names.
//! 2. **Replay:** Executes the trace, servicing one queued prefetch after every access.
//! 3. **Report:** Flushes every lane and prints per-lane, L2, bus and prefetch statistics.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use heapsim_core::System;
use heapsim_core::sim::trace;

#[derive(Parser, Debug)]
#[command(
    name = "heapsim",
    author,
    version,
    about = "Handle-addressed memory hierarchy simulator",
    long_about = "Replay an object access trace against per-lane MOESI object caches, a handle table cache and a shared L2.\n\nLogging is controlled by RUST_LOG (default: warn).\n\nExamples:\n  heapsim run --config configs/system.json --trace traces/stream.trace\n  RUST_LOG=heapsim_core=debug heapsim run -c configs/system.json -t traces/stream.trace --quiet"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a trace and print statistics.
    Run {
        /// Top-level system descriptor (JSON).
        #[arg(short, long)]
        config: PathBuf,

        /// Access trace to replay.
        #[arg(short, long)]
        trace: PathBuf,

        /// Print only the replay summary, not the statistics tables.
        #[arg(short, long)]
        quiet: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            trace,
            quiet,
        } => cmd_run(&config, &trace, quiet),
    }
}

fn cmd_run(config: &Path, trace_path: &Path, quiet: bool) {
    let mut system = System::from_descriptor(config).unwrap_or_else(|e| {
        eprintln!("\n[!] FATAL: {e}");
        process::exit(1);
    });
    let ops = trace::load(trace_path).unwrap_or_else(|e| {
        eprintln!("\n[!] FATAL: {e}");
        process::exit(1);
    });

    let report = system
        .replay(&ops)
        .and_then(|report| system.flush_all().map(|()| report))
        .unwrap_or_else(|e| {
            eprintln!("\n[!] FATAL: {e}");
            process::exit(1);
        });

    println!(
        "replayed {} accesses ({} operations): {} wait ticks, {} prefetches serviced",
        report.accesses,
        ops.len(),
        report.ticks,
        report.prefetches
    );
    if !quiet {
        system.print_statistics();
    }
}
