//! Build automation tasks for SFUP
//!
//! Run with: cargo xtask <command>

use clap::{Parser, Subcommand, ValueEnum};
use std::path::Path;
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "SFUP build automation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all tests
    Test,

    /// Run clippy lints
    Lint,

    /// Check formatting
    Fmt,

    /// Run all CI checks
    Ci,

    /// Run the crypto and end-to-end benchmarks
    Bench,

    /// Generate documentation
    Doc,

    /// Fuzz one target for a bounded time (needs cargo-fuzz and nightly)
    Fuzz {
        /// Target to run
        #[arg(value_enum)]
        target: FuzzTarget,

        /// Seconds to run before stopping
        #[arg(short, long, default_value_t = 60)]
        seconds: u64,
    },
}

/// Targets defined in `fuzz/Cargo.toml`
#[derive(Clone, Copy, ValueEnum)]
enum FuzzTarget {
    /// Sealed fields and keystream chunking
    Crypto,
    /// Upload filename validation
    Filename,
    /// Ticket ids and download keys from URL parameters
    TicketParams,
}

impl FuzzTarget {
    fn binary(self) -> &'static str {
        match self {
            Self::Crypto => "fuzz_crypto",
            Self::Filename => "fuzz_filename",
            Self::TicketParams => "fuzz_ticket_params",
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Test => {
            run_command("cargo", &["test", "--workspace"])?;
        }
        Commands::Lint => {
            run_command(
                "cargo",
                &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
            )?;
        }
        Commands::Fmt => {
            run_command("cargo", &["fmt", "--all", "--check"])?;
        }
        Commands::Ci => {
            println!("Running CI checks...");
            run_command("cargo", &["fmt", "--all", "--check"])?;
            run_command(
                "cargo",
                &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
            )?;
            run_command("cargo", &["test", "--workspace"])?;
            println!("All CI checks passed!");
        }
        Commands::Bench => {
            run_command("cargo", &["bench", "-p", "sfup-crypto"])?;
            run_command("cargo", &["bench", "-p", "sfup-integration-tests"])?;
        }
        Commands::Doc => {
            run_command("cargo", &["doc", "--workspace", "--no-deps", "--open"])?;
        }
        Commands::Fuzz { target, seconds } => {
            // fuzz/ is its own workspace, so cargo-fuzz runs from there
            let max_time = format!("-max_total_time={seconds}");
            run_command_in(
                Path::new("fuzz"),
                "cargo",
                &["+nightly", "fuzz", "run", target.binary(), "--", &max_time],
            )?;
        }
    }

    Ok(())
}

fn run_command(program: &str, args: &[&str]) -> anyhow::Result<()> {
    run_command_in(Path::new("."), program, args)
}

fn run_command_in(dir: &Path, program: &str, args: &[&str]) -> anyhow::Result<()> {
    let status = Command::new(program).current_dir(dir).args(args).status()?;

    if !status.success() {
        anyhow::bail!("{} {:?} failed", program, args);
    }

    Ok(())
}
