//! CLI entry point for the lotplan rebalancer.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use lotplan_rebalancer::config::Config;
use lotplan_rebalancer::error::Error;
use lotplan_rebalancer::execution::{self, RunOptions};
use lotplan_rebalancer::target::TargetSpec;

#[derive(Parser)]
#[command(name = "rebalancer")]
#[command(about = "Portfolio rebalancer: target weights to lot-sized broker orders")]
#[command(version)]
struct Cli {
    /// Path to config.toml
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Plan, check, confirm, and execute rebalance orders
    Run {
        /// Path to target.json
        target: PathBuf,

        /// Show plan without executing
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation prompt (for automation/cron)
        #[arg(long)]
        force: bool,
    },

    /// Compute and print the plan only
    Plan {
        /// Path to target.json
        target: PathBuf,
    },

    /// Show current holdings and cash
    Positions,

    /// List orders still open at the broker
    Pending,

    /// Check the broker account
    Status,

    /// Compare actual holdings vs target
    Reconcile {
        /// Path to target.json
        target: PathBuf,
    },
}

fn load_target(path: &Path) -> TargetSpec {
    match TargetSpec::load(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading target: {e}");
            process::exit(1);
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Run {
            target,
            dry_run,
            force,
        } => {
            let spec = load_target(&target);
            let opts = RunOptions {
                dry_run,
                force,
                target_file: target.display().to_string(),
            };
            execution::run(&config, &spec, &opts)
        }
        Command::Plan { target } => execution::plan(&config, &load_target(&target)),
        Command::Positions => execution::show_positions(&config),
        Command::Pending => execution::show_pending(&config),
        Command::Status => execution::check_status(&config),
        Command::Reconcile { target } => execution::run_reconcile(&config, &load_target(&target)),
    };

    if let Err(e) = result {
        match &e {
            Error::CheckFailed(msg) => {
                eprintln!("\nAborted: {msg}");
                process::exit(2);
            }
            Error::Aborted(msg) => {
                eprintln!("{msg}");
                process::exit(0);
            }
            _ => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    }
}
