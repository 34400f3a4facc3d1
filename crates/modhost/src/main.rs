mod config;
mod logging;
mod modules;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use modhost_core::module_system::ModuleSystemError;
use modhost_core::{KernelConfig, KernelError, Orchestrator};
use thiserror::Error;

use crate::config::ConfigError;

/// Modhost: a module orchestration host
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Simple liveness check; prints "pong" and exits
    #[arg(long)]
    ping: bool,

    /// Kernel configuration file (.json, .yaml, .yml or .toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "info,modhost_core=trace". Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the resolved module load order without starting anything
    Order,
    /// Bootstrap, run until Ctrl-C (or the duration elapses), then shut down
    Run {
        /// Stop after this many milliseconds
        #[arg(long)]
        duration_ms: Option<u64>,
    },
    /// Bootstrap, print per-module health, then shut down
    Health,
}

#[derive(Debug, Error)]
enum HostError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid module catalog: {0}")]
    Catalog(#[from] ModuleSystemError),

    #[error(transparent)]
    Kernel(#[from] KernelError),
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    if args.ping {
        println!("pong");
        return ExitCode::SUCCESS;
    }

    if let Err(e) = logging::init(args.log_level.as_deref()) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: CliArgs) -> Result<(), HostError> {
    let config = match &args.config {
        Some(path) => config::load(path)?,
        None => KernelConfig::default(),
    };
    let mut orchestrator = Orchestrator::new(modules::catalog()?, config);

    match args.command.unwrap_or(Commands::Run { duration_ms: None }) {
        Commands::Order => {
            for (i, name) in orchestrator.resolve_order()?.iter().enumerate() {
                println!("{}. {}", i + 1, name);
            }
        }
        Commands::Health => {
            orchestrator.bootstrap().await?;
            let health = orchestrator.health().await;
            for (name, status) in &health {
                let state = if status.healthy { "healthy" } else { "unhealthy" };
                match &status.message {
                    Some(message) => println!("{}: {} ({})", name, state, message),
                    None => println!("{}: {}", name, state),
                }
            }
            orchestrator.shutdown().await;
        }
        Commands::Run { duration_ms } => {
            let report = orchestrator.bootstrap().await?;
            for (name, cause) in &report.failed {
                warn!("Module '{}' is unavailable: {}", name, cause);
            }
            println!("Modhost ready: {} module(s) loaded", report.loaded.len());

            let elapsed = async {
                match duration_ms {
                    Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                _ = elapsed => info!("Run duration elapsed"),
                signal = tokio::signal::ctrl_c() => match signal {
                    Ok(()) => info!("Interrupt received"),
                    Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
                },
            }

            let shutdown = orchestrator.shutdown().await;
            println!("Shutdown complete: {} module(s) stopped", shutdown.stopped.len());
        }
    }
    Ok(())
}
