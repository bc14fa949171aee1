//! service-skeleton
//!
//! # Architecture Overview
//!
//! ```text
//!   SIGTERM / SIGINT ──┐      ┌──────────────────────────────────────────┐
//!   SIGHUP ────────────┼─────▶│              Orchestrator                │
//!                      │      │  start ─▶ telemetry ─▶ storage ─▶ api    │
//!                      │      │  stop  ─▶ drain shutdown actions in order │
//!                      │      └──────────────┬───────────────────────────┘
//!                      │                     │ per generation
//!     Client Request   │      ┌─────────┐    ▼     ┌──────────┐    ┌─────────┐
//!     ─────────────────┼─────▶│   net   │────────▶ │   http   │───▶│ service │
//!                      │      │listener │          │  routes  │    │  hello  │
//!                      │      └─────────┘          └──────────┘    └────┬────┘
//!                      │                                               ▼
//!                      │                                         ┌──────────┐
//!                      │                                         │ storage  │
//!                      │                                         │ counters │
//!                      │                                         └──────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use service_skeleton::config::{load_config, save_config, FileConfigSource, LogFormat, LogTarget};
use service_skeleton::observability::logging;
use service_skeleton::{Orchestrator, ServiceConfig, SignalHub};

#[derive(Parser)]
#[command(name = "service-skeleton")]
#[command(about = "HTTP service skeleton with graceful reload", long_about = None)]
struct Cli {
    /// Configuration file (TOML). Defaults apply when it does not exist.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[arg(long, value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: Option<String>,

    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    #[arg(long, value_enum)]
    log_target: Option<LogTarget>,

    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    cfg_dump: bool,

    /// Write the effective configuration to the config file and exit.
    #[arg(long)]
    cfg_save: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the API until terminated (default)
    Serve,
}

impl Cli {
    fn apply(&self, config: &mut ServiceConfig) {
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        if let Some(target) = self.log_target {
            config.logging.target = target;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {}", cli.config.display(), e);
            return ExitCode::FAILURE;
        }
    };
    cli.apply(&mut config);

    if cli.cfg_dump {
        return match serde_json::to_string_pretty(&config) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to render configuration: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    if cli.cfg_save {
        return match save_config(&config, &cli.config) {
            Ok(()) => {
                println!("Configuration written to {}", cli.config.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to save configuration: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(cli.config, &config).await,
    }
}

async fn serve(path: PathBuf, config: &ServiceConfig) -> ExitCode {
    let otel_slot = match logging::init(&config.logging) {
        Ok(slot) => slot,
        Err(e) => {
            eprintln!("Failed to initialise logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        uid = %Uuid::new_v4(),
        pid = std::process::id(),
        service = %config.service_name,
        config = %path.display(),
        "service-skeleton v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let hub = match SignalHub::install_os() {
        Ok(hub) => hub,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install signal handlers");
            return ExitCode::FAILURE;
        }
    };

    let orchestrator = Orchestrator::builder(Arc::new(FileConfigSource::new(path)), hub)
        .otel_slot(otel_slot)
        .build();

    match orchestrator.run().await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Service terminated with a fatal error");
            ExitCode::FAILURE
        }
    }
}
