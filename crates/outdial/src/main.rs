// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outdial - outbound-call dispatch and tracking engine.
//!
//! This is the binary entry point for the Outdial engine.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod serve;

/// Outdial - outbound-call dispatch and tracking engine.
#[derive(Parser, Debug)]
#[command(name = "outdial", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the engine: worker pool, supervisors, and ingress gateway.
    Serve {
        /// Explicit config file path (skips the XDG hierarchy).
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Load and validate the configuration, then exit.
    CheckConfig {
        /// Explicit config file path (skips the XDG hierarchy).
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn load(config_path: Option<&PathBuf>) -> Result<outdial_config::OutdialConfig, String> {
    let loaded = match config_path {
        Some(path) => outdial_config::load_config_from_path(path),
        None => outdial_config::load_config(),
    };
    loaded.map_err(|e| format!("failed to load configuration: {e}"))
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            let config = match load(config.as_ref()) {
                Ok(config) => config,
                Err(message) => {
                    eprintln!("error: {message}");
                    return std::process::ExitCode::FAILURE;
                }
            };
            if let Err(errors) = outdial_config::validate_config(&config) {
                eprintln!("error: configuration is invalid:");
                for error in errors {
                    eprintln!("  - {error}");
                }
                return std::process::ExitCode::FAILURE;
            }
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("error: {e}");
                return std::process::ExitCode::FAILURE;
            }
            std::process::ExitCode::SUCCESS
        }
        Commands::CheckConfig { config } => {
            let config = match load(config.as_ref()) {
                Ok(config) => config,
                Err(message) => {
                    eprintln!("error: {message}");
                    return std::process::ExitCode::FAILURE;
                }
            };
            match outdial_config::validate_config(&config) {
                Ok(()) => {
                    println!("configuration ok");
                    std::process::ExitCode::SUCCESS
                }
                Err(errors) => {
                    eprintln!("configuration is invalid:");
                    for error in errors {
                        eprintln!("  - {error}");
                    }
                    std::process::ExitCode::FAILURE
                }
            }
        }
    }
}
