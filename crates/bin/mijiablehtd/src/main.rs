//! # mijiablehtd — mijiableht daemon
//!
//! Composition root that wires the BLE scanner, sensor cache, and MQTT
//! publisher together and runs them until shutdown.
//!
//! ## Responsibilities
//! - Parse configuration (YAML file, env vars, docker secret)
//! - Initialize logging
//! - Run the orchestrator and map failures to process exit codes:
//!   0 clean shutdown, 2 invalid configuration, 3 fatal BLE adapter error,
//!   4 MQTT authentication failure, 1 anything else
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;
mod daemon;

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    // Configuration errors are reported before logging is up.
    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("mijiablehtd: configuration error: {err}");
            return ExitCode::from(2);
        }
    };
    let timezone = match config.timezone() {
        Ok(timezone) => timezone,
        Err(err) => {
            eprintln!("mijiablehtd: configuration error: {err}");
            return ExitCode::from(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    tracing::info!(%timezone, "configuration loaded");

    match daemon::run(config, timezone).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "daemon terminated");
            ExitCode::from(err.exit_code())
        }
    }
}
