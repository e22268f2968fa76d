mod cli;
mod config;
mod dispatch;
mod duration;
mod error;
mod executor;
mod protocol;
mod simulator;
mod stats;

use clap::error::ErrorKind;
use clap::Parser;
use cli::Args;
use config::AdapterConfig;
use dispatch::Dispatcher;
use error::AdapterError;
use executor::K6Executor;
use protocol::{read_request, Response};
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args = match Args::try_parse() {
        Ok(args) => Ok(args),
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => Err(e),
    };

    // Diagnostics go to stderr; stdout carries only the response line
    init_tracing(args.as_ref().map(|a| a.log_level.as_str()).unwrap_or("info"));
    log_environment();

    let (outcome, legacy_error_channel) = match args {
        Err(e) => (Err(AdapterError::Config(e.to_string().trim().to_string())), false),
        Ok(args) => match AdapterConfig::from_args(&args) {
            Err(e) => (Err(AdapterError::Config(format!("{:#}", e))), false),
            Ok(config) => {
                let legacy = config.legacy_error_channel;
                (handle_request(config).await, legacy)
            }
        },
    };

    if let Err(e) = &outcome {
        error!(kind = e.kind(), "{}", e);
    }

    let response = Response::from_outcome(outcome, legacy_error_channel);
    let written = response.write_to(&mut std::io::stdout().lock(), &mut std::io::stderr().lock());
    if let Err(e) = written {
        error!("failed to write response: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::from(response.exit_code())
}

/// Reads the single request from stdin and runs it.
async fn handle_request(config: AdapterConfig) -> error::Result<String> {
    let request = read_request(std::io::stdin().lock())?;
    Dispatcher::new(K6Executor::new(config)).dispatch(&request).await
}

fn init_tracing(level: &str) {
    let level = level.parse::<tracing::Level>().unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_max_level(level)
        .init();
}

fn log_environment() {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        cwd = ?std::env::current_dir().ok(),
        k6_bin_env = %std::env::var("K6_BIN").unwrap_or_else(|_| "not set".to_string()),
        "k6-adapter starting"
    );
}
