//! The `turnrelay` server binary.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use turnrelay::{Cli, RelayServer};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Help and version go to stdout and exit 0; anything else is a usage
    // error and exits 1.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let server = match RelayServer::bind(cli.into_config()).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "could not start");
            return ExitCode::FAILURE;
        }
    };
    if let Ok(addr) = server.local_addr() {
        tracing::info!(%addr, "ready, press Ctrl-C to exit");
    }

    tokio::select! {
        result = server.run() => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!(error = %e, "event loop failed");
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            ExitCode::SUCCESS
        }
    }
}
