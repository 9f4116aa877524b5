//! Main entry point for the topsoil-ingest CLI application.
//!
//! Startup (configuration, fetcher, Kafka producer) completes before the
//! request is read, then the request is processed once and the response
//! body is written to stdout.

use anyhow::{Context, Result};
use clap::Parser;
use reqwest::StatusCode;
use serde_json::Value;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

use topsoil_ingest::{Cli, Coordinator, KafkaBus, Response, UrlFetcher};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let fetcher = UrlFetcher::new(Duration::from_secs(cli.download_timeout))
        .context("cannot build HTTP client")?;
    let mut coordinator = Coordinator::new(cli.pipeline_config(), Arc::new(fetcher));

    let bus = KafkaBus::new(&cli.bootstrap_servers, Duration::from_secs(cli.flush_timeout))
        .context("cannot create Kafka producer")?;
    coordinator.attach(Arc::new(bus));

    let response = match read_request(&cli).await? {
        Ok(body) => coordinator.handle(&body, &cli.request_id()).await,
        Err(reason) => Response {
            status: StatusCode::BAD_REQUEST,
            body: reason,
        },
    };

    println!("{}", response.body);
    Ok(exit_code(response.status))
}

/// Read and parse the request body.
///
/// I/O failures are fatal; a body that is not JSON is a rejected request.
async fn read_request(cli: &Cli) -> Result<std::result::Result<Value, String>> {
    let text = if cli.reads_stdin() {
        let mut text = String::new();
        tokio::io::stdin()
            .read_to_string(&mut text)
            .await
            .context("cannot read request from stdin")?;
        text
    } else {
        tokio::fs::read_to_string(&cli.request)
            .await
            .with_context(|| format!("cannot read request from {}", cli.request))?
    };

    // tolerate a UTF-8 byte order mark
    let text = text.trim_start_matches('\u{feff}');
    Ok(serde_json::from_str(text).map_err(|e| format!("Request body is not valid JSON: {e}")))
}

fn exit_code(status: StatusCode) -> ExitCode {
    if status.is_success() {
        ExitCode::SUCCESS
    } else if status == StatusCode::SERVICE_UNAVAILABLE {
        ExitCode::from(3)
    } else if status.is_client_error() {
        ExitCode::from(2)
    } else {
        ExitCode::FAILURE
    }
}
