//! Reasonwatch - report whether a streaming chat backend is idle, reasoning,
//! or answering.

mod indicator;
mod replay;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use reasonwatch_core::{
    intercept, DetectorConfig, Fetch, FetchRequest, ReqwestFetch, StateMachine, Status,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use replay::RecordedFetch;

#[derive(Parser, Debug)]
#[command(name = "reasonwatch")]
#[command(about = "Watch a streaming chat backend and report its generation status")]
#[command(version)]
struct Cli {
    /// Detector config file (TOML)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Feed a recorded event-stream file through the detector
    Replay {
        /// File holding the raw event stream
        file: PathBuf,

        /// Bytes per chunk
        #[arg(long, default_value_t = 7)]
        chunk_size: usize,

        /// Pause between chunks, in milliseconds
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,
    },
    /// POST to a live endpoint and watch the response stream
    Watch {
        /// Endpoint URL
        url: String,

        /// JSON request body
        #[arg(long, default_value = "{}")]
        body: String,

        /// Extra request header as "Name: value" (repeatable)
        #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
        headers: Vec<String>,
    },
}

/// How long to wait for the session to settle after the body is drained
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => DetectorConfig::load(path)?,
        None => DetectorConfig::default(),
    };

    let machine = StateMachine::new();
    let (status_tx, status_rx) = watch::channel(machine.current());
    let _indicator = machine.subscribe(move |status| {
        println!("{}", indicator::render(status));
        let _ = status_tx.send(status);
    });

    let received = match cli.command {
        Command::Replay {
            file,
            chunk_size,
            delay_ms,
        } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let fetch = intercept(
                RecordedFetch::new(
                    Bytes::from(data),
                    chunk_size,
                    Duration::from_millis(delay_ms),
                    &config,
                ),
                config.predicate(),
                Arc::clone(&machine),
            );
            run(&fetch, RecordedFetch::request(&config)?).await?
        }
        Command::Watch { url, body, headers } => {
            serde_json::from_str::<serde_json::Value>(&body)
                .context("--body must be valid JSON")?;
            let mut request = FetchRequest::post(url, body)
                .with_header("accept", &config.media_type)?
                .with_header("content-type", "application/json")?;
            for header in &headers {
                let (name, value) = header
                    .split_once(':')
                    .with_context(|| format!("Header must be \"Name: value\": {header}"))?;
                request = request.with_header(name.trim(), value.trim())?;
            }
            let fetch = intercept(ReqwestFetch::new(), config.predicate(), Arc::clone(&machine));
            run(&fetch, request).await?
        }
    };

    settle(status_rx).await;
    info!("Done: {} bytes received", received);
    Ok(())
}

/// Send the request and drain the caller's copy of the body
async fn run<F: Fetch>(fetch: &F, request: FetchRequest) -> Result<usize> {
    let response = fetch.fetch(request).await?;
    info!("Response {} ({:?})", response.status, response.content_type());

    let mut body = response.body;
    let mut received = 0;
    while let Some(chunk) = body.next().await {
        received += chunk?.len();
    }
    Ok(received)
}

/// Wait for the detached session task to report Idle
async fn settle(mut status_rx: watch::Receiver<Status>) {
    let waited = tokio::time::timeout(
        SETTLE_TIMEOUT,
        status_rx.wait_for(|status| !status.is_busy()),
    )
    .await;
    if waited.is_err() {
        warn!("Status did not return to idle within {:?}", SETTLE_TIMEOUT);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
