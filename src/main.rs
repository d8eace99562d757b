//! AlgoJudge Engine - Command Line Entry Point
//!
//! Judges one request read from a JSON file (or stdin when the path is `-`)
//! and prints the judged submission as JSON.

use std::process::ExitCode;

use anyhow::Context;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use algojudge_engine::{JudgeService, config::CONFIG, metrics, models::JudgeRequest};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = ?e, "Judging failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| CONFIG.log.rust_log.clone().into());
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr; stdout carries the judged submission.
    if CONFIG.log.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let path = args
        .next()
        .context("usage: algojudge-engine <request.json | -> [--full] [--metrics]")?;
    let flags: Vec<String> = args.collect();

    let raw = if path == "-" {
        let mut raw = String::new();
        tokio::io::stdin()
            .read_to_string(&mut raw)
            .await
            .context("Failed to read request from stdin")?;
        raw
    } else {
        tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read request file {path}"))?
    };
    let request: JudgeRequest =
        serde_json::from_str(&raw).context("Request is not a valid judge request")?;

    tracing::info!(
        language = %request.language,
        test_cases = request.test_cases.len(),
        "Starting AlgoJudge engine"
    );

    let service = JudgeService::try_new(&CONFIG)?;
    let cancel = CancellationToken::new();
    let handle = service.spawn(request, cancel.clone());

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling judging");
            ctrl_c.cancel();
        }
    });

    let submission = handle.await.context("Judging task panicked")??;
    let submission = if flags.iter().any(|f| f == "--full") {
        submission
    } else {
        submission.redacted()
    };
    println!("{}", serde_json::to_string_pretty(&submission)?);

    if flags.iter().any(|f| f == "--metrics") {
        eprintln!("{}", metrics::gather_text()?);
    }
    Ok(())
}
