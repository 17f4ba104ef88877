//! rollprobe-target: HTTP responder with tunable shutdown behavior
//!
//! Configured through environment variables (see `TargetConfig`).
//! Exit code 0 on clean shutdown, 2 on startup or shutdown error.

use anyhow::Context;
use rollprobe::config::TargetConfig;
use rollprobe::logging;
use rollprobe::server::SignalListener;
use rollprobe::target::Responder;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Exit code for startup and shutdown failures
const EXIT_FAILURE: i32 = 2;

#[tokio::main]
async fn main() {
    logging::init();

    if let Err(e) = run().await {
        error!(error = %format!("{e:#}"), "Target failed");
        std::process::exit(EXIT_FAILURE);
    }
}

async fn run() -> anyhow::Result<()> {
    let cfg = TargetConfig::from_env()?;
    cfg.log_summary();

    let responder = Responder::new(&cfg)?;
    let mut signals = SignalListener::termination().context("install signal handlers")?;

    let listener = TcpListener::bind(cfg.bind_address())
        .await
        .with_context(|| format!("listen on {}", cfg.http_address))?;

    responder
        .serve(listener, async move {
            signals.recv().await;
        })
        .await?;

    info!("Target shut down cleanly");
    Ok(())
}
