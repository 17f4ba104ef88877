//! rollprobe-prober: concurrent load generator for a rollprobe target
//!
//! Counts which (cluster, pod) answered each request and exposes the counts
//! on `/metrics`. Exit code 1 on run failure.

use anyhow::Context;
use clap::Parser;
use rollprobe::config::ProberConfig;
use rollprobe::logging;
use rollprobe::prober::{Aggregator, HttpTarget, Prober};
use rollprobe::server::{run_metrics_server, SignalListener, TaskGroup, METRICS_SHUTDOWN_TIMEOUT};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Exit code for run failures
const EXIT_FAILURE: i32 = 1;

#[tokio::main]
async fn main() {
    let cfg = ProberConfig::parse();
    logging::init();
    cfg.log_summary();

    if let Err(e) = run(cfg).await {
        error!(error = %format!("{e:#}"), "Prober failed");
        std::process::exit(EXIT_FAILURE);
    }
}

async fn run(cfg: ProberConfig) -> anyhow::Result<()> {
    let mut signals = SignalListener::interrupt().context("install signal handler")?;

    // Registry is created here and shared explicitly, never registered globally
    let aggregator = Arc::new(Aggregator::new().context("create metrics registry")?);
    let target = Arc::new(
        HttpTarget::new(cfg.target_url(), cfg.timeout).context("create http client")?,
    );
    let prober = Prober::new(target, aggregator.clone(), &cfg);

    let listener = TcpListener::bind(cfg.bind_address())
        .await
        .with_context(|| format!("listen on {}", cfg.listen_addr))?;

    let mut group = TaskGroup::new();

    let signal = group.signal();
    group.spawn("prober", async move {
        prober.run(signal).await?;
        Ok(())
    });

    let signal = group.signal();
    group.spawn("metrics", async move {
        run_metrics_server(listener, aggregator, signal, METRICS_SHUTDOWN_TIMEOUT).await?;
        Ok(())
    });

    let cancel = group.controller();
    let mut signal = group.signal();
    group.spawn("interrupt", async move {
        tokio::select! {
            _ = signals.recv() => {
                info!("Interrupted, stopping workers");
                cancel.shutdown();
            }
            _ = signal.wait() => {}
        }
        Ok(())
    });

    group.wait().await?;
    info!("Prober stopped");
    Ok(())
}
