//! Metric aggregator - TCP ingest, windowed mean aggregation
//!
//! Clients stream "<name>\t<value>\t<timestamp>" lines; every flush interval
//! the mean per metric name is written to stdout as "<name>\t<mean>".
//!
//! Module structure:
//! - `domain/` - Records, aggregates, parsing and validation
//! - `io/` - External interfaces (TCP listener, connections, sink, Prometheus)
//! - `services/` - Admission gate, aggregation store, scheduler
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use metric_aggregator::infra::{Config, Metrics};
use metric_aggregator::io::{bind_listener, run_listener, LineSink, ListenerConfig};
use metric_aggregator::services::{AdmissionGate, Scheduler};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Metric aggregator - windowed mean aggregation over TCP
#[derive(Parser, Debug)]
#[command(name = "metric-aggregator", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the ingest listening port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the maximum number of concurrent connections
    #[arg(long)]
    max_connections: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr: stdout carries the aggregated output
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(git_hash = %env!("GIT_HASH"), "metric-aggregator starting");

    let args = Args::parse();

    let config_path = Config::resolve_config_path(args.config.as_deref());
    let mut config = Config::load_from_path(&config_path);
    if let Some(port) = args.port {
        config = config.with_port(port);
    }
    if let Some(max) = args.max_connections {
        config = config.with_max_connections(max);
    }

    info!(
        config_file = %config.config_file(),
        listen_addr = %config.listen_addr(),
        max_connections = %config.max_connections(),
        handoff_capacity = %config.handoff_capacity(),
        raw_report_interval_secs = %config.raw_report_interval().as_secs(),
        flush_interval_secs = %config.flush_interval().as_secs(),
        lookback_secs = %config.lookback().as_secs(),
        lookahead_secs = %config.lookahead().as_secs(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let metrics = Arc::new(Metrics::new());
    let gate = AdmissionGate::new(config.max_connections());

    // Single hand-off channel: many workers, one scheduler
    let (handoff_tx, handoff_rx) = mpsc::channel(config.handoff_capacity());

    let scheduler = Scheduler::new(&config, LineSink::stdout(), metrics.clone());
    let scheduler_handle = tokio::spawn(scheduler.run(handoff_rx, shutdown_rx.clone()));

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_gate = gate.clone();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = metric_aggregator::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                prom_gate,
                prom_shutdown,
            )
            .await
            {
                tracing::error!(error = %format!("{e:#}"), "Prometheus metrics server error");
            }
        });
    }

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let listener_config = ListenerConfig::from_config(&config);
    let listener = bind_listener(&listener_config.addr).await?;
    run_listener(listener, listener_config.window, gate, handoff_tx, metrics, shutdown_rx).await?;

    // Listener only returns on shutdown; wait for the final flush
    scheduler_handle.await?;

    info!("metric-aggregator shutdown complete");
    Ok(())
}
