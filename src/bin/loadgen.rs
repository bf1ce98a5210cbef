//! Load generator for the metric aggregator
//!
//! Opens N concurrent connections and streams valid records stamped with the
//! current time. Useful for watching admission control (connections beyond
//! `max_connections` stall until a slot frees) and the raw ingest report.
//!
//! Usage:
//!   cargo run --bin metric-loadgen -- --addr 127.0.0.1:4268 --connections 20 --rate 100

use chrono::Utc;
use clap::Parser;
use metric_aggregator::domain::parse::format_timestamp;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "metric-loadgen", about = "Stream synthetic records at a metric aggregator")]
struct Args {
    /// Aggregator ingest address
    #[arg(long, default_value = "127.0.0.1:4268")]
    addr: String,

    /// Concurrent connections to open
    #[arg(short, long, default_value = "10")]
    connections: usize,

    /// Records per second per connection
    #[arg(short, long, default_value = "50")]
    rate: u32,

    /// Run time in seconds
    #[arg(short, long, default_value = "30")]
    duration: u64,

    /// Distinct metric names to spread records over
    #[arg(long, default_value = "8")]
    names: usize,
}

/// Stream records on one connection until the deadline, then close politely
async fn drive_connection(
    id: usize,
    addr: String,
    rate: u32,
    deadline: Instant,
    names: usize,
) -> std::io::Result<u64> {
    let connect_start = Instant::now();
    let mut stream = TcpStream::connect(&addr).await?;
    info!(conn = %id, connect_ms = %connect_start.elapsed().as_millis(), "loadgen_connected");

    let period = Duration::from_secs_f64(1.0 / f64::from(rate.max(1)));
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut sent = 0u64;
    while Instant::now() < deadline {
        ticker.tick().await;
        let name = format!("load-{}", (id + sent as usize) % names.max(1));
        let value = (sent % 100) as f64 + id as f64 / 10.0;
        let line = format!("{name}\t{value}\t{}\n", format_timestamp(&Utc::now()));
        stream.write_all(line.as_bytes()).await?;
        sent += 1;
    }

    // Empty line asks the server to close the connection
    stream.write_all(b"\n").await?;
    stream.shutdown().await?;
    Ok(sent)
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let args = Args::parse();
    let deadline = Instant::now() + Duration::from_secs(args.duration);

    info!(
        addr = %args.addr,
        connections = %args.connections,
        rate = %args.rate,
        duration_secs = %args.duration,
        "loadgen_starting"
    );

    let mut handles = Vec::with_capacity(args.connections);
    for id in 0..args.connections {
        let addr = args.addr.clone();
        handles.push(tokio::spawn(drive_connection(id, addr, args.rate, deadline, args.names)));
    }

    let mut total = 0u64;
    for (id, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(Ok(sent)) => total += sent,
            Ok(Err(e)) => warn!(conn = %id, error = %e, "loadgen_connection_failed"),
            Err(e) => warn!(conn = %id, error = %e, "loadgen_task_failed"),
        }
    }

    info!(records_sent = %total, "loadgen_finished");
}
