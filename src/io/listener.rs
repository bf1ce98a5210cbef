//! Ingest TCP listener
//!
//! Accept loop gated by the admission gate: a slot is taken *before*
//! `accept()`, so once every slot is held no further connection is accepted
//! and new clients wait in the kernel backlog until a worker finishes.

use crate::domain::types::Record;
use crate::domain::window::TimeWindow;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::connection::ConnectionWorker;
use crate::services::admission::AdmissionGate;
use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

/// Ingest listener configuration
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub addr: String,
    pub window: TimeWindow,
}

impl ListenerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            addr: config.listen_addr(),
            window: TimeWindow::new(config.lookback(), config.lookahead()),
        }
    }
}

/// Bind the ingest socket
pub async fn bind_listener(addr: &str) -> anyhow::Result<TcpListener> {
    TcpListener::bind(addr).await.with_context(|| format!("Failed to bind ingest listener on {addr}"))
}

/// Run the accept loop until shutdown
///
/// Each accepted connection gets its own task running a `ConnectionWorker`
/// that holds one admission slot for its whole lifetime.
pub async fn run_listener(
    listener: TcpListener,
    window: TimeWindow,
    gate: AdmissionGate,
    handoff_tx: mpsc::Sender<Record>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let local_addr = listener.local_addr().context("Failed to read listener address")?;
    info!(addr = %local_addr, max_connections = %gate.capacity(), "ingest_listener_started");

    loop {
        let permit = tokio::select! {
            _ = shutdown.wait_for(|&stop| stop) => break,
            permit = gate.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let (socket, peer) = tokio::select! {
            _ = shutdown.wait_for(|&stop| stop) => break,
            result = listener.accept() => match result {
                Ok(accepted) => accepted,
                Err(e) => {
                    // Dropping the permit returns the slot
                    error!(error = %e, "ingest_accept_failed");
                    continue;
                }
            },
        };

        metrics.record_connection_accepted();
        if let Err(e) = socket.set_nodelay(true) {
            error!(peer = %peer, error = %e, "ingest_set_nodelay_failed");
        }

        let worker = ConnectionWorker::new(handoff_tx.clone(), metrics.clone(), window);
        tokio::spawn(async move {
            worker.serve(socket, peer, permit).await;
        });
    }

    // Workers already admitted keep their slots and finish on their own
    gate.close();
    info!(active_connections = %gate.active(), "ingest_listener_shutdown");
    Ok(())
}
