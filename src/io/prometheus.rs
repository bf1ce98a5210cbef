//! Prometheus metrics HTTP endpoint
//!
//! Exposes ingest counters in Prometheus text format at /metrics and a
//! liveness probe at /health. Uses hyper for the HTTP server.

use crate::infra::metrics::{Metrics, MetricsSummary};
use crate::services::admission::AdmissionGate;
use anyhow::Context;
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name} {val}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(summary: &MetricsSummary) -> String {
    let mut output = String::with_capacity(2048);
    let counters: [(&str, &str, u64); 8] = [
        ("aggregator_records_total", "Records handed off to the scheduler", summary.records_total),
        (
            "aggregator_records_out_of_window_total",
            "Records dropped by the time window filter",
            summary.records_out_of_window,
        ),
        ("aggregator_parse_errors_total", "Malformed lines (connection closed)", summary.parse_errors),
        ("aggregator_read_errors_total", "Connections closed by a read failure", summary.read_errors),
        (
            "aggregator_connections_accepted_total",
            "Connections admitted",
            summary.connections_accepted,
        ),
        ("aggregator_connections_closed_total", "Connections closed", summary.connections_closed),
        ("aggregator_flushes_total", "Window flushes executed", summary.flushes_total),
        (
            "aggregator_aggregates_emitted_total",
            "Aggregates written to the flush sink",
            summary.aggregates_emitted,
        ),
    ];
    for (name, help, val) in counters {
        write_metric(&mut output, name, help, MetricType::Counter, val);
    }
    write_metric(
        &mut output,
        "aggregator_active_connections",
        "Admission slots currently held",
        MetricType::Gauge,
        summary.active_connections as u64,
    );
    output
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    gate: AdmissionGate,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(&metrics.snapshot(gate.active()));
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
                .expect("static response should not fail"))
        }
        (&Method::GET, "/health") => Ok(Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("ok")))
            .expect("static response should not fail")),
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found")))
            .expect("static response should not fail")),
    }
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    gate: AdmissionGate,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics server on {addr}"))?;

    info!(port = %port, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let gate = gate.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                let gate = gate.clone();
                                async move { handle_request(req, metrics, gate).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            _ = shutdown.wait_for(|&stop| stop) => {
                info!("prometheus_metrics_server_shutdown");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = Metrics::new();
        metrics.record_handed_off();
        metrics.record_handed_off();
        metrics.record_parse_error();
        metrics.record_connection_accepted();
        metrics.record_flush(3);

        let output = format_prometheus_metrics(&metrics.snapshot(1));

        assert!(output.contains("# TYPE aggregator_records_total counter"));
        assert!(output.contains("aggregator_records_total 2\n"));
        assert!(output.contains("aggregator_parse_errors_total 1\n"));
        assert!(output.contains("aggregator_connections_accepted_total 1\n"));
        assert!(output.contains("aggregator_aggregates_emitted_total 3\n"));
        assert!(output.contains("# TYPE aggregator_active_connections gauge"));
        assert!(output.contains("aggregator_active_connections 1\n"));
    }
}
