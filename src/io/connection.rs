//! Connection worker - owns one accepted connection end to end
//!
//! Protocol: "<name>\t<value>\t<timestamp>\n", optionally "\r\n".
//! - end of stream or read failure closes the connection
//! - an empty line closes the connection
//! - a malformed line closes the connection (nothing is written back)
//! - a record outside the time window is dropped and reading continues
//! - a line longer than `MAX_LINE_LEN` closes the connection
//!
//! Valid records go to the scheduler over the shared hand-off channel. The
//! send waits while the channel is full, so a slow scheduler slows producers.

use crate::domain::parse::{parse_record, trim_terminators, ParseError};
use crate::domain::types::Record;
use crate::domain::window::TimeWindow;
use crate::infra::metrics::Metrics;
use crate::services::admission::AdmissionPermit;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Longest accepted line in bytes, terminator included
///
/// A valid record needs at most 64 + 1 + 20 bytes plus the value, so this
/// leaves ample room for long decimal literals.
pub const MAX_LINE_LEN: usize = 1024;

/// Why a connection was closed
#[derive(Debug, Clone, PartialEq)]
pub enum CloseReason {
    /// Peer closed its side (bytes after the last newline are discarded)
    EndOfStream,
    /// Peer sent an empty line
    EmptyLine,
    /// Peer sent a malformed line
    Parse(ParseError),
    /// Peer sent `MAX_LINE_LEN` bytes without a newline
    LineTooLong,
    /// Reading from the socket failed
    Read(String),
    /// Scheduler is gone; nothing left to hand records to
    HandoffClosed,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::EndOfStream => "end_of_stream",
            CloseReason::EmptyLine => "empty_line",
            CloseReason::Parse(e) => e.as_str(),
            CloseReason::LineTooLong => "line_too_long",
            CloseReason::Read(_) => "read_error",
            CloseReason::HandoffClosed => "handoff_closed",
        }
    }
}

pub struct ConnectionWorker {
    handoff_tx: mpsc::Sender<Record>,
    metrics: Arc<Metrics>,
    window: TimeWindow,
}

impl ConnectionWorker {
    pub fn new(handoff_tx: mpsc::Sender<Record>, metrics: Arc<Metrics>, window: TimeWindow) -> Self {
        Self { handoff_tx, metrics, window }
    }

    /// Serve one connection until it closes, then release its admission slot
    pub async fn serve<S>(self, stream: S, peer: SocketAddr, permit: AdmissionPermit) -> CloseReason
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        debug!(peer = %peer, "connection_accepted");

        let mut reader = BufReader::new(stream);
        let reason = self.read_loop(&mut reader, peer).await;

        if let Err(e) = reader.get_mut().shutdown().await {
            debug!(peer = %peer, error = %e, "connection_shutdown_failed");
        }
        drop(reader);
        permit.release();
        self.metrics.record_connection_closed();

        match &reason {
            CloseReason::Parse(e) => {
                warn!(peer = %peer, reason = %reason.as_str(), error = %e, "connection_closed")
            }
            CloseReason::Read(e) => {
                warn!(peer = %peer, reason = %reason.as_str(), error = %e, "connection_closed")
            }
            CloseReason::LineTooLong => warn!(
                peer = %peer,
                reason = %reason.as_str(),
                limit = %MAX_LINE_LEN,
                "connection_closed"
            ),
            _ => debug!(peer = %peer, reason = %reason.as_str(), "connection_closed"),
        }
        reason
    }

    async fn read_loop<R>(&self, reader: &mut R, peer: SocketAddr) -> CloseReason
    where
        R: AsyncBufRead + Unpin,
    {
        let mut buf = Vec::with_capacity(128);

        loop {
            buf.clear();
            let mut limited = (&mut *reader).take(MAX_LINE_LEN as u64);
            match limited.read_until(b'\n', &mut buf).await {
                Ok(0) => return CloseReason::EndOfStream,
                Ok(n) if buf.last() != Some(&b'\n') => {
                    if n >= MAX_LINE_LEN {
                        self.metrics.record_parse_error();
                        return CloseReason::LineTooLong;
                    }
                    return CloseReason::EndOfStream;
                }
                Ok(_) => {}
                Err(e) => {
                    self.metrics.record_read_error();
                    return CloseReason::Read(e.to_string());
                }
            }

            let text = String::from_utf8_lossy(&buf);
            let line = trim_terminators(&text);
            if line.is_empty() {
                return CloseReason::EmptyLine;
            }

            let record = match parse_record(line) {
                Ok(record) => record,
                Err(e) => {
                    self.metrics.record_parse_error();
                    return CloseReason::Parse(e);
                }
            };

            // Evaluated against the clock now, not when the bytes arrived
            if !self.window.accepts_now(record.timestamp) {
                self.metrics.record_out_of_window();
                debug!(
                    peer = %peer,
                    name = %record.name,
                    timestamp = %record.timestamp,
                    "record_outside_window"
                );
                continue;
            }

            if self.handoff_tx.send(record).await.is_err() {
                return CloseReason::HandoffClosed;
            }
            self.metrics.record_handed_off();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parse::format_timestamp;
    use crate::services::admission::AdmissionGate;
    use chrono::Utc;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt};

    struct Harness {
        gate: AdmissionGate,
        metrics: Arc<Metrics>,
        handoff_tx: mpsc::Sender<Record>,
        handoff_rx: mpsc::Receiver<Record>,
    }

    impl Harness {
        fn worker(&self) -> ConnectionWorker {
            ConnectionWorker::new(self.handoff_tx.clone(), self.metrics.clone(), TimeWindow::default())
        }
    }

    fn harness() -> Harness {
        let (handoff_tx, handoff_rx) = mpsc::channel(64);
        let metrics = Arc::new(Metrics::new());
        Harness { gate: AdmissionGate::new(1), metrics, handoff_tx, handoff_rx }
    }

    fn peer() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 40000))
    }

    fn now_ts() -> String {
        format_timestamp(&Utc::now())
    }

    /// Feed `input` to a worker over an in-memory stream and wait for it to close
    async fn run_with_input(h: &mut Harness, input: &[u8]) -> CloseReason {
        let (client, server) = duplex(4096);
        let permit = h.gate.acquire().await.unwrap();
        let worker = h.worker();
        let task = tokio::spawn(worker.serve(server, peer(), permit));

        let (mut read_half, mut write_half) = tokio::io::split(client);
        write_half.write_all(input).await.unwrap();
        write_half.shutdown().await.unwrap();

        let reason = tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();

        // Server side is closed: the peer reads EOF and nothing else
        let mut rest = Vec::new();
        read_half.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        reason
    }

    fn drain(rx: &mut mpsc::Receiver<Record>) -> Vec<Record> {
        let mut out = Vec::new();
        while let Ok(r) = rx.try_recv() {
            out.push(r);
        }
        out
    }

    #[tokio::test]
    async fn test_records_handed_off_in_order() {
        let mut h = harness();
        let ts = now_ts();
        let input = format!("svc\t1\t{ts}\nsvc\t3\t{ts}\r\nother\t2.5\t{ts}\n");
        let reason = run_with_input(&mut h, input.as_bytes()).await;
        assert_eq!(reason, CloseReason::EndOfStream);

        let records = drain(&mut h.handoff_rx);
        let values: Vec<f64> = records.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![1.0, 3.0, 2.5]);
        assert_eq!(records[2].name, "other");
        assert_eq!(h.metrics.raw_since_report(), 3);
    }

    #[tokio::test]
    async fn test_empty_line_closes_connection() {
        let mut h = harness();
        let ts = now_ts();
        let input = format!("svc\t1\t{ts}\n\r\nsvc\t5\t{ts}\n");
        let reason = run_with_input(&mut h, input.as_bytes()).await;
        assert_eq!(reason, CloseReason::EmptyLine);

        // The line after the empty one is never read
        assert_eq!(drain(&mut h.handoff_rx).len(), 1);
    }

    #[tokio::test]
    async fn test_parse_error_closes_connection() {
        let mut h = harness();
        let ts = now_ts();
        let input = format!("svc\t1\t{ts}\nsvc\t1\nsvc\t2\t{ts}\n");
        let reason = run_with_input(&mut h, input.as_bytes()).await;
        assert_eq!(reason, CloseReason::Parse(ParseError::MissingValues { fields: 2 }));
        assert_eq!(drain(&mut h.handoff_rx).len(), 1);
        assert_eq!(h.metrics.snapshot(0).parse_errors, 1);
    }

    #[tokio::test]
    async fn test_out_of_window_dropped_silently() {
        let mut h = harness();
        let stale = format_timestamp(&(Utc::now() - chrono::Duration::seconds(120)));
        let future = format_timestamp(&(Utc::now() + chrono::Duration::seconds(120)));
        let ts = now_ts();
        let input = format!("old\t1\t{stale}\nnew\t1\t{future}\nok\t1\t{ts}\n");
        let reason = run_with_input(&mut h, input.as_bytes()).await;
        assert_eq!(reason, CloseReason::EndOfStream);

        let records = drain(&mut h.handoff_rx);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "ok");
        assert_eq!(h.metrics.snapshot(0).records_out_of_window, 2);
        assert_eq!(h.metrics.raw_since_report(), 1);
    }

    #[tokio::test]
    async fn test_partial_final_line_discarded() {
        let mut h = harness();
        let ts = now_ts();
        let input = format!("svc\t1\t{ts}\nsvc\t2\t{ts}");
        let reason = run_with_input(&mut h, input.as_bytes()).await;
        assert_eq!(reason, CloseReason::EndOfStream);
        assert_eq!(drain(&mut h.handoff_rx).len(), 1);
    }

    #[tokio::test]
    async fn test_line_at_limit_accepted() {
        let mut h = harness();
        let line = format!("svc\t1\t{}\n", now_ts());
        let padded = format!("svc\t{}1\t{}\n", "0".repeat(MAX_LINE_LEN - line.len()), now_ts());
        assert_eq!(padded.len(), MAX_LINE_LEN);

        let reason = run_with_input(&mut h, padded.as_bytes()).await;
        assert_eq!(reason, CloseReason::EndOfStream);
        assert_eq!(drain(&mut h.handoff_rx)[0].value, 1.0);
    }

    #[tokio::test]
    async fn test_unterminated_flood_closes_connection() {
        let h = harness();
        let permit = h.gate.acquire().await.unwrap();
        let (client, server) = duplex(4096);
        let task = tokio::spawn(h.worker().serve(server, peer(), permit));

        // Server hangs up mid-write, so write errors are expected
        let (_read_half, mut write_half) = tokio::io::split(client);
        let flood = tokio::spawn(async move {
            let chunk = [b'a'; 512];
            for _ in 0..64 {
                if write_half.write_all(&chunk).await.is_err() {
                    break;
                }
            }
        });

        let reason = tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        assert_eq!(reason, CloseReason::LineTooLong);
        assert_eq!(h.gate.active(), 0);
        assert_eq!(h.metrics.snapshot(0).parse_errors, 1);
        flood.abort();
    }

    #[tokio::test]
    async fn test_slot_released_on_every_exit() {
        let mut h = harness();
        let ts = now_ts();
        for input in [
            String::new(),
            "\n".to_string(),
            "bad line\n".to_string(),
            format!("svc\t1\t{ts}\n"),
        ] {
            run_with_input(&mut h, input.as_bytes()).await;
            assert_eq!(h.gate.active(), 0, "slot leaked for input {input:?}");
        }
        assert_eq!(h.metrics.snapshot(0).connections_closed, 4);
    }

    #[tokio::test]
    async fn test_handoff_closed_ends_worker() {
        let (handoff_tx, handoff_rx) = mpsc::channel(1);
        drop(handoff_rx);
        let metrics = Arc::new(Metrics::new());
        let worker = ConnectionWorker::new(handoff_tx, metrics.clone(), TimeWindow::default());
        let gate = AdmissionGate::new(1);
        let permit = gate.acquire().await.unwrap();

        let (mut client, server) = duplex(1024);
        client.write_all(format!("svc\t1\t{}\n", now_ts()).as_bytes()).await.unwrap();

        let reason = worker.serve(server, peer(), permit).await;
        assert_eq!(reason, CloseReason::HandoffClosed);
        assert_eq!(gate.active(), 0);
        assert_eq!(metrics.raw_since_report(), 0);
    }
}
