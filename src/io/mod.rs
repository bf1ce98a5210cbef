//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `listener` - TCP accept loop gated by admission control
//! - `connection` - per-connection read/parse/filter/hand-off worker
//! - `sink` - flush output for drained aggregation windows
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod connection;
pub mod listener;
pub mod prometheus;
pub mod sink;

// Re-export commonly used types
pub use connection::{CloseReason, ConnectionWorker};
pub use listener::{bind_listener, run_listener, ListenerConfig};
pub use sink::{AggregateSink, LineSink};
