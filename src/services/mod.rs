//! Services - admission control, aggregation state and scheduling
//!
//! This module contains the core concurrency services:
//! - `admission` - bounded connection admission gate
//! - `store` - single-owner name to aggregate map
//! - `scheduler` - control loop serializing folds, raw reports and flushes

pub mod admission;
pub mod scheduler;
pub mod store;

// Re-export commonly used types
pub use admission::{AdmissionGate, AdmissionPermit};
pub use scheduler::Scheduler;
pub use store::AggregationStore;
