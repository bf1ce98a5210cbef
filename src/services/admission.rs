//! Connection admission control
//!
//! A fixed pool of slots bounds how many connections are served at once. The
//! listener takes a slot *before* accepting, so when the pool is exhausted new
//! connection attempts wait in the kernel accept backlog instead of being
//! admitted or rejected.
//!
//! Slots are returned by dropping the `AdmissionPermit`, which makes release
//! exactly-once on every exit path of a connection, including panics.

use std::sync::Arc;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Bounded counting resource limiting concurrently active connections
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl AdmissionGate {
    /// Create a gate with `capacity` slots (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { semaphore: Arc::new(Semaphore::new(capacity)), capacity }
    }

    /// Wait until a slot is free and take it. No timeout.
    ///
    /// Only fails if the gate has been closed.
    pub async fn acquire(&self) -> Result<AdmissionPermit, AcquireError> {
        let permit = self.semaphore.clone().acquire_owned().await?;
        Ok(AdmissionPermit { _permit: permit })
    }

    /// Take a slot if one is free right now
    #[cfg(test)]
    pub fn try_acquire(&self) -> Option<AdmissionPermit> {
        self.semaphore.clone().try_acquire_owned().ok().map(|permit| AdmissionPermit { _permit: permit })
    }

    /// Stop handing out slots; pending and future `acquire` calls fail
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free slots
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently held by connections
    pub fn active(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }
}

/// One held admission slot
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionPermit {
    /// Return the slot to the gate
    pub fn release(self) {
        drop(self);
    }
}
