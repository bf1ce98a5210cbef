//! Aggregation store - name to running aggregate for the current window
//!
//! Owned by value by the scheduler and only reachable through `&mut self`, so
//! the single-writer rule is enforced by the borrow checker instead of a lock.

use crate::domain::types::{Aggregate, Record};
use rustc_hash::FxHashMap;

#[derive(Debug, Default)]
pub struct AggregationStore {
    aggregates: FxHashMap<String, Aggregate>,
}

impl AggregationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one record into its aggregate, creating it on first sight
    pub fn fold(&mut self, record: Record) {
        match self.aggregates.get_mut(&record.name) {
            Some(aggregate) => aggregate.absorb(&record),
            None => {
                self.aggregates.insert(record.name.clone(), Aggregate::from_record(record));
            }
        }
    }

    /// Take every aggregate out and leave the store empty
    pub fn drain_all(&mut self) -> Vec<Aggregate> {
        std::mem::take(&mut self.aggregates).into_values().collect()
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&Aggregate> {
        self.aggregates.get(name)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.aggregates.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.aggregates.is_empty()
    }
}
