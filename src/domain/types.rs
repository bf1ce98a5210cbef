//! Shared types for the metric aggregator

use chrono::{DateTime, Utc};

/// A single validated measurement, ready to be folded into the store
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub name: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl Record {
    pub fn new(name: impl Into<String>, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self { name: name.into(), value, timestamp }
    }
}

/// Accumulated statistics for one metric name within the current window
///
/// `mean` is only ever written by `from_record` and `absorb`, so it always
/// equals `sum / count`.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub name: String,
    pub sum: f64,
    pub count: u64,
    pub mean: f64,
    pub last_timestamp: DateTime<Utc>,
}

impl Aggregate {
    /// Start a fresh aggregate from the first record of a window
    pub fn from_record(record: Record) -> Self {
        Self {
            name: record.name,
            sum: record.value,
            count: 1,
            mean: record.value,
            last_timestamp: record.timestamp,
        }
    }

    /// Fold another record with the same name into this aggregate
    pub fn absorb(&mut self, record: &Record) {
        debug_assert_eq!(self.name, record.name);
        self.sum += record.value;
        self.count += 1;
        self.mean = self.sum / self.count as f64;
        self.last_timestamp = record.timestamp;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_609_459_200 + secs, 0).unwrap()
    }

    #[test]
    fn test_from_record() {
        let agg = Aggregate::from_record(Record::new("cpu", 4.0, ts(0)));
        assert_eq!(agg.name, "cpu");
        assert_eq!(agg.count, 1);
        assert_eq!(agg.sum, 4.0);
        assert_eq!(agg.mean, 4.0);
        assert_eq!(agg.last_timestamp, ts(0));
    }

    #[test]
    fn test_absorb_updates_mean_and_timestamp() {
        let mut agg = Aggregate::from_record(Record::new("x", 10.0, ts(0)));
        agg.absorb(&Record::new("x", 20.0, ts(5)));
        assert_eq!(agg.sum, 30.0);
        assert_eq!(agg.count, 2);
        assert_eq!(agg.mean, 15.0);
        assert_eq!(agg.last_timestamp, ts(5));

        agg.absorb(&Record::new("x", 30.0, ts(3)));
        assert_eq!(agg.sum, 60.0);
        assert_eq!(agg.count, 3);
        assert_eq!(agg.mean, 20.0);
        // Last folded wins, not the latest in time
        assert_eq!(agg.last_timestamp, ts(3));
    }
}
