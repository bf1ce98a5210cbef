//! Timestamp acceptance window
//!
//! A record is accepted only if `now - lookback <= ts <= now + lookahead`.
//! Both bounds are inclusive and both are enforced; dropping the upper bound
//! would let clock-skewed future timestamps through.

use chrono::{DateTime, Utc};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    lookback: chrono::Duration,
    lookahead: chrono::Duration,
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self::new(Duration::from_secs(60), Duration::ZERO)
    }
}

impl TimeWindow {
    pub fn new(lookback: Duration, lookahead: Duration) -> Self {
        Self {
            lookback: chrono::Duration::from_std(lookback).unwrap_or(chrono::Duration::MAX),
            lookahead: chrono::Duration::from_std(lookahead).unwrap_or(chrono::Duration::MAX),
        }
    }

    /// Check `ts` against the window around `now`
    pub fn accepts(&self, ts: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let oldest = now.checked_sub_signed(self.lookback).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let newest = now.checked_add_signed(self.lookahead).unwrap_or(DateTime::<Utc>::MAX_UTC);
        oldest <= ts && ts <= newest
    }

    /// Check `ts` against the window around the current wall clock
    pub fn accepts_now(&self, ts: DateTime<Utc>) -> bool {
        self.accepts(ts, Utc::now())
    }
}
