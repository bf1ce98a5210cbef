//! Domain models - metric records, aggregates and their validation
//!
//! This module contains the canonical data types used throughout the system:
//! - `Record` - one validated measurement parsed from the wire
//! - `Aggregate` - running count/sum/mean for one metric name
//! - `name` - metric name syntax check
//! - `parse` - wire line to `Record` conversion
//! - `window` - timestamp acceptance window

pub mod name;
pub mod parse;
pub mod types;
pub mod window;

// Re-export commonly used types at module level
pub use name::is_valid_name;
pub use parse::{parse_record, ParseError};
pub use types::{Aggregate, Record};
pub use window::TimeWindow;
