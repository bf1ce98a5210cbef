//! Wire line parsing
//!
//! Protocol: "<name>\t<value>\t<timestamp>" with the timestamp in the fixed
//! UTC form `YYYY-MM-DDThh:mm:ssZ`. Line terminators are stripped here if the
//! caller has not already done so.

use crate::domain::name::is_valid_name;
use crate::domain::types::Record;
use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use thiserror::Error;

/// chrono format for the wire timestamp
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Byte length of a wire timestamp
const TIMESTAMP_LEN: usize = 20;

/// Protocol errors for a single line. Any of these closes the connection.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("missing values: expected 3 tab-separated fields, got {fields}")]
    MissingValues { fields: usize },

    #[error("invalid name")]
    InvalidName,

    #[error("value not numeric")]
    ValueNotNumeric,

    #[error("timestamp not ISO8601")]
    TimestampNotIso8601,
}

impl ParseError {
    /// Short label for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseError::MissingValues { .. } => "missing_values",
            ParseError::InvalidName => "invalid_name",
            ParseError::ValueNotNumeric => "value_not_numeric",
            ParseError::TimestampNotIso8601 => "timestamp_not_iso8601",
        }
    }
}

/// Strip `\r` and `\n` from both ends of a raw line
pub fn trim_terminators(line: &str) -> &str {
    line.trim_matches(|c| c == '\r' || c == '\n')
}

/// Parse one wire line into a `Record`
pub fn parse_record(line: &str) -> Result<Record, ParseError> {
    let line = trim_terminators(line);

    let mut fields = line.split('\t');
    let (Some(name), Some(value), Some(timestamp), None) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(ParseError::MissingValues { fields: line.split('\t').count() });
    };

    if !is_valid_name(name) {
        return Err(ParseError::InvalidName);
    }

    let value = parse_value(value).ok_or(ParseError::ValueNotNumeric)?;
    let timestamp = parse_timestamp(timestamp).ok_or(ParseError::TimestampNotIso8601)?;

    Ok(Record { name: name.to_string(), value, timestamp })
}

/// Parse a decimal or exponential float, rejecting NaN and infinities
fn parse_value(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse the fixed `YYYY-MM-DDThh:mm:ssZ` form
///
/// chrono alone accepts unpadded and signed fields, so the exact shape is
/// checked first and chrono only validates the calendar. Second `60` parses
/// in chrono as a leap second and is rejected here.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if !has_timestamp_shape(raw.as_bytes()) {
        return None;
    }
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .ok()
        .filter(|naive| naive.nanosecond() < 1_000_000_000)
        .map(|naive| naive.and_utc())
}

fn has_timestamp_shape(b: &[u8]) -> bool {
    if b.len() != TIMESTAMP_LEN {
        return false;
    }
    b.iter().enumerate().all(|(i, &c)| match i {
        4 | 7 => c == b'-',
        10 => c == b'T',
        13 | 16 => c == b':',
        19 => c == b'Z',
        _ => c.is_ascii_digit(),
    })
}

/// Format a timestamp in the wire form
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_valid_line() {
        let record = parse_record("cpu\t42.5\t2021-01-01T00:00:00Z").unwrap();
        assert_eq!(record.name, "cpu");
        assert_eq!(record.value, 42.5);
        assert_eq!(record.timestamp, Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_strips_terminators() {
        let record = parse_record("mem\t-3e2\t2021-06-15T12:30:45Z\r\n").unwrap();
        assert_eq!(record.name, "mem");
        assert_eq!(record.value, -300.0);
        assert_eq!(record.timestamp, Utc.with_ymd_and_hms(2021, 6, 15, 12, 30, 45).unwrap());
    }

    #[test]
    fn test_missing_values() {
        assert_eq!(parse_record("cpu\t42.5"), Err(ParseError::MissingValues { fields: 2 }));
        assert_eq!(parse_record("cpu"), Err(ParseError::MissingValues { fields: 1 }));
        assert_eq!(
            parse_record("cpu\t1\t2021-01-01T00:00:00Z\textra"),
            Err(ParseError::MissingValues { fields: 4 })
        );
        // Space is not a separator
        assert_eq!(
            parse_record("cpu 1 2021-01-01T00:00:00Z"),
            Err(ParseError::MissingValues { fields: 1 })
        );
    }

    #[test]
    fn test_invalid_name() {
        assert_eq!(parse_record("-cpu\t1\t2021-01-01T00:00:00Z"), Err(ParseError::InvalidName));
        assert_eq!(parse_record("\t1\t2021-01-01T00:00:00Z"), Err(ParseError::InvalidName));
    }

    #[test]
    fn test_value_not_numeric() {
        assert_eq!(
            parse_record("cpu\tNaN-not-a-number\t2021-01-01T00:00:00Z"),
            Err(ParseError::ValueNotNumeric)
        );
        assert_eq!(parse_record("cpu\t\t2021-01-01T00:00:00Z"), Err(ParseError::ValueNotNumeric));
        assert_eq!(parse_record("cpu\tNaN\t2021-01-01T00:00:00Z"), Err(ParseError::ValueNotNumeric));
        assert_eq!(parse_record("cpu\tinf\t2021-01-01T00:00:00Z"), Err(ParseError::ValueNotNumeric));
    }

    #[test]
    fn test_timestamp_not_iso8601() {
        for ts in [
            "2021-01-01 00:00:00Z",
            "2021-01-01T00:00:00",
            "2021-01-01T00:00:00+00:00",
            "2021-1-01T00:00:00Z",
            "2021-13-01T00:00:00Z",
            "2021-02-30T00:00:00Z",
            "2021-01-01T23:59:60Z",
            "2016-12-31T23:59:60Z",
            "2021-01-01T24:00:00Z",
            "1609459200",
            "",
        ] {
            let line = format!("cpu\t1\t{ts}");
            assert_eq!(parse_record(&line), Err(ParseError::TimestampNotIso8601), "input {ts:?}");
        }
    }

    #[test]
    fn test_error_order() {
        // Name is checked before value, value before timestamp
        assert_eq!(parse_record("-x\tabc\tnope"), Err(ParseError::InvalidName));
        assert_eq!(parse_record("x\tabc\tnope"), Err(ParseError::ValueNotNumeric));
    }

    #[test]
    fn test_format_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 58).unwrap();
        assert_eq!(format_timestamp(&ts), "2024-02-29T23:59:58Z");
        assert_eq!(parse_timestamp(&format_timestamp(&ts)), Some(ts));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(ParseError::InvalidName.to_string(), "invalid name");
        assert_eq!(ParseError::ValueNotNumeric.to_string(), "value not numeric");
        assert_eq!(ParseError::TimestampNotIso8601.to_string(), "timestamp not ISO8601");
        assert!(ParseError::MissingValues { fields: 2 }.to_string().starts_with("missing values"));
    }
}
