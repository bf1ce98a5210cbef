//! Metric name syntax check
//!
//! A legal name is 1-64 characters, starts with an ASCII letter or digit,
//! and continues with ASCII letters, digits or hyphens.

/// Maximum metric name length in characters
pub const MAX_NAME_LEN: usize = 64;

/// Check whether `name` is a legal metric name
///
/// Works on chars rather than bytes so a multi-byte letter is rejected as one
/// illegal character instead of being measured as several.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_alphanumeric() {
        return false;
    }

    let mut len = 1;
    for c in chars {
        len += 1;
        if len > MAX_NAME_LEN || !(c.is_ascii_alphanumeric() || c == '-') {
            return false;
        }
    }
    true
}
