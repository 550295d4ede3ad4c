//! Custom serde deserializers for the loosely formatted input files.
//!
//! The station list and the parameter table are produced by hand or by other
//! tools, so values often carry stray whitespace.

use serde::{Deserialize, Deserializer, de::Error};

/// Deserializes a string and trims surrounding whitespace.
///
/// # Examples
/// ```text
/// Input:  "  ABCD "
/// Output: "ABCD"
/// ```
pub fn trimmed_string<'a, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'a>,
{
    let s = String::deserialize(deserializer)?;
    Ok(s.trim().to_string())
}

/// Deserializes a float written as text, tolerating whitespace.
///
/// An empty field is rejected rather than silently turned into zero.
pub fn float_from_str<'a, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'a>,
{
    let s = String::deserialize(deserializer)?;
    parse_float(&s).ok_or_else(|| D::Error::custom(format!("invalid number '{}'", s.trim())))
}

/// Parses a numeric cell, `None` for empty or malformed text.
pub fn parse_float(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}
