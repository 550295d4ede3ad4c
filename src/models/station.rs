use super::serde_helpers::{float_from_str, trimmed_string};
use serde::Deserialize;

/// A GNSS station from the station list.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Station {
    #[serde(rename = "Station", deserialize_with = "trimmed_string")]
    pub name: String,
    #[serde(deserialize_with = "float_from_str")]
    pub latitude: f64,
    #[serde(deserialize_with = "float_from_str")]
    pub longitude: f64,
}
