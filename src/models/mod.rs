//! Data models and serialization helpers.
//!
//! This module contains the structures representing the workflow inputs
//! (InSAR point tables, GNSS line of sight series, the station list and the
//! plane correction parameters) plus the custom deserializers used while
//! reading them.
pub mod gnss;
pub mod insar;
pub mod plane;
pub mod serde_helpers;
pub mod station;
