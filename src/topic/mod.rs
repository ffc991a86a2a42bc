//! Topic names and filters
//!
//! Validation for outbound topic names and matching of inbound topics
//! against the subscription filters the bridge holds on the broker.

pub mod validation;

pub use validation::{topic_matches_filter, validate_topic_filter, validate_topic_name};
