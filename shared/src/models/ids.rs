//! Human-readable identifiers

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const REQUEST_ID_PREFIX: &str = "REQ";
pub const SET_ID_PREFIX: &str = "SET";

/// Storage key plus display id for a new request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordIds {
    pub id: Uuid,
    pub request_id: String,
}

/// `<prefix>-<YYYYMMDDHHMMSSmmm>-<suffix>`; sorts by creation time within a day
pub fn format_identifier(prefix: &str, at: DateTime<Utc>, suffix: &str) -> String {
    format!("{}-{}-{}", prefix, at.format("%Y%m%d%H%M%S%3f"), suffix)
}

/// Generate a request id: REQ-<ts>-<rand>
pub fn generate_request_id(at: DateTime<Utc>, suffix: &str) -> String {
    format_identifier(REQUEST_ID_PREFIX, at, suffix)
}

/// Generate a set id: SET-<ts>-<rand>
pub fn generate_set_id(at: DateTime<Utc>, suffix: &str) -> String {
    format_identifier(SET_ID_PREFIX, at, suffix)
}

/// Six uppercase hex characters taken from a UUID
pub fn random_suffix(source: Uuid) -> String {
    source.simple().to_string()[..6].to_uppercase()
}
