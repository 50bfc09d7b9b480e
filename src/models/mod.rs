//! Data models for the club portal.
//!
//! Field names serialize in camelCase so documents match what the browser client reads.

mod activity;
mod announcement;
mod certificate;
mod coordinator;
mod event;
mod registration;
mod snapshot;
mod user;

pub use activity::*;
pub use announcement::*;
pub use certificate::*;
pub use coordinator::*;
pub use event::*;
pub use registration::*;
pub use snapshot::*;
pub use user::*;

use chrono::{SecondsFormat, Utc};

/// Current time as an RFC 3339 UTC string with millisecond precision.
///
/// Fixed precision keeps timestamps lexicographically sortable.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Today's date as `YYYY-MM-DD`.
pub fn today() -> String {
    Utc::now().date_naive().format("%Y-%m-%d").to_string()
}

/// Trim an optional string, mapping blank values to `None`.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
