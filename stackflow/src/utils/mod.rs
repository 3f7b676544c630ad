//! Timestamp helpers used in event payloads and build contexts.

use chrono::{DateTime, SecondsFormat, Utc};

/// UTC wall-clock time.
pub type Timestamp = DateTime<Utc>;

/// Formats the current time as RFC 3339 with microseconds and an explicit
/// `+00:00` offset.
///
/// ```
/// use stackflow::utils::iso_timestamp;
///
/// let ts = iso_timestamp();
/// assert!(ts.ends_with("+00:00"));
/// ```
#[must_use]
pub fn iso_timestamp() -> String {
    now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Returns the current time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}
