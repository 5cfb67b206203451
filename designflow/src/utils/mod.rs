//! Utility functions for run identifiers and timestamp handling.

use chrono::Utc;
use uuid::Uuid;

/// Returns the current UTC time as an RFC 3339 string with microsecond precision.
///
/// # Examples
///
/// ```
/// use designflow::utils::iso_timestamp;
///
/// let ts = iso_timestamp();
/// assert!(ts.contains('T'));
/// assert!(ts.ends_with("+00:00"));
/// ```
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Generates a fresh random run identifier.
#[must_use]
pub fn generate_run_id() -> Uuid {
    Uuid::new_v4()
}
