//! Renewal decision policy

use chrono::{DateTime, Utc};
use tracing::debug;

/// Whether a certificate expiring at `not_after` needs renewal given a day
/// threshold.
///
/// Days remaining are computed as whole 24-hour periods until expiry. A
/// certificate with more days remaining than the threshold does not need
/// renewal. A negative threshold disables the check entirely: always renew.
pub fn needs_renewal(not_after: DateTime<Utc>, threshold_days: i64) -> bool {
    if threshold_days < 0 {
        return true;
    }
    let days_remaining = (not_after - Utc::now()).num_hours() / 24;
    debug!(days_remaining, threshold_days, "evaluated renewal policy");
    days_remaining <= threshold_days
}
