//! Shared utility functions.

use chrono::{SecondsFormat, Utc};

/// Current UTC time as ISO-8601 with second precision and no fractional
/// part, e.g. `2025-11-23T14:18:29Z`. Every persisted timestamp uses this
/// form; it sorts lexicographically in chronological order.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
