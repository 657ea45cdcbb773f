//! The single funnel every current-time query passes through.
//!
//! All readers consult the same clock stack, so while a freeze is active
//! they agree with each other and with [`now`] at all times. The moment the
//! stack empties, each reader falls through to its genuine system
//! counterpart directly, with no cached offset or residual skew.

use std::time::SystemTime;

use chrono::{DateTime, Local, Utc};

use crate::state;

/// Returns the current instant: the live frozen instant while a freeze is
/// active, otherwise the real wall clock.
pub fn now() -> DateTime<Utc> {
    match state::lock().current() {
        Some(frozen) => frozen,
        None => Utc::now(),
    }
}

/// Local-timezone reading of the same instant [`now`] reports.
pub fn now_local() -> DateTime<Local> {
    match state::lock().current() {
        Some(frozen) => frozen.with_timezone(&Local),
        None => Local::now(),
    }
}

/// [`SystemTime`] reading of the same instant [`now`] reports.
pub fn system_time() -> SystemTime {
    match state::lock().current() {
        Some(frozen) => SystemTime::from(frozen),
        None => SystemTime::now(),
    }
}

/// Whole seconds since the Unix epoch of the same instant [`now`] reports.
pub fn unix_timestamp() -> i64 {
    now().timestamp()
}

/// Returns `true` while any freeze is active.
pub fn is_frozen() -> bool {
    state::lock().current().is_some()
}

/// Returns the number of currently active, nested freezes.
pub fn freeze_depth() -> usize {
    state::lock().depth()
}
