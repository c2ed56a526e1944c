#![forbid(unsafe_code)]

use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock time in Unix milliseconds; `0` if the clock is before the epoch.
pub fn unix_ms_now() -> i64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_millis() as i64)
		.unwrap_or(0)
}
