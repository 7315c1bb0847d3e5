use std::time::{SystemTime, UNIX_EPOCH};

use crate::CoreError;

/// Returns the current wall-clock time as milliseconds since Unix epoch.
pub fn now_ms() -> Result<i64, CoreError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| CoreError::InvalidData("system clock before epoch".into()))
        .and_then(|d| {
            i64::try_from(d.as_millis())
                .map_err(|_| CoreError::InvalidData("system clock out of range".into()))
        })
}
