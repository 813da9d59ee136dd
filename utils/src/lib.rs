use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub fn get_epoch_time_in_ms() -> u64 {
    let start = SystemTime::now();
    let since_the_epoch = start
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    since_the_epoch.as_millis() as u64
}

/// Adds `secs` seconds to an epoch timestamp expressed in milliseconds.
pub fn add_secs_to_epoch_ms(epoch_ms: u64, secs: u64) -> u64 {
    epoch_ms.saturating_add(secs.saturating_mul(1000))
}
