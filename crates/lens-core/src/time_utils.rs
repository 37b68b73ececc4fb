const MILLIS_PER_DAY: u64 = 86_400_000;

/// Returns the current Unix timestamp in milliseconds.
pub fn current_unix_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

/// Returns the Unix millisecond timestamp `days` whole days before `now_ms`, floored at 0.
pub fn unix_ms_days_before(now_ms: u64, days: u64) -> u64 {
    now_ms.saturating_sub(days.saturating_mul(MILLIS_PER_DAY))
}
