use std::time::Instant;

lazy_static::lazy_static! {
    static ref EPOCH: Instant = Instant::now();
}

/// Nanoseconds since the first clock read in this process.
pub fn now_nanoseconds() -> i64 {
    i64::try_from(EPOCH.elapsed().as_nanos()).unwrap_or(i64::MAX)
}
