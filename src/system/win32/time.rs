use windows::Win32::System::Performance::{QueryPerformanceCounter, QueryPerformanceFrequency};

use crate::system::time::NANOSECONDS_PER_SECOND;

lazy_static::lazy_static! {
    static ref QPF_FREQUENCY: i64 = {
        let mut freq = 0;
        // Cannot fail on any supported version of Windows.
        if unsafe { QueryPerformanceFrequency(&mut freq) }.is_err() {
            tracing::error!("QueryPerformanceFrequency failed; timestamps will be unreliable");
        }
        freq.max(1)
    };
}

pub fn now_nanoseconds() -> i64 {
    let mut ticks = 0;
    if unsafe { QueryPerformanceCounter(&mut ticks) }.is_err() {
        return 0;
    }
    qpc_to_nanoseconds(ticks)
}

pub fn qpc_to_nanoseconds(ticks: i64) -> i64 {
    mul_div_i64(ticks, NANOSECONDS_PER_SECOND, *QPF_FREQUENCY)
}

/// Scale without overflow as long as the result and n * d do not overflow.
fn mul_div_i64(v: i64, n: i64, d: i64) -> i64 {
    let q = v / d;
    let r = v % d;

    q * n + r * n / d
}
