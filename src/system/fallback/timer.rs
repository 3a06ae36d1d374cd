use std::time::{Duration, Instant};

use crate::{error::PacingError, system::time::Nanoseconds};

/// Below this the timer busy-spins instead of sleeping.
const SPIN_THRESHOLD: Duration = Duration::from_micros(100);

/// How early the sleep phase ends so the spin phase can land on the deadline.
const SPIN_TAIL: Duration = Duration::from_micros(80);

/// Sleep-then-spin timer built on the standard library.
pub struct HighResolutionTimer;

impl HighResolutionTimer {
    pub fn new() -> Result<Self, PacingError> {
        Ok(Self)
    }

    /// Blocks until the platform clock reaches `deadline`.
    pub fn wait_until(&self, deadline: Nanoseconds) {
        let remaining = (deadline - Nanoseconds::now()).to_std();
        let target = Instant::now() + remaining;

        if remaining >= SPIN_THRESHOLD {
            std::thread::sleep(remaining.saturating_sub(SPIN_TAIL));
        }

        while Instant::now() < target {
            std::hint::spin_loop();
        }
    }
}
