use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

use super::platform_impl;

pub(crate) const NANOSECONDS_PER_SECOND: i64 = 1_000_000_000;
pub(crate) const NANOSECONDS_PER_SECOND_F64: f64 = 1_000_000_000.0;

/// A signed nanosecond count on the engine's high-resolution timeline.
///
/// Used both for instants (relative to the platform clock's epoch) and for
/// durations; the marker table stores these verbatim.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Nanoseconds(pub i64);

impl Nanoseconds {
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(i64::MAX);

    #[must_use]
    pub const fn from_millis(ms: i64) -> Self {
        Self(ms * 1_000_000)
    }

    #[must_use]
    pub const fn from_micros(us: i64) -> Self {
        Self(us * 1_000)
    }

    /// Reads the platform's high-resolution clock.
    #[must_use]
    pub fn now() -> Self {
        Self(platform_impl::time::now_nanoseconds())
    }

    #[cfg(target_os = "windows")]
    #[must_use]
    pub fn from_qpc_time(ticks: i64) -> Self {
        Self(platform_impl::time::qpc_to_nanoseconds(ticks))
    }

    #[must_use]
    pub fn as_secs_f64(self) -> f64 {
        let s = self.0 / NANOSECONDS_PER_SECOND;
        let n = self.0 % NANOSECONDS_PER_SECOND;

        #[allow(clippy::cast_precision_loss)]
        let secs = s as f64 + n as f64 / NANOSECONDS_PER_SECOND_F64;
        secs
    }

    #[must_use]
    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    #[must_use]
    pub fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    /// Converts to a `std` duration, clamping negative values to zero.
    #[must_use]
    pub fn to_std(self) -> std::time::Duration {
        std::time::Duration::from_nanos(u64::try_from(self.0).unwrap_or(0))
    }

    #[must_use]
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl Add for Nanoseconds {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Nanoseconds {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Nanoseconds {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for Nanoseconds {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Mul<i64> for Nanoseconds {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self(self.0.saturating_mul(rhs))
    }
}

impl From<Hertz> for Nanoseconds {
    fn from(hertz: Hertz) -> Self {
        hertz.to_period()
    }
}

impl From<std::time::Duration> for Nanoseconds {
    fn from(duration: std::time::Duration) -> Self {
        Self(i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct Hertz(pub f64);

impl Hertz {
    pub const ZERO: Self = Self(0.0);

    /// The rate whose period is `period`. Non-positive periods have no rate
    /// and map to zero.
    #[must_use]
    pub fn from_period(period: Nanoseconds) -> Self {
        if period.0 <= 0 {
            return Self::ZERO;
        }

        Self(1.0 / period.as_secs_f64())
    }

    /// The period of this rate, rounded to the nearest nanosecond. A rate of
    /// zero (or less) has no period and maps to zero.
    #[must_use]
    pub fn to_period(self) -> Nanoseconds {
        if self.0 <= 0.0 || !self.0.is_finite() {
            return Nanoseconds::ZERO;
        }

        let period_s = 1.0 / self.0;
        let period_n = period_s * NANOSECONDS_PER_SECOND_F64;

        #[allow(clippy::cast_possible_truncation)]
        Nanoseconds(period_n.round() as i64)
    }

    #[must_use]
    pub fn is_valid(self) -> bool {
        self.0.is_finite() && self.0 > 0.0
    }
}
