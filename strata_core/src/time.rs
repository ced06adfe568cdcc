// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Monotonic timestamps for profiling.
//!
//! The frame profiler and the message transfer profiler stamp milestones
//! with [`now`]. A zero [`HostTime`] marks a milestone that was never
//! reached. Reports carry their [`Timebase`] next to the raw ticks.

use core::fmt;

use rustix::time::{ClockId, clock_gettime};

/// A monotonic clock reading, in ticks of the clock's [`Timebase`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HostTime(pub u64);

impl HostTime {
    /// Placeholder for an unreached milestone.
    pub const ZERO: Self = Self(0);

    /// Raw ticks.
    #[must_use]
    pub const fn ticks(self) -> u64 {
        self.0
    }

    /// Returns `true` for [`HostTime::ZERO`].
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Time elapsed since `earlier`; zero when `earlier` is later.
    #[must_use]
    pub const fn saturating_duration_since(self, earlier: Self) -> Duration {
        Duration(self.0.saturating_sub(earlier.0))
    }

    /// Microseconds elapsed since `earlier`, for trace output.
    #[must_use]
    pub fn micros_since(self, earlier: Self, timebase: Timebase) -> f64 {
        self.saturating_duration_since(earlier).to_nanos(timebase) as f64 / 1_000.0
    }
}

impl fmt::Debug for HostTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostTime({})", self.0)
    }
}

/// Ticks-to-nanoseconds ratio: `nanos = ticks * numer / denom`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Timebase {
    /// Numerator.
    pub numer: u32,
    /// Denominator, never zero.
    pub denom: u32,
}

impl Timebase {
    /// Ticks are nanoseconds.
    pub const NANOS: Self = Self { numer: 1, denom: 1 };
}

/// A span of ticks between two [`HostTime`]s.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(pub u64);

impl Duration {
    /// Converts to nanoseconds.
    #[must_use]
    pub fn to_nanos(self, timebase: Timebase) -> u64 {
        let nanos =
            u128::from(self.0) * u128::from(timebase.numer) / u128::from(timebase.denom.max(1));
        u64::try_from(nanos).unwrap_or(u64::MAX)
    }
}

/// Timebase of [`now`].
#[must_use]
pub const fn timebase() -> Timebase {
    Timebase::NANOS
}

/// Reads `CLOCK_MONOTONIC`.
#[must_use]
pub fn now() -> HostTime {
    let ts = clock_gettime(ClockId::Monotonic);
    let secs = u64::try_from(ts.tv_sec).unwrap_or(0);
    let nanos = u64::try_from(ts.tv_nsec).unwrap_or(0);
    HostTime(secs.saturating_mul(1_000_000_000).saturating_add(nanos))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_monotonic_and_nonzero() {
        let a = now();
        let b = now();
        assert!(b >= a);
        assert!(!a.is_zero());
    }

    #[test]
    fn elapsed_time_saturates_and_scales() {
        assert_eq!(HostTime(10).saturating_duration_since(HostTime(30)), Duration(0));
        let slow = Timebase { numer: 125, denom: 3 };
        assert_eq!(Duration(24_000_000).to_nanos(slow), 1_000_000_000);
        assert_eq!(HostTime(4_500).micros_since(HostTime(2_000), Timebase::NANOS), 2.5);
    }
}
