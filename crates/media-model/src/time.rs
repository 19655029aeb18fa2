//! Rational media time.
//!
//! A [`MediaTime`] is `value / timescale` seconds. A non-positive timescale
//! marks the time as invalid; invalid times compare unequal to everything
//! and poison arithmetic.

use std::cmp::Ordering;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// Timescale used for probed asset durations (microseconds).
pub const DEFAULT_TIMESCALE: i32 = 1_000_000;

/// A rational timestamp or duration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MediaTime {
    pub value: i64,
    pub timescale: i32,
}

impl MediaTime {
    pub const ZERO: MediaTime = MediaTime {
        value: 0,
        timescale: 1,
    };

    pub const INVALID: MediaTime = MediaTime {
        value: 0,
        timescale: 0,
    };

    pub fn new(value: i64, timescale: i32) -> Self {
        Self { value, timescale }
    }

    /// Nearest representable time for `secs` at the given timescale.
    pub fn from_secs(secs: f64, timescale: i32) -> Self {
        if !secs.is_finite() || timescale <= 0 {
            return Self::INVALID;
        }
        Self {
            value: (secs * timescale as f64).round() as i64,
            timescale,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.timescale > 0
    }

    pub fn as_secs(&self) -> f64 {
        if !self.is_valid() {
            return f64::NAN;
        }
        self.value as f64 / self.timescale as f64
    }

    /// Re-express at another timescale, rounding to nearest.
    pub fn convert_scale(&self, timescale: i32) -> Self {
        if !self.is_valid() || timescale <= 0 {
            return Self::INVALID;
        }
        let scaled = self.value as i128 * timescale as i128;
        let denom = self.timescale as i128;
        let rounded = (scaled + scaled.signum() * denom / 2) / denom;
        match i64::try_from(rounded) {
            Ok(value) => Self { value, timescale },
            Err(_) => Self::INVALID,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.is_valid() && self.value == 0
    }

    pub fn is_positive(&self) -> bool {
        self.is_valid() && self.value > 0
    }

    fn common_scale(a: &MediaTime, b: &MediaTime) -> i32 {
        let (x, y) = (a.timescale as i64, b.timescale as i64);
        let lcm = x / gcd(x, y) * y;
        i32::try_from(lcm).unwrap_or_else(|_| a.timescale.max(b.timescale))
    }
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.abs().max(1)
}

impl Default for MediaTime {
    fn default() -> Self {
        Self::ZERO
    }
}

impl PartialEq for MediaTime {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for MediaTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if !self.is_valid() || !other.is_valid() {
            return None;
        }
        let lhs = self.value as i128 * other.timescale as i128;
        let rhs = other.value as i128 * self.timescale as i128;
        Some(lhs.cmp(&rhs))
    }
}

impl Add for MediaTime {
    type Output = MediaTime;

    fn add(self, rhs: MediaTime) -> MediaTime {
        if !self.is_valid() || !rhs.is_valid() {
            return MediaTime::INVALID;
        }
        let scale = MediaTime::common_scale(&self, &rhs);
        MediaTime::new(
            self.convert_scale(scale).value + rhs.convert_scale(scale).value,
            scale,
        )
    }
}

impl Sub for MediaTime {
    type Output = MediaTime;

    fn sub(self, rhs: MediaTime) -> MediaTime {
        if !self.is_valid() || !rhs.is_valid() {
            return MediaTime::INVALID;
        }
        let scale = MediaTime::common_scale(&self, &rhs);
        MediaTime::new(
            self.convert_scale(scale).value - rhs.convert_scale(scale).value,
            scale,
        )
    }
}

/// A half-open span `[start, start + duration)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: MediaTime,
    pub duration: MediaTime,
}

impl TimeRange {
    pub fn new(start: MediaTime, duration: MediaTime) -> Self {
        Self { start, duration }
    }

    /// Range starting at zero.
    pub fn from_zero(duration: MediaTime) -> Self {
        Self {
            start: MediaTime::ZERO,
            duration,
        }
    }

    pub fn end(&self) -> MediaTime {
        self.start + self.duration
    }

    /// Both endpoints valid and the duration non-negative.
    pub fn is_valid(&self) -> bool {
        self.start.is_valid() && self.duration.is_valid() && self.duration.value >= 0
    }

    pub fn is_empty(&self) -> bool {
        !self.duration.is_positive()
    }

    pub fn contains(&self, t: MediaTime) -> bool {
        t >= self.start && t < self.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_equality_across_timescales() {
        assert_eq!(MediaTime::new(1, 30), MediaTime::new(2, 60));
        assert!(MediaTime::new(1, 30) < MediaTime::new(1, 25));
    }

    #[test]
    fn test_invalid_time_never_equal() {
        assert_ne!(MediaTime::INVALID, MediaTime::INVALID);
        assert!(!MediaTime::from_secs(f64::NAN, 600).is_valid());
    }

    #[test]
    fn test_add_uses_common_scale() {
        let sum = MediaTime::new(1, 30) + MediaTime::new(1, 20);
        assert_eq!(sum.timescale, 60);
        assert_eq!(sum.value, 5);
        assert!((sum.as_secs() - 1.0 / 12.0).abs() < 1e-12);
    }

    #[test]
    fn test_convert_scale_overflow_is_invalid() {
        let long = MediaTime::new(i64::MAX / 2, 1);
        assert!(!long.convert_scale(DEFAULT_TIMESCALE).is_valid());
        assert_eq!(
            MediaTime::new(3, 2).convert_scale(600),
            MediaTime::new(900, 600)
        );
        assert_eq!(MediaTime::new(3, 2).convert_scale(600).value, 900);
    }

    #[test]
    fn test_from_secs_rounds() {
        let t = MediaTime::from_secs(10.0, DEFAULT_TIMESCALE);
        assert_eq!(t.value, 10_000_000);
        assert_eq!(t.convert_scale(600).value, 6000);
    }

    #[test]
    fn test_range_contains_is_half_open() {
        let range = TimeRange::from_zero(MediaTime::new(10, 1));
        assert!(range.contains(MediaTime::ZERO));
        assert!(range.contains(MediaTime::new(9999, 1000)));
        assert!(!range.contains(MediaTime::new(10, 1)));
        assert!(!range.is_empty());
        assert!(TimeRange::from_zero(MediaTime::ZERO).is_empty());
    }

    proptest! {
        #[test]
        fn prop_sub_undoes_add(
            a in -1_000_000i64..1_000_000,
            b in -1_000_000i64..1_000_000,
            sa in prop_timescale(),
            sb in prop_timescale(),
        ) {
            let x = MediaTime::new(a, sa);
            let y = MediaTime::new(b, sb);
            prop_assert_eq!((x + y) - y, x);
        }

        #[test]
        fn prop_ordering_matches_seconds(
            a in -100_000i64..100_000,
            b in -100_000i64..100_000,
            sa in prop_timescale(),
            sb in prop_timescale(),
        ) {
            let x = MediaTime::new(a, sa);
            let y = MediaTime::new(b, sb);
            let by_secs = (a as f64 / sa as f64) < (b as f64 / sb as f64);
            prop_assert_eq!(x < y, by_secs);
        }
    }

    fn prop_timescale() -> impl Strategy<Value = i32> {
        prop::sample::select(vec![1, 24, 25, 30, 60, 600, 1000, 90_000, DEFAULT_TIMESCALE])
    }
}
