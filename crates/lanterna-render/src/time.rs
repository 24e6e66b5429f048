/// A rational media timestamp: `value / timescale` seconds.
///
/// A zero timescale marks the time as invalid (no valid PTS), matching the
/// convention of the sample buffers this engine shuttles around. Comparison
/// is exact across timescales.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MediaTime {
    value: i64,
    timescale: i32,
}

impl Default for MediaTime {
    fn default() -> Self {
        Self::ZERO
    }
}

impl MediaTime {
    pub const ZERO: Self = Self {
        value: 0,
        timescale: 1,
    };
    pub const INVALID: Self = Self {
        value: 0,
        timescale: 0,
    };

    #[must_use]
    pub fn new(value: i64, timescale: i32) -> Self {
        Self { value, timescale }
    }

    #[must_use]
    pub fn with_seconds(seconds: f64, timescale: i32) -> Self {
        Self {
            value: (seconds * f64::from(timescale)) as i64,
            timescale,
        }
    }

    #[must_use]
    pub fn value(&self) -> i64 {
        self.value
    }

    #[must_use]
    pub fn timescale(&self) -> i32 {
        self.timescale
    }

    #[must_use]
    pub fn seconds(&self) -> f64 {
        if self.timescale == 0 {
            return 0.0;
        }
        self.value as f64 / f64::from(self.timescale)
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.timescale > 0
    }

    /// The same instant expressed in another timescale (value truncated).
    #[must_use]
    pub fn rescaled(&self, timescale: i32) -> Self {
        if self.timescale == timescale || !self.is_valid() {
            return Self {
                value: self.value,
                timescale,
            };
        }
        let value = (i128::from(self.value) * i128::from(timescale)
            / i128::from(self.timescale)) as i64;
        Self { value, timescale }
    }
}

impl Eq for MediaTime {}

impl PartialOrd for MediaTime {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MediaTime {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let lhs = i128::from(self.value) * i128::from(other.timescale);
        let rhs = i128::from(other.value) * i128::from(self.timescale);
        lhs.cmp(&rhs)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(MediaTime::new(600, 600), 1.0)]
    #[case(MediaTime::new(90_000, 90_000), 1.0)]
    #[case(MediaTime::new(1500, 600), 2.5)]
    #[case(MediaTime::INVALID, 0.0)]
    fn seconds_conversion(#[case] t: MediaTime, #[case] expected: f64) {
        assert!((t.seconds() - expected).abs() < 1e-9);
    }

    #[test]
    fn ordering_crosses_timescales() {
        let a = MediaTime::new(600, 600); // 1.0s
        let b = MediaTime::new(90_000, 90_000); // 1.0s
        let c = MediaTime::new(1200, 600); // 2.0s
        assert_eq!(a.cmp(&b), std::cmp::Ordering::Equal);
        assert!(a < c);
        assert!(c > b);
    }

    #[rstest]
    #[case(MediaTime::new(600, 600), 90_000, 90_000)]
    #[case(MediaTime::new(1500, 600), 90_000, 225_000)]
    #[case(MediaTime::new(3, 600), 600, 3)]
    fn rescale_preserves_the_instant(
        #[case] t: MediaTime,
        #[case] timescale: i32,
        #[case] expected_value: i64,
    ) {
        let r = t.rescaled(timescale);
        assert_eq!(r.timescale(), timescale);
        assert_eq!(r.value(), expected_value);
    }

    #[test]
    fn invalid_is_not_valid() {
        assert!(!MediaTime::INVALID.is_valid());
        assert!(MediaTime::ZERO.is_valid());
    }
}
