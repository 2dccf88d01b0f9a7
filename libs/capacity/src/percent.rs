//! Fixed-point percentages with two decimal places.

use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// A percentage stored as an exact count of hundredths.
///
/// `Percent::from_hundredths(1050)` is `10.50%`. All arithmetic is integer
/// arithmetic; rounding happens once, when a value enters from a float or a
/// property string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Percent(i64);

impl Percent {
    pub const ZERO: Percent = Percent(0);
    pub const HUNDRED: Percent = Percent(10_000);

    #[must_use]
    pub const fn from_hundredths(hundredths: i64) -> Self {
        Self(hundredths)
    }

    #[must_use]
    pub const fn hundredths(self) -> i64 {
        self.0
    }

    /// Rounds half away from zero to two decimal places.
    ///
    /// Returns `None` for NaN and infinities.
    pub fn round2(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        Some(Self((value * 100.0).round() as i64))
    }

    /// Share of the pool that `quota_gb` represents.
    ///
    /// The cluster reports memory in MB while quotas are requested in GB,
    /// hence the `/ 1024` on the denominator.
    pub fn from_quota(quota_gb: f64, total_memory_mb: f64) -> Option<Self> {
        Self::round2(100.0 * quota_gb / (total_memory_mb / 1024.0))
    }

    /// Parses a property value such as `"0"`, `"12.5"` or `"33.33"`.
    pub fn parse(value: &str) -> Option<Self> {
        value.trim().parse::<f64>().ok().and_then(Self::round2)
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl fmt::Display for Percent {
    /// Always two decimals: `10.00`, `0.50`, `-3.25`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Add for Percent {
    type Output = Percent;

    fn add(self, rhs: Percent) -> Percent {
        Percent(self.0 + rhs.0)
    }
}

impl AddAssign for Percent {
    fn add_assign(&mut self, rhs: Percent) {
        self.0 += rhs.0;
    }
}

impl Sub for Percent {
    type Output = Percent;

    fn sub(self, rhs: Percent) -> Percent {
        Percent(self.0 - rhs.0)
    }
}

impl SubAssign for Percent {
    fn sub_assign(&mut self, rhs: Percent) {
        self.0 -= rhs.0;
    }
}

impl Neg for Percent {
    type Output = Percent;

    fn neg(self) -> Percent {
        Percent(-self.0)
    }
}

impl std::iter::Sum for Percent {
    fn sum<I: Iterator<Item = Percent>>(iter: I) -> Percent {
        iter.fold(Percent::ZERO, Add::add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("0", 0)]
    #[case("0.00", 0)]
    #[case("100", 10_000)]
    #[case("12.5", 1_250)]
    #[case(" 33.33 ", 3_333)]
    #[case("0.29", 29)]
    #[case("-1.5", -150)]
    fn test_parse(#[case] input: &str, #[case] hundredths: i64) {
        assert_eq!(Percent::parse(input), Some(Percent::from_hundredths(hundredths)));
    }

    #[rstest]
    #[case("")]
    #[case("abc")]
    #[case("NaN")]
    #[case("inf")]
    fn test_parse_rejects(#[case] input: &str) {
        assert_eq!(Percent::parse(input), None);
    }

    #[rstest]
    #[case(0, "0.00")]
    #[case(5, "0.05")]
    #[case(1_000, "10.00")]
    #[case(10_000, "100.00")]
    #[case(-325, "-3.25")]
    #[case(-5, "-0.05")]
    fn test_display(#[case] hundredths: i64, #[case] expected: &str) {
        assert_eq!(Percent::from_hundredths(hundredths).to_string(), expected);
    }

    #[test]
    fn test_round_half_away_from_zero() {
        assert_eq!(Percent::round2(0.125), Some(Percent::from_hundredths(13)));
        assert_eq!(Percent::round2(-0.125), Some(Percent::from_hundredths(-13)));
        assert_eq!(Percent::round2(0.124), Some(Percent::from_hundredths(12)));
    }

    #[test]
    fn test_from_quota() {
        // 1024 GB cluster, 102.4 GB requested.
        let p = Percent::from_quota(102.4, 1024.0 * 1024.0).unwrap();
        assert_eq!(p.to_string(), "10.00");

        // 3 GB of a 10 GB cluster is 30%.
        let p = Percent::from_quota(3.0, 10.0 * 1024.0).unwrap();
        assert_eq!(p, Percent::from_hundredths(3_000));

        // 1 GB of a 3 GB cluster rounds to 33.33.
        let p = Percent::from_quota(1.0, 3.0 * 1024.0).unwrap();
        assert_eq!(p.to_string(), "33.33");
    }

    #[test]
    fn test_from_quota_zero_memory() {
        assert_eq!(Percent::from_quota(1.0, 0.0), None);
    }

    #[test]
    fn test_sum() {
        let total: Percent = [3_333, 3_333, 3_334]
            .into_iter()
            .map(Percent::from_hundredths)
            .sum();
        assert_eq!(total, Percent::HUNDRED);
    }
}
