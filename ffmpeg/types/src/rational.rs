/*!
    Rational numbers used as timebases.
*/

use std::fmt;

/// Microsecond timebase denominator, used for container-level timestamps.
pub const TIME_BASE_MICROS: i64 = 1_000_000;

/**
    A rational number `num / den`, typically a timebase.

    A zero denominator marks an unknown value.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /**
        The microsecond timebase `1/1_000_000`.
    */
    pub const fn micros() -> Self {
        Self::new(1, TIME_BASE_MICROS as i32)
    }

    pub const fn is_valid(self) -> bool {
        self.num != 0 && self.den != 0
    }

    pub const fn invert(self) -> Self {
        Self::new(self.den, self.num)
    }

    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }

    /**
        Convert `value` expressed in `self` units into seconds.
    */
    pub fn seconds(self, value: i64) -> f64 {
        value as f64 * self.to_f64()
    }

    /**
        Rescale `value` from timebase `self` to timebase `to`, rounding to nearest
        with halfway cases away from zero.
    */
    pub fn rescale(self, value: i64, to: Rational) -> i64 {
        let num = self.num as i128 * to.den as i128;
        let den = self.den as i128 * to.num as i128;
        if den == 0 {
            return 0;
        }
        let product = value as i128 * num;
        let (product, den) = if den < 0 { (-product, -den) } else { (product, den) };
        let half = den / 2;
        let rounded = if product >= 0 {
            (product + half) / den
        } else {
            (product - half) / den
        };
        rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::new(0, 1)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescale_between_timebases() {
        let ninety_k = Rational::new(1, 90_000);
        assert_eq!(ninety_k.rescale(90_000, Rational::new(1, 1000)), 1000);
        assert_eq!(Rational::new(1, 1000).rescale(1500, Rational::new(1, 48_000)), 72_000);
    }

    #[test]
    fn rescale_rounds_to_nearest() {
        let tb = Rational::new(1, 3);
        assert_eq!(tb.rescale(1, Rational::new(1, 1000)), 333);
        assert_eq!(tb.rescale(2, Rational::new(1, 1000)), 667);
        assert_eq!(tb.rescale(-2, Rational::new(1, 1000)), -667);
    }

    #[test]
    fn invalid_rational() {
        assert!(!Rational::default().is_valid());
        assert_eq!(Rational::new(1, 0).to_f64(), 0.0);
        assert_eq!(Rational::new(1, 0).rescale(10, Rational::micros()), 0);
    }

    #[test]
    fn seconds_from_timebase() {
        assert_eq!(Rational::new(1, 48_000).seconds(24_000), 0.5);
    }
}
