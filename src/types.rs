// 1.0: all the primitives live here. nothing in the core works without these types.
// IDs, prices, sizes, leverage, bps, timestamps. each is a newtype so the compiler catches type mixups.
// 1.7 has the checked arithmetic helpers every mutating path goes through.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarketId(pub u32);

// traders and privileged callers share the same id space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionId(pub u64);

// Long = profit when price goes up. Short = profit when price goes down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Long => dec!(1),
            Side::Short => dec!(-1),
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

// smallest positive price unit. 18 decimal fixed point.
pub const PRICE_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 18);

// 1.2: price in quote currency per unit of base. must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Price(Decimal);

impl Price {
    #[must_use]
    pub fn new(value: Decimal) -> Option<Self> {
        if value > Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn new_unchecked(value: Decimal) -> Self {
        debug_assert!(value > Decimal::ZERO);
        Self(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// 1.3: quote currency amount. collateral, margin, pnl, funding all use this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quote(Decimal);

impl Quote {
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    pub fn negate(&self) -> Self {
        Self(-self.0)
    }

    pub fn checked_add(&self, other: Quote, context: &'static str) -> Result<Self, MathError> {
        checked_add(self.0, other.0, context).map(Self)
    }

    pub fn checked_sub(&self, other: Quote, context: &'static str) -> Result<Self, MathError> {
        checked_sub(self.0, other.0, context).map(Self)
    }
}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialOrd for Quote {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quote {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl Sum for Quote {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, q| Self(acc.0 + q.0))
    }
}

impl<'a> Sum<&'a Quote> for Quote {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, q| Self(acc.0 + q.0))
    }
}

// 1.4: leverage multiplier. integer, must be >= 1x.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Leverage(u32);

impl Leverage {
    pub const ONE: Leverage = Leverage(1);

    #[must_use]
    pub fn new(value: u32) -> Option<Self> {
        if value >= 1 {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn as_decimal(&self) -> Decimal {
        Decimal::from(self.0)
    }
}

impl fmt::Display for Leverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.0)
    }
}

// 1.5: basis points. 100 bps = 1%. signed so funding rates fit too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Bps(i32);

pub const BPS_DENOMINATOR: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

impl Bps {
    pub const ZERO: Bps = Bps(0);

    pub fn new(bps: i32) -> Self {
        Self(bps)
    }

    pub fn value(&self) -> i32 {
        self.0
    }

    pub fn as_decimal(&self) -> Decimal {
        Decimal::from(self.0)
    }

    pub fn as_fraction(&self) -> Decimal {
        Decimal::new(i64::from(self.0), 4)
    }
}

impl fmt::Display for Bps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bps", self.0)
    }
}

// 1.6: millisecond timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn from_secs(secs: i64) -> Self {
        Self(secs.saturating_mul(1000))
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    // whole seconds from self to later. zero if later is earlier.
    pub fn secs_until(&self, later: Timestamp) -> u64 {
        let diff_ms = later.0.saturating_sub(self.0).max(0);
        (diff_ms / 1000) as u64
    }

    pub fn plus_secs(&self, secs: u64) -> Self {
        let ms = i64::try_from(secs).unwrap_or(i64::MAX).saturating_mul(1000);
        Self(self.0.saturating_add(ms))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

// 1.7: checked decimal math. overflow aborts the whole call, never saturates.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    #[error("Arithmetic overflow in {0}")]
    Overflow(&'static str),

    #[error("Division by zero in {0}")]
    DivisionByZero(&'static str),
}

pub fn checked_add(a: Decimal, b: Decimal, context: &'static str) -> Result<Decimal, MathError> {
    a.checked_add(b).ok_or(MathError::Overflow(context))
}

pub fn checked_sub(a: Decimal, b: Decimal, context: &'static str) -> Result<Decimal, MathError> {
    a.checked_sub(b).ok_or(MathError::Overflow(context))
}

pub fn checked_mul(a: Decimal, b: Decimal, context: &'static str) -> Result<Decimal, MathError> {
    a.checked_mul(b).ok_or(MathError::Overflow(context))
}

pub fn checked_div(a: Decimal, b: Decimal, context: &'static str) -> Result<Decimal, MathError> {
    if b.is_zero() {
        return Err(MathError::DivisionByZero(context));
    }
    a.checked_div(b).ok_or(MathError::Overflow(context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn side_opposite_and_sign() {
        assert_eq!(Side::Long.opposite(), Side::Short);
        assert_eq!(Side::Short.opposite(), Side::Long);
        assert_eq!(Side::Short.sign(), dec!(-1));
    }

    #[test]
    fn leverage_rejects_zero() {
        assert!(Leverage::new(0).is_none());
        assert_eq!(Leverage::new(20).unwrap().as_decimal(), dec!(20));
    }

    #[test]
    fn bps_conversion() {
        let hundred_bps = Bps::new(100);
        assert_eq!(hundred_bps.as_fraction(), dec!(0.01)); // 1%

        let negative = Bps::new(-50);
        assert_eq!(negative.as_fraction(), dec!(-0.005));
    }

    #[test]
    fn timestamp_seconds() {
        let t0 = Timestamp::from_secs(10);
        let t1 = Timestamp::from_millis(13_999);
        assert_eq!(t0.secs_until(t1), 3);
        assert_eq!(t1.secs_until(t0), 0);
        assert_eq!(t0.plus_secs(5), Timestamp::from_secs(15));
    }

    #[test]
    fn price_epsilon_is_smallest_unit() {
        assert_eq!(PRICE_EPSILON, dec!(0.000000000000000001));
        assert!(Price::new(PRICE_EPSILON).is_some());
    }

    #[test]
    fn checked_math_reports_overflow() {
        assert_eq!(
            checked_mul(Decimal::MAX, dec!(2), "test"),
            Err(MathError::Overflow("test"))
        );
        assert_eq!(
            checked_div(dec!(1), Decimal::ZERO, "test"),
            Err(MathError::DivisionByZero("test"))
        );
        assert_eq!(checked_add(dec!(1), dec!(2), "test"), Ok(dec!(3)));
    }
}
