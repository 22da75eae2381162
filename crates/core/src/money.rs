//! Exact decimal money and percentage value objects.
//!
//! All fiscal arithmetic is `rust_decimal`-backed; binary floating point never
//! appears. Amounts are rounded to two decimals (half-up) at the points the
//! aggregation rules define, never implicitly.

use core::str::FromStr;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Fiscal rounding: two decimals, midpoint away from zero (half-up).
fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// A monetary amount (single implicit currency).
///
/// Arithmetic is checked: overflow surfaces as `DomainError::InvariantViolation`
/// instead of wrapping or panicking.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Build from minor units (e.g. cents): `from_minor_units(12345)` is `123.45`.
    pub fn from_minor_units(units: i64) -> Self {
        Self(Decimal::new(units, 2))
    }

    pub fn zero() -> Self {
        Self::ZERO
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Round to two decimals with fiscal (half-up) rounding.
    pub fn round2(self) -> Self {
        Self(round2(self.0))
    }

    pub fn checked_add(self, rhs: Money) -> DomainResult<Money> {
        self.0
            .checked_add(rhs.0)
            .map(Money)
            .ok_or_else(|| DomainError::invariant("money addition overflow"))
    }

    pub fn checked_sub(self, rhs: Money) -> DomainResult<Money> {
        self.0
            .checked_sub(rhs.0)
            .map(Money)
            .ok_or_else(|| DomainError::invariant("money subtraction overflow"))
    }

    /// Multiply by a bare decimal factor (e.g. a quantity).
    pub fn checked_mul(self, factor: Decimal) -> DomainResult<Money> {
        self.0
            .checked_mul(factor)
            .map(Money)
            .ok_or_else(|| DomainError::invariant("money multiplication overflow"))
    }

    pub fn max(self, rhs: Money) -> Money {
        if self.0 >= rhs.0 { self } else { rhs }
    }
}

impl core::fmt::Display for Money {
    /// Canonical two-decimal rendering (`"121.00"`), also used when the amount
    /// enters a chain fingerprint.
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:.2}", round2(self.0))
    }
}

impl FromStr for Money {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let amount = Decimal::from_str(s)
            .map_err(|e| DomainError::validation(format!("malformed amount '{s}': {e}")))?;
        Ok(Self(amount))
    }
}

impl ValueObject for Money {}

/// A percentage constrained to `[0, 100]`.
///
/// Out-of-range values are rejected at construction (and at deserialization),
/// so a held `Percentage` is always valid.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Percentage(Decimal);

impl Percentage {
    pub const ZERO: Percentage = Percentage(Decimal::ZERO);

    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
            return Err(DomainError::validation(format!(
                "percentage {value} out of range [0, 100]"
            )));
        }
        Ok(Self(value))
    }

    pub fn zero() -> Self {
        Self::ZERO
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// The proportional share of `amount`, rounded to two decimals.
    pub fn of(&self, amount: Money) -> DomainResult<Money> {
        let raw = amount
            .amount()
            .checked_mul(self.0)
            .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
            .ok_or_else(|| DomainError::invariant("percentage application overflow"))?;
        Ok(Money(round2(raw)))
    }
}

impl TryFrom<Decimal> for Percentage {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Percentage::new(value)
    }
}

impl From<Percentage> for Decimal {
    fn from(value: Percentage) -> Self {
        value.0
    }
}

impl core::fmt::Display for Percentage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl ValueObject for Percentage {}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn rounds_half_up_at_two_decimals() {
        assert_eq!(Money::new(dec("30.015")).round2(), Money::new(dec("30.02")));
        assert_eq!(Money::new(dec("30.014")).round2(), Money::new(dec("30.01")));
        assert_eq!(Money::new(dec("-1.005")).round2(), Money::new(dec("-1.01")));
    }

    #[test]
    fn display_is_two_decimal_canonical() {
        assert_eq!(Money::from_minor_units(12100).to_string(), "121.00");
        assert_eq!(Money::new(dec("0.5")).to_string(), "0.50");
    }

    #[test]
    fn from_minor_units_scales_cents() {
        assert_eq!(Money::from_minor_units(10005), Money::new(dec("100.05")));
    }

    #[test]
    fn percentage_rejects_out_of_range() {
        assert!(Percentage::new(dec("-0.01")).is_err());
        assert!(Percentage::new(dec("100.01")).is_err());
        assert!(Percentage::new(dec("0")).is_ok());
        assert!(Percentage::new(dec("100")).is_ok());
    }

    #[test]
    fn percentage_of_rounds_result() {
        let vat = Percentage::new(dec("21")).unwrap();
        let tax = vat.of(Money::new(dec("30.02"))).unwrap();
        assert_eq!(tax, Money::new(dec("6.30")));
    }

    #[test]
    fn hundred_percent_of_amount_is_amount() {
        let all = Percentage::new(dec("100")).unwrap();
        let base = Money::new(dec("47.11"));
        assert_eq!(all.of(base).unwrap(), base);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: round2 output always has at most two decimal places.
            #[test]
            fn round2_has_at_most_two_decimals(units in -1_000_000_000i64..1_000_000_000i64) {
                let value = Money::new(Decimal::new(units, 4)).round2();
                prop_assert!(value.amount().scale() <= 2);
            }

            /// Property: checked addition of cent-scaled amounts is exact.
            #[test]
            fn addition_is_exact_on_minor_units(a in -1_000_000i64..1_000_000i64, b in -1_000_000i64..1_000_000i64) {
                let sum = Money::from_minor_units(a).checked_add(Money::from_minor_units(b)).unwrap();
                prop_assert_eq!(sum, Money::from_minor_units(a + b));
            }

            /// Property: a valid percentage of a non-negative amount stays within [0, amount].
            #[test]
            fn percentage_of_is_bounded(pct in 0i64..=10_000i64, units in 0i64..100_000_000i64) {
                let pct = Percentage::new(Decimal::new(pct, 2)).unwrap();
                let amount = Money::from_minor_units(units);
                let share = pct.of(amount).unwrap();
                prop_assert!(!share.is_negative());
                prop_assert!(share <= amount.round2());
            }
        }
    }
}
