//! Billable invoice lines and their derived amounts.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use fiscalio_core::{DomainError, DomainResult, Money, Percentage, ValueObject};

/// What a line bills for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineItemKind {
    Labor,
    Part,
    Misc,
}

/// One billable line: quantity x unit price, optional discount, tax rate.
///
/// Construction validates; a held `LineItem` is always well-formed. The
/// monetary derivations are not stored, they are recomputed through
/// [`LineItem::amounts`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    kind: LineItemKind,
    description: String,
    quantity: Decimal,
    unit_price: Money,
    discount_percent: Percentage,
    discount_amount: Money,
    tax_percent: Percentage,
}

/// Derived amounts of a single line, each rounded to two decimals.
///
/// Lines round independently *before* invoice-level summation, matching the
/// line-by-line presentation of the printed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmounts {
    pub subtotal: Money,
    pub discount: Money,
    pub taxable_base: Money,
    pub tax: Money,
    pub total: Money,
}

impl LineItem {
    /// Create a line with no discount.
    pub fn new(
        kind: LineItemKind,
        description: impl Into<String>,
        quantity: Decimal,
        unit_price: Money,
        tax_percent: Percentage,
    ) -> DomainResult<Self> {
        let line = Self {
            kind,
            description: description.into(),
            quantity,
            unit_price,
            discount_percent: Percentage::zero(),
            discount_amount: Money::zero(),
            tax_percent,
        };
        line.validate()?;
        Ok(line)
    }

    /// Apply a proportional discount, re-validating the line.
    pub fn with_discount_percent(mut self, discount_percent: Percentage) -> DomainResult<Self> {
        self.discount_percent = discount_percent;
        self.validate()?;
        Ok(self)
    }

    /// Apply a fixed discount, re-validating the line.
    ///
    /// The effective discount is the larger of the fixed amount and the
    /// proportional one; it may never exceed the line subtotal.
    pub fn with_discount_amount(mut self, discount_amount: Money) -> DomainResult<Self> {
        self.discount_amount = discount_amount;
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> DomainResult<()> {
        if self.description.trim().is_empty() {
            return Err(DomainError::validation("line description must not be empty"));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "line quantity must be positive, got {}",
                self.quantity
            )));
        }
        if self.unit_price.is_negative() {
            return Err(DomainError::validation(
                "line unit price must not be negative",
            ));
        }
        if self.discount_amount.is_negative() {
            return Err(DomainError::validation(
                "fixed discount must not be negative",
            ));
        }
        let subtotal = self.subtotal()?;
        if self.discount_amount.round2() > subtotal {
            return Err(DomainError::validation(format!(
                "fixed discount {} exceeds line subtotal {subtotal}",
                self.discount_amount
            )));
        }
        Ok(())
    }

    pub fn kind(&self) -> LineItemKind {
        self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn discount_percent(&self) -> Percentage {
        self.discount_percent
    }

    pub fn discount_amount(&self) -> Money {
        self.discount_amount
    }

    pub fn tax_percent(&self) -> Percentage {
        self.tax_percent
    }

    fn subtotal(&self) -> DomainResult<Money> {
        Ok(self.unit_price.checked_mul(self.quantity)?.round2())
    }

    /// Derive all amounts for this line.
    pub fn amounts(&self) -> DomainResult<LineAmounts> {
        let subtotal = self.subtotal()?;
        let proportional = self.discount_percent.of(subtotal)?;
        let discount = self.discount_amount.round2().max(proportional);
        let taxable_base = subtotal.checked_sub(discount)?;
        let tax = self.tax_percent.of(taxable_base)?;
        let total = taxable_base.checked_add(tax)?;

        Ok(LineAmounts {
            subtotal,
            discount,
            taxable_base,
            tax,
            total,
        })
    }
}

impl ValueObject for LineItem {}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    fn pct(s: &str) -> Percentage {
        Percentage::new(dec(s)).unwrap()
    }

    fn labor_hour(price: &str, tax: &str) -> LineItem {
        LineItem::new(
            LineItemKind::Labor,
            "Brake pad replacement",
            dec("1"),
            money(price),
            pct(tax),
        )
        .unwrap()
    }

    #[test]
    fn plain_line_derives_all_amounts() {
        let line = LineItem::new(
            LineItemKind::Part,
            "Oil filter",
            dec("2"),
            money("12.50"),
            pct("21"),
        )
        .unwrap();

        let amounts = line.amounts().unwrap();
        assert_eq!(amounts.subtotal, money("25.00"));
        assert_eq!(amounts.discount, money("0.00"));
        assert_eq!(amounts.taxable_base, money("25.00"));
        assert_eq!(amounts.tax, money("5.25"));
        assert_eq!(amounts.total, money("30.25"));
    }

    #[test]
    fn zero_or_negative_quantity_is_rejected() {
        for qty in ["0", "-1"] {
            let result = LineItem::new(
                LineItemKind::Labor,
                "Diagnostics",
                dec(qty),
                money("45.00"),
                pct("21"),
            );
            assert!(matches!(result, Err(DomainError::Validation(_))));
        }
    }

    #[test]
    fn empty_description_is_rejected() {
        let result = LineItem::new(
            LineItemKind::Misc,
            "   ",
            dec("1"),
            money("10.00"),
            pct("0"),
        );
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn effective_discount_is_the_larger_of_fixed_and_proportional() {
        // 10% of 100.00 = 10.00 < fixed 15.00.
        let line = labor_hour("100.00", "21")
            .with_discount_percent(pct("10"))
            .unwrap()
            .with_discount_amount(money("15.00"))
            .unwrap();
        assert_eq!(line.amounts().unwrap().discount, money("15.00"));

        // 50% of 100.00 = 50.00 > fixed 15.00.
        let line = labor_hour("100.00", "21")
            .with_discount_percent(pct("50"))
            .unwrap()
            .with_discount_amount(money("15.00"))
            .unwrap();
        assert_eq!(line.amounts().unwrap().discount, money("50.00"));
    }

    #[test]
    fn full_discount_is_legal_and_zeroes_tax() {
        let line = labor_hour("80.00", "21")
            .with_discount_percent(pct("100"))
            .unwrap();

        let amounts = line.amounts().unwrap();
        assert_eq!(amounts.taxable_base, money("0.00"));
        assert_eq!(amounts.tax, money("0.00"));
        assert_eq!(amounts.total, money("0.00"));
    }

    #[test]
    fn fixed_discount_beyond_subtotal_is_rejected() {
        let result = labor_hour("80.00", "21").with_discount_amount(money("80.01"));
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn zero_tax_rate_is_legal() {
        let line = labor_hour("60.00", "0");
        let amounts = line.amounts().unwrap();
        assert_eq!(amounts.tax, money("0.00"));
        assert_eq!(amounts.total, money("60.00"));
    }

    #[test]
    fn sub_cent_subtotal_rounds_before_taxing() {
        let line = LineItem::new(
            LineItemKind::Part,
            "Washer fluid",
            dec("3"),
            money("10.005"),
            pct("21"),
        )
        .unwrap();

        let amounts = line.amounts().unwrap();
        assert_eq!(amounts.subtotal, money("30.02"));
        assert_eq!(amounts.tax, money("6.30"));
        assert_eq!(amounts.total, money("36.32"));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: derived amounts are internally consistent and
            /// two-decimal for any valid line.
            #[test]
            fn amounts_are_consistent(
                qty_cents in 1i64..=10_000i64,
                price_cents in 0i64..=500_000i64,
                discount_pct in 0i64..=10_000i64,
                tax_pct in 0i64..=2_500i64,
            ) {
                let line = LineItem::new(
                    LineItemKind::Part,
                    "Generated part",
                    Decimal::new(qty_cents, 2),
                    Money::from_minor_units(price_cents),
                    Percentage::new(Decimal::new(tax_pct, 2)).unwrap(),
                )
                .unwrap()
                .with_discount_percent(Percentage::new(Decimal::new(discount_pct, 2)).unwrap())
                .unwrap();

                let amounts = line.amounts().unwrap();
                prop_assert!(!amounts.taxable_base.is_negative());
                prop_assert_eq!(
                    amounts.taxable_base,
                    amounts.subtotal.checked_sub(amounts.discount).unwrap()
                );
                prop_assert_eq!(
                    amounts.total,
                    amounts.taxable_base.checked_add(amounts.tax).unwrap()
                );
                prop_assert!(amounts.taxable_base.amount().scale() <= 2);
                prop_assert!(amounts.tax.amount().scale() <= 2);
            }
        }
    }
}
