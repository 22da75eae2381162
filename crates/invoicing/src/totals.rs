//! Invoice-level tax aggregation.
//!
//! Pure rollups over already-rounded line amounts: sum-of-rounded, never
//! round-of-sum, so invoice totals always equal the sum of the printed line
//! totals.

use fiscalio_core::{DomainResult, Money, Percentage};

use crate::line::LineItem;

/// The rolled-up amounts of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceTotals {
    /// Sum of per-line taxable bases.
    pub base_total: Money,
    /// Sum of per-line tax amounts.
    pub tax_total: Money,
    /// Withholding (retention) over the base total; zero when not applicable.
    pub withholding: Money,
    /// `base_total + tax_total - withholding`.
    pub grand_total: Money,
}

/// Roll up invoice totals from its lines.
///
/// An empty slice yields all-zero totals (drafts may not have lines yet).
pub fn invoice_totals(
    lines: &[LineItem],
    withholding_percent: Percentage,
) -> DomainResult<InvoiceTotals> {
    let mut base_total = Money::zero();
    let mut tax_total = Money::zero();

    for line in lines {
        let amounts = line.amounts()?;
        base_total = base_total.checked_add(amounts.taxable_base)?;
        tax_total = tax_total.checked_add(amounts.tax)?;
    }

    let withholding = withholding_percent.of(base_total)?;
    let grand_total = base_total.checked_add(tax_total)?.checked_sub(withholding)?;

    Ok(InvoiceTotals {
        base_total,
        tax_total,
        withholding,
        grand_total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::LineItemKind;
    use rust_decimal::Decimal;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    fn pct(s: &str) -> Percentage {
        Percentage::new(dec(s)).unwrap()
    }

    fn line(qty: &str, price: &str, tax: &str) -> LineItem {
        LineItem::new(LineItemKind::Labor, "Workshop hour", dec(qty), money(price), pct(tax))
            .unwrap()
    }

    #[test]
    fn empty_invoice_totals_are_zero() {
        let totals = invoice_totals(&[], Percentage::zero()).unwrap();
        assert_eq!(totals.base_total, Money::zero());
        assert_eq!(totals.tax_total, Money::zero());
        assert_eq!(totals.withholding, Money::zero());
        assert_eq!(totals.grand_total, Money::zero());
    }

    #[test]
    fn totals_sum_lines_and_apply_withholding() {
        let lines = vec![line("2", "50.00", "21"), line("1", "100.00", "10")];
        let totals = invoice_totals(&lines, pct("15")).unwrap();

        assert_eq!(totals.base_total, money("200.00"));
        assert_eq!(totals.tax_total, money("31.00"));
        assert_eq!(totals.withholding, money("30.00"));
        assert_eq!(totals.grand_total, money("201.00"));
    }

    #[test]
    fn lines_round_before_summation() {
        // Each line: subtotal 30.015 -> 30.02; tax 6.30; total 36.32.
        // Summing raw subtotals first would give a base of 60.03, not 60.04.
        let lines = vec![line("3", "10.005", "21"), line("3", "10.005", "21")];
        let totals = invoice_totals(&lines, Percentage::zero()).unwrap();

        assert_eq!(totals.base_total, money("60.04"));
        assert_eq!(totals.tax_total, money("12.60"));
        assert_eq!(totals.grand_total, money("72.64"));

        let per_line_total = lines[0].amounts().unwrap().total;
        assert_eq!(
            totals.grand_total,
            per_line_total.checked_add(per_line_total).unwrap()
        );
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: without withholding, the grand total equals the sum
            /// of independently derived line totals.
            #[test]
            fn grand_total_is_sum_of_line_totals(
                parts in prop::collection::vec((1i64..=1_000i64, 0i64..=100_000i64, 0i64..=2_500i64), 1..8)
            ) {
                let lines: Vec<LineItem> = parts
                    .iter()
                    .map(|(qty, price, tax)| {
                        LineItem::new(
                            LineItemKind::Part,
                            "Generated part",
                            Decimal::from(*qty),
                            Money::from_minor_units(*price),
                            Percentage::new(Decimal::new(*tax, 2)).unwrap(),
                        )
                        .unwrap()
                    })
                    .collect();

                let totals = invoice_totals(&lines, Percentage::zero()).unwrap();

                let mut expected = Money::zero();
                for l in &lines {
                    expected = expected.checked_add(l.amounts().unwrap().total).unwrap();
                }
                prop_assert_eq!(totals.grand_total, expected);
            }
        }
    }
}
