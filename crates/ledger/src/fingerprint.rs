//! Deterministic document fingerprints.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

use fiscalio_core::{Money, TenantId};

/// The fiscally relevant fields of a numbered document.
///
/// `number` is the formatted rendering (for opaque legacy numbers the raw
/// string is authoritative); amounts enter the digest in their canonical
/// two-decimal form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainInput {
    pub tenant_id: TenantId,
    pub number: String,
    pub issue_date: NaiveDate,
    pub taxable_base: Money,
    pub tax_total: Money,
    pub grand_total: Money,
    pub client_tax_id: String,
}

impl ChainInput {
    /// Canonical `|`-joined payload. Field order is fixed and load-bearing:
    /// tenant, number, issue date (ISO), base, tax, total, client tax id,
    /// previous fingerprint (empty when the document heads the ledger).
    fn payload(&self, previous_fingerprint: Option<&str>) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}|{}|{}",
            self.tenant_id.as_uuid(),
            self.number,
            self.issue_date,
            self.taxable_base,
            self.tax_total,
            self.grand_total,
            self.client_tax_id,
            previous_fingerprint.unwrap_or(""),
        )
    }
}

/// Compute the uppercase-hex SHA-256 fingerprint of a document.
///
/// Pure and deterministic: identical inputs always yield the identical
/// digest, and any single-character change in any field changes the digest
/// completely.
pub fn compute_fingerprint(input: &ChainInput, previous_fingerprint: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.payload(previous_fingerprint).as_bytes());
    hex::encode_upper(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    fn sample_input() -> ChainInput {
        ChainInput {
            tenant_id: TenantId::new(),
            number: "F-2026-000001".to_string(),
            issue_date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            taxable_base: money("100.00"),
            tax_total: money("21.00"),
            grand_total: money("121.00"),
            client_tax_id: "B12345678".to_string(),
        }
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let input = sample_input();
        let a = compute_fingerprint(&input, None);
        let b = compute_fingerprint(&input, None);
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_is_uppercase_hex_256_bit() {
        let digest = compute_fingerprint(&sample_input(), None);
        assert_eq!(digest.len(), 64);
        assert!(digest.bytes().all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b)));
    }

    #[test]
    fn one_cent_change_changes_the_digest() {
        let input = sample_input();
        let mut tampered = input.clone();
        tampered.grand_total = money("121.01");

        assert_ne!(
            compute_fingerprint(&input, None),
            compute_fingerprint(&tampered, None)
        );
    }

    #[test]
    fn previous_fingerprint_feeds_the_digest() {
        let input = sample_input();
        let head = compute_fingerprint(&input, None);
        let linked = compute_fingerprint(&input, Some(&head));
        assert_ne!(head, linked);
    }

    #[test]
    fn equal_amounts_with_different_scales_hash_identically() {
        let input = sample_input();
        let mut rescaled = input.clone();
        rescaled.grand_total = money("121");

        assert_eq!(
            compute_fingerprint(&input, None),
            compute_fingerprint(&rescaled, None)
        );
    }
}
