//! Whole-ledger verification.
//!
//! Walks a tenant's numbered documents in issuance order, recomputing every
//! fingerprint and checking every predecessor link. Read-only and fail-fast;
//! acting on a mismatch (freezing the tenant's issuance) is the caller's job.

use thiserror::Error;

use crate::fingerprint::{compute_fingerprint, ChainInput};

/// One ledger entry as persisted: the fiscal fields plus the recorded
/// integrity columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainRecord {
    pub input: ChainInput,
    pub fingerprint: String,
    pub previous_fingerprint: Option<String>,
}

/// A detected break in a tenant's ledger.
///
/// Fatal for the affected ledger: issuance must halt pending manual review;
/// the chain is never auto-repaired.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    /// The first document of the ledger records a predecessor.
    #[error("document {number} at position {position} heads the ledger but records a predecessor")]
    UnexpectedPredecessor { position: usize, number: String },

    /// A document does not link to its predecessor's fingerprint
    /// (deletion, reordering or insertion).
    #[error("document {number} at position {position} does not link to its predecessor")]
    BrokenLink { position: usize, number: String },

    /// A document's recorded fingerprint does not match its fields
    /// (post-hoc edition).
    #[error("document {number} at position {position} fails fingerprint recomputation")]
    FingerprintMismatch { position: usize, number: String },
}

/// Verify a tenant's ledger, ordered by issuance.
///
/// An empty ledger is trivially valid.
pub fn verify_chain(records: &[ChainRecord]) -> Result<(), IntegrityError> {
    let mut prior_fingerprint: Option<&str> = None;

    for (position, record) in records.iter().enumerate() {
        match (prior_fingerprint, record.previous_fingerprint.as_deref()) {
            (None, Some(_)) => {
                return Err(IntegrityError::UnexpectedPredecessor {
                    position,
                    number: record.input.number.clone(),
                });
            }
            (Some(expected), recorded) if recorded != Some(expected) => {
                return Err(IntegrityError::BrokenLink {
                    position,
                    number: record.input.number.clone(),
                });
            }
            _ => {}
        }

        let recomputed =
            compute_fingerprint(&record.input, record.previous_fingerprint.as_deref());
        if recomputed != record.fingerprint {
            return Err(IntegrityError::FingerprintMismatch {
                position,
                number: record.input.number.clone(),
            });
        }

        prior_fingerprint = Some(&record.fingerprint);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use fiscalio_core::{Money, TenantId};

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    fn input(tenant_id: TenantId, seq: u32, grand_total: &str) -> ChainInput {
        ChainInput {
            tenant_id,
            number: format!("F-2026-{seq:06}"),
            issue_date: NaiveDate::from_ymd_opt(2026, 1, seq).unwrap(),
            taxable_base: money("100.00"),
            tax_total: money("21.00"),
            grand_total: money(grand_total),
            client_tax_id: "B12345678".to_string(),
        }
    }

    fn build_ledger(tenant_id: TenantId, count: u32) -> Vec<ChainRecord> {
        let mut records = Vec::new();
        let mut previous: Option<String> = None;
        for seq in 1..=count {
            let input = input(tenant_id, seq, "121.00");
            let fingerprint = compute_fingerprint(&input, previous.as_deref());
            records.push(ChainRecord {
                input,
                fingerprint: fingerprint.clone(),
                previous_fingerprint: previous,
            });
            previous = Some(fingerprint);
        }
        records
    }

    #[test]
    fn empty_ledger_is_valid() {
        assert_eq!(verify_chain(&[]), Ok(()));
    }

    #[test]
    fn intact_ledger_verifies() {
        let ledger = build_ledger(TenantId::new(), 5);
        assert_eq!(verify_chain(&ledger), Ok(()));
    }

    #[test]
    fn edited_amount_is_detected() {
        let tenant_id = TenantId::new();
        let mut ledger = build_ledger(tenant_id, 3);
        ledger[1].input.grand_total = money("999.00");

        assert_eq!(
            verify_chain(&ledger),
            Err(IntegrityError::FingerprintMismatch {
                position: 1,
                number: "F-2026-000002".to_string(),
            })
        );
    }

    #[test]
    fn removed_document_breaks_the_link() {
        let ledger = build_ledger(TenantId::new(), 4);
        let truncated: Vec<ChainRecord> =
            vec![ledger[0].clone(), ledger[2].clone(), ledger[3].clone()];

        assert_eq!(
            verify_chain(&truncated),
            Err(IntegrityError::BrokenLink {
                position: 1,
                number: "F-2026-000003".to_string(),
            })
        );
    }

    #[test]
    fn reordered_documents_break_the_link() {
        let mut ledger = build_ledger(TenantId::new(), 3);
        ledger.swap(1, 2);

        assert!(matches!(
            verify_chain(&ledger),
            Err(IntegrityError::BrokenLink { position: 1, .. })
        ));
    }

    #[test]
    fn head_with_predecessor_is_detected() {
        let mut ledger = build_ledger(TenantId::new(), 2);
        ledger.remove(0);

        assert_eq!(
            verify_chain(&ledger),
            Err(IntegrityError::UnexpectedPredecessor {
                position: 0,
                number: "F-2026-000002".to_string(),
            })
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

            /// Property: a ledger built link-by-link always verifies, and
            /// flipping any single recorded fingerprint makes it fail.
            #[test]
            fn built_ledgers_verify_and_tampering_fails(count in 1u32..12, tamper in 0u32..12) {
                let ledger = build_ledger(TenantId::new(), count);
                prop_assert_eq!(verify_chain(&ledger), Ok(()));

                let position = (tamper % count) as usize;
                let mut tampered = ledger.clone();
                tampered[position].fingerprint = format!("{:0>64}", "DEAD");
                prop_assert!(verify_chain(&tampered).is_err());
            }
        }
    }
}
