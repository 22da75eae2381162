//! Fiscal document numbers: structured series/year/sequence triples, with an
//! opaque escape hatch for legacy data.
//!
//! A structured number formats canonically as `"F-2026-000123"`. Documents
//! imported from older systems may carry a raw string that fits no known
//! shape; those stay `Opaque`, the raw string is authoritative for display
//! and chain fingerprinting, and every fallback is logged as a data-quality
//! warning rather than silently "fixed".

use core::cmp::Ordering;
use serde::{Deserialize, Serialize};
use tracing::warn;

use fiscalio_core::{DomainError, DomainResult, ValueObject};

use crate::series::Series;

/// Highest sequence a partition may hand out.
pub const MAX_SEQUENCE: u32 = 999_999;

/// Zero-padding width of the canonical sequence rendering.
const PAD_WIDTH: usize = 6;

/// A fiscal document number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentNumber {
    /// The canonical shape: series + fiscal year + gap-free sequence.
    Structured {
        series: Series,
        year: i32,
        sequence: u32,
    },
    /// A legacy/foreign number kept verbatim. Structured fields could not be
    /// recovered; the raw string is authoritative.
    Opaque { raw: String },
}

impl DocumentNumber {
    pub fn structured(series: Series, year: i32, sequence: u32) -> DomainResult<Self> {
        if !(1..=MAX_SEQUENCE).contains(&sequence) {
            return Err(DomainError::validation(format!(
                "sequence {sequence} out of range 1..={MAX_SEQUENCE}"
            )));
        }
        if !(1900..=9999).contains(&year) {
            return Err(DomainError::validation(format!(
                "fiscal year {year} out of range"
            )));
        }
        Ok(Self::Structured {
            series,
            year,
            sequence,
        })
    }

    pub fn opaque(raw: impl Into<String>) -> DomainResult<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(DomainError::validation("document number must not be empty"));
        }
        Ok(Self::Opaque { raw })
    }

    /// Parse a persisted/legacy representation.
    ///
    /// Tolerates the canonical form plus common legacy spellings (lower-case
    /// series, short zero-padding, `/` as delimiter). Anything else becomes
    /// `Opaque` with a data-quality warning; an empty string is an error.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("document number must not be empty"));
        }

        if let Some(number) = Self::try_parse_structured(trimmed) {
            return Ok(number);
        }

        warn!(raw = trimmed, "unrecognized fiscal number shape, keeping opaque");
        Self::opaque(trimmed)
    }

    fn try_parse_structured(raw: &str) -> Option<Self> {
        let mut parts = raw.split(['-', '/']);
        let series = parts.next()?;
        let year = parts.next()?;
        let sequence = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        let series = Series::new(series.to_ascii_uppercase()).ok()?;
        if year.len() != 4 {
            return None;
        }
        let year: i32 = year.parse().ok()?;
        if sequence.is_empty() || sequence.len() > PAD_WIDTH {
            return None;
        }
        let sequence: u32 = sequence.parse().ok()?;

        Self::structured(series, year, sequence).ok()
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Structured { .. })
    }

    /// Series of a structured number; `None` for opaque ones (structured
    /// fields are advisory only there).
    pub fn series(&self) -> Option<&Series> {
        match self {
            Self::Structured { series, .. } => Some(series),
            Self::Opaque { .. } => None,
        }
    }

    pub fn year(&self) -> Option<i32> {
        match self {
            Self::Structured { year, .. } => Some(*year),
            Self::Opaque { .. } => None,
        }
    }

    pub fn sequence(&self) -> Option<u32> {
        match self {
            Self::Structured { sequence, .. } => Some(*sequence),
            Self::Opaque { .. } => None,
        }
    }
}

impl core::fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Structured {
                series,
                year,
                sequence,
            } => write!(f, "{series}-{year}-{sequence:06}"),
            Self::Opaque { raw } => f.write_str(raw),
        }
    }
}

impl PartialOrd for DocumentNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DocumentNumber {
    /// Structured numbers order by `(series, year, sequence)`; opaque numbers
    /// order lexically, after every structured one.
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (
                Self::Structured {
                    series: s1,
                    year: y1,
                    sequence: q1,
                },
                Self::Structured {
                    series: s2,
                    year: y2,
                    sequence: q2,
                },
            ) => (s1, y1, q1).cmp(&(s2, y2, q2)),
            (Self::Structured { .. }, Self::Opaque { .. }) => Ordering::Less,
            (Self::Opaque { .. }, Self::Structured { .. }) => Ordering::Greater,
            (Self::Opaque { raw: r1 }, Self::Opaque { raw: r2 }) => r1.cmp(r2),
        }
    }
}

impl ValueObject for DocumentNumber {}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(s: &str) -> Series {
        Series::new(s).unwrap()
    }

    #[test]
    fn formats_canonically_with_six_digit_padding() {
        let number = DocumentNumber::structured(series("F"), 2026, 123).unwrap();
        assert_eq!(number.to_string(), "F-2026-000123");
    }

    #[test]
    fn parses_canonical_form() {
        let number = DocumentNumber::parse("F-2026-000123").unwrap();
        assert_eq!(
            number,
            DocumentNumber::structured(series("F"), 2026, 123).unwrap()
        );
    }

    #[test]
    fn parses_legacy_spellings() {
        // Lower-case series, short padding.
        let number = DocumentNumber::parse("fs-2019-42").unwrap();
        assert_eq!(
            number,
            DocumentNumber::structured(series("FS"), 2019, 42).unwrap()
        );

        // Slash delimiter.
        let number = DocumentNumber::parse("A/2020/7").unwrap();
        assert_eq!(
            number,
            DocumentNumber::structured(series("A"), 2020, 7).unwrap()
        );
    }

    #[test]
    fn unrecognized_shapes_stay_opaque() {
        for raw in ["2019-INV-17", "FACT.0042", "F-26-000123", "F-2026-0000007"] {
            let number = DocumentNumber::parse(raw).unwrap();
            assert_eq!(number, DocumentNumber::Opaque { raw: raw.into() });
            assert_eq!(number.to_string(), raw);
            assert!(number.series().is_none());
        }
    }

    #[test]
    fn empty_raw_is_rejected() {
        assert!(DocumentNumber::parse("").is_err());
        assert!(DocumentNumber::parse("   ").is_err());
    }

    #[test]
    fn sequence_range_is_enforced() {
        assert!(DocumentNumber::structured(series("F"), 2026, 0).is_err());
        assert!(DocumentNumber::structured(series("F"), 2026, 1_000_000).is_err());
        assert!(DocumentNumber::structured(series("F"), 2026, MAX_SEQUENCE).is_ok());
    }

    #[test]
    fn ordering_is_series_year_sequence_then_opaque() {
        let a = DocumentNumber::structured(series("F"), 2025, 999).unwrap();
        let b = DocumentNumber::structured(series("F"), 2026, 1).unwrap();
        let c = DocumentNumber::structured(series("G"), 2020, 1).unwrap();
        let o = DocumentNumber::opaque("LEGACY-1").unwrap();

        assert!(a < b);
        assert!(b < c);
        assert!(c < o);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: canonical formatting of a structured number parses back
            /// to the same value.
            #[test]
            fn format_then_parse_round_trips(
                s in "[A-Z]{1,3}",
                year in 1900i32..=2100i32,
                sequence in 1u32..=MAX_SEQUENCE,
            ) {
                let number = DocumentNumber::structured(series(&s), year, sequence).unwrap();
                let reparsed = DocumentNumber::parse(&number.to_string()).unwrap();
                prop_assert_eq!(number, reparsed);
            }
        }
    }
}
