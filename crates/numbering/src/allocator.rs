//! Sequence allocation contract.
//!
//! One persistent counter per `(tenant, series, fiscal year)` partition,
//! mutated only inside the adapter's critical section. Repeated calls for a
//! fixed partition return a strictly increasing, gap-free sequence even under
//! concurrent callers across process boundaries.
//!
//! Failure semantics: a number is consumed only when the enclosing unit of
//! work commits. A caller that fails *after* allocation burns the number; the
//! burn is logged by the issuance layer and never recycled.

use std::sync::Arc;
use thiserror::Error;

use fiscalio_core::{DomainResult, TenantId};

use crate::number::DocumentNumber;
use crate::series::Series;

/// A freshly allocated sequence number plus its structured document number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatedNumber {
    sequence: u32,
    number: DocumentNumber,
}

impl AllocatedNumber {
    pub fn new(series: Series, fiscal_year: i32, sequence: u32) -> DomainResult<Self> {
        let number = DocumentNumber::structured(series, fiscal_year, sequence)?;
        Ok(Self { sequence, number })
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn number(&self) -> &DocumentNumber {
        &self.number
    }

    pub fn into_number(self) -> DocumentNumber {
        self.number
    }

    /// Canonical rendering, e.g. `"F-2026-000123"`.
    pub fn formatted(&self) -> String {
        self.number.to_string()
    }
}

/// Allocation failure.
///
/// `Timeout` and `Storage` are safe to retry with backoff: no number is
/// consumed unless the full transaction commits.
#[derive(Debug, Error)]
pub enum AllocationError {
    /// The partition's counter lock could not be acquired in time.
    #[error("counter lock acquisition timed out after {waited_ms}ms")]
    Timeout { waited_ms: u64 },

    /// The partition ran past the last representable sequence.
    #[error("sequence range exhausted for series {series}, year {year}")]
    Exhausted { series: String, year: i32 },

    /// Underlying storage failed; the driver error is wrapped, never leaked.
    #[error("counter storage failure: {0}")]
    Storage(String),
}

/// Gap-free sequence allocator, one counter per partition.
///
/// Implementations must make the read-increment-write of the counter
/// indivisible (row lock or equivalent), create absent counters atomically
/// (upsert-with-lock, not read-then-insert), and bound the time spent waiting
/// on the lock.
pub trait SequenceAllocator: Send + Sync {
    /// Allocate the next sequence for `(tenant_id, series, fiscal_year)`.
    fn allocate(
        &self,
        tenant_id: TenantId,
        series: &Series,
        fiscal_year: i32,
    ) -> Result<AllocatedNumber, AllocationError>;
}

impl<A> SequenceAllocator for Arc<A>
where
    A: SequenceAllocator + ?Sized,
{
    fn allocate(
        &self,
        tenant_id: TenantId,
        series: &Series,
        fiscal_year: i32,
    ) -> Result<AllocatedNumber, AllocationError> {
        (**self).allocate(tenant_id, series, fiscal_year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocated_number_formats_canonically() {
        let allocated = AllocatedNumber::new(Series::new("F").unwrap(), 2026, 1).unwrap();
        assert_eq!(allocated.sequence(), 1);
        assert_eq!(allocated.formatted(), "F-2026-000001");
    }

    #[test]
    fn allocated_number_rejects_out_of_range_sequence() {
        assert!(AllocatedNumber::new(Series::new("F").unwrap(), 2026, 0).is_err());
    }
}
