//! Fiscal document numbering: series, structured numbers, allocation contract.
//!
//! Numbering streams are partitioned by `(tenant, series, fiscal year)`;
//! within one partition, sequences are gap-free and monotonically increasing.
//! This crate holds the value types and the allocator contract; the persistent
//! counter adapters live in the infrastructure crate.

pub mod allocator;
pub mod number;
pub mod series;

pub use allocator::{AllocatedNumber, AllocationError, SequenceAllocator};
pub use number::{DocumentNumber, MAX_SEQUENCE};
pub use series::Series;
