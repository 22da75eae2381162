//! Infrastructure layer: persistence adapters, counter-backed allocators and
//! the issuance orchestration.

pub mod allocator;
pub mod issuance;
pub mod store;


pub use allocator::{InMemorySequenceAllocator, PostgresSequenceAllocator};
pub use issuance::{IssuanceConfig, IssuanceService, IssueError};
pub use store::{chain_record_of, InMemoryInvoiceStore, InvoiceStore, PostgresInvoiceStore, StoreError};
