//! Invoice persistence boundary.
//!
//! This module defines an infrastructure-facing abstraction for storing and
//! loading tenant-scoped invoices without making any storage assumptions.
//! The store never hard-deletes a row; "deleting" a draft is an external
//! concern that lives outside this engine.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryInvoiceStore;
pub use postgres::PostgresInvoiceStore;
pub use r#trait::{chain_record_of, InvoiceStore, StoreError};
