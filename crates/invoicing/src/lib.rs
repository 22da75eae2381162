//! Invoicing domain module.
//!
//! This crate contains the business rules of the fiscal invoice aggregate -
//! line arithmetic, tax aggregation and the lifecycle state machine -
//! implemented purely as deterministic domain logic (no IO, no HTTP, no
//! storage).

pub mod invoice;
pub mod line;
pub mod snapshot;
pub mod totals;

pub use invoice::{
    ClientId, DraftInvoice, Invoice, InvoiceId, InvoiceLine, InvoiceStatus, IssuanceGrant,
    RepairOrderId,
};
pub use line::{LineAmounts, LineItem, LineItemKind};
pub use snapshot::InvoiceSnapshot;
pub use totals::{invoice_totals, InvoiceTotals};
