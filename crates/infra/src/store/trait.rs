use std::sync::Arc;
use thiserror::Error;

use fiscalio_core::{ExpectedVersion, TenantId};
use fiscalio_invoicing::{Invoice, InvoiceId};
use fiscalio_ledger::{ChainInput, ChainRecord};

/// Invoice store operation error.
///
/// These are **infrastructure errors** (storage, concurrency, isolation) as
/// opposed to domain errors (validation, lifecycle). Driver errors are
/// wrapped in `Storage`, never leaked raw, so the engine's error taxonomy
/// stays implementation-independent.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No invoice with that id for that tenant.
    #[error("invoice not found")]
    NotFound,

    /// Optimistic concurrency check failed (stale version).
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    /// Cross-tenant access attempted (security violation).
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    /// The invoice fails its structural invariants (e.g. issued without a
    /// number); the store refuses to persist it.
    #[error("invalid persist: {0}")]
    InvalidPersist(String),

    /// A frozen field of a numbered invoice differs from the stored row.
    #[error("immutable field mutation: {0}")]
    Immutability(String),

    /// Underlying storage failed.
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Tenant-scoped invoice persistence contract.
///
/// Implementations must:
/// - enforce tenant isolation on every operation
/// - enforce optimistic concurrency via `ExpectedVersion` (stored version,
///   `0` for a row that does not exist yet)
/// - validate the structural invariants before persisting
/// - refuse any change to the frozen fields (number, fingerprints, lines,
///   issue date) of a numbered invoice
/// - never delete a row
///
/// Implementations also maintain the tenant's **issuance order**: a dense
/// per-tenant ordinal assigned when an invoice first receives its number.
/// The predecessor-fingerprint lookup and the ledger walk are both defined
/// over that order.
pub trait InvoiceStore: Send + Sync {
    /// Load an invoice by id, scoped to the tenant.
    fn load(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> Result<Invoice, StoreError>;

    /// Persist the invoice (insert or update), checking `expected_version`
    /// against the stored row.
    fn save(&self, invoice: &Invoice, expected_version: ExpectedVersion)
        -> Result<(), StoreError>;

    /// Fingerprint of the tenant's most recently numbered document, or
    /// `None` when the tenant has not issued anything yet.
    fn latest_fingerprint(&self, tenant_id: TenantId) -> Result<Option<String>, StoreError>;

    /// All numbered documents of the tenant in issuance order, as ledger
    /// records ready for chain verification.
    fn chain_records(&self, tenant_id: TenantId) -> Result<Vec<ChainRecord>, StoreError>;

    /// Whether issuance is halted for the tenant pending manual review.
    fn is_ledger_frozen(&self, tenant_id: TenantId) -> Result<bool, StoreError>;

    /// Halt issuance for the tenant. Never reversed by the engine itself.
    fn freeze_ledger(&self, tenant_id: TenantId) -> Result<(), StoreError>;
}

impl<S> InvoiceStore for Arc<S>
where
    S: InvoiceStore + ?Sized,
{
    fn load(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> Result<Invoice, StoreError> {
        (**self).load(tenant_id, invoice_id)
    }

    fn save(
        &self,
        invoice: &Invoice,
        expected_version: ExpectedVersion,
    ) -> Result<(), StoreError> {
        (**self).save(invoice, expected_version)
    }

    fn latest_fingerprint(&self, tenant_id: TenantId) -> Result<Option<String>, StoreError> {
        (**self).latest_fingerprint(tenant_id)
    }

    fn chain_records(&self, tenant_id: TenantId) -> Result<Vec<ChainRecord>, StoreError> {
        (**self).chain_records(tenant_id)
    }

    fn is_ledger_frozen(&self, tenant_id: TenantId) -> Result<bool, StoreError> {
        (**self).is_ledger_frozen(tenant_id)
    }

    fn freeze_ledger(&self, tenant_id: TenantId) -> Result<(), StoreError> {
        (**self).freeze_ledger(tenant_id)
    }
}

/// Name the first frozen field that differs between the stored numbered
/// invoice and an incoming save, if any.
///
/// Once a document carries a number, these fields may never change again;
/// only the status (along legal edges) and payment/void metadata may.
pub(crate) fn frozen_field_diff(existing: &Invoice, incoming: &Invoice) -> Option<&'static str> {
    if existing.number() != incoming.number() {
        return Some("number");
    }
    if existing.fingerprint() != incoming.fingerprint() {
        return Some("fingerprint");
    }
    if existing.previous_fingerprint() != incoming.previous_fingerprint() {
        return Some("previous_fingerprint");
    }
    if existing.issue_date() != incoming.issue_date() {
        return Some("issue_date");
    }
    if existing.lines() != incoming.lines() {
        return Some("lines");
    }
    if existing.withholding_percent() != incoming.withholding_percent() {
        return Some("withholding_percent");
    }
    if existing.client_tax_id() != incoming.client_tax_id() {
        return Some("client_tax_id");
    }
    None
}

/// Project a numbered invoice into its ledger record.
///
/// Fails with `InvalidPersist` on an unnumbered invoice; only numbered
/// documents participate in the chain.
pub fn chain_record_of(invoice: &Invoice) -> Result<ChainRecord, StoreError> {
    let number = invoice
        .number()
        .ok_or_else(|| StoreError::InvalidPersist("unnumbered invoice in ledger".to_string()))?;
    let issue_date = invoice.issue_date().ok_or_else(|| {
        StoreError::InvalidPersist("numbered invoice without issue date".to_string())
    })?;
    let fingerprint = invoice.fingerprint().ok_or_else(|| {
        StoreError::InvalidPersist("numbered invoice without fingerprint".to_string())
    })?;
    let totals = invoice
        .totals()
        .map_err(|e| StoreError::InvalidPersist(e.to_string()))?;

    Ok(ChainRecord {
        input: ChainInput {
            tenant_id: invoice.tenant_id(),
            number: number.to_string(),
            issue_date,
            taxable_base: totals.base_total,
            tax_total: totals.tax_total,
            grand_total: totals.grand_total,
            client_tax_id: invoice.client_tax_id().to_string(),
        },
        fingerprint: fingerprint.to_string(),
        previous_fingerprint: invoice.previous_fingerprint().map(str::to_string),
    })
}
