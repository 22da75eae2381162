//! Application-level orchestration of the invoice lifecycle.
//!
//! `IssuanceService` composes the store, the allocator and the chain builder
//! behind one consistent execution model:
//!
//! ```text
//! Issue
//!   1. refuse if the tenant's ledger is frozen
//!   2. load the draft, check every precondition
//!   3. take the tenant issuance lock (bounded wait)
//!   4. allocate the next sequence for (tenant, series, fiscal year)
//!   5. read the predecessor fingerprint
//!   6. compute this document's fingerprint
//!   7. apply the issuance to the aggregate and save (optimistic version)
//!   8. release the lock
//! ```
//!
//! Steps 5-7 run under the per-tenant lock so two concurrent issuances can
//! never observe the same predecessor and fork the chain. The counter lock
//! inside step 4 is scoped to one `(tenant, series, year)` partition and is
//! never held across the fingerprint or persistence work.
//!
//! A failure after step 4 burns the allocated number: it is logged at `warn`
//! and never recycled. A timeout before the counter commits consumes nothing,
//! so callers may retry with backoff.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, TryLockError};
use std::time::{Duration, Instant};

use chrono::{Datelike, NaiveDate, Utc};
use thiserror::Error;
use tracing::{error, instrument, warn};

use fiscalio_core::{AggregateRoot, DomainError, ExpectedVersion, TenantId, UserId};
use fiscalio_invoicing::{DraftInvoice, Invoice, InvoiceId, IssuanceGrant, LineItem};
use fiscalio_ledger::{compute_fingerprint, verify_chain, ChainInput, IntegrityError};
use fiscalio_numbering::{AllocationError, SequenceAllocator};

use crate::store::{InvoiceStore, StoreError};

/// Caller-facing error union for the lifecycle operations.
#[derive(Debug, Error)]
pub enum IssueError {
    /// Malformed input; correct it and call again.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Operation illegal for the document's current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Attempted mutation of a frozen field; a programming error upstream.
    #[error("immutable field mutation: {0}")]
    Immutability(String),

    /// Internal invariant breach (e.g. arithmetic overflow).
    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("invoice not found")]
    NotFound,

    /// Stale version; reload and retry.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Issuance is halted for this tenant pending manual review.
    #[error("issuance halted: ledger frozen for tenant {0}")]
    LedgerFrozen(TenantId),

    /// Counter lock timeout or counter storage failure; safe to retry with
    /// backoff, no number was consumed.
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    /// The tenant's ledger failed verification; fatal, never auto-repaired.
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    /// Wrapped storage failure.
    #[error("storage failure: {0}")]
    Store(StoreError),
}

impl From<DomainError> for IssueError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => IssueError::Validation(msg),
            DomainError::InvalidState(msg) => IssueError::InvalidState(msg),
            DomainError::Immutability(msg) => {
                error!(error = %msg, "immutability violation reached the issuance layer");
                IssueError::Immutability(msg)
            }
            DomainError::InvariantViolation(msg) => IssueError::Invariant(msg),
            DomainError::InvalidId(msg) => IssueError::Validation(msg),
            DomainError::NotFound => IssueError::NotFound,
            DomainError::Conflict(msg) => IssueError::Conflict(msg),
        }
    }
}

impl From<StoreError> for IssueError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound => IssueError::NotFound,
            StoreError::Conflict(msg) => IssueError::Conflict(msg),
            StoreError::Immutability(msg) => IssueError::Immutability(msg),
            other => IssueError::Store(other),
        }
    }
}

/// Tuning knobs for the issuance orchestration.
#[derive(Debug, Clone)]
pub struct IssuanceConfig {
    /// Bound on waiting for the per-tenant issuance lock.
    pub tenant_lock_timeout: Duration,
}

impl Default for IssuanceConfig {
    fn default() -> Self {
        Self {
            tenant_lock_timeout: Duration::from_secs(5),
        }
    }
}

/// Per-tenant issuance locks.
///
/// Serializes the predecessor-lookup / fingerprint-write window per tenant.
/// Invoices of different tenants never contend here.
#[derive(Default)]
struct TenantLocks {
    inner: Mutex<HashMap<TenantId, Arc<Mutex<()>>>>,
}

impl TenantLocks {
    fn lock_for(&self, tenant_id: TenantId) -> Result<Arc<Mutex<()>>, IssueError> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| IssueError::Store(StoreError::Storage("lock poisoned".to_string())))?;
        Ok(map.entry(tenant_id).or_default().clone())
    }
}

/// The engine's façade: draft management, issuance, payment, voiding and
/// ledger verification over an injected store and allocator.
pub struct IssuanceService<S, A> {
    store: S,
    allocator: A,
    locks: TenantLocks,
    config: IssuanceConfig,
}

impl<S, A> IssuanceService<S, A>
where
    S: InvoiceStore,
    A: SequenceAllocator,
{
    pub fn new(store: S, allocator: A) -> Self {
        Self::with_config(store, allocator, IssuanceConfig::default())
    }

    pub fn with_config(store: S, allocator: A, config: IssuanceConfig) -> Self {
        Self {
            store,
            allocator,
            locks: TenantLocks::default(),
            config,
        }
    }

    /// Open a new draft and persist it.
    pub fn create_draft(&self, draft: DraftInvoice) -> Result<Invoice, IssueError> {
        let invoice = Invoice::create_draft(draft)?;
        self.store.save(&invoice, ExpectedVersion::Exact(0))?;
        Ok(invoice)
    }

    /// Append a line to a draft.
    pub fn add_line(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        item: LineItem,
    ) -> Result<Invoice, IssueError> {
        self.mutate(tenant_id, invoice_id, |invoice| {
            invoice.add_line(item).map(|_| ())
        })
    }

    /// Replace a draft line.
    pub fn edit_line(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        line_no: u32,
        item: LineItem,
    ) -> Result<Invoice, IssueError> {
        self.mutate(tenant_id, invoice_id, |invoice| {
            invoice.edit_line(line_no, item)
        })
    }

    /// Remove a draft line.
    pub fn remove_line(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        line_no: u32,
    ) -> Result<Invoice, IssueError> {
        self.mutate(tenant_id, invoice_id, |invoice| invoice.remove_line(line_no))
    }

    /// Record payment of an issued invoice.
    pub fn mark_paid(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        user_id: UserId,
    ) -> Result<Invoice, IssueError> {
        self.mutate(tenant_id, invoice_id, |invoice| {
            invoice.mark_paid(user_id, Utc::now())
        })
    }

    /// Void an issued invoice with a mandatory reason.
    pub fn void(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        reason: &str,
        user_id: UserId,
    ) -> Result<Invoice, IssueError> {
        self.mutate(tenant_id, invoice_id, |invoice| {
            invoice.void(reason, user_id, Utc::now())
        })
    }

    /// Turn a draft into a numbered, chained, immutable fiscal document.
    #[instrument(
        skip(self),
        fields(
            tenant_id = %tenant_id.as_uuid(),
            invoice_id = %invoice_id,
        ),
        err
    )]
    pub fn issue(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        user_id: UserId,
        issue_date: NaiveDate,
    ) -> Result<Invoice, IssueError> {
        if self.store.is_ledger_frozen(tenant_id)? {
            return Err(IssueError::LedgerFrozen(tenant_id));
        }

        let mut invoice = self.store.load(tenant_id, invoice_id)?;
        invoice.can_issue()?;
        let expected = ExpectedVersion::Exact(invoice.version());

        let lock = self.locks.lock_for(tenant_id)?;
        let _guard = acquire_bounded(&lock, self.config.tenant_lock_timeout)?;

        let allocated =
            self.allocator
                .allocate(tenant_id, invoice.series(), issue_date.year())?;

        // From here on a failure burns the allocated number.
        let outcome = (|| -> Result<(), IssueError> {
            let previous = self.store.latest_fingerprint(tenant_id)?;
            let totals = invoice.totals()?;
            let input = ChainInput {
                tenant_id,
                number: allocated.formatted(),
                issue_date,
                taxable_base: totals.base_total,
                tax_total: totals.tax_total,
                grand_total: totals.grand_total,
                client_tax_id: invoice.client_tax_id().to_string(),
            };
            let fingerprint = compute_fingerprint(&input, previous.as_deref());

            invoice.issue(IssuanceGrant {
                number: allocated.number().clone(),
                fingerprint,
                previous_fingerprint: previous,
                issue_date,
                issued_by: user_id,
                issued_at: Utc::now(),
            })?;
            self.store.save(&invoice, expected)?;
            Ok(())
        })();

        if let Err(e) = outcome {
            warn!(
                tenant_id = %tenant_id.as_uuid(),
                number = %allocated.formatted(),
                sequence = allocated.sequence(),
                "issuance failed after allocation, sequence number burned"
            );
            return Err(e);
        }

        Ok(invoice)
    }

    /// Recompute the tenant's whole chain. On the first mismatch the
    /// tenant's issuance is frozen pending manual review.
    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid()), err)]
    pub fn verify_ledger(&self, tenant_id: TenantId) -> Result<(), IssueError> {
        let records = self.store.chain_records(tenant_id)?;

        if let Err(e) = verify_chain(&records) {
            error!(
                tenant_id = %tenant_id.as_uuid(),
                violation = %e,
                "ledger integrity violation, freezing issuance"
            );
            self.store.freeze_ledger(tenant_id)?;
            return Err(IssueError::Integrity(e));
        }
        Ok(())
    }

    /// Read an invoice (no mutation).
    pub fn load(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> Result<Invoice, IssueError> {
        Ok(self.store.load(tenant_id, invoice_id)?)
    }

    /// Load-mutate-save with an optimistic version check.
    fn mutate<F>(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        apply: F,
    ) -> Result<Invoice, IssueError>
    where
        F: FnOnce(&mut Invoice) -> Result<(), DomainError>,
    {
        let mut invoice = self.store.load(tenant_id, invoice_id)?;
        let before = invoice.version();
        apply(&mut invoice)?;
        // Idempotent no-ops (e.g. re-marking a paid invoice) skip the write.
        if invoice.version() != before {
            self.store.save(&invoice, ExpectedVersion::Exact(before))?;
        }
        Ok(invoice)
    }
}

/// Bounded lock acquisition; a timeout maps to the allocation taxonomy (the
/// caller never consumed a number and may retry).
fn acquire_bounded(
    lock: &Mutex<()>,
    timeout: Duration,
) -> Result<std::sync::MutexGuard<'_, ()>, IssueError> {
    let started = Instant::now();
    loop {
        match lock.try_lock() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::WouldBlock) => {
                if started.elapsed() >= timeout {
                    return Err(IssueError::Allocation(AllocationError::Timeout {
                        waited_ms: started.elapsed().as_millis() as u64,
                    }));
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            Err(TryLockError::Poisoned(_)) => {
                return Err(IssueError::Store(StoreError::Storage(
                    "tenant lock poisoned".to_string(),
                )));
            }
        }
    }
}
