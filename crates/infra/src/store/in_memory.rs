use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use tracing::error;

use fiscalio_core::{AggregateRoot, ExpectedVersion, TenantId};
use fiscalio_invoicing::{Invoice, InvoiceId, InvoiceStatus};
use fiscalio_ledger::ChainRecord;

use super::r#trait::{chain_record_of, frozen_field_diff, InvoiceStore, StoreError};

#[derive(Debug)]
struct StoredRow {
    invoice: Invoice,
    /// Dense per-tenant ordinal, assigned when the invoice first gets its
    /// number. `None` while the row is a draft.
    issued_order: Option<u64>,
}

#[derive(Debug, Default)]
struct Inner {
    rows: HashMap<InvoiceId, StoredRow>,
    next_issued_order: HashMap<TenantId, u64>,
    frozen: HashSet<TenantId>,
}

/// In-memory invoice store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryInvoiceStore {
    inner: RwLock<Inner>,
}

impl InMemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InvoiceStore for InMemoryInvoiceStore {
    fn load(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> Result<Invoice, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;

        let row = inner.rows.get(&invoice_id).ok_or(StoreError::NotFound)?;
        if row.invoice.tenant_id() != tenant_id {
            return Err(StoreError::TenantIsolation(format!(
                "invoice {invoice_id} does not belong to tenant {tenant_id}"
            )));
        }
        Ok(row.invoice.clone())
    }

    fn save(
        &self,
        invoice: &Invoice,
        expected_version: ExpectedVersion,
    ) -> Result<(), StoreError> {
        invoice
            .snapshot()
            .validate()
            .map_err(|e| StoreError::InvalidPersist(e.to_string()))?;

        let mut inner = self
            .inner
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;

        let issued_order = match inner.rows.get(&invoice.id_typed()) {
            None => {
                if !expected_version.matches(0) {
                    return Err(StoreError::Conflict(format!(
                        "expected {expected_version:?}, found no stored row"
                    )));
                }
                None
            }
            Some(existing) => {
                if existing.invoice.tenant_id() != invoice.tenant_id() {
                    return Err(StoreError::TenantIsolation(format!(
                        "invoice {} does not belong to tenant {}",
                        invoice.id_typed(),
                        invoice.tenant_id()
                    )));
                }
                let current = existing.invoice.version();
                if !expected_version.matches(current) {
                    return Err(StoreError::Conflict(format!(
                        "expected {expected_version:?}, found {current}"
                    )));
                }
                if existing.invoice.status() != InvoiceStatus::Draft {
                    if let Some(field) = frozen_field_diff(&existing.invoice, invoice) {
                        error!(
                            invoice_id = %invoice.id_typed(),
                            field,
                            "rejected mutation of a frozen invoice field"
                        );
                        return Err(StoreError::Immutability(format!(
                            "field '{field}' of a numbered invoice cannot change"
                        )));
                    }
                }
                existing.issued_order
            }
        };

        // First save in a numbered state claims the next issuance ordinal.
        let issued_order = match issued_order {
            Some(order) => Some(order),
            None if invoice.is_numbered() => {
                let next = inner
                    .next_issued_order
                    .entry(invoice.tenant_id())
                    .or_insert(0);
                *next += 1;
                Some(*next)
            }
            None => None,
        };

        inner.rows.insert(
            invoice.id_typed(),
            StoredRow {
                invoice: invoice.clone(),
                issued_order,
            },
        );
        Ok(())
    }

    fn latest_fingerprint(&self, tenant_id: TenantId) -> Result<Option<String>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;

        let latest = inner
            .rows
            .values()
            .filter(|r| r.invoice.tenant_id() == tenant_id)
            .filter_map(|r| r.issued_order.map(|o| (o, &r.invoice)))
            .max_by_key(|(order, _)| *order);

        Ok(latest.and_then(|(_, invoice)| invoice.fingerprint().map(str::to_string)))
    }

    fn chain_records(&self, tenant_id: TenantId) -> Result<Vec<ChainRecord>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;

        let mut numbered: Vec<(u64, &Invoice)> = inner
            .rows
            .values()
            .filter(|r| r.invoice.tenant_id() == tenant_id)
            .filter_map(|r| r.issued_order.map(|o| (o, &r.invoice)))
            .collect();
        numbered.sort_by_key(|(order, _)| *order);

        numbered
            .into_iter()
            .map(|(_, invoice)| chain_record_of(invoice))
            .collect()
    }

    fn is_ledger_frozen(&self, tenant_id: TenantId) -> Result<bool, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;
        Ok(inner.frozen.contains(&tenant_id))
    }

    fn freeze_ledger(&self, tenant_id: TenantId) -> Result<(), StoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;
        inner.frozen.insert(tenant_id);
        Ok(())
    }
}
