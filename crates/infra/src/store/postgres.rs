//! Postgres-backed invoice store.
//!
//! One row per invoice: the full aggregate snapshot as JSONB plus the
//! integrity columns (number, fingerprints, issue date, fiscal totals,
//! issuance order) the predecessor lookup and the ledger walk query directly.
//!
//! ## Schema
//!
//! ```sql
//! CREATE TABLE invoices (
//!     invoice_id           UUID PRIMARY KEY,
//!     tenant_id            UUID NOT NULL,
//!     status               TEXT NOT NULL,
//!     number               TEXT,
//!     fingerprint          TEXT,
//!     previous_fingerprint TEXT,
//!     issue_date           DATE,
//!     taxable_base         NUMERIC(14, 2),
//!     tax_total            NUMERIC(14, 2),
//!     grand_total          NUMERIC(14, 2),
//!     client_tax_id        TEXT NOT NULL,
//!     issued_order         BIGINT,
//!     version              BIGINT NOT NULL,
//!     snapshot             JSONB NOT NULL,
//!     created_at           TIMESTAMPTZ NOT NULL,
//!     updated_at           TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//! CREATE UNIQUE INDEX invoices_tenant_issuance
//!     ON invoices (tenant_id, issued_order) WHERE issued_order IS NOT NULL;
//!
//! CREATE TABLE ledger_freezes (
//!     tenant_id UUID PRIMARY KEY,
//!     frozen_at TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//! ```
//!
//! ## Error Mapping
//!
//! SQLx errors are wrapped in `StoreError`, never leaked raw. A unique
//! violation (SQLSTATE 23505) on the issuance-order index means a concurrent
//! save won the ordinal and maps to `Conflict`.
//!
//! ## Thread Safety
//!
//! `PostgresInvoiceStore` is `Send + Sync`; all operations go through the
//! SQLx connection pool.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use tracing::{error, instrument};

use fiscalio_core::{AggregateRoot, ExpectedVersion, Money, TenantId};
use fiscalio_invoicing::{Invoice, InvoiceId, InvoiceSnapshot, InvoiceStatus};
use fiscalio_ledger::{ChainInput, ChainRecord};

use super::r#trait::{frozen_field_diff, InvoiceStore, StoreError};

/// Postgres-backed invoice store.
#[derive(Debug, Clone)]
pub struct PostgresInvoiceStore {
    pool: Arc<PgPool>,
}

impl PostgresInvoiceStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the invoice tables if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS invoices (
                invoice_id           UUID PRIMARY KEY,
                tenant_id            UUID NOT NULL,
                status               TEXT NOT NULL,
                number               TEXT,
                fingerprint          TEXT,
                previous_fingerprint TEXT,
                issue_date           DATE,
                taxable_base         NUMERIC(14, 2),
                tax_total            NUMERIC(14, 2),
                grand_total          NUMERIC(14, 2),
                client_tax_id        TEXT NOT NULL,
                issued_order         BIGINT,
                version              BIGINT NOT NULL,
                snapshot             JSONB NOT NULL,
                created_at           TIMESTAMPTZ NOT NULL,
                updated_at           TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_invoices", e))?;

        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS invoices_tenant_issuance
                ON invoices (tenant_id, issued_order) WHERE issued_order IS NOT NULL
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_issuance_index", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ledger_freezes (
                tenant_id UUID PRIMARY KEY,
                frozen_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_ledger_freezes", e))?;

        Ok(())
    }

    #[instrument(
        skip(self),
        fields(
            tenant_id = %tenant_id.as_uuid(),
            invoice_id = %invoice_id,
        ),
        err
    )]
    pub async fn load_invoice(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
    ) -> Result<Invoice, StoreError> {
        let row = sqlx::query("SELECT tenant_id, snapshot FROM invoices WHERE invoice_id = $1")
            .bind(invoice_id.0.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_invoice", e))?
            .ok_or(StoreError::NotFound)?;

        let row_tenant: uuid::Uuid = row
            .try_get("tenant_id")
            .map_err(|e| map_sqlx_error("load_invoice", e))?;
        if row_tenant != *tenant_id.as_uuid() {
            return Err(StoreError::TenantIsolation(format!(
                "invoice {invoice_id} does not belong to tenant {tenant_id}"
            )));
        }

        let snapshot: serde_json::Value = row
            .try_get("snapshot")
            .map_err(|e| map_sqlx_error("load_invoice", e))?;
        restore_snapshot(snapshot)
    }

    #[instrument(
        skip(self, invoice),
        fields(
            tenant_id = %invoice.tenant_id().as_uuid(),
            invoice_id = %invoice.id_typed(),
            expected_version = ?expected_version,
        ),
        err
    )]
    pub async fn save_invoice(
        &self,
        invoice: &Invoice,
        expected_version: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let snapshot = invoice.snapshot();
        snapshot
            .validate()
            .map_err(|e| StoreError::InvalidPersist(e.to_string()))?;
        let payload = serde_json::to_value(&snapshot)
            .map_err(|e| StoreError::InvalidPersist(format!("snapshot serialization: {e}")))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let existing = sqlx::query(
            r#"
            SELECT tenant_id, status, issued_order, version, snapshot
            FROM invoices
            WHERE invoice_id = $1
            FOR UPDATE
            "#,
        )
        .bind(invoice.id_typed().0.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("save_select", e))?;

        let issued_order = match existing {
            None => {
                if !expected_version.matches(0) {
                    return Err(StoreError::Conflict(format!(
                        "expected {expected_version:?}, found no stored row"
                    )));
                }
                None
            }
            Some(row) => {
                let row_tenant: uuid::Uuid = row
                    .try_get("tenant_id")
                    .map_err(|e| map_sqlx_error("save_select", e))?;
                if row_tenant != *invoice.tenant_id().as_uuid() {
                    return Err(StoreError::TenantIsolation(format!(
                        "invoice {} does not belong to tenant {}",
                        invoice.id_typed(),
                        invoice.tenant_id()
                    )));
                }

                let current: i64 = row
                    .try_get("version")
                    .map_err(|e| map_sqlx_error("save_select", e))?;
                if !expected_version.matches(current as u64) {
                    return Err(StoreError::Conflict(format!(
                        "expected {expected_version:?}, found {current}"
                    )));
                }

                let status: String = row
                    .try_get("status")
                    .map_err(|e| map_sqlx_error("save_select", e))?;
                if status != "draft" {
                    let stored: serde_json::Value = row
                        .try_get("snapshot")
                        .map_err(|e| map_sqlx_error("save_select", e))?;
                    let stored = restore_snapshot(stored)?;
                    if let Some(field) = frozen_field_diff(&stored, invoice) {
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

                row.try_get::<Option<i64>, _>("issued_order")
                    .map_err(|e| map_sqlx_error("save_select", e))?
            }
        };

        // First save in a numbered state claims the next issuance ordinal;
        // the unique partial index backstops concurrent claimants.
        let issued_order: Option<i64> = match issued_order {
            Some(order) => Some(order),
            None if invoice.is_numbered() => {
                let next: i64 = sqlx::query(
                    "SELECT COALESCE(MAX(issued_order), 0) + 1 AS next FROM invoices WHERE tenant_id = $1",
                )
                .bind(invoice.tenant_id().as_uuid())
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("save_issuance_order", e))?
                .try_get("next")
                .map_err(|e| map_sqlx_error("save_issuance_order", e))?;
                Some(next)
            }
            None => None,
        };

        let totals = if invoice.is_numbered() {
            Some(
                invoice
                    .totals()
                    .map_err(|e| StoreError::InvalidPersist(e.to_string()))?,
            )
        } else {
            None
        };

        sqlx::query(
            r#"
            INSERT INTO invoices (
                invoice_id, tenant_id, status, number, fingerprint,
                previous_fingerprint, issue_date, taxable_base, tax_total,
                grand_total, client_tax_id, issued_order, version, snapshot,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, now())
            ON CONFLICT (invoice_id) DO UPDATE SET
                status = EXCLUDED.status,
                number = EXCLUDED.number,
                fingerprint = EXCLUDED.fingerprint,
                previous_fingerprint = EXCLUDED.previous_fingerprint,
                issue_date = EXCLUDED.issue_date,
                taxable_base = EXCLUDED.taxable_base,
                tax_total = EXCLUDED.tax_total,
                grand_total = EXCLUDED.grand_total,
                issued_order = EXCLUDED.issued_order,
                version = EXCLUDED.version,
                snapshot = EXCLUDED.snapshot,
                updated_at = now()
            "#,
        )
        .bind(invoice.id_typed().0.as_uuid())
        .bind(invoice.tenant_id().as_uuid())
        .bind(status_label(invoice.status()))
        .bind(invoice.number().map(|n| n.to_string()))
        .bind(invoice.fingerprint())
        .bind(invoice.previous_fingerprint())
        .bind(invoice.issue_date())
        .bind(totals.as_ref().map(|t| t.base_total.amount()))
        .bind(totals.as_ref().map(|t| t.tax_total.amount()))
        .bind(totals.as_ref().map(|t| t.grand_total.amount()))
        .bind(invoice.client_tax_id())
        .bind(issued_order)
        .bind(invoice.version() as i64)
        .bind(&payload)
        .bind(invoice.created_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict("concurrent issuance-order claim detected".to_string())
            } else {
                map_sqlx_error("save_upsert", e)
            }
        })?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid()), err)]
    pub async fn latest_tenant_fingerprint(
        &self,
        tenant_id: TenantId,
    ) -> Result<Option<String>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT fingerprint
            FROM invoices
            WHERE tenant_id = $1 AND issued_order IS NOT NULL
            ORDER BY issued_order DESC
            LIMIT 1
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("latest_fingerprint", e))?;

        match row {
            None => Ok(None),
            Some(row) => row
                .try_get("fingerprint")
                .map_err(|e| map_sqlx_error("latest_fingerprint", e)),
        }
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid()), err)]
    pub async fn tenant_chain_records(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<ChainRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT number, issue_date, taxable_base, tax_total, grand_total,
                   client_tax_id, fingerprint, previous_fingerprint
            FROM invoices
            WHERE tenant_id = $1 AND issued_order IS NOT NULL
            ORDER BY issued_order ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("chain_records", e))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(chain_record_from_row(tenant_id, &row)?);
        }
        Ok(records)
    }

    pub async fn tenant_ledger_frozen(&self, tenant_id: TenantId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM ledger_freezes WHERE tenant_id = $1) AS frozen")
            .bind(tenant_id.as_uuid())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("is_ledger_frozen", e))?;
        row.try_get("frozen")
            .map_err(|e| map_sqlx_error("is_ledger_frozen", e))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid()), err)]
    pub async fn freeze_tenant_ledger(&self, tenant_id: TenantId) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO ledger_freezes (tenant_id) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(tenant_id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("freeze_ledger", e))?;
        Ok(())
    }
}

impl InvoiceStore for PostgresInvoiceStore {
    fn load(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> Result<Invoice, StoreError> {
        // We use tokio::runtime::Handle to run async code in a sync context.
        block_on(self.load_invoice(tenant_id, invoice_id))
    }

    fn save(
        &self,
        invoice: &Invoice,
        expected_version: ExpectedVersion,
    ) -> Result<(), StoreError> {
        block_on(self.save_invoice(invoice, expected_version))
    }

    fn latest_fingerprint(&self, tenant_id: TenantId) -> Result<Option<String>, StoreError> {
        block_on(self.latest_tenant_fingerprint(tenant_id))
    }

    fn chain_records(&self, tenant_id: TenantId) -> Result<Vec<ChainRecord>, StoreError> {
        block_on(self.tenant_chain_records(tenant_id))
    }

    fn is_ledger_frozen(&self, tenant_id: TenantId) -> Result<bool, StoreError> {
        block_on(self.tenant_ledger_frozen(tenant_id))
    }

    fn freeze_ledger(&self, tenant_id: TenantId) -> Result<(), StoreError> {
        block_on(self.freeze_tenant_ledger(tenant_id))
    }
}

fn block_on<F, T>(future: F) -> Result<T, StoreError>
where
    F: std::future::Future<Output = Result<T, StoreError>>,
{
    let handle = tokio::runtime::Handle::try_current().map_err(|_| {
        StoreError::Storage("no tokio runtime available for database operations".to_string())
    })?;
    handle.block_on(future)
}

fn status_label(status: InvoiceStatus) -> &'static str {
    match status {
        InvoiceStatus::Draft => "draft",
        InvoiceStatus::Issued => "issued",
        InvoiceStatus::Paid => "paid",
        InvoiceStatus::Void => "void",
    }
}

fn restore_snapshot(value: serde_json::Value) -> Result<Invoice, StoreError> {
    let snapshot: InvoiceSnapshot = serde_json::from_value(value)
        .map_err(|e| StoreError::InvalidPersist(format!("snapshot deserialization: {e}")))?;
    Invoice::restore(snapshot).map_err(|e| StoreError::InvalidPersist(e.to_string()))
}

fn chain_record_from_row(
    tenant_id: TenantId,
    row: &sqlx::postgres::PgRow,
) -> Result<ChainRecord, StoreError> {
    let get = |e: sqlx::Error| map_sqlx_error("chain_record_row", e);

    let number: String = row.try_get("number").map_err(get)?;
    let issue_date: NaiveDate = row.try_get("issue_date").map_err(get)?;
    let taxable_base: Decimal = row.try_get("taxable_base").map_err(get)?;
    let tax_total: Decimal = row.try_get("tax_total").map_err(get)?;
    let grand_total: Decimal = row.try_get("grand_total").map_err(get)?;
    let client_tax_id: String = row.try_get("client_tax_id").map_err(get)?;
    let fingerprint: String = row.try_get("fingerprint").map_err(get)?;
    let previous_fingerprint: Option<String> =
        row.try_get("previous_fingerprint").map_err(get)?;

    Ok(ChainRecord {
        input: ChainInput {
            tenant_id,
            number,
            issue_date,
            taxable_base: Money::new(taxable_base),
            tax_total: Money::new(tax_total),
            grand_total: Money::new(grand_total),
            client_tax_id,
        },
        fingerprint,
        previous_fingerprint,
    })
}

/// SQLSTATE 23505: unique constraint violation.
fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

fn map_sqlx_error(operation: &str, error: sqlx::Error) -> StoreError {
    StoreError::Storage(format!("{operation}: {error}"))
}
