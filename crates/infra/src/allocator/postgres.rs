//! Postgres-backed sequence allocator.
//!
//! One row per `(tenant_id, series, fiscal_year)` partition in the
//! `invoice_counters` table. Allocation is a single atomic upsert:
//!
//! ```sql
//! INSERT INTO invoice_counters (tenant_id, series, fiscal_year, last_sequence)
//! VALUES ($1, $2, $3, 1)
//! ON CONFLICT (tenant_id, series, fiscal_year)
//! DO UPDATE SET last_sequence = invoice_counters.last_sequence + 1
//! RETURNING last_sequence
//! ```
//!
//! The upsert takes the exclusive row lock for the remainder of the
//! transaction, so concurrent allocators on the same partition queue behind
//! it; `SET LOCAL lock_timeout` bounds that wait and SQLSTATE `55P03`
//! (lock_not_available) maps to `AllocationError::Timeout`. Upsert-with-lock
//! (not read-then-insert) also closes the race where two callers both see an
//! absent counter and both insert sequence 1.
//!
//! The counter transaction commits here, before the invoice row is written:
//! a caller that fails afterwards burns the allocated number. That burn is
//! logged by the issuance layer and the number is never recycled; a timeout
//! or storage failure inside this transaction consumes nothing.

use std::sync::Arc;
use std::time::Duration;

use sqlx::{PgPool, Row};
use tracing::instrument;

use fiscalio_core::TenantId;
use fiscalio_numbering::{
    AllocatedNumber, AllocationError, SequenceAllocator, Series, MAX_SEQUENCE,
};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Durable, cross-process gap-free allocator.
#[derive(Debug, Clone)]
pub struct PostgresSequenceAllocator {
    pool: Arc<PgPool>,
    lock_timeout: Duration,
}

impl PostgresSequenceAllocator {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Create the counter table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<(), AllocationError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS invoice_counters (
                tenant_id     UUID NOT NULL,
                series        TEXT NOT NULL,
                fiscal_year   INT  NOT NULL,
                last_sequence INT  NOT NULL,
                PRIMARY KEY (tenant_id, series, fiscal_year)
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| AllocationError::Storage(e.to_string()))?;
        Ok(())
    }

    #[instrument(
        skip(self),
        fields(
            tenant_id = %tenant_id.as_uuid(),
            series = %series,
            fiscal_year,
        ),
        err
    )]
    pub async fn allocate_next(
        &self,
        tenant_id: TenantId,
        series: &Series,
        fiscal_year: i32,
    ) -> Result<AllocatedNumber, AllocationError> {
        let timeout_ms = self.lock_timeout.as_millis();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AllocationError::Storage(e.to_string()))?;

        // lock_timeout cannot be bound as a parameter; the value is a number
        // we format ourselves, never caller input.
        sqlx::query(&format!("SET LOCAL lock_timeout = '{timeout_ms}ms'"))
            .execute(&mut *tx)
            .await
            .map_err(|e| AllocationError::Storage(e.to_string()))?;

        let row = sqlx::query(
            r#"
            INSERT INTO invoice_counters (tenant_id, series, fiscal_year, last_sequence)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (tenant_id, series, fiscal_year)
            DO UPDATE SET last_sequence = invoice_counters.last_sequence + 1
            RETURNING last_sequence
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(series.as_str())
        .bind(fiscal_year)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_lock_timeout(&e) {
                AllocationError::Timeout {
                    waited_ms: timeout_ms as u64,
                }
            } else {
                AllocationError::Storage(e.to_string())
            }
        })?;

        let sequence: i32 = row
            .try_get("last_sequence")
            .map_err(|e| AllocationError::Storage(e.to_string()))?;

        if sequence <= 0 || sequence as u32 > MAX_SEQUENCE {
            // Roll back so the out-of-range increment is not persisted.
            tx.rollback()
                .await
                .map_err(|e| AllocationError::Storage(e.to_string()))?;
            return Err(AllocationError::Exhausted {
                series: series.to_string(),
                year: fiscal_year,
            });
        }

        tx.commit()
            .await
            .map_err(|e| AllocationError::Storage(e.to_string()))?;

        AllocatedNumber::new(series.clone(), fiscal_year, sequence as u32)
            .map_err(|e| AllocationError::Storage(e.to_string()))
    }
}

impl SequenceAllocator for PostgresSequenceAllocator {
    fn allocate(
        &self,
        tenant_id: TenantId,
        series: &Series,
        fiscal_year: i32,
    ) -> Result<AllocatedNumber, AllocationError> {
        // We use tokio::runtime::Handle to run async code in a sync context.
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            AllocationError::Storage(
                "no tokio runtime available for database operations".to_string(),
            )
        })?;

        handle.block_on(self.allocate_next(tenant_id, series, fiscal_year))
    }
}

/// SQLSTATE 55P03: lock_not_available (lock_timeout expired).
fn is_lock_timeout(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("55P03"),
        _ => false,
    }
}
