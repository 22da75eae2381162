//! Persistence projection of the invoice aggregate.
//!
//! `InvoiceSnapshot` is the plain serializable record adapters read and
//! write; the aggregate itself carries no serialization or presentation
//! concerns. `restore` re-validates the structural invariants, which is what
//! lets a store reject rows (or save attempts) that claim an impossible
//! state, e.g. issued without a number.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use fiscalio_core::{DomainError, DomainResult, Percentage, TenantId, UserId};
use fiscalio_numbering::{DocumentNumber, Series};

use crate::invoice::{ClientId, Invoice, InvoiceId, InvoiceLine, InvoiceStatus, RepairOrderId};

/// Plain data record of an invoice's full state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSnapshot {
    pub id: InvoiceId,
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub client_tax_id: String,
    pub source_order_id: Option<RepairOrderId>,
    pub series: Series,
    pub number: Option<DocumentNumber>,
    pub status: InvoiceStatus,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub lines: Vec<InvoiceLine>,
    pub next_line_no: u32,
    pub withholding_percent: Percentage,
    pub fingerprint: Option<String>,
    pub previous_fingerprint: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: UserId,
    pub issued_by: Option<UserId>,
    pub issued_at: Option<DateTime<Utc>>,
    pub paid_by: Option<UserId>,
    pub paid_at: Option<DateTime<Utc>>,
    pub voided_by: Option<UserId>,
    pub voided_at: Option<DateTime<Utc>>,
    pub void_reason: Option<String>,
    pub version: u64,
}

impl InvoiceSnapshot {
    /// Check the structural invariants a stored invoice must satisfy.
    pub fn validate(&self) -> DomainResult<()> {
        if self.client_tax_id.trim().is_empty() {
            return Err(DomainError::invariant("client tax id must not be empty"));
        }
        if self.version == 0 {
            return Err(DomainError::invariant("version must be at least 1"));
        }
        if let Some(max) = self.lines.iter().map(|l| l.line_no).max() {
            if self.next_line_no <= max {
                return Err(DomainError::invariant(
                    "next_line_no must exceed every line ordinal",
                ));
            }
        }

        match self.status {
            InvoiceStatus::Draft => {
                if self.number.is_some() || self.fingerprint.is_some() {
                    return Err(DomainError::invariant(
                        "a draft must not carry a number or fingerprint",
                    ));
                }
                if self.issue_date.is_some() || self.issued_by.is_some() {
                    return Err(DomainError::invariant(
                        "a draft must not carry issuance audit fields",
                    ));
                }
            }
            InvoiceStatus::Issued | InvoiceStatus::Paid | InvoiceStatus::Void => {
                if self.number.is_none() {
                    return Err(DomainError::invariant(format!(
                        "a {:?} invoice must carry a number",
                        self.status
                    )));
                }
                if self.fingerprint.is_none() {
                    return Err(DomainError::invariant(format!(
                        "a {:?} invoice must carry a fingerprint",
                        self.status
                    )));
                }
                if self.issue_date.is_none() || self.issued_by.is_none() {
                    return Err(DomainError::invariant(
                        "a numbered invoice must carry issuance audit fields",
                    ));
                }
                if self.lines.is_empty() {
                    return Err(DomainError::invariant(
                        "a numbered invoice must have lines",
                    ));
                }
            }
        }

        if self.status == InvoiceStatus::Paid && (self.paid_by.is_none() || self.paid_at.is_none())
        {
            return Err(DomainError::invariant(
                "a paid invoice must carry payment audit fields",
            ));
        }
        if self.status == InvoiceStatus::Void {
            let reason_ok = self
                .void_reason
                .as_deref()
                .is_some_and(|r| !r.trim().is_empty());
            if !reason_ok || self.voided_by.is_none() {
                return Err(DomainError::invariant(
                    "a void invoice must carry a reason and the voiding actor",
                ));
            }
        }

        Ok(())
    }
}

impl Invoice {
    /// Project the aggregate into its persistence record.
    pub fn snapshot(&self) -> InvoiceSnapshot {
        InvoiceSnapshot {
            id: self.id,
            tenant_id: self.tenant_id,
            client_id: self.client_id,
            client_tax_id: self.client_tax_id.clone(),
            source_order_id: self.source_order_id,
            series: self.series.clone(),
            number: self.number.clone(),
            status: self.status,
            issue_date: self.issue_date,
            due_date: self.due_date,
            lines: self.lines.clone(),
            next_line_no: self.next_line_no,
            withholding_percent: self.withholding_percent,
            fingerprint: self.fingerprint.clone(),
            previous_fingerprint: self.previous_fingerprint.clone(),
            created_at: self.created_at,
            created_by: self.created_by,
            issued_by: self.issued_by,
            issued_at: self.issued_at,
            paid_by: self.paid_by,
            paid_at: self.paid_at,
            voided_by: self.voided_by,
            voided_at: self.voided_at,
            void_reason: self.void_reason.clone(),
            version: self.version,
        }
    }

    /// Rehydrate an aggregate from its persistence record, rejecting
    /// structurally invalid state.
    pub fn restore(snapshot: InvoiceSnapshot) -> DomainResult<Invoice> {
        snapshot.validate()?;

        Ok(Invoice {
            id: snapshot.id,
            tenant_id: snapshot.tenant_id,
            client_id: snapshot.client_id,
            client_tax_id: snapshot.client_tax_id,
            source_order_id: snapshot.source_order_id,
            series: snapshot.series,
            number: snapshot.number,
            status: snapshot.status,
            issue_date: snapshot.issue_date,
            due_date: snapshot.due_date,
            lines: snapshot.lines,
            next_line_no: snapshot.next_line_no,
            withholding_percent: snapshot.withholding_percent,
            fingerprint: snapshot.fingerprint,
            previous_fingerprint: snapshot.previous_fingerprint,
            created_at: snapshot.created_at,
            created_by: snapshot.created_by,
            issued_by: snapshot.issued_by,
            issued_at: snapshot.issued_at,
            paid_by: snapshot.paid_by,
            paid_at: snapshot.paid_at,
            voided_by: snapshot.voided_by,
            voided_at: snapshot.voided_at,
            void_reason: snapshot.void_reason,
            version: snapshot.version,
        })
    }
}
