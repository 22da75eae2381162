//! The invoice aggregate root and its lifecycle state machine.
//!
//! Lifecycle: `Draft -> Issued -> Paid`, with `Issued -> Void` as the only
//! other exit. No edge returns to an earlier state and no operation ever
//! deletes a document. While `Draft`, lines are freely mutable; issuance
//! freezes lines, number and integrity fields permanently.
//!
//! The aggregate performs no IO. Number allocation and fingerprint
//! computation happen outside and arrive as an [`IssuanceGrant`]; the
//! orchestration of both within one atomic unit of work lives in the
//! infrastructure layer.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use fiscalio_core::{
    AggregateId, AggregateRoot, DomainError, DomainResult, Percentage, TenantId, UserId,
};
use fiscalio_numbering::{DocumentNumber, Series};

use crate::line::LineItem;
use crate::totals::{invoice_totals, InvoiceTotals};

/// Invoice identifier (tenant-scoped through the store).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub AggregateId);

impl InvoiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Client identifier (owned by the surrounding CRM, opaque here).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub AggregateId);

impl ClientId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ClientId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Repair-order identifier: the workshop order an invoice bills, if any.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepairOrderId(pub AggregateId);

impl RepairOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for RepairOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Invoice status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Issued,
    Paid,
    Void,
}

/// A line with its position inside the invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub line_no: u32,
    pub item: LineItem,
}

/// Parameters for opening a draft.
#[derive(Debug, Clone)]
pub struct DraftInvoice {
    pub id: InvoiceId,
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub client_tax_id: String,
    pub source_order_id: Option<RepairOrderId>,
    pub series: Series,
    pub due_date: Option<NaiveDate>,
    pub withholding_percent: Percentage,
    pub lines: Vec<LineItem>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// The irreversible side effects of an issuance, prepared outside the
/// aggregate: allocated number, computed fingerprint, predecessor link.
#[derive(Debug, Clone)]
pub struct IssuanceGrant {
    pub number: DocumentNumber,
    pub fingerprint: String,
    pub previous_fingerprint: Option<String>,
    pub issue_date: NaiveDate,
    pub issued_by: UserId,
    pub issued_at: DateTime<Utc>,
}

/// Aggregate root: Invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    pub(crate) id: InvoiceId,
    pub(crate) tenant_id: TenantId,
    pub(crate) client_id: ClientId,
    pub(crate) client_tax_id: String,
    pub(crate) source_order_id: Option<RepairOrderId>,
    pub(crate) series: Series,
    pub(crate) number: Option<DocumentNumber>,
    pub(crate) status: InvoiceStatus,
    pub(crate) issue_date: Option<NaiveDate>,
    pub(crate) due_date: Option<NaiveDate>,
    pub(crate) lines: Vec<InvoiceLine>,
    pub(crate) next_line_no: u32,
    pub(crate) withholding_percent: Percentage,
    pub(crate) fingerprint: Option<String>,
    pub(crate) previous_fingerprint: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) created_by: UserId,
    pub(crate) issued_by: Option<UserId>,
    pub(crate) issued_at: Option<DateTime<Utc>>,
    pub(crate) paid_by: Option<UserId>,
    pub(crate) paid_at: Option<DateTime<Utc>>,
    pub(crate) voided_by: Option<UserId>,
    pub(crate) voided_at: Option<DateTime<Utc>>,
    pub(crate) void_reason: Option<String>,
    pub(crate) version: u64,
}

impl Invoice {
    /// Open a new draft. Lines may be empty at creation; they are required
    /// only at issuance.
    pub fn create_draft(draft: DraftInvoice) -> DomainResult<Invoice> {
        if draft.client_tax_id.trim().is_empty() {
            return Err(DomainError::validation("client tax id must not be empty"));
        }

        let mut lines = Vec::with_capacity(draft.lines.len());
        for (idx, item) in draft.lines.into_iter().enumerate() {
            lines.push(InvoiceLine {
                line_no: idx as u32 + 1,
                item,
            });
        }
        let next_line_no = lines.len() as u32 + 1;

        Ok(Invoice {
            id: draft.id,
            tenant_id: draft.tenant_id,
            client_id: draft.client_id,
            client_tax_id: draft.client_tax_id,
            source_order_id: draft.source_order_id,
            series: draft.series,
            number: None,
            status: InvoiceStatus::Draft,
            issue_date: None,
            due_date: draft.due_date,
            lines,
            next_line_no,
            withholding_percent: draft.withholding_percent,
            fingerprint: None,
            previous_fingerprint: None,
            created_at: draft.created_at,
            created_by: draft.created_by,
            issued_by: None,
            issued_at: None,
            paid_by: None,
            paid_at: None,
            voided_by: None,
            voided_at: None,
            void_reason: None,
            version: 1,
        })
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn client_tax_id(&self) -> &str {
        &self.client_tax_id
    }

    pub fn source_order_id(&self) -> Option<RepairOrderId> {
        self.source_order_id
    }

    pub fn series(&self) -> &Series {
        &self.series
    }

    pub fn number(&self) -> Option<&DocumentNumber> {
        self.number.as_ref()
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn issue_date(&self) -> Option<NaiveDate> {
        self.issue_date
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn lines(&self) -> &[InvoiceLine] {
        &self.lines
    }

    pub fn withholding_percent(&self) -> Percentage {
        self.withholding_percent
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    pub fn previous_fingerprint(&self) -> Option<&str> {
        self.previous_fingerprint.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn created_by(&self) -> UserId {
        self.created_by
    }

    pub fn issued_by(&self) -> Option<UserId> {
        self.issued_by
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    pub fn paid_by(&self) -> Option<UserId> {
        self.paid_by
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    pub fn voided_by(&self) -> Option<UserId> {
        self.voided_by
    }

    pub fn voided_at(&self) -> Option<DateTime<Utc>> {
        self.voided_at
    }

    pub fn void_reason(&self) -> Option<&str> {
        self.void_reason.as_deref()
    }

    /// Lines are mutable only while the document is a draft.
    pub fn is_modifiable(&self) -> bool {
        self.status == InvoiceStatus::Draft
    }

    /// Whether the document already carries a fiscal number.
    pub fn is_numbered(&self) -> bool {
        self.number.is_some()
    }

    /// Roll up the invoice totals from its current lines.
    pub fn totals(&self) -> DomainResult<InvoiceTotals> {
        let items: Vec<LineItem> = self.lines.iter().map(|l| l.item.clone()).collect();
        invoice_totals(&items, self.withholding_percent)
    }

    fn ensure_draft(&self, operation: &str) -> DomainResult<()> {
        if self.status != InvoiceStatus::Draft {
            return Err(DomainError::invalid_state(format!(
                "{operation} requires a draft invoice, status is {:?}",
                self.status
            )));
        }
        Ok(())
    }

    /// Append a line. Draft only.
    pub fn add_line(&mut self, item: LineItem) -> DomainResult<u32> {
        self.ensure_draft("add_line")?;

        let line_no = self.next_line_no;
        self.lines.push(InvoiceLine { line_no, item });
        self.next_line_no += 1;
        self.version += 1;
        Ok(line_no)
    }

    /// Replace the line at `line_no`. Draft only.
    pub fn edit_line(&mut self, line_no: u32, item: LineItem) -> DomainResult<()> {
        self.ensure_draft("edit_line")?;

        let line = self
            .lines
            .iter_mut()
            .find(|l| l.line_no == line_no)
            .ok_or(DomainError::NotFound)?;
        line.item = item;
        self.version += 1;
        Ok(())
    }

    /// Remove the line at `line_no`. Draft only. Removed ordinals are not
    /// reused.
    pub fn remove_line(&mut self, line_no: u32) -> DomainResult<()> {
        self.ensure_draft("remove_line")?;

        let idx = self
            .lines
            .iter()
            .position(|l| l.line_no == line_no)
            .ok_or(DomainError::NotFound)?;
        self.lines.remove(idx);
        self.version += 1;
        Ok(())
    }

    /// Check every issuance precondition without mutating.
    pub fn can_issue(&self) -> DomainResult<()> {
        if self.number.is_some() {
            return Err(DomainError::immutability(
                "document number already assigned",
            ));
        }
        self.ensure_draft("issue")?;
        if self.lines.is_empty() {
            return Err(DomainError::validation(
                "cannot issue an invoice without lines",
            ));
        }
        Ok(())
    }

    /// Apply the irreversible issuance effects: number, fingerprint,
    /// predecessor link, status and audit trail, all together.
    pub fn issue(&mut self, grant: IssuanceGrant) -> DomainResult<()> {
        self.can_issue()?;

        if grant.fingerprint.trim().is_empty() {
            return Err(DomainError::validation("fingerprint must not be empty"));
        }
        if let Some(series) = grant.number.series() {
            if series != &self.series {
                return Err(DomainError::invariant(format!(
                    "allocated series {series} does not match draft series {}",
                    self.series
                )));
            }
        }

        self.number = Some(grant.number);
        self.fingerprint = Some(grant.fingerprint);
        self.previous_fingerprint = grant.previous_fingerprint;
        self.issue_date = Some(grant.issue_date);
        self.issued_by = Some(grant.issued_by);
        self.issued_at = Some(grant.issued_at);
        self.status = InvoiceStatus::Issued;
        self.version += 1;
        Ok(())
    }

    /// Record payment. Re-invoking on an already paid invoice is a no-op
    /// success; the original payment audit trail is kept.
    pub fn mark_paid(&mut self, user_id: UserId, at: DateTime<Utc>) -> DomainResult<()> {
        match self.status {
            InvoiceStatus::Paid => Ok(()),
            InvoiceStatus::Issued => {
                self.status = InvoiceStatus::Paid;
                self.paid_by = Some(user_id);
                self.paid_at = Some(at);
                self.version += 1;
                Ok(())
            }
            InvoiceStatus::Draft => Err(DomainError::invalid_state(
                "cannot mark a draft invoice as paid",
            )),
            InvoiceStatus::Void => Err(DomainError::invalid_state(
                "cannot mark a void invoice as paid",
            )),
        }
    }

    /// Void an issued invoice. The document, its number and its fingerprint
    /// remain on record permanently; voiding is an annotation, not a removal.
    pub fn void(
        &mut self,
        reason: impl Into<String>,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(DomainError::validation("void reason must not be empty"));
        }

        match self.status {
            InvoiceStatus::Issued => {
                self.status = InvoiceStatus::Void;
                self.void_reason = Some(reason);
                self.voided_by = Some(user_id);
                self.voided_at = Some(at);
                self.version += 1;
                Ok(())
            }
            InvoiceStatus::Draft => Err(DomainError::invalid_state(
                "a draft invoice is discarded, never voided",
            )),
            InvoiceStatus::Paid => Err(DomainError::invalid_state(
                "a paid invoice requires a rectification document, not a void",
            )),
            InvoiceStatus::Void => Err(DomainError::conflict("invoice is already void")),
        }
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
