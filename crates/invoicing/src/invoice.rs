//! Invoice entity and lifecycle state machine.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use billbook_core::{
    AccountId, BillingError, BillingResult, ClientId, Currency, Entity, InvoiceId, Money,
    ProjectId,
};

use crate::correction::InvoiceSnapshot;
use crate::line_items::LineItem;
use crate::numbering::{InvoiceNumber, NumberSequence};

/// Persisted invoice statuses.
///
/// Only the caller-driven states are stored. Paid / partially-paid / overdue
/// are projections computed by the billing validator at read time, so payment
/// state and stored status cannot diverge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input for creating a draft invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInvoice {
    pub account_id: AccountId,
    pub client_id: ClientId,
    pub project_id: Option<ProjectId>,
    pub currency: Currency,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    /// Opaque rate supplied by tax master data, e.g. 0.19.
    pub tax_rate: Decimal,
    pub exclude_from_tax: bool,
    pub notes: Option<String>,
}

/// Entity root: Invoice.
///
/// Monetary fields (`sub_total`, `tax_amount`, `total_amount`) are derived
/// exclusively by the line-item ledger recomputation; nothing else writes
/// them. Mutations bump `version` so the storage layer can apply optimistic
/// locking for the single-writer-per-invoice contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub(crate) id: InvoiceId,
    pub(crate) account_id: AccountId,
    pub(crate) client_id: ClientId,
    pub(crate) project_id: Option<ProjectId>,
    pub(crate) number: InvoiceNumber,
    pub(crate) status: InvoiceStatus,
    pub(crate) issue_date: NaiveDate,
    pub(crate) due_date: NaiveDate,
    pub(crate) currency: Currency,
    pub(crate) tax_rate: Decimal,
    pub(crate) exclude_from_tax: bool,
    pub(crate) notes: Option<String>,
    pub(crate) items: Vec<LineItem>,
    pub(crate) sub_total: Money,
    pub(crate) tax_amount: Money,
    pub(crate) total_amount: Money,
    pub(crate) correction_of: Option<InvoiceId>,
    pub(crate) corrected_by: Option<InvoiceId>,
    pub(crate) correction_reason: Option<String>,
    pub(crate) correction_date: Option<DateTime<Utc>>,
    pub(crate) original_snapshot: Option<InvoiceSnapshot>,
    pub(crate) version: u64,
}

impl Invoice {
    /// Create a draft invoice with no items.
    ///
    /// The invoice number is assigned here, exactly once, from the
    /// issue-date prefix and the per-account sequence. It is never
    /// regenerated.
    pub fn draft(new: NewInvoice, sequence: &mut dyn NumberSequence) -> BillingResult<Invoice> {
        if new.due_date < new.issue_date {
            return Err(BillingError::validation(format!(
                "due date {} precedes issue date {}",
                new.due_date, new.issue_date
            )));
        }
        if new.tax_rate.is_sign_negative() {
            return Err(BillingError::validation("tax rate must be non-negative"));
        }

        let number = InvoiceNumber::assign(new.issue_date, sequence.next(new.account_id)?);
        let zero = Money::zero(new.currency);

        Ok(Invoice {
            id: InvoiceId::new(),
            account_id: new.account_id,
            client_id: new.client_id,
            project_id: new.project_id,
            number,
            status: InvoiceStatus::Draft,
            issue_date: new.issue_date,
            due_date: new.due_date,
            currency: new.currency,
            tax_rate: new.tax_rate,
            exclude_from_tax: new.exclude_from_tax,
            notes: new.notes,
            items: Vec::new(),
            sub_total: zero,
            tax_amount: zero,
            total_amount: zero,
            correction_of: None,
            corrected_by: None,
            correction_reason: None,
            correction_date: None,
            original_snapshot: None,
            version: 0,
        })
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn project_id(&self) -> Option<ProjectId> {
        self.project_id
    }

    pub fn number(&self) -> &InvoiceNumber {
        &self.number
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn issue_date(&self) -> NaiveDate {
        self.issue_date
    }

    pub fn due_date(&self) -> NaiveDate {
        self.due_date
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn tax_rate(&self) -> Decimal {
        self.tax_rate
    }

    pub fn exclude_from_tax(&self) -> bool {
        self.exclude_from_tax
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn sub_total(&self) -> Money {
        self.sub_total
    }

    pub fn tax_amount(&self) -> Money {
        self.tax_amount
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn correction_of(&self) -> Option<InvoiceId> {
        self.correction_of
    }

    pub fn corrected_by(&self) -> Option<InvoiceId> {
        self.corrected_by
    }

    pub fn correction_reason(&self) -> Option<&str> {
        self.correction_reason.as_deref()
    }

    pub fn correction_date(&self) -> Option<DateTime<Utc>> {
        self.correction_date
    }

    pub fn original_snapshot(&self) -> Option<&InvoiceSnapshot> {
        self.original_snapshot.as_ref()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_draft(&self) -> bool {
        self.status == InvoiceStatus::Draft
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == InvoiceStatus::Cancelled
    }

    /// Draft -> Sent. Issuing locks the line items; further changes go
    /// through a correction.
    pub fn mark_sent(&mut self) -> BillingResult<()> {
        match self.status {
            InvoiceStatus::Draft => {
                self.status = InvoiceStatus::Sent;
                self.bump_version();
                Ok(())
            }
            InvoiceStatus::Sent => Err(BillingError::validation(format!(
                "invoice {} is already sent",
                self.id
            ))),
            InvoiceStatus::Cancelled => Err(BillingError::AlreadyCancelled(self.id)),
        }
    }

    /// Cancel from any non-cancelled status.
    ///
    /// Cancelling twice is an explicit error, not a no-op: the second call
    /// indicates the caller is acting on stale state.
    pub fn cancel(&mut self) -> BillingResult<()> {
        if self.status == InvoiceStatus::Cancelled {
            return Err(BillingError::AlreadyCancelled(self.id));
        }
        self.status = InvoiceStatus::Cancelled;
        self.bump_version();
        Ok(())
    }

    /// Deletion guard: legal only while draft and without payments.
    ///
    /// The delete itself belongs to the storage collaborator; this is the
    /// legality check it must consult first.
    pub fn assert_deletable(&self, payment_count: usize) -> BillingResult<()> {
        if self.status != InvoiceStatus::Draft || payment_count > 0 {
            return Err(BillingError::InvoiceHasDependents {
                invoice_id: self.id,
                payments: payment_count,
            });
        }
        Ok(())
    }

    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }
}

impl Entity for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
