//! Domain error model.

use thiserror::Error;

use crate::id::{InvoiceId, TimeEntryId};
use crate::money::{CurrencyCode, Money};

/// Result type used across the billing domain.
pub type BillingResult<T> = Result<T, BillingError>;

/// Billing-domain error.
///
/// Keep this focused on deterministic business failures. Nothing here is
/// retried internally; transient failures belong to the storage collaborator.
/// State errors carry the current persisted state so a caller can decide the
/// next action without re-fetching.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BillingError {
    /// Arithmetic or comparison across two different currencies.
    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch {
        left: CurrencyCode,
        right: CurrencyCode,
    },

    /// A payment amount was zero or negative.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// A supplied line-item total does not equal quantity x unit price
    /// rounded to currency scale.
    #[error("line item total mismatch: expected {expected}, got {supplied}")]
    LineItemTotalMismatch { expected: Money, supplied: Money },

    /// Two line items on one invoice reference the same time entry.
    #[error("time entry {0} is already billed by another line item on this invoice")]
    DuplicateTimeEntryReference(TimeEntryId),

    /// Cancelling an invoice that is already cancelled.
    #[error("invoice {0} is already cancelled")]
    AlreadyCancelled(InvoiceId),

    /// Recording a payment against a cancelled invoice.
    #[error("invoice {0} is cancelled and accepts no further payments")]
    InvoiceCancelled(InvoiceId),

    /// Correcting a draft or cancelled invoice.
    #[error("invoice {invoice_id} cannot be corrected while {status}")]
    NotCorrectable {
        invoice_id: InvoiceId,
        status: String,
    },

    /// Deleting an invoice that has payments or has left draft.
    #[error("invoice {invoice_id} has dependents ({payments} payment(s)) and cannot be deleted")]
    InvoiceHasDependents {
        invoice_id: InvoiceId,
        payments: usize,
    },

    /// Replacing line items on an issued invoice without a correction.
    #[error("invoice {0} has been issued; replace items through a correction")]
    ItemsLockedAfterIssue(InvoiceId),

    /// Invoice generation could not resolve exactly one client.
    #[error("could not resolve a single client: {0}")]
    AmbiguousClient(String),

    /// Invoice generation selected no billable time entries.
    #[error("no billable time entries matched the filter")]
    NoBillableEntries,

    /// Strict proposed-payment validation projected an overbilled invoice.
    #[error("payment would overbill the invoice (projected balance {projected_balance})")]
    PaymentWouldOverbill { projected_balance: Money },

    /// A value failed validation (malformed or internally inconsistent input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced entity does not exist (stale caller state).
    #[error("not found")]
    NotFound,
}

/// Coarse error classification for transports and retry policy.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller-fixable input problem; never retried.
    Validation,
    /// Illegal transition given current persisted state.
    State,
    /// Entity missing; caller state is stale.
    NotFound,
}

impl BillingError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_amount(msg: impl Into<String>) -> Self {
        Self::InvalidAmount(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::CurrencyMismatch { .. }
            | Self::InvalidAmount(_)
            | Self::LineItemTotalMismatch { .. }
            | Self::DuplicateTimeEntryReference(_)
            | Self::AmbiguousClient(_)
            | Self::NoBillableEntries
            | Self::Validation(_) => ErrorCategory::Validation,
            Self::AlreadyCancelled(_)
            | Self::InvoiceCancelled(_)
            | Self::NotCorrectable { .. }
            | Self::InvoiceHasDependents { .. }
            | Self::ItemsLockedAfterIssue(_)
            | Self::PaymentWouldOverbill { .. } => ErrorCategory::State,
            Self::NotFound => ErrorCategory::NotFound,
        }
    }
}
