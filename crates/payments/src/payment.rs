//! Append-only payment ledger.
//!
//! Payments are never mutated or deleted; a wrong payment is corrected by a
//! new refund row. Two aggregates are derived per invoice: the raw
//! reconciliation total and the tax-relevant total.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use billbook_core::{
    BillingError, BillingResult, ClientId, Entity, InvoiceId, Money, PaymentId,
};
use billbook_invoicing::Invoice;

/// Transaction classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentKind {
    Payment,
    Refund,
    Expense,
}

/// One recorded transaction.
///
/// A payment without an `invoice_id` is an unattributed client transaction
/// and never enters invoice reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub invoice_id: Option<InvoiceId>,
    pub client_id: Option<ClientId>,
    pub amount: Money,
    pub kind: PaymentKind,
    pub payment_date: NaiveDate,
    pub exclude_from_tax: bool,
    pub note: Option<String>,
}

impl Entity for Payment {
    type Id = PaymentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Input for recording a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub invoice_id: Option<InvoiceId>,
    pub client_id: Option<ClientId>,
    pub amount: Money,
    pub kind: PaymentKind,
    pub payment_date: NaiveDate,
    pub exclude_from_tax: bool,
    pub note: Option<String>,
}

/// The payment records the engine reconciles over.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLedger {
    payments: Vec<Payment>,
}

impl PaymentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a transaction.
    ///
    /// `invoice` must be the invoice named by `new.invoice_id` (the caller
    /// fetched both); it is consulted for the cancelled-state guard and the
    /// currency check. Unattributed payments pass `None`.
    pub fn record(&mut self, new: NewPayment, invoice: Option<&Invoice>) -> BillingResult<&Payment> {
        if !new.amount.is_positive() {
            return Err(BillingError::invalid_amount(format!(
                "amount must be strictly positive, got {}",
                new.amount
            )));
        }

        match (new.invoice_id, invoice) {
            (Some(invoice_id), Some(invoice)) => {
                if invoice.id_typed() != invoice_id {
                    return Err(BillingError::validation(format!(
                        "payment names invoice {invoice_id} but {} was supplied",
                        invoice.id_typed()
                    )));
                }
                if invoice.is_cancelled() {
                    return Err(BillingError::InvoiceCancelled(invoice_id));
                }
                if new.amount.currency().code != invoice.currency().code {
                    return Err(BillingError::CurrencyMismatch {
                        left: invoice.currency().code,
                        right: new.amount.currency().code,
                    });
                }
            }
            (Some(invoice_id), None) => {
                return Err(BillingError::validation(format!(
                    "payment against invoice {invoice_id} requires the invoice for validation"
                )));
            }
            (None, _) => {}
        }

        self.payments.push(Payment {
            id: PaymentId::new(),
            invoice_id: new.invoice_id,
            client_id: new.client_id,
            amount: new.amount,
            kind: new.kind,
            payment_date: new.payment_date,
            exclude_from_tax: new.exclude_from_tax,
            note: new.note,
        });
        // Just pushed, so last() is present.
        self.payments
            .last()
            .ok_or_else(BillingError::not_found)
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    pub fn for_invoice(&self, invoice_id: InvoiceId) -> impl Iterator<Item = &Payment> {
        self.payments
            .iter()
            .filter(move |p| p.invoice_id == Some(invoice_id))
    }

    pub fn count_for_invoice(&self, invoice_id: InvoiceId) -> usize {
        self.for_invoice(invoice_id).count()
    }

    /// Raw reconciliation aggregate: payments minus refunds attached to the
    /// invoice, tax-excluded rows included.
    pub fn total_applied(&self, invoice: &Invoice) -> BillingResult<Money> {
        self.applied(invoice, true)
    }

    /// Tax-relevant aggregate: same as [`Self::total_applied`] but without
    /// rows flagged `exclude_from_tax`.
    pub fn tax_relevant_applied(&self, invoice: &Invoice) -> BillingResult<Money> {
        self.applied(invoice, false)
    }

    fn applied(&self, invoice: &Invoice, include_tax_excluded: bool) -> BillingResult<Money> {
        let mut total = Money::zero(invoice.currency());
        for payment in self.for_invoice(invoice.id_typed()) {
            if !include_tax_excluded && payment.exclude_from_tax {
                continue;
            }
            match payment.kind {
                PaymentKind::Payment => total = total.checked_add(payment.amount)?,
                PaymentKind::Refund => total = total.checked_sub(payment.amount)?,
                // Expenses are client costs, not settlement of the invoice.
                PaymentKind::Expense => {}
            }
        }
        Ok(total)
    }
}
