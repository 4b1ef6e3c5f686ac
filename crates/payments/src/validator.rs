//! Billing validation: paid-vs-owed classification and pre-commit checks.
//!
//! Every function here is a point-in-time computation over the invoice and
//! ledger passed in; nothing is cached, so callers re-query after recording
//! further payments.

use core::cmp::Ordering;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use billbook_core::{BillingError, BillingResult, Currency, Money};
use billbook_invoicing::{Invoice, InvoiceStatus};

use crate::payment::{PaymentKind, PaymentLedger};

/// Derived classification of an invoice's settlement state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingStatus {
    /// Balance within the tolerance threshold.
    Valid,
    /// Client owes more than paid.
    Underbilled,
    /// Paid more than owed.
    Overbilled,
}

/// Read-time status projection replacing stored paid/overdue columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivedStatus {
    Draft,
    Sent,
    PartiallyPaid,
    Paid,
    Overdue,
    Cancelled,
}

/// Outcome of [`billing_status`]: classification, the signed balance
/// (positive = still owed) and non-fatal warnings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingReport {
    pub status: BillingStatus,
    pub balance: Money,
    pub warnings: Vec<String>,
}

/// Projection of a payment that has not been committed yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentValidation {
    pub is_valid: bool,
    pub projected_balance: Money,
    pub projected_status: BillingStatus,
    pub warnings: Vec<String>,
}

impl PaymentValidation {
    /// Blocking form of strict validation: an invalid projection becomes a
    /// hard error instead of a flag, for callers that must not commit.
    pub fn into_committable(self) -> BillingResult<Self> {
        if !self.is_valid {
            return Err(BillingError::PaymentWouldOverbill {
                projected_balance: self.projected_balance,
            });
        }
        Ok(self)
    }
}

/// Default tolerance: 1.50 in the invoice's currency.
pub fn default_threshold(currency: Currency) -> Money {
    Money::new(Decimal::new(150, 2), currency)
}

/// Classify the invoice's settlement state against the ledger.
pub fn billing_status(
    invoice: &Invoice,
    ledger: &PaymentLedger,
    threshold: Option<Money>,
) -> BillingResult<BillingReport> {
    let threshold = effective_threshold(invoice, threshold)?;
    let paid = ledger.total_applied(invoice)?;
    let balance = invoice.total_amount().checked_sub(paid)?;
    let status = classify(balance, threshold)?;

    let mut warnings = Vec::new();
    if status == BillingStatus::Overbilled {
        warnings.push(format!(
            "invoice {} is overbilled: paid {} against a total of {}",
            invoice.number(),
            paid,
            invoice.total_amount()
        ));
        tracing::warn!(invoice = %invoice.number(), %balance, "invoice overbilled");
    }
    warnings.extend(duplicate_payment_warnings(invoice, ledger));
    if invoice.is_draft() && ledger.count_for_invoice(invoice.id_typed()) > 0 {
        warnings.push(format!(
            "invoice {} has payments but is still a draft; check the workflow upstream",
            invoice.number()
        ));
    }

    Ok(BillingReport {
        status,
        balance,
        warnings,
    })
}

/// Classify the state as if `proposed` had already been applied, without
/// touching stored state.
///
/// `strict` escalates an overbilled projection to `is_valid = false`; the
/// non-strict mode keeps the projection valid and only warns, for workflows
/// where overpaying is intentional (e.g. a client paying ahead as credit).
pub fn validate_proposed(
    invoice: &Invoice,
    ledger: &PaymentLedger,
    proposed: Money,
    threshold: Option<Money>,
    strict: bool,
) -> BillingResult<PaymentValidation> {
    if !proposed.is_positive() {
        return Err(BillingError::invalid_amount(format!(
            "proposed amount must be strictly positive, got {proposed}"
        )));
    }
    let threshold = effective_threshold(invoice, threshold)?;
    let paid = ledger.total_applied(invoice)?.checked_add(proposed)?;
    let projected_balance = invoice.total_amount().checked_sub(paid)?;
    let projected_status = classify(projected_balance, threshold)?;

    let mut warnings = Vec::new();
    if projected_status == BillingStatus::Overbilled {
        warnings.push(format!(
            "payment of {} would overbill invoice {} (projected balance {})",
            proposed,
            invoice.number(),
            projected_balance
        ));
        tracing::debug!(
            invoice = %invoice.number(),
            %projected_balance,
            strict,
            "proposed payment projects overbilled"
        );
    }

    Ok(PaymentValidation {
        is_valid: !(strict && projected_status == BillingStatus::Overbilled),
        projected_balance,
        projected_status,
        warnings,
    })
}

/// Read-time view combining the persisted status, payment state and the due
/// date. Never persisted, so it cannot diverge from the ledger.
pub fn derived_status(
    invoice: &Invoice,
    ledger: &PaymentLedger,
    today: NaiveDate,
    threshold: Option<Money>,
) -> BillingResult<DerivedStatus> {
    match invoice.status() {
        InvoiceStatus::Cancelled => Ok(DerivedStatus::Cancelled),
        InvoiceStatus::Draft => Ok(DerivedStatus::Draft),
        InvoiceStatus::Sent => {
            let threshold = effective_threshold(invoice, threshold)?;
            let paid = ledger.total_applied(invoice)?;
            let balance = invoice.total_amount().checked_sub(paid)?;
            // Settled or overpaid both read as paid.
            if classify(balance, threshold)? != BillingStatus::Underbilled {
                Ok(DerivedStatus::Paid)
            } else if today > invoice.due_date() {
                Ok(DerivedStatus::Overdue)
            } else if paid.is_positive() {
                Ok(DerivedStatus::PartiallyPaid)
            } else {
                Ok(DerivedStatus::Sent)
            }
        }
    }
}

fn effective_threshold(invoice: &Invoice, threshold: Option<Money>) -> BillingResult<Money> {
    let threshold = threshold.unwrap_or_else(|| default_threshold(invoice.currency()));
    if threshold.currency().code != invoice.currency().code {
        return Err(BillingError::CurrencyMismatch {
            left: invoice.currency().code,
            right: threshold.currency().code,
        });
    }
    if threshold.is_negative() {
        return Err(BillingError::validation("threshold must be non-negative"));
    }
    Ok(threshold)
}

fn classify(balance: Money, threshold: Money) -> BillingResult<BillingStatus> {
    if balance.abs().compare(threshold)? != Ordering::Greater {
        Ok(BillingStatus::Valid)
    } else if balance.is_positive() {
        Ok(BillingStatus::Underbilled)
    } else {
        Ok(BillingStatus::Overbilled)
    }
}

/// Best-effort duplicate detection: two payment rows with the same amount on
/// the same date against the same invoice. A heuristic, not an invariant;
/// legitimate equal payments on one day will also be flagged.
fn duplicate_payment_warnings(invoice: &Invoice, ledger: &PaymentLedger) -> Vec<String> {
    let rows: Vec<_> = ledger
        .for_invoice(invoice.id_typed())
        .filter(|p| p.kind == PaymentKind::Payment)
        .collect();

    let mut warnings = Vec::new();
    for (index, payment) in rows.iter().enumerate() {
        let is_first_of_pair = rows[..index]
            .iter()
            .all(|prior| prior.amount != payment.amount || prior.payment_date != payment.payment_date);
        let has_twin = rows[index + 1..]
            .iter()
            .any(|later| later.amount == payment.amount && later.payment_date == payment.payment_date);
        if is_first_of_pair && has_twin {
            warnings.push(format!(
                "possible duplicate payment on invoice {}: {} on {}",
                invoice.number(),
                payment.amount,
                payment.payment_date
            ));
            tracing::warn!(
                invoice = %invoice.number(),
                amount = %payment.amount,
                date = %payment.payment_date,
                "possible duplicate payment"
            );
        }
    }
    warnings
}
