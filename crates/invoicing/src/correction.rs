//! Auditable corrections to issued invoices.
//!
//! A correction never edits billing history: the source invoice keeps its
//! figures and gains an immutable snapshot plus a back-reference, while a new
//! invoice carrying `correction_of` supersedes it.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use billbook_core::{BillingError, BillingResult, Money};

use crate::invoice::{Invoice, InvoiceStatus, NewInvoice};
use crate::line_items::{LineItem, LineItemDraft};
use crate::numbering::{InvoiceNumber, NumberSequence};

/// Pre-correction field values of the source invoice, captured for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSnapshot {
    pub taken_at: DateTime<Utc>,
    pub number: InvoiceNumber,
    pub status: InvoiceStatus,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
    pub items: Vec<LineItem>,
    pub tax_rate: Decimal,
    pub exclude_from_tax: bool,
    pub sub_total: Money,
    pub tax_amount: Money,
    pub total_amount: Money,
}

/// Requested changes for a correction. Unset fields carry over from the
/// source invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectionChanges {
    /// Mandatory, human-readable justification.
    pub reason: String,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    /// Full replacement item set; `None` keeps the source items.
    pub items: Option<Vec<LineItemDraft>>,
}

/// Result of a correction: the superseding invoice plus advisory warnings.
#[derive(Debug, Clone)]
pub struct CorrectionOutcome {
    pub invoice: Invoice,
    pub warnings: Vec<String>,
}

impl Invoice {
    /// Produce a new invoice that supersedes this one.
    ///
    /// The source must have been issued: drafts are edited directly and
    /// cancelled invoices get a fresh invoice instead of a correction. The
    /// source is mutated only by the snapshot and the back-reference; its
    /// totals stay exactly as billed.
    ///
    /// `payment_count` is read from the payment ledger by the caller; a
    /// non-zero count produces a re-reconciliation warning, never an error.
    pub fn correct(
        &mut self,
        changes: CorrectionChanges,
        sequence: &mut dyn NumberSequence,
        payment_count: usize,
        occurred_at: DateTime<Utc>,
    ) -> BillingResult<CorrectionOutcome> {
        match self.status {
            InvoiceStatus::Sent => {}
            InvoiceStatus::Draft | InvoiceStatus::Cancelled => {
                return Err(BillingError::NotCorrectable {
                    invoice_id: self.id,
                    status: self.status.to_string(),
                });
            }
        }
        if self.corrected_by.is_some() {
            return Err(BillingError::NotCorrectable {
                invoice_id: self.id,
                status: "already corrected".to_string(),
            });
        }
        let reason = changes.reason.trim();
        if reason.is_empty() {
            return Err(BillingError::validation(
                "correction requires a non-empty reason",
            ));
        }

        let item_drafts = match changes.items {
            Some(drafts) => drafts,
            None => self.items.iter().map(carry_over_item).collect(),
        };

        let mut corrected = Invoice::draft(
            NewInvoice {
                account_id: self.account_id,
                client_id: self.client_id,
                project_id: self.project_id,
                currency: self.currency,
                issue_date: changes.issue_date.unwrap_or(self.issue_date),
                due_date: changes.due_date.unwrap_or(self.due_date),
                tax_rate: self.tax_rate,
                exclude_from_tax: self.exclude_from_tax,
                notes: changes.notes.or_else(|| self.notes.clone()),
            },
            sequence,
        )?;
        corrected.replace_items(item_drafts)?;
        corrected.correction_of = Some(self.id);
        corrected.correction_reason = Some(reason.to_string());
        corrected.correction_date = Some(occurred_at);
        // A correction supersedes an issued document, so it is issued itself.
        corrected.mark_sent()?;

        self.original_snapshot = Some(InvoiceSnapshot {
            taken_at: occurred_at,
            number: self.number.clone(),
            status: self.status,
            issue_date: self.issue_date,
            due_date: self.due_date,
            notes: self.notes.clone(),
            items: self.items.clone(),
            tax_rate: self.tax_rate,
            exclude_from_tax: self.exclude_from_tax,
            sub_total: self.sub_total,
            tax_amount: self.tax_amount,
            total_amount: self.total_amount,
        });
        self.corrected_by = Some(corrected.id);
        self.bump_version();

        let mut warnings = Vec::new();
        if payment_count > 0 {
            warnings.push(format!(
                "invoice {} has {} payment(s); re-reconcile them against the corrected total {}",
                self.number, payment_count, corrected.total_amount
            ));
        }

        Ok(CorrectionOutcome {
            invoice: corrected,
            warnings,
        })
    }
}

fn carry_over_item(item: &LineItem) -> LineItemDraft {
    LineItemDraft {
        description: item.description.clone(),
        quantity: item.quantity,
        unit_price: item.unit_price,
        total_price: Some(item.total_price),
        source_time_entry_id: item.source_time_entry_id,
        rate_type: item.rate_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_items::RateType;
    use crate::numbering::InMemorySequence;
    use billbook_core::{AccountId, ClientId, Currency};

    fn eur() -> Currency {
        Currency::with_default_scale("EUR".parse().unwrap())
    }

    fn money(s: &str) -> Money {
        Money::new(s.parse().unwrap(), eur())
    }

    fn item(description: &str, quantity: &str, unit_price: &str) -> LineItemDraft {
        LineItemDraft {
            description: description.to_string(),
            quantity: quantity.parse().unwrap(),
            unit_price: money(unit_price),
            total_price: None,
            source_time_entry_id: None,
            rate_type: RateType::Hourly,
        }
    }

    fn sent_invoice(seq: &mut InMemorySequence) -> Invoice {
        let mut invoice = Invoice::draft(
            NewInvoice {
                account_id: AccountId::new(),
                client_id: ClientId::new(),
                project_id: None,
                currency: eur(),
                issue_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
                due_date: NaiveDate::from_ymd_opt(2026, 3, 15).unwrap(),
                tax_rate: Decimal::ZERO,
                exclude_from_tax: false,
                notes: Some("March work".to_string()),
            },
            seq,
        )
        .unwrap();
        invoice.add_items(vec![item("dev", "10", "95.00")]).unwrap();
        invoice.mark_sent().unwrap();
        invoice
    }

    fn changes(reason: &str) -> CorrectionChanges {
        CorrectionChanges {
            reason: reason.to_string(),
            issue_date: None,
            due_date: None,
            notes: None,
            items: None,
        }
    }

    #[test]
    fn draft_invoices_are_not_correctable() {
        let mut seq = InMemorySequence::new();
        let mut invoice = sent_invoice(&mut seq);
        // Rebuild a draft for the check.
        let mut draft = Invoice::draft(
            NewInvoice {
                account_id: invoice.account_id(),
                client_id: invoice.client_id(),
                project_id: None,
                currency: eur(),
                issue_date: invoice.issue_date(),
                due_date: invoice.due_date(),
                tax_rate: Decimal::ZERO,
                exclude_from_tax: false,
                notes: None,
            },
            &mut seq,
        )
        .unwrap();

        let err = draft
            .correct(changes("wrong rate"), &mut seq, 0, Utc::now())
            .unwrap_err();
        match err {
            BillingError::NotCorrectable { status, .. } => assert_eq!(status, "draft"),
            other => panic!("expected NotCorrectable, got {other:?}"),
        }

        invoice.cancel().unwrap();
        let err = invoice
            .correct(changes("wrong rate"), &mut seq, 0, Utc::now())
            .unwrap_err();
        assert!(matches!(err, BillingError::NotCorrectable { .. }));
    }

    #[test]
    fn correction_requires_a_reason() {
        let mut seq = InMemorySequence::new();
        let mut invoice = sent_invoice(&mut seq);

        let err = invoice
            .correct(changes("   "), &mut seq, 0, Utc::now())
            .unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));
        assert!(invoice.original_snapshot().is_none());
    }

    #[test]
    fn correction_preserves_source_totals_and_links_both_ways() {
        let mut seq = InMemorySequence::new();
        let mut invoice = sent_invoice(&mut seq);
        let original_total = invoice.total_amount();

        let mut change = changes("rate was wrong");
        change.items = Some(vec![item("dev", "10", "85.00")]);
        let outcome = invoice.correct(change, &mut seq, 0, Utc::now()).unwrap();

        // Source unchanged except snapshot + back-reference.
        assert_eq!(invoice.total_amount(), original_total);
        assert_eq!(invoice.corrected_by(), Some(outcome.invoice.id_typed()));
        let snapshot = invoice.original_snapshot().unwrap();
        assert_eq!(snapshot.total_amount, original_total);
        assert_eq!(snapshot.items.len(), 1);

        // Correction reflects only the corrected items.
        assert_eq!(outcome.invoice.total_amount(), money("850.00"));
        assert_eq!(outcome.invoice.correction_of(), Some(invoice.id_typed()));
        assert_eq!(outcome.invoice.correction_reason(), Some("rate was wrong"));
        assert_eq!(outcome.invoice.status(), InvoiceStatus::Sent);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn correcting_twice_directly_is_rejected() {
        let mut seq = InMemorySequence::new();
        let mut invoice = sent_invoice(&mut seq);

        invoice
            .correct(changes("first fix"), &mut seq, 0, Utc::now())
            .unwrap();
        let err = invoice
            .correct(changes("second fix"), &mut seq, 0, Utc::now())
            .unwrap_err();
        assert!(matches!(err, BillingError::NotCorrectable { .. }));
    }

    #[test]
    fn correction_of_a_correction_extends_the_chain() {
        let mut seq = InMemorySequence::new();
        let mut invoice = sent_invoice(&mut seq);

        let outcome = invoice
            .correct(changes("first fix"), &mut seq, 0, Utc::now())
            .unwrap();
        let mut first_correction = outcome.invoice;
        let second = first_correction
            .correct(changes("second fix"), &mut seq, 0, Utc::now())
            .unwrap();

        assert_eq!(
            second.invoice.correction_of(),
            Some(first_correction.id_typed())
        );
        assert_eq!(first_correction.correction_of(), Some(invoice.id_typed()));
    }

    #[test]
    fn existing_payments_produce_an_advisory_warning() {
        let mut seq = InMemorySequence::new();
        let mut invoice = sent_invoice(&mut seq);

        let outcome = invoice
            .correct(changes("client disputed hours"), &mut seq, 2, Utc::now())
            .unwrap();
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("2 payment(s)"));
    }

    #[test]
    fn serde_round_trip_reproduces_totals() {
        let mut seq = InMemorySequence::new();
        let mut invoice = sent_invoice(&mut seq);
        invoice
            .correct(changes("audit trail check"), &mut seq, 0, Utc::now())
            .unwrap();

        let json = serde_json::to_string(&invoice).unwrap();
        let restored: Invoice = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, invoice);
        assert_eq!(restored.sub_total(), invoice.sub_total());
        assert_eq!(restored.tax_amount(), invoice.tax_amount());
        assert_eq!(restored.total_amount(), invoice.total_amount());
    }
}
