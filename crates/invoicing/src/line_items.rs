//! Line-item ledger: the only writer of invoice totals.
//!
//! Items are validated as a whole batch before anything is committed, which
//! makes `replace_items` all-or-nothing: a single bad item leaves the prior
//! items and totals untouched.

use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use billbook_core::{BillingError, BillingResult, Currency, LineItemId, Money, TimeEntryId};

use crate::invoice::{Invoice, InvoiceStatus};

/// How a line item's unit price is denominated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateType {
    Hourly,
    Daily,
    Fixed,
}

/// One billable unit on an invoice.
///
/// Invariant: `total_price == round(quantity * unit_price)` at currency
/// scale; violations are rejected at insertion, never silently corrected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Money,
    pub total_price: Money,
    pub source_time_entry_id: Option<TimeEntryId>,
    pub rate_type: RateType,
}

/// Input for one line item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItemDraft {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Money,
    /// Optional caller-supplied total. Must equal `quantity * unit_price`
    /// rounded to currency scale, with zero tolerance.
    pub total_price: Option<Money>,
    pub source_time_entry_id: Option<TimeEntryId>,
    pub rate_type: RateType,
}

impl Invoice {
    /// Append items to the invoice and recompute totals.
    pub fn add_items(&mut self, drafts: Vec<LineItemDraft>) -> BillingResult<()> {
        self.ensure_items_mutable()?;

        let mut seen: HashSet<TimeEntryId> = self
            .items
            .iter()
            .filter_map(|item| item.source_time_entry_id)
            .collect();
        let new_items = validate_batch(self.currency, drafts, &mut seen)?;

        self.items.extend(new_items);
        self.recompute_totals()?;
        self.bump_version();
        Ok(())
    }

    /// Replace the full item set and recompute totals.
    ///
    /// Transactional: the batch is validated into owned items before the
    /// prior set is discarded, so no partial replacement is ever observable.
    pub fn replace_items(&mut self, drafts: Vec<LineItemDraft>) -> BillingResult<()> {
        self.ensure_items_mutable()?;

        let mut seen = HashSet::new();
        let new_items = validate_batch(self.currency, drafts, &mut seen)?;

        self.items = new_items;
        self.recompute_totals()?;
        self.bump_version();
        Ok(())
    }

    fn ensure_items_mutable(&self) -> BillingResult<()> {
        match self.status {
            InvoiceStatus::Draft => Ok(()),
            InvoiceStatus::Sent | InvoiceStatus::Cancelled => {
                Err(BillingError::ItemsLockedAfterIssue(self.id))
            }
        }
    }

    /// Recompute `sub_total`, `tax_amount`, `total_amount` from the items.
    ///
    /// This is the only code path that writes those three fields. Totals sum
    /// already-rounded per-line totals, so the figures match what a reader
    /// of the printed invoice would add up by hand.
    pub(crate) fn recompute_totals(&mut self) -> BillingResult<()> {
        let mut sub_total = Money::zero(self.currency);
        for item in &self.items {
            sub_total = sub_total.checked_add(item.total_price)?;
        }

        self.sub_total = sub_total;
        self.tax_amount = if self.exclude_from_tax {
            Money::zero(self.currency)
        } else {
            sub_total.mul_decimal(self.tax_rate)?
        };
        self.total_amount = self.sub_total.checked_add(self.tax_amount)?;
        Ok(())
    }
}

fn validate_batch(
    currency: Currency,
    drafts: Vec<LineItemDraft>,
    seen: &mut HashSet<TimeEntryId>,
) -> BillingResult<Vec<LineItem>> {
    let mut items = Vec::with_capacity(drafts.len());

    for draft in drafts {
        if draft.quantity.is_sign_negative() {
            return Err(BillingError::validation(format!(
                "line item quantity must be non-negative, got {}",
                draft.quantity
            )));
        }
        if draft.unit_price.currency().code != currency.code {
            return Err(BillingError::CurrencyMismatch {
                left: currency.code,
                right: draft.unit_price.currency().code,
            });
        }
        if draft.unit_price.is_negative() {
            return Err(BillingError::validation(
                "line item unit price must be non-negative",
            ));
        }

        let expected = draft.unit_price.mul_decimal(draft.quantity)?;
        if let Some(supplied) = draft.total_price {
            if supplied.currency().code != currency.code {
                return Err(BillingError::CurrencyMismatch {
                    left: currency.code,
                    right: supplied.currency().code,
                });
            }
            if supplied != expected {
                return Err(BillingError::LineItemTotalMismatch { expected, supplied });
            }
        }

        if let Some(entry_id) = draft.source_time_entry_id {
            // One time entry bills at most once per invoice.
            if !seen.insert(entry_id) {
                return Err(BillingError::DuplicateTimeEntryReference(entry_id));
            }
        }

        items.push(LineItem {
            id: LineItemId::new(),
            description: draft.description,
            quantity: draft.quantity,
            unit_price: draft.unit_price,
            total_price: expected,
            source_time_entry_id: draft.source_time_entry_id,
            rate_type: draft.rate_type,
        });
    }

    Ok(items)
}
