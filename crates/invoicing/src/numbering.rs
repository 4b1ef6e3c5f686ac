//! Invoice-number assignment.
//!
//! Numbers combine an issue-date prefix with a monotonically increasing
//! per-account sequence. The counter itself lives with the storage
//! collaborator so uniqueness holds under concurrent invoice creation;
//! the engine only consumes it through [`NumberSequence`].

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use billbook_core::{AccountId, BillingResult};

/// Atomic increment-and-read counter, one sequence per account.
///
/// Implemented by the storage collaborator (e.g. a sequence row under
/// row-level locking). A returned value must never be handed out twice for
/// the same account.
pub trait NumberSequence {
    fn next(&mut self, account_id: AccountId) -> BillingResult<u64>;
}

/// Immutable invoice number, assigned exactly once at creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceNumber(String);

impl InvoiceNumber {
    pub(crate) fn assign(issue_date: NaiveDate, sequence_value: u64) -> Self {
        Self(format!("{}-{:04}", issue_date.format("%Y%m"), sequence_value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Process-local sequence for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemorySequence {
    counters: HashMap<AccountId, u64>,
}

impl InMemorySequence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NumberSequence for InMemorySequence {
    fn next(&mut self, account_id: AccountId) -> BillingResult<u64> {
        let counter = self.counters.entry(account_id).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequences_are_per_account_and_monotonic() {
        let mut seq = InMemorySequence::new();
        let a = AccountId::new();
        let b = AccountId::new();

        assert_eq!(seq.next(a).unwrap(), 1);
        assert_eq!(seq.next(a).unwrap(), 2);
        assert_eq!(seq.next(b).unwrap(), 1);
        assert_eq!(seq.next(a).unwrap(), 3);
    }

    #[test]
    fn number_combines_issue_month_and_sequence() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 23).unwrap();
        let number = InvoiceNumber::assign(date, 42);
        assert_eq!(number.as_str(), "202608-0042");
    }
}
