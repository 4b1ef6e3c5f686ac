//! Time-entry aggregation into draft invoices.
//!
//! The aggregator is a pure function over already-fetched entries: it
//! resolves the billed client, filters billable work not yet attached to a
//! live invoice, groups by billing key (task + rate + unit) and emits one
//! line item per group on a fresh draft invoice.

use std::collections::HashSet;

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use billbook_core::{
    AccountId, BillingError, BillingResult, ClientId, Currency, InvoiceId, Money, ProjectId,
    TimeEntryId,
};
use billbook_invoicing::{Invoice, LineItemDraft, NewInvoice, NumberSequence, RateType};

use crate::entry::{RateUnit, TimeEntry};

/// Master-data lookup owned by the storage collaborator.
pub trait ClientDirectory {
    fn client_of_project(&self, project_id: ProjectId) -> Option<ClientId>;
}

/// Who the generated invoice bills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillingTarget {
    Client(ClientId),
    Project(ProjectId),
}

/// Which entries are considered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryFilter {
    Ids(Vec<TimeEntryId>),
    /// Inclusive on both ends.
    DateRange { from: NaiveDate, to: NaiveDate },
}

/// Input for one generation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub account_id: AccountId,
    pub target: BillingTarget,
    pub filter: EntryFilter,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub tax_rate: Decimal,
    pub exclude_from_tax: bool,
}

/// Aggregation knobs that are policy, not data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Hours per billable day, used to convert minutes for daily rates.
    pub workday_hours: u32,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self { workday_hours: 8 }
    }
}

/// Why a matching entry was left off the invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Attached to a non-cancelled invoice; skipping prevents double-billing.
    AlreadyInvoiced,
    NotBillable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub id: TimeEntryId,
    pub reason: SkipReason,
}

/// A populated draft invoice plus the entries that were passed over.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub invoice: Invoice,
    pub skipped: Vec<SkippedEntry>,
}

/// Derive a draft invoice from time entries.
///
/// Fails with [`BillingError::NoBillableEntries`] when nothing qualifies: a
/// zero-item draft would be indistinguishable from a user-created empty one.
/// `cancelled_invoices` is the set of cancelled invoice ids among the
/// entries' attachments, fetched by the caller.
pub fn generate(
    request: &GenerateRequest,
    entries: &[TimeEntry],
    cancelled_invoices: &HashSet<InvoiceId>,
    directory: &dyn ClientDirectory,
    sequence: &mut dyn NumberSequence,
    config: &AggregatorConfig,
) -> BillingResult<GenerationOutcome> {
    if config.workday_hours == 0 {
        return Err(BillingError::validation(
            "workday_hours must be at least 1",
        ));
    }
    let client_id = resolve_client(&request.target, directory)?;

    let mut selected: Vec<&TimeEntry> = Vec::new();
    let mut skipped: Vec<SkippedEntry> = Vec::new();

    for entry in entries {
        if !matches_target(entry, &request.target, client_id)
            || !matches_filter(entry, &request.filter)
        {
            continue;
        }
        if !entry.billable {
            skipped.push(SkippedEntry {
                id: entry.id,
                reason: SkipReason::NotBillable,
            });
            continue;
        }
        if let Some(invoice_id) = entry.invoice_id {
            if !cancelled_invoices.contains(&invoice_id) {
                skipped.push(SkippedEntry {
                    id: entry.id,
                    reason: SkipReason::AlreadyInvoiced,
                });
                continue;
            }
        }
        selected.push(entry);
    }

    if selected.is_empty() {
        return Err(BillingError::NoBillableEntries);
    }

    let currency = selected[0].rate.currency();
    for entry in &selected {
        if entry.rate.currency().code != currency.code {
            return Err(BillingError::CurrencyMismatch {
                left: currency.code,
                right: entry.rate.currency().code,
            });
        }
    }

    let drafts = build_line_drafts(&selected, config);

    let mut invoice = Invoice::draft(
        NewInvoice {
            account_id: request.account_id,
            client_id,
            project_id: match request.target {
                BillingTarget::Project(project_id) => Some(project_id),
                BillingTarget::Client(_) => None,
            },
            currency,
            issue_date: request.issue_date,
            due_date: request.due_date,
            tax_rate: request.tax_rate,
            exclude_from_tax: request.exclude_from_tax,
            notes: None,
        },
        sequence,
    )?;
    invoice.add_items(drafts)?;

    tracing::debug!(
        invoice = %invoice.number(),
        selected = selected.len(),
        skipped = skipped.len(),
        "generated invoice from time entries"
    );

    Ok(GenerationOutcome { invoice, skipped })
}

fn resolve_client(
    target: &BillingTarget,
    directory: &dyn ClientDirectory,
) -> BillingResult<ClientId> {
    match target {
        BillingTarget::Client(client_id) => Ok(*client_id),
        BillingTarget::Project(project_id) => {
            directory.client_of_project(*project_id).ok_or_else(|| {
                BillingError::AmbiguousClient(format!(
                    "project {project_id} does not resolve to a client"
                ))
            })
        }
    }
}

fn matches_target(entry: &TimeEntry, target: &BillingTarget, client_id: ClientId) -> bool {
    match target {
        BillingTarget::Client(_) => entry.client_id == client_id,
        BillingTarget::Project(project_id) => {
            entry.client_id == client_id && entry.project_id == Some(*project_id)
        }
    }
}

fn matches_filter(entry: &TimeEntry, filter: &EntryFilter) -> bool {
    match filter {
        EntryFilter::Ids(ids) => ids.contains(&entry.id),
        EntryFilter::DateRange { from, to } => {
            entry.work_date >= *from && entry.work_date <= *to
        }
    }
}

/// One line item per billing key (task, rate, unit), durations summed.
///
/// Group order follows first appearance in the input so regeneration over
/// the same data is deterministic.
fn build_line_drafts(selected: &[&TimeEntry], config: &AggregatorConfig) -> Vec<LineItemDraft> {
    struct Group<'a> {
        task: &'a str,
        rate: Money,
        unit: RateUnit,
        minutes: u64,
        entry_ids: Vec<TimeEntryId>,
    }

    let mut groups: Vec<Group<'_>> = Vec::new();
    for entry in selected {
        match groups.iter_mut().find(|g| {
            g.task == entry.task && g.rate == entry.rate && g.unit == entry.rate_unit
        }) {
            Some(group) => {
                group.minutes += u64::from(entry.minutes);
                group.entry_ids.push(entry.id);
            }
            None => groups.push(Group {
                task: &entry.task,
                rate: entry.rate,
                unit: entry.rate_unit,
                minutes: u64::from(entry.minutes),
                entry_ids: vec![entry.id],
            }),
        }
    }

    groups
        .into_iter()
        .map(|group| {
            let minutes = Decimal::from(group.minutes);
            let divisor = match group.unit {
                RateUnit::Hourly => Decimal::from(60u32),
                // Widened so extreme workday configs cannot overflow u32.
                RateUnit::Daily => Decimal::from(60u64 * u64::from(config.workday_hours)),
            };
            let quantity = (minutes / divisor)
                .round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
            // Traceability only survives ungrouped entries; a merged line
            // cannot point at a single source entry.
            let source = match group.entry_ids.as_slice() {
                [single] => Some(*single),
                _ => None,
            };
            LineItemDraft {
                description: group.task.to_string(),
                quantity,
                unit_price: group.rate,
                total_price: None,
                source_time_entry_id: source,
                rate_type: match group.unit {
                    RateUnit::Hourly => RateType::Hourly,
                    RateUnit::Daily => RateType::Daily,
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use billbook_invoicing::InMemorySequence;
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn eur() -> Currency {
        Currency::with_default_scale("EUR".parse().unwrap())
    }

    fn money(s: &str) -> Money {
        Money::new(s.parse().unwrap(), eur())
    }

    struct Directory(HashMap<ProjectId, ClientId>);

    impl ClientDirectory for Directory {
        fn client_of_project(&self, project_id: ProjectId) -> Option<ClientId> {
            self.0.get(&project_id).copied()
        }
    }

    fn entry(client_id: ClientId, task: &str, minutes: u32, rate: &str) -> TimeEntry {
        TimeEntry {
            id: TimeEntryId::new(),
            client_id,
            project_id: None,
            task: task.to_string(),
            work_date: NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
            minutes,
            billable: true,
            rate: money(rate),
            rate_unit: RateUnit::Hourly,
            invoice_id: None,
        }
    }

    fn request(client_id: ClientId) -> GenerateRequest {
        GenerateRequest {
            account_id: AccountId::new(),
            target: BillingTarget::Client(client_id),
            filter: EntryFilter::DateRange {
                from: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
                to: NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
            },
            issue_date: NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2026, 4, 15).unwrap(),
            tax_rate: Decimal::ZERO,
            exclude_from_tax: false,
        }
    }

    fn no_projects() -> Directory {
        Directory(HashMap::new())
    }

    #[test]
    fn groups_entries_by_task_and_rate() {
        let client_id = ClientId::new();
        let entries = vec![
            entry(client_id, "development", 90, "95.00"),
            entry(client_id, "development", 30, "95.00"),
            entry(client_id, "design", 60, "80.00"),
        ];

        let outcome = generate(
            &request(client_id),
            &entries,
            &HashSet::new(),
            &no_projects(),
            &mut InMemorySequence::new(),
            &AggregatorConfig::default(),
        )
        .unwrap();

        let invoice = outcome.invoice;
        assert_eq!(invoice.items().len(), 2);
        // 120 minutes of development at 95.00/h.
        assert_eq!(invoice.items()[0].quantity, Decimal::new(200, 2));
        assert_eq!(invoice.items()[0].total_price, money("190.00"));
        // Single-entry group keeps its source reference; merged one does not.
        assert!(invoice.items()[0].source_time_entry_id.is_none());
        assert!(invoice.items()[1].source_time_entry_id.is_some());
        assert_eq!(invoice.sub_total(), money("270.00"));
        assert!(outcome.skipped.is_empty());
    }

    #[test]
    fn daily_rates_convert_minutes_to_workdays() {
        let client_id = ClientId::new();
        let mut workshop = entry(client_id, "workshop", 960, "800.00");
        workshop.rate_unit = RateUnit::Daily;

        let outcome = generate(
            &request(client_id),
            &[workshop],
            &HashSet::new(),
            &no_projects(),
            &mut InMemorySequence::new(),
            &AggregatorConfig::default(),
        )
        .unwrap();

        let item = &outcome.invoice.items()[0];
        assert_eq!(item.quantity, Decimal::from(2u32));
        assert_eq!(item.rate_type, RateType::Daily);
        assert_eq!(item.total_price, money("1600.00"));
    }

    #[test]
    fn already_invoiced_entries_are_skipped_and_reported() {
        let client_id = ClientId::new();
        let live_invoice = InvoiceId::new();
        let cancelled_invoice = InvoiceId::new();

        let mut consumed = entry(client_id, "development", 60, "95.00");
        consumed.invoice_id = Some(live_invoice);
        let mut released = entry(client_id, "development", 60, "95.00");
        released.invoice_id = Some(cancelled_invoice);

        let cancelled: HashSet<InvoiceId> = [cancelled_invoice].into_iter().collect();
        let outcome = generate(
            &request(client_id),
            &[consumed.clone(), released],
            &cancelled,
            &no_projects(),
            &mut InMemorySequence::new(),
            &AggregatorConfig::default(),
        )
        .unwrap();

        // Only the entry on the cancelled invoice is billable again.
        assert_eq!(outcome.invoice.items().len(), 1);
        assert_eq!(outcome.invoice.sub_total(), money("95.00"));
        assert_eq!(
            outcome.skipped,
            vec![SkippedEntry {
                id: consumed.id,
                reason: SkipReason::AlreadyInvoiced,
            }]
        );
    }

    #[test]
    fn regeneration_over_consumed_entries_yields_no_billable_entries() {
        let client_id = ClientId::new();
        let mut consumed = entry(client_id, "development", 60, "95.00");
        consumed.invoice_id = Some(InvoiceId::new());

        let err = generate(
            &request(client_id),
            &[consumed],
            &HashSet::new(),
            &no_projects(),
            &mut InMemorySequence::new(),
            &AggregatorConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err, BillingError::NoBillableEntries);
    }

    #[test]
    fn non_billable_entries_never_reach_the_invoice() {
        let client_id = ClientId::new();
        let mut internal = entry(client_id, "internal sync", 45, "95.00");
        internal.billable = false;

        let outcome = generate(
            &request(client_id),
            &[entry(client_id, "development", 60, "95.00"), internal.clone()],
            &HashSet::new(),
            &no_projects(),
            &mut InMemorySequence::new(),
            &AggregatorConfig::default(),
        )
        .unwrap();

        assert_eq!(outcome.invoice.items().len(), 1);
        assert_eq!(
            outcome.skipped,
            vec![SkippedEntry {
                id: internal.id,
                reason: SkipReason::NotBillable,
            }]
        );
    }

    #[test]
    fn project_target_resolves_the_client_through_the_directory() {
        let client_id = ClientId::new();
        let project_id = ProjectId::new();
        let directory = Directory([(project_id, client_id)].into_iter().collect());

        let mut project_entry = entry(client_id, "development", 60, "95.00");
        project_entry.project_id = Some(project_id);
        let off_project = entry(client_id, "development", 60, "95.00");

        let mut req = request(client_id);
        req.target = BillingTarget::Project(project_id);

        let outcome = generate(
            &req,
            &[project_entry, off_project],
            &HashSet::new(),
            &directory,
            &mut InMemorySequence::new(),
            &AggregatorConfig::default(),
        )
        .unwrap();

        assert_eq!(outcome.invoice.client_id(), client_id);
        assert_eq!(outcome.invoice.project_id(), Some(project_id));
        assert_eq!(outcome.invoice.items().len(), 1);
    }

    #[test]
    fn unknown_project_fails_with_ambiguous_client() {
        let mut req = request(ClientId::new());
        req.target = BillingTarget::Project(ProjectId::new());

        let err = generate(
            &req,
            &[],
            &HashSet::new(),
            &no_projects(),
            &mut InMemorySequence::new(),
            &AggregatorConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, BillingError::AmbiguousClient(_)));
    }

    #[test]
    fn mixed_rate_currencies_fail() {
        let client_id = ClientId::new();
        let usd = Currency::with_default_scale("USD".parse().unwrap());
        let mut foreign = entry(client_id, "development", 60, "95.00");
        foreign.rate = Money::new("95.00".parse().unwrap(), usd);

        let err = generate(
            &request(client_id),
            &[entry(client_id, "design", 60, "80.00"), foreign],
            &HashSet::new(),
            &no_projects(),
            &mut InMemorySequence::new(),
            &AggregatorConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, BillingError::CurrencyMismatch { .. }));
    }

    #[test]
    fn id_filter_selects_only_named_entries() {
        let client_id = ClientId::new();
        let wanted = entry(client_id, "development", 60, "95.00");
        let other = entry(client_id, "design", 60, "80.00");

        let mut req = request(client_id);
        req.filter = EntryFilter::Ids(vec![wanted.id]);

        let outcome = generate(
            &req,
            &[wanted, other],
            &HashSet::new(),
            &no_projects(),
            &mut InMemorySequence::new(),
            &AggregatorConfig::default(),
        )
        .unwrap();
        assert_eq!(outcome.invoice.items().len(), 1);
        assert_eq!(outcome.invoice.items()[0].description, "development");
    }

    #[test]
    fn zero_workday_hours_is_rejected() {
        let client_id = ClientId::new();
        let mut workshop = entry(client_id, "workshop", 960, "800.00");
        workshop.rate_unit = RateUnit::Daily;

        let err = generate(
            &request(client_id),
            &[workshop],
            &HashSet::new(),
            &no_projects(),
            &mut InMemorySequence::new(),
            &AggregatorConfig { workday_hours: 0 },
        )
        .unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));
    }

    #[test]
    fn extreme_workday_hours_does_not_overflow() {
        let client_id = ClientId::new();
        let mut workshop = entry(client_id, "workshop", 960, "800.00");
        workshop.rate_unit = RateUnit::Daily;

        let outcome = generate(
            &request(client_id),
            &[workshop],
            &HashSet::new(),
            &no_projects(),
            &mut InMemorySequence::new(),
            &AggregatorConfig {
                workday_hours: u32::MAX,
            },
        )
        .unwrap();
        // 960 minutes of a workday this long rounds down to nothing billable.
        assert!(outcome.invoice.items()[0].quantity.is_zero());
        assert!(outcome.invoice.total_amount().is_zero());
    }

    proptest! {
        /// Property: grouping never loses or invents time. With durations in
        /// quarter hours the hourly quantities are exact at 2 dp, so the sum
        /// of quantities times 60 equals the sum of selected entry minutes,
        /// and there is exactly one line per distinct task.
        #[test]
        fn grouping_conserves_minutes(
            work in prop::collection::vec((0usize..3, 1u32..=32), 1..20)
        ) {
            let client_id = ClientId::new();
            let tasks = ["development", "design", "support"];
            let entries: Vec<TimeEntry> = work
                .iter()
                .map(|(task_index, quarter_hours)| {
                    entry(client_id, tasks[*task_index], quarter_hours * 15, "95.00")
                })
                .collect();

            let outcome = generate(
                &request(client_id),
                &entries,
                &HashSet::new(),
                &no_projects(),
                &mut InMemorySequence::new(),
                &AggregatorConfig::default(),
            )
            .unwrap();

            let billed_minutes: Decimal = outcome
                .invoice
                .items()
                .iter()
                .map(|item| item.quantity * Decimal::from(60u32))
                .sum();
            let worked_minutes: Decimal =
                entries.iter().map(|e| Decimal::from(e.minutes)).sum();
            prop_assert_eq!(billed_minutes, worked_minutes);

            let distinct_tasks: HashSet<&str> =
                entries.iter().map(|e| e.task.as_str()).collect();
            prop_assert_eq!(outcome.invoice.items().len(), distinct_tasks.len());
        }
    }
}
