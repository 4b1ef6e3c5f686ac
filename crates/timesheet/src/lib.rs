//! Time-tracking domain module.
//!
//! Raw billable work records and the aggregator that turns them into a
//! populated draft invoice. Pure domain logic; fetching entries and looking
//! up master data stay with the caller.

pub mod aggregator;
pub mod entry;

pub use aggregator::{
    AggregatorConfig, BillingTarget, ClientDirectory, EntryFilter, GenerateRequest,
    GenerationOutcome, SkipReason, SkippedEntry, generate,
};
pub use entry::{RateUnit, TimeEntry};
