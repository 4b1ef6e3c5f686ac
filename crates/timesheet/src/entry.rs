//! Time-entry model.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use billbook_core::{ClientId, Entity, InvoiceId, Money, ProjectId, TimeEntryId};

/// Unit the entry's effective rate is quoted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateUnit {
    Hourly,
    Daily,
}

/// A recorded unit of work, the raw input to invoice generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: TimeEntryId,
    pub client_id: ClientId,
    pub project_id: Option<ProjectId>,
    /// Task label; part of the aggregation billing key.
    pub task: String,
    pub work_date: NaiveDate,
    pub minutes: u32,
    pub billable: bool,
    /// Effective rate for this entry, in the invoice currency.
    pub rate: Money,
    pub rate_unit: RateUnit,
    /// Invoice this entry has been billed on, if any. Entries attached to a
    /// cancelled invoice become billable again.
    pub invoice_id: Option<InvoiceId>,
}

impl Entity for TimeEntry {
    type Id = TimeEntryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
