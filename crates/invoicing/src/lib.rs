//! Invoicing domain module.
//!
//! This crate contains the business rules for invoices: the lifecycle state
//! machine, the line-item ledger that owns monetary consistency, invoice
//! numbering, and auditable corrections. Implemented purely as deterministic
//! domain logic (no IO, no HTTP, no storage).

pub mod correction;
pub mod invoice;
pub mod line_items;
pub mod numbering;

pub use correction::{CorrectionChanges, CorrectionOutcome, InvoiceSnapshot};
pub use invoice::{Invoice, InvoiceStatus, NewInvoice};
pub use line_items::{LineItem, LineItemDraft, RateType};
pub use numbering::{InMemorySequence, InvoiceNumber, NumberSequence};
