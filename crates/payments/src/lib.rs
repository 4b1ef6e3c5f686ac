//! Payments domain module.
//!
//! Append-only payment records against invoices, the two reconciliation
//! aggregates derived from them, and the billing validator that classifies
//! an invoice's paid-vs-owed state. Pure domain logic; persistence belongs
//! to the storage collaborator.

pub mod payment;
pub mod validator;

pub use payment::{NewPayment, Payment, PaymentKind, PaymentLedger};
pub use validator::{
    BillingReport, BillingStatus, DerivedStatus, PaymentValidation, billing_status,
    default_threshold, derived_status, validate_proposed,
};
