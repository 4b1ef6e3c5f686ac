//! `billbook-core` — shared billing primitives.
//!
//! This crate contains **pure domain** building blocks (ids, money, errors).
//! No IO, no storage, no transport concerns.

pub mod entity;
pub mod error;
pub mod id;
pub mod money;

pub use entity::Entity;
pub use error::{BillingError, BillingResult, ErrorCategory};
pub use id::{AccountId, ClientId, InvoiceId, LineItemId, PaymentId, ProjectId, TimeEntryId};
pub use money::{Currency, CurrencyCode, Money};
