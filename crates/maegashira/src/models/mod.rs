//! Data model: routing-table entries, per-request transactions, error kinds.

pub mod error;
pub mod route;
pub mod transaction;
