//! Management-listener endpoints: health, metrics, routing-table
//! management and self-description.

pub mod api;
pub mod docs;
pub mod health;
pub mod metrics;
