//! Route handlers, one module per resource.

pub mod events;
pub mod foods;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod payment_qrs;
pub mod summary;
