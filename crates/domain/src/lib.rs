//! Domain layer for order fulfillment.
//!
//! This crate provides:
//! - submission validation and normalization ([`OrderSubmission`])
//! - the status state machine ([`StatusChange`]) applied through atomic
//!   conditional updates
//! - [`OrderService`], the entry point used by the HTTP layer
//! - [`OrderView`], the wire shape of an order

pub mod error;
pub mod order;
pub mod view;

pub use error::{DomainError, ValidationError};
pub use order::{
    ItemInput, OrderService, OrderSubmission, StatusChange, SubmissionRules, TransitionOutcome,
    normalize_transaction_id,
};
pub use view::{OrderView, PaymentView};
