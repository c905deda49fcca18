//! Order submission, status transitions, and the order service.

mod service;
mod submission;
mod transition;

pub use service::{OrderService, TransitionOutcome};
pub use submission::{ItemInput, OrderSubmission, SubmissionRules, normalize_transaction_id};
pub use transition::StatusChange;
