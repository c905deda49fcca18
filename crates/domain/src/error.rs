//! Domain error types.

use common::{DecisionEmailStatus, OrderId, OrderStatus};
use order_store::StoreError;
use thiserror::Error;

/// Input that fails a submission or status-change rule. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing required team fields")]
    MissingTeamFields,

    #[error("Phone number must be exactly 10 digits (0-9 only)")]
    InvalidPhone,

    #[error("Team leader name can contain only letters and spaces")]
    InvalidLeaderName,

    #[error("Email must end with {0}")]
    InvalidEmailDomain(String),

    #[error("Transaction ID is required")]
    MissingTransactionId,

    #[error("Transaction ID must be alphanumeric (A-Z, 0-9) with no spaces")]
    InvalidTransactionId,

    #[error("Invalid items JSON")]
    InvalidItemsJson,

    #[error("items must contain 1 to {max} entries")]
    ItemCount { max: usize },

    #[error("Each item must have id and name")]
    ItemMissingIdOrName,

    #[error("Each item must have a valid price")]
    InvalidItemPrice,

    #[error("Order total is too large")]
    SubtotalTooLarge,

    #[error("Each item must have quantity 1 to {max}")]
    InvalidItemQuantity { max: u32 },

    #[error("Maximum {max} total items allowed per order")]
    TooManyItems { max: u32 },

    #[error("paymentScreenshot is required")]
    MissingScreenshot,

    #[error("Invalid status")]
    InvalidStatus,

    #[error("Rejection reason is required")]
    MissingRejectionReason,

    #[error("An order cannot be moved back to Placed")]
    CannotReopen,
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Another order already used this transaction id.
    #[error(
        "This transaction ID has already been used. Please enter a valid and unused transaction ID."
    )]
    DuplicateTransactionId(String),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order is not in a state that allows the requested change.
    #[error("Invalid state transition: cannot {action} from {current} state")]
    InvalidTransition {
        current: OrderStatus,
        action: &'static str,
    },

    /// Only a terminally failed decision email can be put back in the queue.
    #[error("Decision email is {0}; only failed emails can be retried")]
    EmailNotRetryable(DecisionEmailStatus),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateTransactionId(txn) => DomainError::DuplicateTransactionId(txn),
            StoreError::OrderNotFound(id) => DomainError::OrderNotFound(id),
            other => DomainError::Store(other),
        }
    }
}
