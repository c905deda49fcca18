use thiserror::Error;

use crate::OrderId;

/// Errors that can occur when interacting with the order store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another order already uses this normalized transaction id.
    #[error("Transaction id already used: {0}")]
    DuplicateTransactionId(String),

    /// Another catalog item already uses this client id.
    #[error("Catalog item already exists: {0}")]
    DuplicateCatalogItem(String),

    /// The payment QR collection is already at its limit.
    #[error("Maximum {0} QR codes allowed")]
    PaymentQrLimit(usize),

    /// The order was not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A stored row could not be mapped back into a record.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<common::ParseStatusError> for StoreError {
    fn from(e: common::ParseStatusError) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
