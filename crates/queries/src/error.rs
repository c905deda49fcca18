//! Query error types.

use thiserror::Error;

/// Errors that can occur while answering a read-side query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// An error occurred in the order or catalog store.
    #[error("Store error: {0}")]
    Store(#[from] order_store::StoreError),
}

/// Result type for query operations.
pub type Result<T> = std::result::Result<T, QueryError>;
