//! Fulfillment error types.

use std::time::Duration;

use order_store::StoreError;
use thiserror::Error;

/// Errors raised by object storage or the upload throttler.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The storage backend refused or failed the upload.
    #[error("Upload failed: {0}")]
    Storage(String),

    /// Writing the object locally failed.
    #[error("Upload I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The upload did not finish in time.
    #[error("Upload timed out after {0:?}")]
    TimedOut(Duration),

    /// The throttler was shut down.
    #[error("Upload throttler closed")]
    Closed,
}

/// Errors raised by a mailer.
///
/// Send-time variants are treated as transient by the dispatcher.
#[derive(Debug, Error)]
pub enum MailError {
    /// The mailer could not be built from its settings.
    #[error("Mail configuration error: {0}")]
    Config(String),

    #[error("Mail transport error: {0}")]
    Transport(String),

    #[error("Mail send timed out after {0:?}")]
    TimedOut(Duration),
}

/// Errors that abort a background pass.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Mail(#[from] MailError),
}

/// Convenience type alias for fulfillment results.
pub type Result<T> = std::result::Result<T, FulfillmentError>;
