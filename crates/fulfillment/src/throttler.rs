//! Bounded-concurrency front for object storage.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::error::UploadError;
use crate::services::{ObjectStorage, StoredObject};

/// Admits at most `limit` uploads at once.
///
/// Callers beyond the limit wait in arrival order; nothing is dropped. Each
/// admitted upload runs under its own timeout, and a timeout is reported like
/// any other failure. Failed uploads are not retried here.
#[derive(Clone)]
pub struct UploadThrottler {
    storage: Arc<dyn ObjectStorage>,
    permits: Arc<Semaphore>,
    limit: usize,
    timeout: Duration,
}

impl UploadThrottler {
    pub fn new(storage: Arc<dyn ObjectStorage>, limit: usize, timeout: Duration) -> Self {
        let limit = limit.max(1);
        Self {
            storage,
            permits: Arc::new(Semaphore::new(limit)),
            limit,
            timeout,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Uploads `bytes` into `folder` once a slot is free.
    #[tracing::instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn submit(&self, bytes: Vec<u8>, folder: &str) -> Result<StoredObject, UploadError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| UploadError::Closed)?;

        let in_flight = metrics::gauge!("uploads_in_flight");
        in_flight.increment(1.0);
        let result = tokio::time::timeout(self.timeout, self.storage.upload(bytes, folder)).await;
        in_flight.decrement(1.0);

        match result {
            Ok(result) => result,
            Err(_) => Err(UploadError::TimedOut(self.timeout)),
        }
    }

    /// Stops admitting uploads. Waiting and later callers fail with `Closed`.
    pub fn close(&self) {
        self.permits.close();
    }
}
