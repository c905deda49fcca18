//! Background image uploads for orders and catalog records.

use std::sync::Arc;

use common::{CatalogId, Clock, OrderId};
use order_store::{CatalogStore, OrderRecord, OrderStore, UploadOutcome};
use realtime::{Broadcaster, BroadcasterExt};
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::throttler::UploadThrottler;

/// Destination folders in object storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFolders {
    pub payments: String,
    pub foods: String,
    pub payment_qrs: String,
}

impl Default for UploadFolders {
    fn default() -> Self {
        Self {
            payments: "food-portal/payments".to_string(),
            foods: "food-portal/foods".to_string(),
            payment_qrs: "food-portal/payment-qrs".to_string(),
        }
    }
}

/// Callback run after a catalog record changes, e.g. to drop a cached view.
pub type CatalogChanged = Arc<dyn Fn() + Send + Sync>;

fn outcome_label(outcome: &UploadOutcome) -> &'static str {
    match outcome {
        UploadOutcome::Uploaded { .. } => "uploaded",
        UploadOutcome::Failed { .. } => "failed",
    }
}

/// Runs uploads after the response has been returned and records the result.
///
/// Each upload goes through the shared [`UploadThrottler`]. The result is
/// written with a conditional update that only applies while the record's
/// upload is still pending, so a record reaches a terminal upload state once.
pub struct Uploader<S: OrderStore> {
    orders: S,
    catalog: Arc<dyn CatalogStore>,
    throttler: UploadThrottler,
    broadcaster: Arc<dyn Broadcaster>,
    clock: Arc<dyn Clock>,
    folders: UploadFolders,
    on_catalog_change: Option<CatalogChanged>,
}

impl<S: OrderStore + Clone> Clone for Uploader<S> {
    fn clone(&self) -> Self {
        Self {
            orders: self.orders.clone(),
            catalog: Arc::clone(&self.catalog),
            throttler: self.throttler.clone(),
            broadcaster: Arc::clone(&self.broadcaster),
            clock: Arc::clone(&self.clock),
            folders: self.folders.clone(),
            on_catalog_change: self.on_catalog_change.clone(),
        }
    }
}

impl<S: OrderStore + Clone + 'static> Uploader<S> {
    pub fn new(
        orders: S,
        catalog: Arc<dyn CatalogStore>,
        throttler: UploadThrottler,
        broadcaster: Arc<dyn Broadcaster>,
        clock: Arc<dyn Clock>,
        folders: UploadFolders,
    ) -> Self {
        Self {
            orders,
            catalog,
            throttler,
            broadcaster,
            clock,
            folders,
            on_catalog_change: None,
        }
    }

    /// Runs `hook` whenever a food image upload is recorded.
    pub fn on_catalog_change(mut self, hook: CatalogChanged) -> Self {
        self.on_catalog_change = Some(hook);
        self
    }

    pub fn throttler(&self) -> &UploadThrottler {
        &self.throttler
    }

    async fn upload(&self, bytes: Vec<u8>, folder: &str) -> UploadOutcome {
        let outcome = match self.throttler.submit(bytes, folder).await {
            Ok(stored) => UploadOutcome::Uploaded {
                url: stored.url,
                storage_id: stored.storage_id,
            },
            Err(e) => UploadOutcome::Failed {
                error: e.to_string(),
            },
        };
        metrics::counter!("uploads_completed_total", "outcome" => outcome_label(&outcome))
            .increment(1);
        outcome
    }

    /// Uploads an order's payment screenshot and records the result.
    ///
    /// Returns the updated order, or `None` if the upload was no longer
    /// pending (for example, the reconciler already failed it).
    #[tracing::instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload_payment(&self, id: OrderId, bytes: Vec<u8>) -> Result<Option<OrderRecord>> {
        let outcome = self.upload(bytes, &self.folders.payments).await;
        if let UploadOutcome::Failed { ref error } = outcome {
            tracing::warn!(order_id = %id, error = %error, "payment screenshot upload failed");
        }

        let now = self.clock.now();
        let updated = self.orders.record_upload(id, outcome, now).await?;
        match &updated {
            Some(order) => self.broadcaster.order_upload_finished(order, now),
            None => tracing::debug!(order_id = %id, "upload result discarded, no longer pending"),
        }
        Ok(updated)
    }

    /// Uploads a food item image and records the result.
    #[tracing::instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload_food_image(&self, id: CatalogId, bytes: Vec<u8>) -> Result<bool> {
        let outcome = self.upload(bytes, &self.folders.foods).await;
        let now = self.clock.now();
        let updated = self.catalog.record_food_upload(id, outcome, now).await?;
        if let Some(food) = &updated {
            if let Some(hook) = &self.on_catalog_change {
                hook();
            }
            self.broadcaster.foods_changed("imageUpdated", &food.client_id, now);
        }
        Ok(updated.is_some())
    }

    /// Uploads a payment QR image and records the result.
    #[tracing::instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload_payment_qr_image(&self, id: CatalogId, bytes: Vec<u8>) -> Result<bool> {
        let outcome = self.upload(bytes, &self.folders.payment_qrs).await;
        let now = self.clock.now();
        let updated = self
            .catalog
            .record_payment_qr_upload(id, outcome, now)
            .await?;
        if let Some(qr) = &updated {
            self.broadcaster.payment_qr_changed("imageUpdated", qr.id, now);
        }
        Ok(updated.is_some())
    }

    /// Runs [`Uploader::upload_payment`] in the background.
    pub fn spawn_payment_upload(&self, id: OrderId, bytes: Vec<u8>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.upload_payment(id, bytes).await {
                tracing::error!(order_id = %id, error = %e, "recording payment upload failed");
            }
        })
    }

    pub fn spawn_food_upload(&self, id: CatalogId, bytes: Vec<u8>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.upload_food_image(id, bytes).await {
                tracing::error!(food_id = %id, error = %e, "recording food image upload failed");
            }
        })
    }

    pub fn spawn_payment_qr_upload(&self, id: CatalogId, bytes: Vec<u8>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.upload_payment_qr_image(id, bytes).await {
                tracing::error!(qr_id = %id, error = %e, "recording payment QR upload failed");
            }
        })
    }
}
