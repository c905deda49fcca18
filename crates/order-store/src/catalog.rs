//! Catalog records: food items and payment QR codes.
//!
//! Both carry an image that is uploaded in the background, with the same
//! pending/uploaded/failed sub-state as an order's payment screenshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CatalogId, Money, UploadStatus};
use serde::{Deserialize, Serialize};

use crate::{Result, UploadOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodItem {
    pub id: CatalogId,
    /// Identifier chosen by the operator; unique across the catalog.
    pub client_id: String,
    pub name: String,
    pub description: String,
    pub is_veg: bool,
    pub price: Money,
    pub image_url: String,
    pub storage_id: String,
    pub is_active: bool,
    pub upload_status: UploadStatus,
    pub upload_error: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentQr {
    pub id: CatalogId,
    pub image_url: String,
    pub storage_id: String,
    pub is_active: bool,
    pub upload_status: UploadStatus,
    pub upload_error: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentQr {
    pub fn pending(id: CatalogId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            image_url: String::new(),
            storage_id: String::new(),
            is_active: true,
            upload_status: UploadStatus::Pending,
            upload_error: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Applies an upload outcome to the image fields of a catalog record.
pub(crate) fn apply_upload(
    outcome: &UploadOutcome,
    image_url: &mut String,
    storage_id: &mut String,
    upload_status: &mut UploadStatus,
    upload_error: &mut String,
) {
    match outcome {
        UploadOutcome::Uploaded {
            url,
            storage_id: id,
        } => {
            *image_url = url.clone();
            *storage_id = id.clone();
            *upload_status = UploadStatus::Uploaded;
            upload_error.clear();
        }
        UploadOutcome::Failed { error } => {
            *upload_status = UploadStatus::Failed;
            *upload_error = error.clone();
        }
    }
}

/// Storage contract for the catalog.
///
/// Upload results are applied only while the record's upload is still
/// pending, exactly like orders.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Fails with `DuplicateCatalogItem` when the client id is taken.
    async fn insert_food(&self, food: FoodItem) -> Result<FoodItem>;

    /// Every food item, sorted by name.
    async fn list_foods(&self) -> Result<Vec<FoodItem>>;

    async fn record_food_upload(
        &self,
        id: CatalogId,
        outcome: UploadOutcome,
        now: DateTime<Utc>,
    ) -> Result<Option<FoodItem>>;

    /// Inserts `qr` only while fewer than `max` QR codes exist; the count
    /// and the insert are one atomic step.
    async fn insert_payment_qr(&self, qr: PaymentQr, max: usize) -> Result<PaymentQr>;

    /// Every payment QR, newest first.
    async fn list_payment_qrs(&self) -> Result<Vec<PaymentQr>>;

    async fn record_payment_qr_upload(
        &self,
        id: CatalogId,
        outcome: UploadOutcome,
        now: DateTime<Utc>,
    ) -> Result<Option<PaymentQr>>;

    /// Fails catalog uploads pending since before `pending_before`.
    ///
    /// Returns how many records changed.
    async fn fail_stale_uploads(
        &self,
        pending_before: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<u64>;
}
