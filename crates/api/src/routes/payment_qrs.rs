//! Payment QR code endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{CatalogId, UploadStatus};
use order_store::{OrderStore, PaymentQr};
use realtime::BroadcasterExt;
use serde::Serialize;

use crate::AppState;
use crate::auth::Caller;
use crate::error::ApiError;
use crate::form::Form;

/// Most QR codes kept at once.
pub const MAX_PAYMENT_QRS: usize = 4;

const IMAGE_FIELD: &str = "image";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentQrResponse {
    pub id: CatalogId,
    pub image_url: String,
    pub is_active: bool,
    pub upload_status: UploadStatus,
    pub upload_error: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&PaymentQr> for PaymentQrResponse {
    fn from(qr: &PaymentQr) -> Self {
        Self {
            id: qr.id,
            image_url: qr.image_url.clone(),
            is_active: qr.is_active,
            upload_status: qr.upload_status,
            upload_error: qr.upload_error.clone(),
            created_at: qr.created_at,
            updated_at: qr.updated_at,
        }
    }
}

/// The QR customers should pay to; empty fields when none is ready.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveQrResponse {
    pub id: String,
    pub image_url: String,
}

/// GET /payment-qrs — every QR code, newest first (operator).
#[tracing::instrument(skip(state, caller))]
pub async fn list<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
) -> Result<Json<Vec<PaymentQrResponse>>, ApiError> {
    caller.require_operator()?;
    let qrs = state.catalog.list_payment_qrs().await?;
    Ok(Json(qrs.iter().map(PaymentQrResponse::from).collect()))
}

/// GET /payment-qrs/active — the newest active QR whose image is uploaded.
#[tracing::instrument(skip(state))]
pub async fn active<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<ActiveQrResponse>, ApiError> {
    let qrs = state.catalog.list_payment_qrs().await?;
    let response = qrs
        .iter()
        .find(|qr| qr.is_active && qr.upload_status == UploadStatus::Uploaded)
        .map(|qr| ActiveQrResponse {
            id: qr.id.to_string(),
            image_url: qr.image_url.clone(),
        })
        .unwrap_or(ActiveQrResponse {
            id: String::new(),
            image_url: String::new(),
        });
    Ok(Json(response))
}

/// POST /payment-qrs — add a QR code; the image uploads in the background.
#[tracing::instrument(skip(state, caller, multipart))]
pub async fn create<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    multipart: Multipart,
) -> Result<(StatusCode, Json<PaymentQrResponse>), ApiError> {
    caller.require_operator()?;
    let mut form = Form::read(multipart, IMAGE_FIELD).await?;

    let image = form
        .image
        .take()
        .ok_or_else(|| ApiError::BadRequest("image file is required".to_string()))?;

    let now = state.clock.now();
    let qr = state
        .catalog
        .insert_payment_qr(PaymentQr::pending(CatalogId::new(), now), MAX_PAYMENT_QRS)
        .await?;
    state.realtime.payment_qr_changed("created", qr.id, now);
    state.uploader.spawn_payment_qr_upload(qr.id, image.bytes);

    Ok((StatusCode::CREATED, Json(PaymentQrResponse::from(&qr))))
}
