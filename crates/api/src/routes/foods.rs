//! Catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{CatalogId, Money, UploadStatus};
use order_store::{FoodItem, OrderStore};
use queries::FoodListing;
use realtime::BroadcasterExt;
use serde::Serialize;

use crate::AppState;
use crate::auth::Caller;
use crate::error::ApiError;
use crate::form::Form;

const IMAGE_FIELD: &str = "image";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    pub is_veg: bool,
    pub price: f64,
    pub image: String,
    pub image_upload_status: UploadStatus,
    pub image_upload_error: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&FoodItem> for FoodResponse {
    fn from(food: &FoodItem) -> Self {
        Self {
            id: food.client_id.clone(),
            name: food.name.clone(),
            description: food.description.clone(),
            is_veg: food.is_veg,
            price: food.price.as_major(),
            image: food.image_url.clone(),
            image_upload_status: food.upload_status,
            image_upload_error: food.upload_error.clone(),
            is_active: food.is_active,
            created_at: food.created_at,
        }
    }
}

/// Derives a client id from a display name: lower-case words joined by `-`.
fn slug(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// GET /foods — the catalog with popularity, served from the short-lived cache.
#[tracing::instrument(skip(state))]
pub async fn list<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<FoodListing>>, ApiError> {
    let foods = state.catalog_view.foods().await?;
    Ok(Json(foods.as_ref().clone()))
}

/// POST /foods — add a catalog item; its image uploads in the background.
#[tracing::instrument(skip(state, caller, multipart))]
pub async fn create<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    multipart: Multipart,
) -> Result<(StatusCode, Json<FoodResponse>), ApiError> {
    caller.require_operator()?;
    let mut form = Form::read(multipart, IMAGE_FIELD).await?;
    let image = form.image.take();

    let name = form.text("name").trim().to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest("name is required".to_string()));
    }
    let is_veg = form
        .flag("isVeg")
        .ok_or_else(|| ApiError::BadRequest("isVeg must be true/false".to_string()))?;
    let price = form
        .text("price")
        .trim()
        .parse::<f64>()
        .ok()
        .and_then(Money::from_major)
        .filter(|p| p.minor() >= 0)
        .ok_or_else(|| ApiError::BadRequest("price must be a number >= 0".to_string()))?;
    let client_id = match form.text("clientId").trim() {
        "" => slug(&name),
        given => given.to_string(),
    };
    if client_id.is_empty() {
        return Err(ApiError::BadRequest("clientId is required".to_string()));
    }

    let now = state.clock.now();
    let food = FoodItem {
        id: CatalogId::new(),
        client_id,
        name,
        description: form.text("description").trim().to_string(),
        is_veg,
        price,
        image_url: if image.is_some() {
            String::new()
        } else {
            form.text("imageUrl").trim().to_string()
        },
        storage_id: String::new(),
        is_active: form.flag("isActive").unwrap_or(true),
        upload_status: if image.is_some() {
            UploadStatus::Pending
        } else {
            UploadStatus::Uploaded
        },
        upload_error: String::new(),
        created_at: now,
        updated_at: now,
    };

    let food = state.catalog.insert_food(food).await?;
    tracing::info!(food = %food.client_id, "food item created");
    state.realtime.foods_changed("created", &food.client_id, now);
    state.catalog_view.invalidate();

    if let Some(image) = image {
        state.uploader.spawn_food_upload(food.id, image.bytes);
    }

    Ok((StatusCode::CREATED, Json(FoodResponse::from(&food))))
}
