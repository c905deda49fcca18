//! Order submission, listing and operator review endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use common::OrderId;
use domain::{ItemInput, OrderSubmission, OrderView, StatusChange};
use order_store::{OrderQuery, OrderRecord, OrderStore, PageCursor};
use realtime::BroadcasterExt;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::Caller;
use crate::error::ApiError;
use crate::form::Form;

/// Response header carrying the cursor of the next page.
pub const NEXT_CURSOR_HEADER: &str = "x-next-cursor";

const SCREENSHOT_FIELD: &str = "paymentScreenshot";

// -- Request types --

#[derive(Deserialize)]
pub struct ListParams {
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionIdParams {
    #[serde(default)]
    pub transaction_id: String,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: String,
    pub reason: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct AvailabilityResponse {
    pub available: bool,
}

fn view_for(caller: &Caller, order: &OrderRecord) -> OrderView {
    if caller.is_operator() {
        OrderView::for_operator(order)
    } else {
        OrderView::from_record(order)
    }
}

// -- Handlers --

/// POST /orders — place an order; the payment screenshot uploads in the background.
#[tracing::instrument(skip(state, caller, multipart))]
pub async fn submit<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    multipart: Multipart,
) -> Result<(StatusCode, Json<OrderView>), ApiError> {
    let account_key = caller.require_account()?;
    let mut form = Form::read(multipart, SCREENSHOT_FIELD).await?;
    let image = form.image.take();

    let submission = OrderSubmission {
        team_name: form.text("teamName").to_string(),
        leader_name: form.text("leaderName").to_string(),
        phone: form.text("phone").to_string(),
        email: form.text("email").to_string(),
        transaction_id: form.text("transactionId").to_string(),
        items: ItemInput::parse_list(form.text("items"))?,
        screenshot_name: image
            .as_ref()
            .map(|i| {
                if i.file_name.is_empty() {
                    SCREENSHOT_FIELD.to_string()
                } else {
                    i.file_name.clone()
                }
            })
            .unwrap_or_default(),
    };

    let order = state.orders.submit(account_key, submission).await?;
    state.realtime.order_created(&order, state.clock.now());
    state.catalog_view.invalidate();

    if let Some(image) = image {
        state.uploader.spawn_payment_upload(order.id, image.bytes);
    }

    Ok((StatusCode::ACCEPTED, Json(OrderView::from_record(&order))))
}

/// GET /orders — one keyset page, newest first.
///
/// Operators see every order; customers see their own.
#[tracing::instrument(skip(state, params))]
pub async fn list<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Query(params): Query<ListParams>,
) -> Result<(HeaderMap, Json<Vec<OrderView>>), ApiError> {
    let query = if caller.is_operator() {
        OrderQuery::all()
    } else {
        OrderQuery::for_account(caller.require_account()?)
    };

    let cursor = match params.cursor.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            PageCursor::parse(raw)
                .ok_or_else(|| ApiError::BadRequest("Invalid cursor".to_string()))?,
        ),
    };
    let mut query = query.before(cursor);
    if let Some(limit) = params.limit {
        query = query.limit(limit);
    }

    let page = state.listing.page(&query).await?;

    let mut headers = HeaderMap::new();
    if let Some(next) = page.next_cursor
        && let Ok(value) = HeaderValue::from_str(&next.to_string())
    {
        headers.insert(NEXT_CURSOR_HEADER, value);
    }
    let views = page.orders.iter().map(|o| view_for(&caller, o)).collect();
    Ok((headers, Json(views)))
}

/// GET /orders/transaction-id-available — advisory uniqueness check.
#[tracing::instrument(skip(state, params))]
pub async fn transaction_id_available<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<TransactionIdParams>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let available = state
        .orders
        .transaction_id_available(&params.transaction_id)
        .await?;
    Ok(Json(AvailabilityResponse { available }))
}

/// GET /orders/:id — one order, for an operator or its owner.
#[tracing::instrument(skip(state))]
pub async fn get<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<OrderView>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.orders.get_order(order_id).await?;

    let visible = caller.is_operator() || caller.account_key() == Some(&order.account_key);
    if !visible {
        return Err(ApiError::NotFound(format!("Order not found: {id}")));
    }
    Ok(Json(view_for(&caller, &order)))
}

/// PATCH /orders/:id/status — operator decision or hand-over.
///
/// Repeating a decision returns the current order unchanged.
#[tracing::instrument(skip(state, caller, req))]
pub async fn update_status<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<OrderView>, ApiError> {
    caller.require_operator()?;
    let order_id = parse_order_id(&id)?;
    let change = StatusChange::parse(&req.status, req.reason.as_deref())?;

    let outcome = state.orders.change_status(order_id, change).await?;
    if outcome.applied {
        state
            .realtime
            .order_status_changed(&outcome.order, state.clock.now());
        state.catalog_view.invalidate();
    }
    Ok(Json(OrderView::for_operator(&outcome.order)))
}

/// POST /orders/:id/decision-email/retry — requeue a failed decision email.
#[tracing::instrument(skip(state, caller))]
pub async fn retry_decision_email<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<OrderView>, ApiError> {
    caller.require_operator()?;
    let order_id = parse_order_id(&id)?;

    let order = state.orders.retry_decision_email(order_id).await?;
    state
        .realtime
        .decision_email_changed(&order, state.clock.now());
    Ok(Json(OrderView::for_operator(&order)))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    id.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid ID format: {id}")))
}
