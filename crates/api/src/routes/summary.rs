//! Kitchen planning summaries.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use order_store::OrderStore;
use queries::AcceptedItemsSummary;

use crate::AppState;
use crate::auth::Caller;
use crate::error::ApiError;

/// GET /summary/accepted-items — item totals over Verified and Delivered orders.
#[tracing::instrument(skip(state, caller))]
pub async fn accepted_items<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
) -> Result<Json<AcceptedItemsSummary>, ApiError> {
    caller.require_operator()?;
    let summary =
        queries::accepted_items(state.orders.store(), &state.catalog, state.clock.now()).await?;
    Ok(Json(summary))
}
