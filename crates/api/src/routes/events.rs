//! Server-sent event streams for operators and customers.
//!
//! Each stream opens with a `retry` hint and a `hello` event, then relays the
//! channel's events until the client disconnects. Keep-alive comments go out
//! every `SSE_HEARTBEAT_SECS`. Dropping the response body drops the
//! subscription, which removes it from the registry.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::HeaderName;
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_core::Stream;
use futures_util::stream::{self, StreamExt};
use order_store::OrderStore;
use realtime::Subscription;

use crate::AppState;
use crate::auth::Caller;
use crate::error::ApiError;

/// How long browsers wait before reconnecting.
const RECONNECT_AFTER: Duration = Duration::from_secs(5);

fn event_stream(
    subscription: Subscription,
    hello: serde_json::Value,
) -> impl Stream<Item = Result<Event, axum::Error>> {
    let hello = Event::default()
        .retry(RECONNECT_AFTER)
        .event("hello")
        .json_data(hello);

    let relayed = stream::unfold(subscription, |mut subscription| async move {
        let event = subscription.recv().await?;
        let sse = Event::default().event(event.name).json_data(&event.data);
        Some((sse, subscription))
    });

    stream::once(async move { hello }).chain(relayed)
}

fn respond<S: OrderStore>(
    state: &AppState<S>,
    subscription: Subscription,
) -> impl IntoResponse + use<S> {
    let hello = serde_json::json!({ "ok": true, "now": state.clock.now() });
    let sse = Sse::new(event_stream(subscription, hello))
        .keep_alive(KeepAlive::new().interval(state.sse_heartbeat).text("ping"));
    // Stops nginx from buffering the stream.
    ([(HeaderName::from_static("x-accel-buffering"), "no")], sse)
}

/// GET /events/admin — every order and catalog mutation (operator).
#[tracing::instrument(skip(state, caller))]
pub async fn operator<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
) -> Result<impl IntoResponse, ApiError> {
    caller.require_operator()?;
    let subscription = state.realtime.operator().subscribe(None);
    Ok(respond(&state, subscription))
}

/// GET /events — catalog changes, plus order changes for the presented account.
#[tracing::instrument(skip(state, caller))]
pub async fn customer<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
) -> impl IntoResponse {
    let subscription = state
        .realtime
        .customer()
        .subscribe(caller.account_key().cloned());
    respond(&state, subscription)
}
