//! HTTP API server for the food-ordering pipeline.
//!
//! Provides REST endpoints for order submission, operator review, the
//! catalog and payment QR codes, plus the operator and customer realtime
//! streams, with structured logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod form;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{DefaultBodyLimit, FromRef};
use axum::routing::{get, patch, post};
use common::{Clock, SystemClock};
use domain::OrderService;
use fulfillment::{
    CatalogChanged, InMemoryStorage, Mailer, ObjectStorage, SmtpMailer, UploadThrottler, Uploader,
};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::{CatalogStore, InMemoryCatalogStore, InMemoryOrderStore, OrderStore};
use queries::{CatalogView, OrderListing};
use realtime::{Broadcaster, Realtime};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use auth::AdminToken;
use config::Config;

/// Largest accepted request body; leaves room for form fields around a full-size image.
const BODY_LIMIT: usize = form::MAX_IMAGE_BYTES + 1024 * 1024;

/// Shared application state accessible from all handlers.
pub struct AppState<S: OrderStore> {
    pub orders: OrderService<S>,
    pub listing: OrderListing<S>,
    pub catalog_view: Arc<CatalogView<S>>,
    pub catalog: Arc<dyn CatalogStore>,
    pub uploader: Uploader<S>,
    pub realtime: Realtime,
    pub clock: Arc<dyn Clock>,
    pub admin_token: AdminToken,
    pub sse_heartbeat: Duration,
}

impl<S: OrderStore> FromRef<Arc<AppState<S>>> for AdminToken {
    fn from_ref(state: &Arc<AppState<S>>) -> Self {
        state.admin_token.clone()
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: OrderStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/orders",
            post(routes::orders::submit::<S>).get(routes::orders::list::<S>),
        )
        .route(
            "/orders/transaction-id-available",
            get(routes::orders::transaction_id_available::<S>),
        )
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/status", patch(routes::orders::update_status::<S>))
        .route(
            "/orders/{id}/decision-email/retry",
            post(routes::orders::retry_decision_email::<S>),
        )
        .route(
            "/foods",
            get(routes::foods::list::<S>).post(routes::foods::create::<S>),
        )
        .route(
            "/payment-qrs",
            get(routes::payment_qrs::list::<S>).post(routes::payment_qrs::create::<S>),
        )
        .route("/payment-qrs/active", get(routes::payment_qrs::active::<S>))
        .route(
            "/summary/accepted-items",
            get(routes::summary::accepted_items::<S>),
        )
        .route("/events", get(routes::events::customer::<S>))
        .route("/events/admin", get(routes::events::operator::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Hook that marks the cached catalog view stale.
pub fn catalog_invalidator<S: OrderStore + 'static>(view: &Arc<CatalogView<S>>) -> CatalogChanged {
    let view = Arc::clone(view);
    Arc::new(move || view.invalidate())
}

/// Wires the services on top of the given stores.
pub fn create_state<S: OrderStore + Clone + 'static>(
    config: &Config,
    orders: S,
    catalog: Arc<dyn CatalogStore>,
    storage: Arc<dyn ObjectStorage>,
    clock: Arc<dyn Clock>,
) -> Arc<AppState<S>> {
    let realtime = Realtime::new(config.sse_buffer);
    let broadcaster: Arc<dyn Broadcaster> = Arc::new(realtime.clone());
    let throttler = UploadThrottler::new(
        storage,
        config.max_parallel_uploads,
        config.upload_timeout,
    );
    let catalog_view = Arc::new(CatalogView::new(
        orders.clone(),
        Arc::clone(&catalog),
        config.catalog_cache_ttl,
    ));
    let uploader = Uploader::new(
        orders.clone(),
        Arc::clone(&catalog),
        throttler,
        broadcaster,
        Arc::clone(&clock),
        config.upload_folders(),
    )
    .on_catalog_change(catalog_invalidator(&catalog_view));

    Arc::new(AppState {
        orders: OrderService::new(orders.clone(), Arc::clone(&clock), config.submission_rules()),
        listing: OrderListing::new(orders),
        catalog_view,
        catalog,
        uploader,
        realtime,
        clock,
        admin_token: AdminToken::new(config.admin_token.clone()),
        sse_heartbeat: config.sse_heartbeat,
    })
}

/// Picks the mailer for decision emails.
///
/// Returns `None` when mail is disabled or the SMTP settings are incomplete
/// or invalid. Without a mailer the dispatcher is not started and decided
/// orders keep their emails queued.
pub fn decision_mailer(config: &Config) -> Option<Arc<dyn Mailer>> {
    if !config.mail_enabled {
        tracing::info!("mail disabled, decision emails stay queued");
        return None;
    }
    let Some(settings) = config.smtp_settings() else {
        tracing::warn!(
            "MAIL_ENABLED is set but SMTP_HOST, SMTP_USER or SMTP_PASS is missing, \
             decision emails stay queued"
        );
        return None;
    };
    match SmtpMailer::new(&settings) {
        Ok(mailer) => {
            tracing::info!(
                host = %settings.host,
                port = settings.port,
                "sending decision emails over SMTP"
            );
            Some(Arc::new(mailer))
        }
        Err(e) => {
            tracing::error!(error = %e, "invalid mail settings, decision emails stay queued");
            None
        }
    }
}

/// Creates the default application state with in-memory stores and storage.
pub fn create_default_state(config: &Config) -> Arc<AppState<InMemoryOrderStore>> {
    create_state(
        config,
        InMemoryOrderStore::new(),
        Arc::new(InMemoryCatalogStore::new()),
        Arc::new(InMemoryStorage::new()),
        Arc::new(SystemClock),
    )
}
