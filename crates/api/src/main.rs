//! API server entry point.

use std::sync::Arc;

use api::config::Config;
use common::{Clock, SystemClock};
use fulfillment::{DecisionDispatcher, FilesystemStorage, InMemoryStorage, ObjectStorage, Reconciler};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::{
    CatalogStore, InMemoryCatalogStore, InMemoryOrderStore, OrderStore, PostgresCatalogStore,
    PostgresOrderStore,
};
use realtime::Broadcaster;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn object_storage(config: &Config) -> Arc<dyn ObjectStorage> {
    match &config.upload_dir {
        Some(dir) => {
            tracing::info!(%dir, "storing uploads on the filesystem");
            Arc::new(FilesystemStorage::new(dir, config.upload_base_url.clone()))
        }
        None => {
            tracing::warn!("UPLOAD_DIR not set, keeping uploads in memory");
            Arc::new(InMemoryStorage::new())
        }
    }
}

/// Serves until a shutdown signal, with the dispatcher and reconciler running alongside.
async fn run<S: OrderStore + Clone + 'static>(
    config: Config,
    orders: S,
    catalog: Arc<dyn CatalogStore>,
    metrics_handle: PrometheusHandle,
) {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = api::create_state(
        &config,
        orders.clone(),
        Arc::clone(&catalog),
        object_storage(&config),
        Arc::clone(&clock),
    );
    let broadcaster: Arc<dyn Broadcaster> = Arc::new(state.realtime.clone());

    // Background workers stop when the shutdown flag flips.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = Vec::new();

    if let Some(mailer) = api::decision_mailer(&config) {
        let dispatcher = Arc::new(DecisionDispatcher::new(
            orders.clone(),
            mailer,
            Arc::clone(&broadcaster),
            Arc::clone(&clock),
            config.dispatch_config(),
        ));
        workers.push(dispatcher.spawn(shutdown_rx.clone()));
    }

    let reconciler = Reconciler::new(
        orders,
        catalog,
        broadcaster,
        clock,
        config.reconcile_config(),
    )
    .on_catalog_change(api::catalog_invalidator(&state.catalog_view));
    workers.push(Arc::new(reconciler).spawn(shutdown_rx));

    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    let _ = shutdown_tx.send(true);
    for worker in workers {
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "background worker panicked");
        }
    }
}

#[tokio::main]
async fn main() {
    // 1. Initialize tracing before anything that logs
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the stores and serve
    match config.database_url.clone() {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(&url)
                .await
                .expect("failed to connect to PostgreSQL");
            let orders = PostgresOrderStore::new(pool.clone());
            orders
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL stores");
            run(config, orders, Arc::new(PostgresCatalogStore::new(pool)), metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores");
            let catalog = Arc::new(InMemoryCatalogStore::new());
            run(config, InMemoryOrderStore::new(), catalog, metrics_handle).await;
        }
    }

    tracing::info!("server shut down gracefully");
}
