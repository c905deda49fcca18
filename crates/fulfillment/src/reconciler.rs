//! Reconciliation of uploads interrupted by a restart.

use std::sync::Arc;
use std::time::Duration;

use common::Clock;
use order_store::{CatalogStore, OrderStore};
use realtime::{Broadcaster, BroadcasterExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::dispatcher::{ticker, to_chrono};
use crate::error::Result;
use crate::uploader::CatalogChanged;

/// Error recorded on uploads that never finished.
pub const UPLOAD_INTERRUPTED: &str = "upload interrupted";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileConfig {
    pub interval: Duration,
    /// An upload pending for longer than this is considered lost.
    pub stale_after: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            stale_after: Duration::from_secs(900),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub orders: usize,
    pub catalog: u64,
}

/// Fails uploads that have been pending too long.
///
/// Upload tasks live only in memory, so a restart loses them. Their records
/// would otherwise stay `pending` forever; this pass makes the loss visible
/// to operators instead.
pub struct Reconciler<S: OrderStore> {
    orders: S,
    catalog: Arc<dyn CatalogStore>,
    broadcaster: Arc<dyn Broadcaster>,
    clock: Arc<dyn Clock>,
    config: ReconcileConfig,
    on_catalog_change: Option<CatalogChanged>,
}

impl<S: OrderStore + 'static> Reconciler<S> {
    pub fn new(
        orders: S,
        catalog: Arc<dyn CatalogStore>,
        broadcaster: Arc<dyn Broadcaster>,
        clock: Arc<dyn Clock>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            orders,
            catalog,
            broadcaster,
            clock,
            config,
            on_catalog_change: None,
        }
    }

    /// Runs `hook` whenever a pass fails catalog uploads.
    pub fn on_catalog_change(mut self, hook: CatalogChanged) -> Self {
        self.on_catalog_change = Some(hook);
        self
    }

    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Result<ReconcileReport> {
        let now = self.clock.now();
        let cutoff = now
            .checked_sub_signed(to_chrono(self.config.stale_after))
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);

        let orders = self
            .orders
            .fail_stale_uploads(cutoff, UPLOAD_INTERRUPTED, now)
            .await?;
        for order in &orders {
            tracing::warn!(order_id = %order.id, "payment upload marked interrupted");
            self.broadcaster.order_upload_finished(order, now);
        }

        let catalog = self
            .catalog
            .fail_stale_uploads(cutoff, UPLOAD_INTERRUPTED, now)
            .await?;
        if catalog > 0 {
            tracing::warn!(count = catalog, "catalog uploads marked interrupted");
            if let Some(hook) = &self.on_catalog_change {
                hook();
            }
            self.broadcaster.foods_changed("uploadsReconciled", "", now);
            self.broadcaster.payment_qr_changed("uploadsReconciled", "", now);
        }

        Ok(ReconcileReport {
            orders: orders.len(),
            catalog,
        })
    }

    /// Runs a pass every `interval` until `shutdown` flips or its sender is dropped.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = ticker(self.config.interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            tracing::error!(error = %e, "reconciliation pass failed");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
            tracing::info!("reconciler stopped");
        })
    }
}
