//! Decision email dispatcher.

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::Clock;
use order_store::{ClaimPolicy, EmailOutcome, OrderRecord, OrderStore};
use realtime::{Broadcaster, BroadcasterExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};

use crate::error::{MailError, Result};
use crate::services::{DecisionMessage, Mailer, SendReport, SkipReason};

/// Tuning for the dispatcher loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Time between sweeps.
    pub interval: Duration,
    /// Emails claimed per sweep.
    pub batch_size: usize,
    /// Attempts after which a transient failure becomes terminal.
    pub max_attempts: u32,
    /// Age after which a `sending` claim counts as orphaned.
    pub reclaim_after: Duration,
    /// Per-send timeout.
    pub send_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            batch_size: 10,
            max_attempts: 10,
            reclaim_after: Duration::from_secs(600),
            send_timeout: Duration::from_secs(30),
        }
    }
}

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub claimed: usize,
    pub sent: usize,
    pub requeued: usize,
    pub failed: usize,
}

pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// Shortest period a background loop ticks at.
pub const MIN_TICK: Duration = Duration::from_secs(1);

/// Interval for a background loop; periods below [`MIN_TICK`] are raised to it.
pub(crate) fn ticker(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval(period.max(MIN_TICK));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Delivers exactly one decision email per decided order.
///
/// Each email is claimed with an atomic conditional update before sending,
/// so concurrent sweeps (in one process or several) never send the same
/// email twice. Transient failures go back to `queued` for the next sweep;
/// a missing recipient or too many attempts end in `failed`.
pub struct DecisionDispatcher<S: OrderStore> {
    store: S,
    mailer: Arc<dyn Mailer>,
    broadcaster: Arc<dyn Broadcaster>,
    clock: Arc<dyn Clock>,
    config: DispatchConfig,
}

impl<S: OrderStore + 'static> DecisionDispatcher<S> {
    pub fn new(
        store: S,
        mailer: Arc<dyn Mailer>,
        broadcaster: Arc<dyn Broadcaster>,
        clock: Arc<dyn Clock>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            store,
            mailer,
            broadcaster,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Claims and attempts up to one batch of decision emails.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let started = Instant::now();
        let policy = ClaimPolicy::new(self.clock.now(), to_chrono(self.config.reclaim_after));
        let ids = self
            .store
            .list_claimable_decision_emails(&policy, self.config.batch_size)
            .await?;

        let mut report = SweepReport::default();
        for id in ids {
            let Some(order) = self.store.claim_decision_email(id, &policy).await? else {
                tracing::debug!(order_id = %id, "decision email claimed elsewhere");
                continue;
            };
            report.claimed += 1;

            let outcome = self.attempt(&order).await;
            let label = match &outcome {
                EmailOutcome::Sent => {
                    report.sent += 1;
                    "sent"
                }
                EmailOutcome::Retry { error } => {
                    report.requeued += 1;
                    tracing::warn!(order_id = %id, attempts = order.decision_email.attempts, error = %error, "decision email requeued");
                    "requeued"
                }
                EmailOutcome::Failed { error } => {
                    report.failed += 1;
                    tracing::error!(order_id = %id, attempts = order.decision_email.attempts, error = %error, "decision email failed");
                    "failed"
                }
            };
            metrics::counter!("decision_emails_total", "outcome" => label).increment(1);

            let now = self.clock.now();
            match self.store.finish_decision_email(id, outcome, now).await? {
                Some(order) => self.broadcaster.decision_email_changed(&order, now),
                None => tracing::warn!(order_id = %id, "decision email claim lost before finishing"),
            }
        }

        metrics::histogram!("dispatcher_sweep_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        if report.claimed > 0 {
            tracing::info!(
                claimed = report.claimed,
                sent = report.sent,
                requeued = report.requeued,
                failed = report.failed,
                "dispatcher sweep finished"
            );
        }
        Ok(report)
    }

    /// Sends the email of a claimed order and classifies the result.
    async fn attempt(&self, order: &OrderRecord) -> EmailOutcome {
        let Some(message) = DecisionMessage::render(order) else {
            return EmailOutcome::Failed {
                error: "order has no decision".to_string(),
            };
        };

        let sent = tokio::time::timeout(self.config.send_timeout, self.mailer.send(&message))
            .await
            .unwrap_or(Err(MailError::TimedOut(self.config.send_timeout)));

        let error = match sent {
            Ok(SendReport::Sent) => return EmailOutcome::Sent,
            Ok(SendReport::Skipped(reason)) if reason.is_terminal() => {
                return EmailOutcome::Failed {
                    error: reason.as_str().to_string(),
                };
            }
            Ok(SendReport::Skipped(reason)) => reason.as_str().to_string(),
            Err(e) => e.to_string(),
        };

        if order.decision_email.attempts >= self.config.max_attempts {
            EmailOutcome::Failed {
                error: format!("{error} (gave up after {} attempts)", order.decision_email.attempts),
            }
        } else {
            EmailOutcome::Retry { error }
        }
    }

    /// Runs a sweep every `interval` until `shutdown` flips or its sender is dropped.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = ticker(self.config.interval);
            tracing::info!(interval = ?self.config.interval, "decision dispatcher started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_once().await {
                            tracing::error!(error = %e, "dispatcher sweep failed");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
            tracing::info!("decision dispatcher stopped");
        })
    }
}
