//! Order service providing the operations the HTTP layer calls.

use std::sync::Arc;

use common::{AccountKey, Clock, OrderId, OrderStatus};
use order_store::{OrderRecord, OrderStore, OrderStoreExt, Payment};

use crate::error::DomainError;

use super::{OrderSubmission, StatusChange, SubmissionRules, normalize_transaction_id};

/// Result of a status change request.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    /// The order as it is now stored.
    pub order: OrderRecord,
    /// True only if this call moved the order. A repeated decision leaves the
    /// order untouched and reports `false`.
    pub applied: bool,
}

impl TransitionOutcome {
    /// Returns true if this call made the first-time decision and therefore
    /// queued the decision email.
    pub fn queued_email(&self) -> bool {
        self.applied && self.order.status.is_decision()
    }
}

/// Service for managing orders.
///
/// Every state change is delegated to one conditional update in the store;
/// the service never reads, modifies and writes back.
pub struct OrderService<S: OrderStore> {
    store: S,
    clock: Arc<dyn Clock>,
    rules: SubmissionRules,
}

impl<S: OrderStore> OrderService<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, rules: SubmissionRules) -> Self {
        Self {
            store,
            clock,
            rules,
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn rules(&self) -> &SubmissionRules {
        &self.rules
    }

    /// Validates and stores a new order with a pending payment upload.
    ///
    /// Uniqueness of the transaction id is enforced by the store's insert, not
    /// by a prior lookup, so concurrent duplicates resolve to exactly one order.
    #[tracing::instrument(skip(self, submission), fields(txn = %submission.transaction_id))]
    pub async fn submit(
        &self,
        account_key: AccountKey,
        submission: OrderSubmission,
    ) -> Result<OrderRecord, DomainError> {
        let valid = submission.validate(&self.rules)?;

        let order = OrderRecord::placed(
            OrderId::new(),
            account_key,
            valid.team,
            valid.items,
            Payment::pending(valid.transaction_id, valid.screenshot_name),
            self.clock.now(),
        );

        match self.store.insert_order(order).await {
            Ok(order) => {
                metrics::counter!("orders_submitted_total").increment(1);
                tracing::info!(order_id = %order.id, "order placed");
                Ok(order)
            }
            Err(e) => {
                let err = DomainError::from(e);
                if matches!(err, DomainError::DuplicateTransactionId(_)) {
                    metrics::counter!("orders_duplicate_transaction_total").increment(1);
                }
                Err(err)
            }
        }
    }

    /// Advisory pre-submit check. The insert remains the authoritative guard.
    pub async fn transaction_id_available(&self, raw: &str) -> Result<bool, DomainError> {
        let normalized = normalize_transaction_id(raw)?;
        Ok(!self.store.transaction_id_exists(&normalized).await?)
    }

    /// Applies an operator status change.
    ///
    /// A decision on an order that is no longer Placed is a no-op that returns
    /// the stored state. Delivering an order that is not Verified fails with
    /// `InvalidTransition`, except for an already Delivered order which is
    /// returned unchanged.
    #[tracing::instrument(skip(self))]
    pub async fn change_status(
        &self,
        id: OrderId,
        change: StatusChange,
    ) -> Result<TransitionOutcome, DomainError> {
        let now = self.clock.now();
        let updated = match &change {
            StatusChange::Decide(decision) => self.store.apply_decision(id, decision, now).await?,
            StatusChange::Deliver => self.store.mark_delivered(id, now).await?,
        };

        if let Some(order) = updated {
            metrics::counter!("order_decisions_total", "status" => order.status.as_str())
                .increment(1);
            tracing::info!(order_id = %id, status = %order.status, "order status changed");
            return Ok(TransitionOutcome {
                order,
                applied: true,
            });
        }

        let current = self.store.require_order(id).await?;
        match change {
            StatusChange::Decide(_) => {
                tracing::debug!(order_id = %id, status = %current.status, "order already decided");
            }
            StatusChange::Deliver if current.status == OrderStatus::Delivered => {}
            StatusChange::Deliver => {
                return Err(DomainError::InvalidTransition {
                    current: current.status,
                    action: "deliver",
                });
            }
        }
        Ok(TransitionOutcome {
            order: current,
            applied: false,
        })
    }

    /// Puts a terminally failed decision email back into the dispatch queue.
    #[tracing::instrument(skip(self))]
    pub async fn retry_decision_email(&self, id: OrderId) -> Result<OrderRecord, DomainError> {
        if let Some(order) = self
            .store
            .requeue_failed_decision_email(id, self.clock.now())
            .await?
        {
            tracing::info!(order_id = %id, "decision email requeued");
            return Ok(order);
        }
        let current = self.store.require_order(id).await?;
        Err(DomainError::EmailNotRetryable(current.decision_email.status))
    }

    /// Loads an order, failing with `OrderNotFound` if it does not exist.
    pub async fn get_order(&self, id: OrderId) -> Result<OrderRecord, DomainError> {
        Ok(self.store.require_order(id).await?)
    }
}
