use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderStatus;

use crate::{OrderId, OrderQuery, OrderRecord, Result, StoreError};

/// A validated operator decision.
///
/// Only Verified and Rejected can be constructed, and a rejection always
/// carries its reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    status: OrderStatus,
    reason: String,
}

impl Decision {
    pub fn verify() -> Self {
        Self {
            status: OrderStatus::Verified,
            reason: String::new(),
        }
    }

    /// Returns `None` when the trimmed reason is empty.
    pub fn reject(reason: impl AsRef<str>) -> Option<Self> {
        let reason = reason.as_ref().trim();
        if reason.is_empty() {
            return None;
        }
        Some(Self {
            status: OrderStatus::Rejected,
            reason: reason.to_string(),
        })
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// The rejection reason; empty for Verified.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Terminal result of an image upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded { url: String, storage_id: String },
    Failed { error: String },
}

/// Result of one decision-email delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailOutcome {
    Sent,
    /// Transient failure; the email goes back to `queued`.
    Retry { error: String },
    /// Terminal failure; the email stays `failed` until an operator retries.
    Failed { error: String },
}

/// Which decision emails a dispatcher may claim.
///
/// An email is claimable when its order has left Placed and the email is
/// either `queued`, or has been `sending` since before
/// `reclaim_sending_before` (a claim orphaned by a crashed dispatcher).
/// Delivered orders stay eligible so a fast delivery never swallows the
/// verification email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimPolicy {
    pub now: DateTime<Utc>,
    pub reclaim_sending_before: DateTime<Utc>,
}

impl ClaimPolicy {
    pub fn new(now: DateTime<Utc>, reclaim_after: chrono::Duration) -> Self {
        Self {
            now,
            reclaim_sending_before: now
                .checked_sub_signed(reclaim_after)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        }
    }

    /// Returns true if `order`'s decision email may be claimed under this policy.
    pub fn is_claimable(&self, order: &OrderRecord) -> bool {
        use common::DecisionEmailStatus as S;

        if order.status.can_decide() {
            return false;
        }
        match order.decision_email.status {
            S::Queued => true,
            S::Sending => order
                .decision_email
                .last_attempt_at
                .is_none_or(|at| at < self.reclaim_sending_before),
            S::None | S::Sent | S::Failed => false,
        }
    }
}

/// Storage contract for orders.
///
/// Every method that changes an order is one atomic conditional update. A
/// return value of `Ok(None)` means the order was missing or its precondition
/// no longer held; no partial change is ever applied.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a new order.
    ///
    /// Fails with `DuplicateTransactionId` when another order already holds
    /// the same normalized transaction id. The check and the insert are one
    /// operation, so concurrent duplicates cannot both succeed.
    async fn insert_order(&self, order: OrderRecord) -> Result<OrderRecord>;

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderRecord>>;

    /// Returns true if an order already uses this normalized transaction id.
    async fn transaction_id_exists(&self, normalized: &str) -> Result<bool>;

    /// Records the screenshot upload result, only while the upload is still pending.
    async fn record_upload(
        &self,
        id: OrderId,
        outcome: UploadOutcome,
        now: DateTime<Utc>,
    ) -> Result<Option<OrderRecord>>;

    /// Applies an operator decision, only while the order is still Placed.
    ///
    /// The status, rejection reason and a freshly queued decision email are
    /// written together.
    async fn apply_decision(
        &self,
        id: OrderId,
        decision: &Decision,
        now: DateTime<Utc>,
    ) -> Result<Option<OrderRecord>>;

    /// Moves a Verified order to Delivered. Never touches the decision email.
    async fn mark_delivered(&self, id: OrderId, now: DateTime<Utc>)
    -> Result<Option<OrderRecord>>;

    /// Lists ids of claimable decision emails, least recently updated first.
    async fn list_claimable_decision_emails(
        &self,
        policy: &ClaimPolicy,
        limit: usize,
    ) -> Result<Vec<OrderId>>;

    /// Claims one decision email: `sending`, one more attempt, `lastAttemptAt = now`.
    ///
    /// Returns `None` if the email is no longer claimable (someone else won).
    async fn claim_decision_email(
        &self,
        id: OrderId,
        policy: &ClaimPolicy,
    ) -> Result<Option<OrderRecord>>;

    /// Records the outcome of an attempt, only while the email is `sending`.
    async fn finish_decision_email(
        &self,
        id: OrderId,
        outcome: EmailOutcome,
        now: DateTime<Utc>,
    ) -> Result<Option<OrderRecord>>;

    /// Puts a terminally `failed` decision email back into the queue.
    async fn requeue_failed_decision_email(
        &self,
        id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<Option<OrderRecord>>;

    /// Returns one keyset page, newest first.
    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<OrderRecord>>;

    /// Returns every order whose status is one of `statuses`.
    async fn list_orders_with_status(&self, statuses: &[OrderStatus])
    -> Result<Vec<OrderRecord>>;

    /// Marks uploads that have been pending since before `pending_before` as failed.
    ///
    /// Returns the orders that changed.
    async fn fail_stale_uploads(
        &self,
        pending_before: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderRecord>>;
}

/// Extension trait providing convenience methods for order stores.
#[async_trait]
pub trait OrderStoreExt: OrderStore {
    /// Loads an order, failing with `OrderNotFound` if it does not exist.
    async fn require_order(&self, id: OrderId) -> Result<OrderRecord> {
        self.get_order(id)
            .await?
            .ok_or(StoreError::OrderNotFound(id))
    }
}

// Blanket implementation for all OrderStore implementations
impl<T: OrderStore + ?Sized> OrderStoreExt for T {}
