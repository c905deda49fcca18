use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{DecisionEmailStatus, DecisionType, OrderStatus, UploadStatus};
use tokio::sync::RwLock;

use crate::{
    CatalogId, OrderId, OrderQuery, OrderRecord, Result, StoreError,
    catalog::{CatalogStore, FoodItem, PaymentQr, apply_upload},
    store::{ClaimPolicy, Decision, EmailOutcome, OrderStore, UploadOutcome},
};

#[derive(Default)]
struct OrderState {
    orders: HashMap<OrderId, OrderRecord>,
    /// Normalized transaction id -> owning order.
    by_transaction: HashMap<String, OrderId>,
}

/// In-memory order store for tests and single-process runs.
///
/// A single write lock around the whole state makes every conditional update
/// atomic with respect to every other one, matching the row-level guarantees
/// of the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<OrderState>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Applies `change` to the order if `predicate` holds, under the write lock.
    async fn update_if(
        &self,
        id: OrderId,
        predicate: impl FnOnce(&OrderRecord) -> bool + Send,
        change: impl FnOnce(&mut OrderRecord) + Send,
    ) -> Option<OrderRecord> {
        let mut state = self.state.write().await;
        let order = state.orders.get_mut(&id)?;
        if !predicate(order) {
            return None;
        }
        change(order);
        Some(order.clone())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert_order(&self, order: OrderRecord) -> Result<OrderRecord> {
        let mut state = self.state.write().await;
        if state
            .by_transaction
            .contains_key(&order.transaction_id_normalized)
        {
            return Err(StoreError::DuplicateTransactionId(
                order.transaction_id_normalized,
            ));
        }
        state
            .by_transaction
            .insert(order.transaction_id_normalized.clone(), order.id);
        state.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderRecord>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn transaction_id_exists(&self, normalized: &str) -> Result<bool> {
        Ok(self
            .state
            .read()
            .await
            .by_transaction
            .contains_key(normalized))
    }

    async fn record_upload(
        &self,
        id: OrderId,
        outcome: UploadOutcome,
        now: DateTime<Utc>,
    ) -> Result<Option<OrderRecord>> {
        Ok(self
            .update_if(
                id,
                |o| o.payment.upload_status == UploadStatus::Pending,
                |o| {
                    let p = &mut o.payment;
                    apply_upload(
                        &outcome,
                        &mut p.screenshot_url,
                        &mut p.storage_id,
                        &mut p.upload_status,
                        &mut p.upload_error,
                    );
                    o.updated_at = now;
                },
            )
            .await)
    }

    async fn apply_decision(
        &self,
        id: OrderId,
        decision: &Decision,
        now: DateTime<Utc>,
    ) -> Result<Option<OrderRecord>> {
        Ok(self
            .update_if(
                id,
                |o| o.status.can_decide(),
                |o| {
                    o.status = decision.status();
                    o.rejection_reason = decision.reason().to_string();
                    o.decision_email.kind = DecisionType::from(decision.status());
                    o.decision_email.status = DecisionEmailStatus::Queued;
                    o.decision_email.attempts = 0;
                    o.decision_email.last_error.clear();
                    o.decision_email.queued_at = Some(now);
                    o.decision_email.last_attempt_at = None;
                    o.decision_email.sent_at = None;
                    o.updated_at = now;
                },
            )
            .await)
    }

    async fn mark_delivered(
        &self,
        id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<Option<OrderRecord>> {
        Ok(self
            .update_if(
                id,
                |o| o.status.can_deliver(),
                |o| {
                    o.status = OrderStatus::Delivered;
                    o.updated_at = now;
                },
            )
            .await)
    }

    async fn list_claimable_decision_emails(
        &self,
        policy: &ClaimPolicy,
        limit: usize,
    ) -> Result<Vec<OrderId>> {
        let state = self.state.read().await;
        let mut claimable: Vec<_> = state
            .orders
            .values()
            .filter(|o| policy.is_claimable(o))
            .map(|o| (o.updated_at, o.id))
            .collect();
        claimable.sort();
        Ok(claimable.into_iter().take(limit).map(|(_, id)| id).collect())
    }

    async fn claim_decision_email(
        &self,
        id: OrderId,
        policy: &ClaimPolicy,
    ) -> Result<Option<OrderRecord>> {
        let now = policy.now;
        Ok(self
            .update_if(
                id,
                |o| policy.is_claimable(o),
                |o| {
                    o.decision_email.status = DecisionEmailStatus::Sending;
                    o.decision_email.attempts += 1;
                    o.decision_email.last_attempt_at = Some(now);
                    o.updated_at = now;
                },
            )
            .await)
    }

    async fn finish_decision_email(
        &self,
        id: OrderId,
        outcome: EmailOutcome,
        now: DateTime<Utc>,
    ) -> Result<Option<OrderRecord>> {
        Ok(self
            .update_if(
                id,
                |o| o.decision_email.status == DecisionEmailStatus::Sending,
                |o| {
                    let email = &mut o.decision_email;
                    match outcome {
                        EmailOutcome::Sent => {
                            email.status = DecisionEmailStatus::Sent;
                            email.sent_at = Some(now);
                            email.last_error.clear();
                        }
                        EmailOutcome::Retry { error } => {
                            email.status = DecisionEmailStatus::Queued;
                            email.last_error = error;
                        }
                        EmailOutcome::Failed { error } => {
                            email.status = DecisionEmailStatus::Failed;
                            email.last_error = error;
                        }
                    }
                    o.updated_at = now;
                },
            )
            .await)
    }

    async fn requeue_failed_decision_email(
        &self,
        id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<Option<OrderRecord>> {
        Ok(self
            .update_if(
                id,
                |o| o.decision_email.status == DecisionEmailStatus::Failed,
                |o| {
                    o.decision_email.status = DecisionEmailStatus::Queued;
                    o.decision_email.attempts = 0;
                    o.decision_email.queued_at = Some(now);
                    o.updated_at = now;
                },
            )
            .await)
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<OrderRecord>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| query.matches(o))
            .cloned()
            .collect();
        orders.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        orders.truncate(query.limit);
        Ok(orders)
    }

    async fn list_orders_with_status(
        &self,
        statuses: &[OrderStatus],
    ) -> Result<Vec<OrderRecord>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .filter(|o| statuses.contains(&o.status))
            .cloned()
            .collect())
    }

    async fn fail_stale_uploads(
        &self,
        pending_before: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderRecord>> {
        let mut state = self.state.write().await;
        let mut changed = Vec::new();
        for order in state.orders.values_mut() {
            if order.payment.upload_status == UploadStatus::Pending
                && order.created_at < pending_before
            {
                order.payment.upload_status = UploadStatus::Failed;
                order.payment.upload_error = error.to_string();
                order.updated_at = now;
                changed.push(order.clone());
            }
        }
        Ok(changed)
    }
}

#[derive(Default)]
struct CatalogState {
    foods: HashMap<CatalogId, FoodItem>,
    qrs: HashMap<CatalogId, PaymentQr>,
}

/// In-memory catalog store.
#[derive(Clone, Default)]
pub struct InMemoryCatalogStore {
    state: Arc<RwLock<CatalogState>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn insert_food(&self, food: FoodItem) -> Result<FoodItem> {
        let mut state = self.state.write().await;
        if state.foods.values().any(|f| f.client_id == food.client_id) {
            return Err(StoreError::DuplicateCatalogItem(food.client_id));
        }
        state.foods.insert(food.id, food.clone());
        Ok(food)
    }

    async fn list_foods(&self) -> Result<Vec<FoodItem>> {
        let state = self.state.read().await;
        let mut foods: Vec<_> = state.foods.values().cloned().collect();
        foods.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(foods)
    }

    async fn record_food_upload(
        &self,
        id: CatalogId,
        outcome: UploadOutcome,
        now: DateTime<Utc>,
    ) -> Result<Option<FoodItem>> {
        let mut state = self.state.write().await;
        let Some(food) = state.foods.get_mut(&id) else {
            return Ok(None);
        };
        if food.upload_status != UploadStatus::Pending {
            return Ok(None);
        }
        apply_upload(
            &outcome,
            &mut food.image_url,
            &mut food.storage_id,
            &mut food.upload_status,
            &mut food.upload_error,
        );
        food.updated_at = now;
        Ok(Some(food.clone()))
    }

    async fn insert_payment_qr(&self, qr: PaymentQr, max: usize) -> Result<PaymentQr> {
        let mut state = self.state.write().await;
        if state.qrs.len() >= max {
            return Err(StoreError::PaymentQrLimit(max));
        }
        state.qrs.insert(qr.id, qr.clone());
        Ok(qr)
    }

    async fn list_payment_qrs(&self) -> Result<Vec<PaymentQr>> {
        let state = self.state.read().await;
        let mut qrs: Vec<_> = state.qrs.values().cloned().collect();
        qrs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(qrs)
    }

    async fn record_payment_qr_upload(
        &self,
        id: CatalogId,
        outcome: UploadOutcome,
        now: DateTime<Utc>,
    ) -> Result<Option<PaymentQr>> {
        let mut state = self.state.write().await;
        let Some(qr) = state.qrs.get_mut(&id) else {
            return Ok(None);
        };
        if qr.upload_status != UploadStatus::Pending {
            return Ok(None);
        }
        apply_upload(
            &outcome,
            &mut qr.image_url,
            &mut qr.storage_id,
            &mut qr.upload_status,
            &mut qr.upload_error,
        );
        qr.updated_at = now;
        Ok(Some(qr.clone()))
    }

    async fn fail_stale_uploads(
        &self,
        pending_before: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut state = self.state.write().await;
        let state = &mut *state;
        let mut changed = 0;
        let foods = state
            .foods
            .values_mut()
            .map(|f| (&mut f.upload_status, &mut f.upload_error, &mut f.updated_at, f.created_at));
        let qrs = state
            .qrs
            .values_mut()
            .map(|q| (&mut q.upload_status, &mut q.upload_error, &mut q.updated_at, q.created_at));
        for (status, upload_error, updated_at, created_at) in foods.chain(qrs) {
            if *status == UploadStatus::Pending && created_at < pending_before {
                *status = UploadStatus::Failed;
                *upload_error = error.to_string();
                *updated_at = now;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AccountKey, OrderItem, Payment, Team};
    use chrono::Duration;
    use common::Money;

    fn placed(txn: &str, account: &str, created_at: DateTime<Utc>) -> OrderRecord {
        OrderRecord::placed(
            OrderId::new(),
            AccountKey::parse(account).unwrap(),
            Team {
                team_name: "Crabs".to_string(),
                leader_name: "Ferris".to_string(),
                phone: "9876543210".to_string(),
                email: account.to_string(),
            },
            vec![OrderItem {
                item_id: "f1".to_string(),
                name: "Idli".to_string(),
                price: Money::from_minor(4000),
                quantity: 2,
            }],
            Payment::pending(txn, "proof.png"),
            created_at,
        )
    }

    #[tokio::test]
    async fn duplicate_transaction_id_is_rejected_case_insensitively() {
        let store = InMemoryOrderStore::new();
        let now = Utc::now();
        store
            .insert_order(placed("UPI123", "a@klu.ac.in", now))
            .await
            .unwrap();

        let result = store.insert_order(placed("upi123", "b@klu.ac.in", now)).await;
        assert!(matches!(result, Err(StoreError::DuplicateTransactionId(ref t)) if t == "upi123"));
        assert_eq!(store.order_count().await, 1);
        assert!(store.transaction_id_exists("upi123").await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_duplicate_inserts_admit_exactly_one() {
        let store = InMemoryOrderStore::new();
        let now = Utc::now();
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            let order = placed("SAME-TXN", &format!("u{i}@klu.ac.in"), now);
            handles.push(tokio::spawn(async move { store.insert_order(order).await }));
        }
        let mut ok = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn decision_applies_only_once() {
        let store = InMemoryOrderStore::new();
        let now = Utc::now();
        let order = store
            .insert_order(placed("T1", "a@klu.ac.in", now))
            .await
            .unwrap();

        let first = store
            .apply_decision(order.id, &Decision::verify(), now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.status, OrderStatus::Verified);
        assert_eq!(first.decision_email.status, DecisionEmailStatus::Queued);
        assert_eq!(first.decision_email.kind, DecisionType::Verified);
        assert_eq!(first.decision_email.queued_at, Some(now));

        let second = store
            .apply_decision(order.id, &Decision::reject("late").unwrap(), now)
            .await
            .unwrap();
        assert!(second.is_none());
        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Verified);
        assert!(stored.rejection_reason.is_empty());
    }

    #[tokio::test]
    async fn concurrent_decisions_have_one_winner() {
        let store = InMemoryOrderStore::new();
        let now = Utc::now();
        let order = store
            .insert_order(placed("T2", "a@klu.ac.in", now))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..10 {
            let store = store.clone();
            let decision = if i % 2 == 0 {
                Decision::verify()
            } else {
                Decision::reject("mismatch").unwrap()
            };
            handles.push(tokio::spawn(async move {
                store.apply_decision(order.id, &decision, now).await
            }));
        }
        let mut winners = 0;
        for h in handles {
            if h.await.unwrap().unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn upload_result_is_recorded_once() {
        let store = InMemoryOrderStore::new();
        let now = Utc::now();
        let order = store
            .insert_order(placed("T3", "a@klu.ac.in", now))
            .await
            .unwrap();

        let uploaded = store
            .record_upload(
                order.id,
                UploadOutcome::Uploaded {
                    url: "https://cdn/x.png".to_string(),
                    storage_id: "x".to_string(),
                },
                now,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(uploaded.payment.upload_status, UploadStatus::Uploaded);
        assert_eq!(uploaded.payment.screenshot_url, "https://cdn/x.png");

        let late_failure = store
            .record_upload(
                order.id,
                UploadOutcome::Failed {
                    error: "boom".to_string(),
                },
                now,
            )
            .await
            .unwrap();
        assert!(late_failure.is_none());
    }

    #[tokio::test]
    async fn delivered_requires_verified() {
        let store = InMemoryOrderStore::new();
        let now = Utc::now();
        let order = store
            .insert_order(placed("T4", "a@klu.ac.in", now))
            .await
            .unwrap();

        assert!(store.mark_delivered(order.id, now).await.unwrap().is_none());
        store
            .apply_decision(order.id, &Decision::verify(), now)
            .await
            .unwrap();
        let delivered = store.mark_delivered(order.id, now).await.unwrap().unwrap();
        assert_eq!(delivered.status, OrderStatus::Delivered);
        assert_eq!(delivered.decision_email.status, DecisionEmailStatus::Queued);
    }

    #[tokio::test]
    async fn claim_is_exclusive_and_stale_sending_is_reclaimable() {
        let store = InMemoryOrderStore::new();
        let now = Utc::now();
        let order = store
            .insert_order(placed("T5", "a@klu.ac.in", now))
            .await
            .unwrap();
        store
            .apply_decision(order.id, &Decision::verify(), now)
            .await
            .unwrap();

        let policy = ClaimPolicy::new(now, Duration::minutes(10));
        let claimed = store
            .claim_decision_email(order.id, &policy)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.decision_email.status, DecisionEmailStatus::Sending);
        assert_eq!(claimed.decision_email.attempts, 1);
        assert!(store.claim_decision_email(order.id, &policy).await.unwrap().is_none());
        assert!(
            store
                .list_claimable_decision_emails(&policy, 10)
                .await
                .unwrap()
                .is_empty()
        );

        let later = ClaimPolicy::new(now + Duration::minutes(11), Duration::minutes(10));
        assert_eq!(
            store.list_claimable_decision_emails(&later, 10).await.unwrap(),
            vec![order.id]
        );
        let reclaimed = store
            .claim_decision_email(order.id, &later)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reclaimed.decision_email.attempts, 2);
    }

    #[tokio::test]
    async fn finish_and_requeue_decision_email() {
        let store = InMemoryOrderStore::new();
        let now = Utc::now();
        let order = store
            .insert_order(placed("T6", "a@klu.ac.in", now))
            .await
            .unwrap();
        store
            .apply_decision(order.id, &Decision::reject("blurry").unwrap(), now)
            .await
            .unwrap();
        let policy = ClaimPolicy::new(now, Duration::minutes(10));
        store.claim_decision_email(order.id, &policy).await.unwrap();

        let failed = store
            .finish_decision_email(
                order.id,
                EmailOutcome::Failed {
                    error: "missing recipient".to_string(),
                },
                now,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(failed.decision_email.status, DecisionEmailStatus::Failed);
        assert!(
            store
                .list_claimable_decision_emails(&policy, 10)
                .await
                .unwrap()
                .is_empty()
        );

        let requeued = store
            .requeue_failed_decision_email(order.id, now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(requeued.decision_email.status, DecisionEmailStatus::Queued);
        assert_eq!(requeued.decision_email.attempts, 0);
        assert!(
            store
                .requeue_failed_decision_email(order.id, now)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn list_orders_pages_newest_first() {
        let store = InMemoryOrderStore::new();
        let base = Utc::now();
        let account = AccountKey::parse("a@klu.ac.in").unwrap();
        for i in 0..5 {
            store
                .insert_order(placed(&format!("P{i}"), "a@klu.ac.in", base + Duration::seconds(i)))
                .await
                .unwrap();
        }
        store
            .insert_order(placed("OTHER", "b@klu.ac.in", base))
            .await
            .unwrap();

        let first = store
            .list_orders(&OrderQuery::for_account(account.clone()).limit(3))
            .await
            .unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].transaction_id_normalized, "p4");

        let cursor = crate::PageCursor::after(&first[2]);
        let second = store
            .list_orders(&OrderQuery::for_account(account).before(Some(cursor)).limit(3))
            .await
            .unwrap();
        let txns: Vec<_> = second.iter().map(|o| o.transaction_id_normalized.as_str()).collect();
        assert_eq!(txns, vec!["p1", "p0"]);

        assert_eq!(store.list_orders(&OrderQuery::all()).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn stale_uploads_are_failed() {
        let store = InMemoryOrderStore::new();
        let now = Utc::now();
        let old = store
            .insert_order(placed("OLD", "a@klu.ac.in", now - Duration::minutes(30)))
            .await
            .unwrap();
        store
            .insert_order(placed("NEW", "a@klu.ac.in", now))
            .await
            .unwrap();

        let changed = store
            .fail_stale_uploads(now - Duration::minutes(15), "upload interrupted", now)
            .await
            .unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].id, old.id);
        assert_eq!(changed[0].payment.upload_error, "upload interrupted");
    }

    #[tokio::test]
    async fn catalog_food_client_id_is_unique() {
        let store = InMemoryCatalogStore::new();
        let now = Utc::now();
        let food = FoodItem {
            id: CatalogId::new(),
            client_id: "dosa".to_string(),
            name: "Dosa".to_string(),
            description: String::new(),
            is_veg: true,
            price: Money::from_minor(6000),
            image_url: String::new(),
            storage_id: String::new(),
            is_active: true,
            upload_status: UploadStatus::Pending,
            upload_error: String::new(),
            created_at: now,
            updated_at: now,
        };
        store.insert_food(food.clone()).await.unwrap();
        let dup = FoodItem {
            id: CatalogId::new(),
            ..food.clone()
        };
        assert!(matches!(
            store.insert_food(dup).await,
            Err(StoreError::DuplicateCatalogItem(_))
        ));

        let updated = store
            .record_food_upload(
                food.id,
                UploadOutcome::Uploaded {
                    url: "u".to_string(),
                    storage_id: "s".to_string(),
                },
                now,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.upload_status, UploadStatus::Uploaded);
        assert_eq!(updated.image_url, "u");
    }

    #[tokio::test]
    async fn concurrent_qr_inserts_stop_at_limit() {
        let store = InMemoryCatalogStore::new();
        let now = Utc::now();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .insert_payment_qr(PaymentQr::pending(CatalogId::new(), now), 4)
                    .await
            }));
        }

        let mut created = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => created += 1,
                Err(StoreError::PaymentQrLimit(4)) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(created, 4);
        assert_eq!(store.list_payment_qrs().await.unwrap().len(), 4);
    }
}
