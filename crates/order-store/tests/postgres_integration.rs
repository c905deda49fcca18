//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p order-store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{DecisionEmailStatus, Money, OrderStatus, UploadStatus};
use order_store::{
    AccountKey, CatalogId, CatalogStore, ClaimPolicy, Decision, EmailOutcome, OrderId, OrderItem, OrderQuery,
    OrderRecord, OrderStore, OrderStoreExt, PageCursor, Payment, PaymentQr, PostgresCatalogStore,
    PostgresOrderStore, StoreError, Team, UploadOutcome,
};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_orders_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresOrderStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE orders, food_items, payment_qrs")
        .execute(&pool)
        .await
        .unwrap();

    PostgresOrderStore::new(pool)
}

fn placed(txn: &str, account: &str, created_at: chrono::DateTime<Utc>) -> OrderRecord {
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
async fn insert_and_load_order() {
    let store = get_test_store().await;
    let order = store
        .insert_order(placed("UPI-1", "a@klu.ac.in", Utc::now()))
        .await
        .unwrap();

    let loaded = store.require_order(order.id).await.unwrap();
    assert_eq!(loaded, order);
    assert_eq!(loaded.subtotal.minor(), 8000);
    assert_eq!(loaded.total_items, 2);
    assert_eq!(loaded.payment.upload_status, UploadStatus::Pending);
}

#[tokio::test]
async fn missing_order_is_not_found() {
    let store = get_test_store().await;
    let result = store.require_order(OrderId::new()).await;
    assert!(matches!(result, Err(StoreError::OrderNotFound(_))));
}

#[tokio::test]
async fn duplicate_transaction_id_maps_unique_violation() {
    let store = get_test_store().await;
    store
        .insert_order(placed("UPI-2", "a@klu.ac.in", Utc::now()))
        .await
        .unwrap();

    let result = store
        .insert_order(placed("upi-2", "b@klu.ac.in", Utc::now()))
        .await;
    assert!(matches!(result, Err(StoreError::DuplicateTransactionId(_))));
    assert!(store.transaction_id_exists("upi-2").await.unwrap());
}

#[tokio::test]
async fn concurrent_decisions_have_one_winner() {
    let store = get_test_store().await;
    let order = store
        .insert_order(placed("UPI-3", "a@klu.ac.in", Utc::now()))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        let decision = if i % 2 == 0 {
            Decision::verify()
        } else {
            Decision::reject("amount mismatch").unwrap()
        };
        handles.push(tokio::spawn(async move {
            store.apply_decision(order.id, &decision, Utc::now()).await
        }));
    }

    let mut winners = 0;
    for h in handles {
        if h.await.unwrap().unwrap().is_some() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);

    let stored = store.require_order(order.id).await.unwrap();
    assert!(stored.status.is_decision());
    assert_eq!(stored.decision_email.status, DecisionEmailStatus::Queued);
    assert_eq!(
        stored.rejection_reason.is_empty(),
        stored.status == OrderStatus::Verified
    );
}

#[tokio::test]
async fn upload_outcome_only_applies_while_pending() {
    let store = get_test_store().await;
    let order = store
        .insert_order(placed("UPI-4", "a@klu.ac.in", Utc::now()))
        .await
        .unwrap();

    let failed = store
        .record_upload(
            order.id,
            UploadOutcome::Failed {
                error: "storage down".to_string(),
            },
            Utc::now(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed.payment.upload_status, UploadStatus::Failed);

    let late = store
        .record_upload(
            order.id,
            UploadOutcome::Uploaded {
                url: "https://cdn/x.png".to_string(),
                storage_id: "x".to_string(),
            },
            Utc::now(),
        )
        .await
        .unwrap();
    assert!(late.is_none());
}

#[tokio::test]
async fn decision_email_claim_lifecycle() {
    let store = get_test_store().await;
    let now = Utc::now();
    let order = store
        .insert_order(placed("UPI-5", "a@klu.ac.in", now))
        .await
        .unwrap();
    store
        .apply_decision(order.id, &Decision::verify(), now)
        .await
        .unwrap();

    let policy = ClaimPolicy::new(now, Duration::minutes(10));
    assert_eq!(
        store.list_claimable_decision_emails(&policy, 10).await.unwrap(),
        vec![order.id]
    );

    let claimed = store
        .claim_decision_email(order.id, &policy)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.decision_email.status, DecisionEmailStatus::Sending);
    assert_eq!(claimed.decision_email.attempts, 1);
    assert!(store.claim_decision_email(order.id, &policy).await.unwrap().is_none());

    let retried = store
        .finish_decision_email(
            order.id,
            EmailOutcome::Retry {
                error: "smtp timeout".to_string(),
            },
            now,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(retried.decision_email.status, DecisionEmailStatus::Queued);
    assert_eq!(retried.decision_email.last_error, "smtp timeout");

    store.claim_decision_email(order.id, &policy).await.unwrap();
    let sent = store
        .finish_decision_email(order.id, EmailOutcome::Sent, now)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sent.decision_email.status, DecisionEmailStatus::Sent);
    assert_eq!(sent.decision_email.attempts, 2);
    assert!(sent.decision_email.sent_at.is_some());
    assert!(
        store
            .list_claimable_decision_emails(&policy, 10)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn stale_sending_claim_is_reclaimable() {
    let store = get_test_store().await;
    let now = Utc::now();
    let order = store
        .insert_order(placed("UPI-6", "a@klu.ac.in", now))
        .await
        .unwrap();
    store
        .apply_decision(order.id, &Decision::reject("blurry").unwrap(), now)
        .await
        .unwrap();
    store
        .claim_decision_email(order.id, &ClaimPolicy::new(now, Duration::minutes(10)))
        .await
        .unwrap()
        .unwrap();

    let later = ClaimPolicy::new(now + Duration::minutes(11), Duration::minutes(10));
    let reclaimed = store
        .claim_decision_email(order.id, &later)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reclaimed.decision_email.attempts, 2);
}

#[tokio::test]
async fn keyset_pages_do_not_skip_equal_timestamps() {
    let store = get_test_store().await;
    let ts = Utc::now();
    for i in 0..5 {
        store
            .insert_order(placed(&format!("SAME-{i}"), "a@klu.ac.in", ts))
            .await
            .unwrap();
    }

    let account = AccountKey::parse("a@klu.ac.in").unwrap();
    let first = store
        .list_orders(&OrderQuery::for_account(account.clone()).limit(2))
        .await
        .unwrap();
    assert_eq!(first.len(), 2);

    let mut seen: Vec<_> = first.iter().map(|o| o.id).collect();
    let mut cursor = PageCursor::after(&first[1]);
    loop {
        let page = store
            .list_orders(
                &OrderQuery::for_account(account.clone())
                    .before(Some(cursor))
                    .limit(2),
            )
            .await
            .unwrap();
        if page.is_empty() {
            break;
        }
        seen.extend(page.iter().map(|o| o.id));
        cursor = PageCursor::after(page.last().unwrap());
    }

    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 5);
}

#[tokio::test]
async fn stale_pending_uploads_are_failed() {
    let store = get_test_store().await;
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
    assert_eq!(changed[0].payment.upload_status, UploadStatus::Failed);
}

#[tokio::test]
async fn list_orders_with_status_filters() {
    let store = get_test_store().await;
    let now = Utc::now();
    let a = store
        .insert_order(placed("S-1", "a@klu.ac.in", now))
        .await
        .unwrap();
    store
        .insert_order(placed("S-2", "a@klu.ac.in", now))
        .await
        .unwrap();
    store
        .apply_decision(a.id, &Decision::reject("no").unwrap(), now)
        .await
        .unwrap();

    let rejected = store
        .list_orders_with_status(&[OrderStatus::Rejected])
        .await
        .unwrap();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].id, a.id);
}

#[tokio::test]
async fn concurrent_qr_inserts_stop_at_limit() {
    let store = get_test_store().await;
    let catalog = PostgresCatalogStore::new(store.pool().clone());
    let now = Utc::now();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let catalog = catalog.clone();
        handles.push(tokio::spawn(async move {
            catalog
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
    assert_eq!(catalog.list_payment_qrs().await.unwrap().len(), 4);
}
