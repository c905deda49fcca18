//! Integration tests for the read side against the in-memory stores.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{AccountKey, CatalogId, Money, OrderId, OrderStatus, UploadStatus};
use order_store::{
    CatalogStore, Decision, FoodItem, InMemoryCatalogStore, InMemoryOrderStore, OrderItem,
    OrderQuery, OrderRecord, OrderStore, Payment, Team,
};
use queries::{CatalogView, OrderListing, accepted_items};

fn key(email: &str) -> AccountKey {
    AccountKey::parse(email).unwrap()
}

async fn insert(
    store: &InMemoryOrderStore,
    email: &str,
    txn: &str,
    items: &[(&str, u32)],
    created_at: DateTime<Utc>,
) -> OrderRecord {
    let order = OrderRecord::placed(
        OrderId::new(),
        key(email),
        Team {
            team_name: "Crabs".to_string(),
            leader_name: "Ferris".to_string(),
            phone: "9876543210".to_string(),
            email: email.to_string(),
        },
        items
            .iter()
            .map(|(id, qty)| OrderItem {
                item_id: id.to_string(),
                name: id.to_string(),
                price: Money::from_minor(5000),
                quantity: *qty,
            })
            .collect(),
        Payment::pending(txn, "proof.png"),
        created_at,
    );
    store.insert_order(order).await.unwrap()
}

fn food(client_id: &str, name: &str, is_veg: bool) -> FoodItem {
    let now = Utc::now();
    FoodItem {
        id: CatalogId::new(),
        client_id: client_id.to_string(),
        name: name.to_string(),
        description: String::new(),
        is_veg,
        price: Money::from_minor(5000),
        image_url: String::new(),
        storage_id: String::new(),
        is_active: true,
        upload_status: UploadStatus::Pending,
        upload_error: String::new(),
        created_at: now,
        updated_at: now,
    }
}

async fn collect_pages(
    listing: &OrderListing<InMemoryOrderStore>,
    query: OrderQuery,
) -> Vec<OrderId> {
    let mut seen = Vec::new();
    let mut cursor = None;
    loop {
        let page = listing.page(&query.clone().before(cursor)).await.unwrap();
        seen.extend(page.orders.iter().map(|o| o.id));
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => return seen,
        }
    }
}

mod pagination {
    use super::*;

    #[tokio::test]
    async fn pages_cover_every_order_once() {
        let store = InMemoryOrderStore::new();
        let start = Utc::now();
        let mut all = HashSet::new();
        for i in 0..25 {
            let at = start + chrono::Duration::seconds(i);
            all.insert(insert(&store, "a@klu.ac.in", &format!("T{i}"), &[("dosa", 1)], at).await.id);
        }

        let listing = OrderListing::new(store);
        let first = listing.page(&OrderQuery::all().limit(10)).await.unwrap();
        assert_eq!(first.orders.len(), 10);
        assert!(first.orders.windows(2).all(|w| w[0].created_at >= w[1].created_at));

        let seen = collect_pages(&listing, OrderQuery::all().limit(10)).await;
        assert_eq!(seen.len(), 25);
        assert_eq!(seen.into_iter().collect::<HashSet<_>>(), all);
    }

    #[tokio::test]
    async fn exact_multiple_has_no_trailing_cursor() {
        let store = InMemoryOrderStore::new();
        let start = Utc::now();
        for i in 0..4 {
            insert(&store, "a@klu.ac.in", &format!("T{i}"), &[("dosa", 1)], start + chrono::Duration::seconds(i)).await;
        }
        let listing = OrderListing::new(store);

        let first = listing.page(&OrderQuery::all().limit(2)).await.unwrap();
        assert!(first.next_cursor.is_some());
        let second = listing
            .page(&OrderQuery::all().limit(2).before(first.next_cursor))
            .await
            .unwrap();
        assert_eq!(second.orders.len(), 2);
        assert!(second.next_cursor.is_none());
    }

    #[tokio::test]
    async fn inserts_during_paging_cause_no_gaps_or_duplicates() {
        let store = InMemoryOrderStore::new();
        let start = Utc::now();
        let mut original = HashSet::new();
        for i in 0..20 {
            let at = start + chrono::Duration::seconds(i);
            original.insert(insert(&store, "a@klu.ac.in", &format!("T{i}"), &[("dosa", 1)], at).await.id);
        }

        let listing = OrderListing::new(store.clone());
        let mut seen = Vec::new();
        let mut cursor = None;
        let mut late = 0;
        loop {
            let page = listing
                .page(&OrderQuery::all().limit(6).before(cursor))
                .await
                .unwrap();
            seen.extend(page.orders.iter().map(|o| o.id));

            // A newer order lands between every pair of page requests.
            late += 1;
            let at = start + chrono::Duration::hours(1) + chrono::Duration::seconds(late);
            insert(&store, "a@klu.ac.in", &format!("LATE{late}"), &[("dosa", 1)], at).await;

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        let unique: HashSet<_> = seen.iter().copied().collect();
        assert_eq!(unique.len(), seen.len());
        assert_eq!(unique, original);

        let again = collect_pages(&listing, OrderQuery::all().limit(6)).await;
        assert_eq!(again.len(), 20 + late as usize);
    }

    #[tokio::test]
    async fn equal_timestamps_are_split_by_id() {
        let store = InMemoryOrderStore::new();
        let at = Utc::now();
        let mut all = HashSet::new();
        for i in 0..7 {
            all.insert(insert(&store, "a@klu.ac.in", &format!("T{i}"), &[("dosa", 1)], at).await.id);
        }

        let listing = OrderListing::new(store);
        let seen = collect_pages(&listing, OrderQuery::all().limit(3)).await;
        assert_eq!(seen.len(), 7);
        assert_eq!(seen.into_iter().collect::<HashSet<_>>(), all);
    }

    #[tokio::test]
    async fn account_query_lists_only_own_orders() {
        let store = InMemoryOrderStore::new();
        let now = Utc::now();
        insert(&store, "a@klu.ac.in", "T1", &[("dosa", 1)], now).await;
        insert(&store, "b@klu.ac.in", "T2", &[("dosa", 1)], now).await;

        let listing = OrderListing::new(store);
        let page = listing
            .page(&OrderQuery::for_account(key("A@klu.ac.in")))
            .await
            .unwrap();
        assert_eq!(page.orders.len(), 1);
        assert_eq!(page.orders[0].team.email, "a@klu.ac.in");
    }
}

mod catalog {
    use super::*;

    #[tokio::test]
    async fn foods_carry_popularity_and_cache_until_invalidated() {
        let orders = InMemoryOrderStore::new();
        let catalog = Arc::new(InMemoryCatalogStore::new());
        catalog.insert_food(food("vada", "Vada", true)).await.unwrap();
        catalog.insert_food(food("dosa", "Dosa", true)).await.unwrap();
        let now = Utc::now();
        insert(&orders, "a@klu.ac.in", "T1", &[("dosa", 2)], now).await;
        let rejected = insert(&orders, "b@klu.ac.in", "T2", &[("vada", 3)], now).await;
        orders
            .apply_decision(rejected.id, &Decision::reject("bad proof").unwrap(), now)
            .await
            .unwrap();

        let view = CatalogView::new(orders.clone(), catalog.clone(), Duration::from_secs(60));
        let foods = view.foods().await.unwrap();
        let names: Vec<_> = foods.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Dosa", "Vada"]);
        assert_eq!(foods[0].ordered_by_count, 1);
        assert_eq!(foods[0].ordered_qty, 2);
        assert!(foods[0].is_bestseller);
        assert_eq!(foods[1].ordered_qty, 0);
        assert!(!foods[1].is_bestseller);

        insert(&orders, "c@klu.ac.in", "T3", &[("vada", 1)], now).await;
        assert_eq!(view.foods().await.unwrap()[1].ordered_qty, 0);

        view.invalidate();
        let foods = view.foods().await.unwrap();
        assert_eq!(foods[1].ordered_qty, 1);
        assert!(foods[1].is_bestseller);

        let json = serde_json::to_value(&foods[0]).unwrap();
        assert_eq!(json["id"], "dosa");
        assert_eq!(json["orderedByCount"], 1);
        assert_eq!(json["isBestseller"], true);
    }
}

mod summary {
    use super::*;

    #[tokio::test]
    async fn accepted_items_sum_verified_and_delivered() {
        let orders = InMemoryOrderStore::new();
        let catalog: Arc<dyn CatalogStore> = Arc::new(InMemoryCatalogStore::new());
        catalog.insert_food(food("dosa", "Dosa", true)).await.unwrap();
        catalog.insert_food(food("biryani", "Biryani", false)).await.unwrap();
        let now = Utc::now();

        let verified = insert(&orders, "a@klu.ac.in", "T1", &[("dosa", 2), ("biryani", 1)], now).await;
        let delivered = insert(&orders, "b@klu.ac.in", "T2", &[("biryani", 3), ("ghost", 3)], now).await;
        insert(&orders, "c@klu.ac.in", "T3", &[("dosa", 9)], now).await;
        let rejected = insert(&orders, "d@klu.ac.in", "T4", &[("dosa", 9)], now).await;

        orders.apply_decision(verified.id, &Decision::verify(), now).await.unwrap();
        orders.apply_decision(delivered.id, &Decision::verify(), now).await.unwrap();
        orders.mark_delivered(delivered.id, now).await.unwrap();
        orders
            .apply_decision(rejected.id, &Decision::reject("no").unwrap(), now)
            .await
            .unwrap();

        let summary = accepted_items(&orders, &catalog, now).await.unwrap();
        assert_eq!(
            summary.accepted_statuses,
            vec![OrderStatus::Verified, OrderStatus::Delivered]
        );
        assert_eq!(summary.totals.accepted_orders, 2);
        assert_eq!(summary.totals.total_quantity, 9);

        let rows: Vec<_> = summary
            .items
            .iter()
            .map(|i| (i.item_id.as_str(), i.quantity, i.is_veg))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("biryani", 4, Some(false)),
                ("ghost", 3, None),
                ("dosa", 2, Some(true)),
            ]
        );

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["acceptedStatuses"][0], "Verified");
        assert_eq!(json["totals"]["totalQuantity"], 9);
        assert_eq!(json["items"][0]["isVeg"], false);
    }
}
