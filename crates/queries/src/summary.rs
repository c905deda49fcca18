//! Accepted-items summary for kitchen planning.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::OrderStatus;
use order_store::{CatalogStore, OrderStore};
use serde::Serialize;

use crate::Result;

/// Orders whose items the kitchen has to prepare.
pub const ACCEPTED_STATUSES: [OrderStatus; 2] = [OrderStatus::Verified, OrderStatus::Delivered];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedItem {
    pub item_id: String,
    pub name: String,
    pub quantity: u64,
    /// `None` when the item is no longer in the catalog.
    pub is_veg: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedTotals {
    pub accepted_orders: u64,
    pub total_quantity: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedItemsSummary {
    pub accepted_statuses: Vec<OrderStatus>,
    pub totals: AcceptedTotals,
    pub items: Vec<AcceptedItem>,
    pub generated_at: DateTime<Utc>,
}

/// Sums item quantities over accepted orders.
///
/// Rows are sorted by quantity, largest first, then by name.
#[tracing::instrument(skip(orders, catalog))]
pub async fn accepted_items<S: OrderStore>(
    orders: &S,
    catalog: &Arc<dyn CatalogStore>,
    now: DateTime<Utc>,
) -> Result<AcceptedItemsSummary> {
    let (accepted, foods) = tokio::try_join!(
        orders.list_orders_with_status(&ACCEPTED_STATUSES),
        catalog.list_foods(),
    )?;
    let veg: HashMap<&str, bool> = foods
        .iter()
        .map(|f| (f.client_id.as_str(), f.is_veg))
        .collect();

    let mut rows: HashMap<&str, AcceptedItem> = HashMap::new();
    for order in &accepted {
        for item in &order.items {
            let row = rows
                .entry(item.item_id.as_str())
                .or_insert_with(|| AcceptedItem {
                    item_id: item.item_id.clone(),
                    name: item.name.clone(),
                    quantity: 0,
                    is_veg: veg.get(item.item_id.as_str()).copied(),
                });
            row.quantity += u64::from(item.quantity);
        }
    }

    let mut items: Vec<AcceptedItem> = rows.into_values().collect();
    items.sort_by(|a, b| b.quantity.cmp(&a.quantity).then_with(|| a.name.cmp(&b.name)));

    Ok(AcceptedItemsSummary {
        accepted_statuses: ACCEPTED_STATUSES.to_vec(),
        totals: AcceptedTotals {
            accepted_orders: accepted.len() as u64,
            total_quantity: items.iter().map(|i| i.quantity).sum(),
        },
        items,
        generated_at: now,
    })
}
