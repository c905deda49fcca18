//! Catalog listing enriched with popularity, served through a TTL cache.

use std::sync::Arc;
use std::time::Duration;

use common::{OrderStatus, UploadStatus};
use order_store::{CatalogStore, FoodItem, OrderStore};
use serde::Serialize;

use crate::Result;
use crate::cache::TtlCache;
use crate::popularity::Popularity;

/// Statuses whose orders count towards popularity.
const POPULAR_STATUSES: [OrderStatus; 3] = [
    OrderStatus::Placed,
    OrderStatus::Verified,
    OrderStatus::Delivered,
];

/// One food item as listed to customers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodListing {
    /// The operator-chosen client id.
    pub id: String,
    pub name: String,
    pub description: String,
    pub is_veg: bool,
    /// Major currency units.
    pub price: f64,
    pub image: String,
    pub is_active: bool,
    pub upload_status: UploadStatus,
    pub ordered_by_count: u32,
    pub ordered_qty: u32,
    pub is_bestseller: bool,
}

impl FoodListing {
    fn new(food: &FoodItem, popularity: &Popularity) -> Self {
        let stats = popularity.get(&food.client_id);
        Self {
            id: food.client_id.clone(),
            name: food.name.clone(),
            description: food.description.clone(),
            is_veg: food.is_veg,
            price: food.price.as_major(),
            image: food.image_url.clone(),
            is_active: food.is_active,
            upload_status: food.upload_status,
            ordered_by_count: stats.ordered_by_count,
            ordered_qty: stats.ordered_qty,
            is_bestseller: stats.is_bestseller,
        }
    }
}

/// The frequently polled catalog view.
///
/// Building it scans every counted order, so results are cached briefly and
/// concurrent misses share one build. Writers call [`CatalogView::invalidate`]
/// after changing orders or foods.
pub struct CatalogView<S: OrderStore> {
    orders: S,
    catalog: Arc<dyn CatalogStore>,
    cache: TtlCache<Vec<FoodListing>>,
}

impl<S: OrderStore> CatalogView<S> {
    pub fn new(orders: S, catalog: Arc<dyn CatalogStore>, ttl: Duration) -> Self {
        Self {
            orders,
            catalog,
            cache: TtlCache::new("catalog", ttl),
        }
    }

    /// Food items sorted by name, with popularity.
    pub async fn foods(&self) -> Result<Arc<Vec<FoodListing>>> {
        self.cache.get_or_load(|| self.build()).await
    }

    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    #[tracing::instrument(skip(self))]
    async fn build(&self) -> Result<Vec<FoodListing>> {
        let (foods, orders) = tokio::try_join!(
            self.catalog.list_foods(),
            self.orders.list_orders_with_status(&POPULAR_STATUSES),
        )?;
        let popularity = Popularity::aggregate(&orders);
        tracing::debug!(foods = foods.len(), orders = orders.len(), "catalog view built");
        Ok(foods
            .iter()
            .map(|food| FoodListing::new(food, &popularity))
            .collect())
    }
}
