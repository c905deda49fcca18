//! Keyset pagination over orders.

use order_store::{OrderQuery, OrderRecord, OrderStore, PageCursor};

use crate::Result;

/// One page of orders, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPage {
    pub orders: Vec<OrderRecord>,
    /// Cursor for the following page; `None` on the last page.
    pub next_cursor: Option<PageCursor>,
}

/// Lists orders page by page.
///
/// Each page holds records strictly older than the cursor, so orders inserted
/// while a client pages (always newer) never shift later pages.
pub struct OrderListing<S: OrderStore> {
    store: S,
}

impl<S: OrderStore> OrderListing<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn page(&self, query: &OrderQuery) -> Result<OrderPage> {
        let limit = query.limit;
        // One extra row tells whether another page exists.
        let probe = OrderQuery {
            limit: limit + 1,
            ..query.clone()
        };
        let mut orders = self.store.list_orders(&probe).await?;

        let next_cursor = if orders.len() > limit {
            orders.truncate(limit);
            orders.last().map(PageCursor::after)
        } else {
            None
        };
        Ok(OrderPage {
            orders,
            next_cursor,
        })
    }
}
