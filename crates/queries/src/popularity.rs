//! Per-item popularity aggregated over orders.

use std::collections::{HashMap, HashSet};

use order_store::OrderRecord;

/// How many items carry the bestseller badge.
pub const BESTSELLER_COUNT: usize = 6;

/// Popularity of one catalog item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemPopularity {
    /// Distinct team emails that ordered the item.
    pub ordered_by_count: u32,
    /// Total quantity ordered.
    pub ordered_qty: u32,
    pub is_bestseller: bool,
}

/// Popularity keyed by catalog client id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Popularity {
    items: HashMap<String, ItemPopularity>,
}

impl Popularity {
    /// Aggregates `orders`, skipping those whose status does not count
    /// (rejected orders).
    pub fn aggregate<'a>(orders: impl IntoIterator<Item = &'a OrderRecord>) -> Self {
        let mut tally: HashMap<&str, (HashSet<String>, u32)> = HashMap::new();

        for order in orders {
            if !order.status.counts_towards_popularity() {
                continue;
            }
            let email = order.team.email.trim().to_lowercase();
            for item in &order.items {
                let id = item.item_id.trim();
                if id.is_empty() {
                    continue;
                }
                let (emails, qty) = tally.entry(id).or_default();
                *qty += item.quantity;
                if !email.is_empty() {
                    emails.insert(email.clone());
                }
            }
        }

        let mut ranked: Vec<(&str, u32, u32)> = tally
            .iter()
            .map(|(id, (emails, qty))| (*id, emails.len() as u32, *qty))
            .filter(|(_, count, qty)| *count > 0 || *qty > 0)
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)).then(a.0.cmp(b.0)));
        let bestsellers: HashSet<&str> = ranked
            .iter()
            .take(BESTSELLER_COUNT)
            .map(|(id, _, _)| *id)
            .collect();

        let items = ranked
            .iter()
            .map(|(id, count, qty)| {
                (
                    id.to_string(),
                    ItemPopularity {
                        ordered_by_count: *count,
                        ordered_qty: *qty,
                        is_bestseller: bestsellers.contains(id),
                    },
                )
            })
            .collect();
        Self { items }
    }

    /// Popularity of `client_id`; zero if nobody ordered it.
    pub fn get(&self, client_id: &str) -> ItemPopularity {
        self.items.get(client_id).copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
