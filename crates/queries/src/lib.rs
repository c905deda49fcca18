//! Read side of the order pipeline.
//!
//! This crate provides:
//! - [`OrderListing`]: keyset pages of orders, newest first
//! - [`CatalogView`]: the catalog with per-item popularity behind a
//!   single-flight [`TtlCache`]
//! - [`accepted_items`]: item totals over accepted orders

pub mod cache;
pub mod catalog;
pub mod error;
pub mod pagination;
pub mod popularity;
pub mod summary;

pub use cache::TtlCache;
pub use catalog::{CatalogView, FoodListing};
pub use error::{QueryError, Result};
pub use pagination::{OrderListing, OrderPage};
pub use popularity::{BESTSELLER_COUNT, ItemPopularity, Popularity};
pub use summary::{ACCEPTED_STATUSES, AcceptedItem, AcceptedItemsSummary, AcceptedTotals, accepted_items};
