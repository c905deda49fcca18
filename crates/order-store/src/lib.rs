//! Persistence for orders and catalog records.
//!
//! Every mutation is a single atomic, conditionally scoped update: the
//! predicate and the change are applied together, and the caller learns from
//! the returned `Option` whether its predicate still held. Both backends honor
//! the same contract:
//! - [`InMemoryOrderStore`] / [`InMemoryCatalogStore`] for tests and single-process runs
//! - [`PostgresOrderStore`] / [`PostgresCatalogStore`] for deployments

pub mod catalog;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod record;
pub mod store;

pub use catalog::{CatalogStore, FoodItem, PaymentQr};
pub use common::{AccountKey, CatalogId, OrderId};
pub use error::{Result, StoreError};
pub use memory::{InMemoryCatalogStore, InMemoryOrderStore};
pub use postgres::{PostgresCatalogStore, PostgresOrderStore};
pub use query::{MAX_PAGE_LIMIT, OrderQuery, PageCursor};
pub use record::{DecisionEmail, OrderItem, OrderRecord, Payment, Team};
pub use store::{ClaimPolicy, Decision, EmailOutcome, OrderStore, OrderStoreExt, UploadOutcome};
