//! Shared types for the order-fulfillment pipeline.

pub mod clock;
pub mod money;
pub mod status;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use money::Money;
pub use status::{DecisionEmailStatus, DecisionType, OrderStatus, ParseStatusError, UploadStatus};
pub use types::{AccountKey, CatalogId, OrderId};
