//! Realtime fan-out for connected operators and customers.
//!
//! Two independent [`Registry`] instances hold the live subscribers: the
//! operator channel receives every order and catalog mutation, the customer
//! channel receives summaries, with order events delivered only to the
//! subscriber presenting the owning account key. Delivery is best-effort and
//! at-most-once; clients re-fetch state through the read API after reconnecting.

pub mod event;
pub mod publish;
pub mod registry;

pub use event::{
    FOODS_CHANGED, ORDER_CREATED, ORDER_UPDATED, ORDERS_CHANGED, PAYMENT_QR_CHANGED,
    RealtimeEvent,
};
pub use publish::{Broadcaster, BroadcasterExt, Realtime, RecordingBroadcaster};
pub use registry::{Channel, Registry, Subscription};
