//! Publishing seam and the order/catalog event vocabulary.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use domain::OrderView;
use order_store::OrderRecord;
use serde_json::json;

use crate::event::{FOODS_CHANGED, ORDER_CREATED, ORDER_UPDATED, ORDERS_CHANGED, PAYMENT_QR_CHANGED};
use crate::{Channel, RealtimeEvent, Registry};

/// Where services send realtime events.
///
/// Implemented by [`Realtime`] in the server and by
/// [`RecordingBroadcaster`] in tests.
pub trait Broadcaster: Send + Sync {
    fn publish(&self, channel: Channel, event: RealtimeEvent);
}

/// The operator and customer registries of one process.
#[derive(Clone)]
pub struct Realtime {
    operator: Arc<Registry>,
    customer: Arc<Registry>,
}

impl Realtime {
    /// Creates both registries with a per-subscriber queue of `buffer` events.
    pub fn new(buffer: usize) -> Self {
        Self {
            operator: Registry::new(Channel::Operator, buffer),
            customer: Registry::new(Channel::Customer, buffer),
        }
    }

    pub fn operator(&self) -> &Arc<Registry> {
        &self.operator
    }

    pub fn customer(&self) -> &Arc<Registry> {
        &self.customer
    }

    pub fn registry(&self, channel: Channel) -> &Arc<Registry> {
        match channel {
            Channel::Operator => &self.operator,
            Channel::Customer => &self.customer,
        }
    }
}

impl Broadcaster for Realtime {
    fn publish(&self, channel: Channel, event: RealtimeEvent) {
        let name = event.name;
        let delivered = self.registry(channel).broadcast(event);
        tracing::trace!(channel = channel.as_str(), event = name, delivered, "event published");
    }
}

/// Records published events instead of delivering them.
#[derive(Debug, Default)]
pub struct RecordingBroadcaster {
    events: Mutex<Vec<(Channel, RealtimeEvent)>>,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, in order.
    pub fn events(&self) -> Vec<(Channel, RealtimeEvent)> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Names of the events published on `channel`, in order.
    pub fn names(&self, channel: Channel) -> Vec<&'static str> {
        self.events()
            .into_iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, e)| e.name)
            .collect()
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn publish(&self, channel: Channel, event: RealtimeEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((channel, event));
    }
}

/// The events raised by order and catalog mutations.
pub trait BroadcasterExt: Broadcaster {
    /// A new order was placed.
    fn order_created(&self, order: &OrderRecord, at: DateTime<Utc>) {
        self.publish(
            Channel::Operator,
            RealtimeEvent::new(ORDER_CREATED, OrderView::for_operator(order)),
        );
        self.publish(
            Channel::Customer,
            RealtimeEvent::new(
                ORDERS_CHANGED,
                json!({
                    "action": "orderCreated",
                    "id": order.id,
                    "status": order.status,
                    "at": at,
                }),
            )
            .tagged(order.account_key.clone()),
        );
        self.publish(
            Channel::Customer,
            RealtimeEvent::new(
                FOODS_CHANGED,
                json!({ "action": "orderCreated", "id": order.id, "at": at }),
            ),
        );
    }

    /// The payment screenshot upload reached a terminal state.
    fn order_upload_finished(&self, order: &OrderRecord, at: DateTime<Utc>) {
        self.publish(
            Channel::Operator,
            RealtimeEvent::new(ORDER_UPDATED, OrderView::for_operator(order)),
        );
        self.publish(
            Channel::Customer,
            RealtimeEvent::new(
                ORDERS_CHANGED,
                json!({
                    "action": "paymentUploadUpdated",
                    "id": order.id,
                    "status": order.status,
                    "uploadStatus": order.payment.upload_status,
                    "at": at,
                }),
            )
            .tagged(order.account_key.clone()),
        );
    }

    /// An operator changed the order status.
    fn order_status_changed(&self, order: &OrderRecord, at: DateTime<Utc>) {
        self.publish(
            Channel::Operator,
            RealtimeEvent::new(ORDER_UPDATED, OrderView::for_operator(order)),
        );
        self.publish(
            Channel::Customer,
            RealtimeEvent::new(
                ORDERS_CHANGED,
                json!({
                    "action": "statusUpdated",
                    "id": order.id,
                    "status": order.status,
                    "rejectionReason": order.rejection_reason,
                    "at": at,
                }),
            )
            .tagged(order.account_key.clone()),
        );
        self.publish(
            Channel::Customer,
            RealtimeEvent::new(
                FOODS_CHANGED,
                json!({
                    "action": "orderStatusUpdated",
                    "id": order.id,
                    "status": order.status,
                    "at": at,
                }),
            ),
        );
    }

    /// The decision email moved to a new delivery state.
    fn decision_email_changed(&self, order: &OrderRecord, at: DateTime<Utc>) {
        self.publish(
            Channel::Operator,
            RealtimeEvent::new(ORDER_UPDATED, OrderView::for_operator(order)),
        );
        self.publish(
            Channel::Customer,
            RealtimeEvent::new(
                ORDERS_CHANGED,
                json!({
                    "action": "decisionEmailUpdated",
                    "id": order.id,
                    "status": order.status,
                    "emailStatus": order.decision_email.status,
                    "at": at,
                }),
            )
            .tagged(order.account_key.clone()),
        );
    }

    /// A food item was added or its image upload finished.
    fn foods_changed(&self, action: &str, id: impl ToString, at: DateTime<Utc>) {
        let payload = json!({ "action": action, "id": id.to_string(), "at": at });
        self.publish(
            Channel::Operator,
            RealtimeEvent::new(FOODS_CHANGED, payload.clone()),
        );
        self.publish(Channel::Customer, RealtimeEvent::new(FOODS_CHANGED, payload));
    }

    /// A payment QR was added or its image upload finished.
    fn payment_qr_changed(&self, action: &str, id: impl ToString, at: DateTime<Utc>) {
        let payload = json!({ "action": action, "id": id.to_string(), "at": at });
        self.publish(
            Channel::Operator,
            RealtimeEvent::new(PAYMENT_QR_CHANGED, payload.clone()),
        );
        self.publish(
            Channel::Customer,
            RealtimeEvent::new(PAYMENT_QR_CHANGED, payload),
        );
    }
}

impl<T: Broadcaster + ?Sized> BroadcasterExt for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{AccountKey, Money, OrderId};
    use order_store::{OrderItem, Payment, Team};

    fn order() -> OrderRecord {
        OrderRecord::placed(
            OrderId::new(),
            AccountKey::parse("a@klu.ac.in").unwrap(),
            Team {
                team_name: "Crabs".to_string(),
                leader_name: "Ferris".to_string(),
                phone: "9876543210".to_string(),
                email: "a@klu.ac.in".to_string(),
            },
            vec![OrderItem {
                item_id: "f1".to_string(),
                name: "Dosa".to_string(),
                price: Money::from_minor(5000),
                quantity: 1,
            }],
            Payment::pending("TXN1", "proof.png"),
            Utc::now(),
        )
    }

    #[test]
    fn order_created_reaches_both_channels() {
        let recorder = RecordingBroadcaster::new();
        let order = order();
        recorder.order_created(&order, Utc::now());

        assert_eq!(recorder.names(Channel::Operator), vec![ORDER_CREATED]);
        assert_eq!(
            recorder.names(Channel::Customer),
            vec![ORDERS_CHANGED, FOODS_CHANGED]
        );

        let events = recorder.events();
        let (_, orders_changed) = &events[1];
        assert_eq!(orders_changed.account_key, Some(order.account_key.clone()));
        assert_eq!(orders_changed.data["action"], "orderCreated");
        let (_, foods_changed) = &events[2];
        assert_eq!(foods_changed.account_key, None);
    }

    #[test]
    fn status_change_payload_carries_reason() {
        let recorder = RecordingBroadcaster::new();
        let mut order = order();
        order.status = common::OrderStatus::Rejected;
        order.rejection_reason = "bad proof".to_string();
        recorder.order_status_changed(&order, Utc::now());

        let events = recorder.events();
        assert_eq!(events[0].1.data["status"], "Rejected");
        assert_eq!(events[1].1.data["rejectionReason"], "bad proof");
    }

    #[tokio::test]
    async fn realtime_routes_to_registries() {
        let realtime = Realtime::new(4);
        let mut operator = realtime.operator().subscribe(None);
        let mut customer = realtime
            .customer()
            .subscribe(AccountKey::parse("a@klu.ac.in"));

        realtime.order_created(&order(), Utc::now());

        assert_eq!(operator.recv().await.unwrap().name, ORDER_CREATED);
        assert_eq!(customer.recv().await.unwrap().name, ORDERS_CHANGED);
        assert_eq!(customer.recv().await.unwrap().name, FOODS_CHANGED);
    }
}
