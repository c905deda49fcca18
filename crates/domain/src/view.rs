//! Wire representation of an order.

use chrono::{DateTime, Utc};
use common::{DecisionEmailStatus, DecisionType, OrderId, OrderStatus, UploadStatus};
use order_store::{OrderItem, OrderRecord, Team};
use serde::Serialize;

/// Payment method recorded for every order; payments are made by scanning a QR code.
const PAYMENT_METHOD: &str = "QR";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    pub method: &'static str,
    pub transaction_id: String,
    pub screenshot_url: String,
    pub screenshot_name: String,
    pub upload_status: UploadStatus,
    pub upload_error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemView {
    pub client_id: String,
    pub name: String,
    /// Major currency units.
    pub price: f64,
    pub quantity: u32,
}

impl From<&OrderItem> for ItemView {
    fn from(item: &OrderItem) -> Self {
        Self {
            client_id: item.item_id.clone(),
            name: item.name.clone(),
            price: item.price.as_major(),
            quantity: item.quantity,
        }
    }
}

/// Delivery state of the decision email; only shown to operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionEmailView {
    #[serde(rename = "type")]
    pub kind: DecisionType,
    pub status: DecisionEmailStatus,
    pub attempts: u32,
    pub last_error: String,
    pub sent_at: Option<DateTime<Utc>>,
}

/// An order as returned by the API and carried in realtime events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub id: OrderId,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub rejection_reason: String,
    pub team: Team,
    pub payment: PaymentView,
    pub items: Vec<ItemView>,
    pub total_items: u32,
    /// Major currency units.
    pub subtotal: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_email: Option<DecisionEmailView>,
}

impl OrderView {
    /// The customer-facing view.
    pub fn from_record(order: &OrderRecord) -> Self {
        Self {
            id: order.id,
            created_at: order.created_at,
            status: order.status,
            rejection_reason: order.rejection_reason.clone(),
            team: order.team.clone(),
            payment: PaymentView {
                method: PAYMENT_METHOD,
                transaction_id: order.payment.transaction_id.clone(),
                screenshot_url: order.payment.screenshot_url.clone(),
                screenshot_name: order.payment.screenshot_name.clone(),
                upload_status: order.payment.upload_status,
                upload_error: order.payment.upload_error.clone(),
            },
            items: order.items.iter().map(ItemView::from).collect(),
            total_items: order.total_items,
            subtotal: order.subtotal.as_major(),
            decision_email: None,
        }
    }

    /// The operator view, which also exposes the decision email state.
    pub fn for_operator(order: &OrderRecord) -> Self {
        let email = &order.decision_email;
        Self {
            decision_email: Some(DecisionEmailView {
                kind: email.kind,
                status: email.status,
                attempts: email.attempts,
                last_error: email.last_error.clone(),
                sent_at: email.sent_at,
            }),
            ..Self::from_record(order)
        }
    }
}
