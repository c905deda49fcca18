//! Persisted order document.

use chrono::{DateTime, Utc};
use common::{AccountKey, DecisionEmailStatus, DecisionType, Money, OrderId, OrderStatus, UploadStatus};
use serde::{Deserialize, Serialize};

/// Team details captured when the order is placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub team_name: String,
    pub leader_name: String,
    pub phone: String,
    pub email: String,
}

/// One line of the order snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    /// Catalog identifier of the food item.
    pub item_id: String,
    pub name: String,
    pub price: Money,
    pub quantity: u32,
}

impl OrderItem {
    pub fn line_total(&self) -> Money {
        self.price.multiply(self.quantity)
    }
}

/// Proof-of-payment details and the state of its image upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    /// Transaction reference as entered by the customer.
    pub transaction_id: String,
    pub screenshot_url: String,
    /// Identifier assigned by object storage; empty until uploaded.
    pub storage_id: String,
    pub screenshot_name: String,
    pub upload_status: UploadStatus,
    pub upload_error: String,
}

impl Payment {
    /// A payment whose screenshot upload has not finished yet.
    pub fn pending(transaction_id: impl Into<String>, screenshot_name: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            screenshot_url: String::new(),
            storage_id: String::new(),
            screenshot_name: screenshot_name.into(),
            upload_status: UploadStatus::Pending,
            upload_error: String::new(),
        }
    }
}

/// Delivery bookkeeping for the single decision email of an order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionEmail {
    #[serde(rename = "type")]
    pub kind: DecisionType,
    pub status: DecisionEmailStatus,
    pub attempts: u32,
    pub last_error: String,
    pub queued_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// The central order document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub id: OrderId,
    pub account_key: AccountKey,
    /// Lower-cased transaction reference; unique across all orders.
    pub transaction_id_normalized: String,
    pub status: OrderStatus,
    /// Non-empty exactly when `status` is Rejected.
    pub rejection_reason: String,
    pub team: Team,
    pub items: Vec<OrderItem>,
    pub subtotal: Money,
    pub total_items: u32,
    pub payment: Payment,
    pub decision_email: DecisionEmail,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRecord {
    /// Builds a freshly placed order with a pending payment upload.
    ///
    /// `subtotal` and `total_items` are derived from `items`.
    pub fn placed(
        id: OrderId,
        account_key: AccountKey,
        team: Team,
        items: Vec<OrderItem>,
        payment: Payment,
        created_at: DateTime<Utc>,
    ) -> Self {
        let subtotal = items.iter().map(OrderItem::line_total).sum();
        let total_items = items.iter().map(|i| i.quantity).sum();
        Self {
            id,
            account_key,
            transaction_id_normalized: payment.transaction_id.to_lowercase(),
            status: OrderStatus::Placed,
            rejection_reason: String::new(),
            team,
            items,
            subtotal,
            total_items,
            payment,
            decision_email: DecisionEmail::default(),
            created_at,
            updated_at: created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team() -> Team {
        Team {
            team_name: "Rustaceans".to_string(),
            leader_name: "Ferris Crab".to_string(),
            phone: "9876543210".to_string(),
            email: "ferris@klu.ac.in".to_string(),
        }
    }

    #[test]
    fn placed_order_derives_totals_and_normalized_id() {
        let items = vec![
            OrderItem {
                item_id: "f1".to_string(),
                name: "Dosa".to_string(),
                price: Money::from_minor(10000),
                quantity: 2,
            },
            OrderItem {
                item_id: "f2".to_string(),
                name: "Coffee".to_string(),
                price: Money::from_minor(5000),
                quantity: 1,
            },
        ];
        let order = OrderRecord::placed(
            OrderId::new(),
            AccountKey::parse("ferris@klu.ac.in").unwrap(),
            team(),
            items,
            Payment::pending("TXN1", "proof.png"),
            Utc::now(),
        );

        assert_eq!(order.status, OrderStatus::Placed);
        assert_eq!(order.transaction_id_normalized, "txn1");
        assert_eq!(order.total_items, 3);
        assert_eq!(order.subtotal.minor(), 25000);
        assert_eq!(order.payment.upload_status, UploadStatus::Pending);
        assert_eq!(order.decision_email.status, DecisionEmailStatus::None);
        assert_eq!(order.decision_email.kind, DecisionType::None);
    }

    #[test]
    fn decision_email_serializes_type_field() {
        let json = serde_json::to_value(DecisionEmail::default()).unwrap();
        assert_eq!(json["type"], "");
        assert_eq!(json["status"], "none");
        assert_eq!(json["attempts"], 0);
    }
}
