//! Named event payloads.

use common::AccountKey;
use serde::Serialize;

pub const ORDER_CREATED: &str = "orderCreated";
pub const ORDER_UPDATED: &str = "orderUpdated";
pub const ORDERS_CHANGED: &str = "ordersChanged";
pub const FOODS_CHANGED: &str = "foodsChanged";
pub const PAYMENT_QR_CHANGED: &str = "paymentQrChanged";

/// One named event with a JSON payload.
///
/// `account_key` tags events that concern a single customer; on the customer
/// channel a tagged event only reaches subscribers presenting that key.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeEvent {
    pub name: &'static str,
    pub data: serde_json::Value,
    pub account_key: Option<AccountKey>,
}

impl RealtimeEvent {
    /// Builds an untagged event. A payload that fails to serialize becomes `null`.
    pub fn new(name: &'static str, data: impl Serialize) -> Self {
        let data = serde_json::to_value(data).unwrap_or_else(|e| {
            tracing::warn!(event = name, error = %e, "failed to serialize event payload");
            serde_json::Value::Null
        });
        Self {
            name,
            data,
            account_key: None,
        }
    }

    pub fn tagged(mut self, account_key: AccountKey) -> Self {
        self.account_key = Some(account_key);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagging_keeps_payload() {
        let key = AccountKey::parse("A@klu.ac.in").unwrap();
        let event = RealtimeEvent::new(ORDERS_CHANGED, serde_json::json!({"id": "1"}))
            .tagged(key.clone());
        assert_eq!(event.name, "ordersChanged");
        assert_eq!(event.data["id"], "1");
        assert_eq!(event.account_key, Some(key));
    }
}
