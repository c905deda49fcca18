//! Operator status changes.

use common::OrderStatus;
use order_store::Decision;

use crate::ValidationError;

/// A validated operator request to move an order forward.
///
/// ```text
/// Placed ──decide──► Verified ──deliver──► Delivered
///        └─decide──► Rejected
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChange {
    /// First-time decision; only applies while the order is Placed.
    Decide(Decision),
    /// Hand-over; only applies while the order is Verified.
    Deliver,
}

impl StatusChange {
    /// Parses the `{status, reason?}` request body.
    pub fn parse(status: &str, reason: Option<&str>) -> Result<Self, ValidationError> {
        let status: OrderStatus = status
            .trim()
            .parse()
            .map_err(|_| ValidationError::InvalidStatus)?;
        match status {
            OrderStatus::Placed => Err(ValidationError::CannotReopen),
            OrderStatus::Verified => Ok(StatusChange::Decide(Decision::verify())),
            OrderStatus::Rejected => reason
                .and_then(Decision::reject)
                .map(StatusChange::Decide)
                .ok_or(ValidationError::MissingRejectionReason),
            OrderStatus::Delivered => Ok(StatusChange::Deliver),
        }
    }

    /// The status the order ends up in when the change applies.
    pub fn target(&self) -> OrderStatus {
        match self {
            StatusChange::Decide(decision) => decision.status(),
            StatusChange::Deliver => OrderStatus::Delivered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decisions() {
        assert_eq!(
            StatusChange::parse("Verified", None).unwrap().target(),
            OrderStatus::Verified
        );
        let rejected = StatusChange::parse("Rejected", Some("  wrong amount ")).unwrap();
        match rejected {
            StatusChange::Decide(d) => assert_eq!(d.reason(), "wrong amount"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            StatusChange::parse(" Delivered ", None).unwrap(),
            StatusChange::Deliver
        );
    }

    #[test]
    fn rejection_needs_reason() {
        assert_eq!(
            StatusChange::parse("Rejected", None),
            Err(ValidationError::MissingRejectionReason)
        );
        assert_eq!(
            StatusChange::parse("Rejected", Some("   ")),
            Err(ValidationError::MissingRejectionReason)
        );
    }

    #[test]
    fn rejects_unknown_and_placed() {
        assert_eq!(
            StatusChange::parse("Shipped", None),
            Err(ValidationError::InvalidStatus)
        );
        assert_eq!(
            StatusChange::parse("Placed", None),
            Err(ValidationError::CannotReopen)
        );
    }
}
