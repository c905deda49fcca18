//! Order, upload and decision-email status values.

use serde::{Deserialize, Serialize};

/// Returned when a stored status string is not a known value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatusError {
    pub kind: &'static str,
    pub value: String,
}

impl std::fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown {} value: {:?}", self.kind, self.value)
    }
}

impl std::error::Error for ParseStatusError {}

/// The lifecycle state of an order.
///
/// ```text
/// Placed ──┬──► Verified ──► Delivered
///          │
///          └──► Rejected
/// ```
///
/// Verified and Rejected are decisions: once an order leaves Placed its
/// decision never changes. Only Delivered may follow Verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    #[default]
    Placed,
    Verified,
    Rejected,
    Delivered,
}

impl OrderStatus {
    /// Returns true for the two operator decisions.
    pub fn is_decision(&self) -> bool {
        matches!(self, OrderStatus::Verified | OrderStatus::Rejected)
    }

    /// Returns true if a decision can still be taken.
    pub fn can_decide(&self) -> bool {
        matches!(self, OrderStatus::Placed)
    }

    /// Returns true if the order can be marked delivered.
    pub fn can_deliver(&self) -> bool {
        matches!(self, OrderStatus::Verified)
    }

    /// Returns true for statuses that count towards catalog popularity.
    pub fn counts_towards_popularity(&self) -> bool {
        !matches!(self, OrderStatus::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Placed => "Placed",
            OrderStatus::Verified => "Verified",
            OrderStatus::Rejected => "Rejected",
            OrderStatus::Delivered => "Delivered",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Placed" => Ok(OrderStatus::Placed),
            "Verified" => Ok(OrderStatus::Verified),
            "Rejected" => Ok(OrderStatus::Rejected),
            "Delivered" => Ok(OrderStatus::Delivered),
            other => Err(ParseStatusError {
                kind: "order status",
                value: other.to_string(),
            }),
        }
    }
}

/// State of an asynchronous image upload attached to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    #[default]
    Pending,
    Uploaded,
    Failed,
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, UploadStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Uploaded => "uploaded",
            UploadStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UploadStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(UploadStatus::Pending),
            "uploaded" => Ok(UploadStatus::Uploaded),
            "failed" => Ok(UploadStatus::Failed),
            other => Err(ParseStatusError {
                kind: "upload status",
                value: other.to_string(),
            }),
        }
    }
}

/// Which decision an outcome email announces. `None` until the order leaves Placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DecisionType {
    #[default]
    #[serde(rename = "")]
    None,
    Verified,
    Rejected,
}

impl DecisionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionType::None => "",
            DecisionType::Verified => "Verified",
            DecisionType::Rejected => "Rejected",
        }
    }
}

impl From<OrderStatus> for DecisionType {
    fn from(status: OrderStatus) -> Self {
        match status {
            OrderStatus::Verified => DecisionType::Verified,
            OrderStatus::Rejected => DecisionType::Rejected,
            OrderStatus::Placed | OrderStatus::Delivered => DecisionType::None,
        }
    }
}

impl std::str::FromStr for DecisionType {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(DecisionType::None),
            "Verified" => Ok(DecisionType::Verified),
            "Rejected" => Ok(DecisionType::Rejected),
            other => Err(ParseStatusError {
                kind: "decision type",
                value: other.to_string(),
            }),
        }
    }
}

/// Delivery state of the decision email.
///
/// ```text
/// none ──► queued ──► sending ──┬──► sent
///            ▲                  ├──► queued   (transient failure)
///            │                  └──► failed   (terminal failure)
///            └───── operator retry ◄──┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DecisionEmailStatus {
    #[default]
    None,
    Queued,
    Sending,
    Sent,
    Failed,
}

impl DecisionEmailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionEmailStatus::None => "none",
            DecisionEmailStatus::Queued => "queued",
            DecisionEmailStatus::Sending => "sending",
            DecisionEmailStatus::Sent => "sent",
            DecisionEmailStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for DecisionEmailStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DecisionEmailStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(DecisionEmailStatus::None),
            "queued" => Ok(DecisionEmailStatus::Queued),
            "sending" => Ok(DecisionEmailStatus::Sending),
            "sent" => Ok(DecisionEmailStatus::Sent),
            "failed" => Ok(DecisionEmailStatus::Failed),
            other => Err(ParseStatusError {
                kind: "decision email status",
                value: other.to_string(),
            }),
        }
    }
}
