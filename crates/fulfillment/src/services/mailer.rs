//! Decision email rendering and the mailer seam.

use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{DecisionType, OrderId};
use order_store::OrderRecord;

use crate::error::MailError;

const BRAND: &str = "CB Food Portal";

/// A rendered decision email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionMessage {
    pub order_id: OrderId,
    pub kind: DecisionType,
    /// Recipient address; empty when the order carries none.
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn or_dash(value: &str) -> &str {
    if value.trim().is_empty() { "-" } else { value }
}

impl DecisionMessage {
    /// Renders the email announcing the order's decision.
    ///
    /// Returns `None` if the order has not been decided.
    pub fn render(order: &OrderRecord) -> Option<Self> {
        let verified = match order.decision_email.kind {
            DecisionType::Verified => true,
            DecisionType::Rejected => false,
            DecisionType::None => return None,
        };

        let (title, subtitle, message) = if verified {
            (
                "Payment Verified",
                "Ticket Confirmed",
                "Your order is confirmed and ready for preparation.",
            )
        } else {
            (
                "Payment Rejected",
                "Payment Failed",
                "Your payment could not be verified. Please contact support if needed.",
            )
        };
        let reason = if order.rejection_reason.trim().is_empty() {
            "Payment was rejected"
        } else {
            order.rejection_reason.as_str()
        };

        let subject = format!("{BRAND} - {subtitle} (Order {})", order.id);

        let mut text = format!(
            "{title}\n\n{message}\n\nTeam: {}\nUser: {}\nOrder ID: {}\nTransaction ID: {}\n",
            or_dash(&order.team.team_name),
            or_dash(&order.team.leader_name),
            order.id,
            or_dash(&order.payment.transaction_id),
        );
        if verified {
            let _ = write!(text, "Subtotal: {}", order.subtotal);
        } else {
            let _ = write!(text, "Reason: {reason}");
        }

        let mut rows = String::new();
        for item in &order.items {
            let _ = write!(
                rows,
                "<tr><td>{}</td><td align=\"center\">{}</td><td align=\"right\">{}</td><td align=\"right\">{}</td></tr>",
                escape_html(&item.name),
                item.quantity,
                item.price,
                item.line_total(),
            );
        }

        let mut html = format!(
            "<div style=\"font-family:Arial,sans-serif;color:#111827;\">\
             <h1>{title}</h1><p>{subtitle}</p><p>{message}</p>\
             <p>Team: {}<br>User: {}<br>Order ID: {}<br>Transaction ID: {}</p>",
            escape_html(or_dash(&order.team.team_name)),
            escape_html(or_dash(&order.team.leader_name)),
            order.id,
            escape_html(or_dash(&order.payment.transaction_id)),
        );
        if !verified {
            let _ = write!(
                html,
                "<p><strong>Rejection Reason</strong><br>{}</p>",
                escape_html(reason)
            );
        }
        let _ = write!(
            html,
            "<table width=\"100%\"><thead><tr><th align=\"left\">Item</th><th>Qty</th>\
             <th align=\"right\">Price</th><th align=\"right\">Total</th></tr></thead>\
             <tbody>{rows}</tbody></table>\
             <p><strong>Subtotal</strong> {}</p>\
             <p style=\"color:#6B7280;font-size:12px;\">This is an automated message from {BRAND}.</p></div>",
            order.subtotal,
        );

        Some(Self {
            order_id: order.id,
            kind: order.decision_email.kind,
            to: order.team.email.trim().to_string(),
            subject,
            text,
            html,
        })
    }
}

/// Why a mailer did not send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Outbound mail is administratively disabled.
    Disabled,
    /// The message has no recipient address.
    MissingRecipient,
    /// The recipient address does not parse.
    InvalidRecipient,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Disabled => "mail disabled",
            SkipReason::MissingRecipient => "missing recipient email",
            SkipReason::InvalidRecipient => "invalid recipient email",
        }
    }

    /// Whether retrying can never succeed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SkipReason::MissingRecipient | SkipReason::InvalidRecipient)
    }
}

/// What a mailer did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendReport {
    Sent,
    Skipped(SkipReason),
}

/// Outbound mail.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &DecisionMessage) -> Result<SendReport, MailError>;
}

#[derive(Debug, Default)]
struct InMemoryMailerState {
    sent: Vec<DecisionMessage>,
    fail_next: u32,
    disabled: bool,
}

/// In-memory mailer for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMailer {
    state: Arc<Mutex<InMemoryMailerState>>,
}

impl InMemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` sends fail with a transport error.
    pub fn fail_next(&self, count: u32) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).fail_next = count;
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).disabled = disabled;
    }

    /// Messages delivered so far, in order.
    pub fn sent(&self) -> Vec<DecisionMessage> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .sent
            .clone()
    }

    pub fn sent_count(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).sent.len()
    }
}

#[async_trait]
impl Mailer for InMemoryMailer {
    async fn send(&self, message: &DecisionMessage) -> Result<SendReport, MailError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.disabled {
            return Ok(SendReport::Skipped(SkipReason::Disabled));
        }
        if message.to.is_empty() {
            return Ok(SendReport::Skipped(SkipReason::MissingRecipient));
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(MailError::Transport("connection reset".to_string()));
        }
        state.sent.push(message.clone());
        Ok(SendReport::Sent)
    }
}
