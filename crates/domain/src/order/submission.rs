//! Validation and normalization of a customer's order submission.

use common::Money;
use order_store::{OrderItem, Team};
use serde::Deserialize;

use crate::ValidationError;

/// Default unit price ceiling: ₹1,00,000.
pub const MAX_ITEM_PRICE_MINOR: i64 = 10_000_000;

/// Limits applied to every submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRules {
    /// Required email suffix, e.g. `@klu.ac.in`. Compared case-insensitively.
    pub allowed_email_domain: String,
    /// Cap on the summed quantity across all lines.
    pub max_total_items: u32,
    pub max_lines: usize,
    pub max_line_quantity: u32,
    /// Highest accepted unit price.
    pub max_item_price: Money,
}

impl Default for SubmissionRules {
    fn default() -> Self {
        Self {
            allowed_email_domain: "@klu.ac.in".to_string(),
            max_total_items: 10,
            max_lines: 100,
            max_line_quantity: 50,
            max_item_price: Money::from_minor(MAX_ITEM_PRICE_MINOR),
        }
    }
}

/// One line item as sent by the client.
///
/// Missing fields deserialize to values that fail validation rather than
/// failing the whole items document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ItemInput {
    #[serde(alias = "clientId")]
    pub id: String,
    pub name: String,
    pub price: f64,
    pub quantity: f64,
}

impl ItemInput {
    /// Parses the `items` form field, a JSON array of line items.
    pub fn parse_list(raw: &str) -> Result<Vec<ItemInput>, ValidationError> {
        serde_json::from_str(raw).map_err(|_| ValidationError::InvalidItemsJson)
    }
}

/// A raw order submission, as received from the client.
///
/// Client-supplied totals are deliberately absent: subtotal and total item
/// count are always derived from the validated items.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderSubmission {
    pub team_name: String,
    pub leader_name: String,
    pub phone: String,
    pub email: String,
    pub transaction_id: String,
    pub items: Vec<ItemInput>,
    /// Original file name of the payment screenshot; empty if none was sent.
    pub screenshot_name: String,
}

/// A submission that passed every rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ValidSubmission {
    pub team: Team,
    pub transaction_id: String,
    pub items: Vec<OrderItem>,
    pub screenshot_name: String,
}

/// Validates a transaction id and returns its normalized (case-folded) form.
pub fn normalize_transaction_id(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingTransactionId);
    }
    if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::InvalidTransactionId);
    }
    Ok(trimmed.to_ascii_lowercase())
}

impl OrderSubmission {
    pub(crate) fn validate(&self, rules: &SubmissionRules) -> Result<ValidSubmission, ValidationError> {
        let team = Team {
            team_name: self.team_name.trim().to_string(),
            leader_name: self.leader_name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            email: self.email.trim().to_string(),
        };

        if team.team_name.is_empty()
            || team.leader_name.is_empty()
            || team.phone.is_empty()
            || team.email.is_empty()
        {
            return Err(ValidationError::MissingTeamFields);
        }
        if team.phone.len() != 10 || !team.phone.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::InvalidPhone);
        }
        if !team
            .leader_name
            .chars()
            .all(|c| c.is_ascii_alphabetic() || c == ' ')
        {
            return Err(ValidationError::InvalidLeaderName);
        }
        let domain = rules.allowed_email_domain.to_lowercase();
        if !team.email.to_lowercase().ends_with(&domain) {
            return Err(ValidationError::InvalidEmailDomain(
                rules.allowed_email_domain.clone(),
            ));
        }

        normalize_transaction_id(&self.transaction_id)?;
        let items = validate_items(&self.items, rules)?;

        let screenshot_name = self.screenshot_name.trim();
        if screenshot_name.is_empty() {
            return Err(ValidationError::MissingScreenshot);
        }

        Ok(ValidSubmission {
            team,
            transaction_id: self.transaction_id.trim().to_string(),
            items,
            screenshot_name: screenshot_name.to_string(),
        })
    }
}

fn validate_items(
    items: &[ItemInput],
    rules: &SubmissionRules,
) -> Result<Vec<OrderItem>, ValidationError> {
    if items.is_empty() || items.len() > rules.max_lines {
        return Err(ValidationError::ItemCount {
            max: rules.max_lines,
        });
    }

    let mut total_quantity: u32 = 0;
    let mut subtotal = Money::zero();
    let mut validated = Vec::with_capacity(items.len());
    for item in items {
        let id = item.id.trim();
        let name = item.name.trim();
        if id.is_empty() || name.is_empty() {
            return Err(ValidationError::ItemMissingIdOrName);
        }

        let price = Money::from_major(item.price)
            .filter(|p| p.is_positive() && *p <= rules.max_item_price)
            .ok_or(ValidationError::InvalidItemPrice)?;

        let max = rules.max_line_quantity;
        if item.quantity.fract() != 0.0 || item.quantity < 1.0 || item.quantity > f64::from(max) {
            return Err(ValidationError::InvalidItemQuantity { max });
        }
        let quantity = item.quantity as u32;
        total_quantity = total_quantity.saturating_add(quantity);
        subtotal = price
            .checked_multiply(quantity)
            .and_then(|line| subtotal.checked_add(line))
            .ok_or(ValidationError::SubtotalTooLarge)?;

        validated.push(OrderItem {
            item_id: id.to_string(),
            name: name.to_string(),
            price,
            quantity,
        });
    }

    if total_quantity > rules.max_total_items {
        return Err(ValidationError::TooManyItems {
            max: rules.max_total_items,
        });
    }
    Ok(validated)
}
