use chrono::{DateTime, SecondsFormat, Utc};

use crate::{AccountKey, OrderId, OrderRecord};

/// Upper bound on the number of orders returned by one page.
pub const MAX_PAGE_LIMIT: usize = 200;

/// Position in the newest-first order listing.
///
/// A page contains records strictly older than the cursor. When the cursor
/// also carries the id of the last record seen, records sharing its exact
/// creation timestamp are ordered by id so that equal timestamps never cause
/// gaps or duplicates between pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub created_at: DateTime<Utc>,
    pub id: Option<OrderId>,
}

impl PageCursor {
    /// Cursor pointing just past `order`.
    pub fn after(order: &OrderRecord) -> Self {
        Self {
            created_at: order.created_at,
            id: Some(order.id),
        }
    }

    /// Cursor from a bare timestamp: everything strictly older.
    pub fn before(created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            id: None,
        }
    }

    /// Parses `<rfc3339>` or `<rfc3339>_<uuid>`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let (ts, id) = match raw.split_once('_') {
            Some((ts, id)) => (ts, Some(id.parse::<OrderId>().ok()?)),
            None => (raw, None),
        };
        let created_at = DateTime::parse_from_rfc3339(ts).ok()?.with_timezone(&Utc);
        Some(Self { created_at, id })
    }

    /// Returns true if `order` lies strictly beyond this cursor.
    pub fn admits(&self, order: &OrderRecord) -> bool {
        match self.id {
            Some(id) => (order.created_at, order.id) < (self.created_at, id),
            None => order.created_at < self.created_at,
        }
    }
}

impl std::fmt::Display for PageCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ts = self.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true);
        match self.id {
            Some(id) => write!(f, "{ts}_{id}"),
            None => f.write_str(&ts),
        }
    }
}

/// Keyset query over orders, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderQuery {
    /// Restrict to one owning account; `None` lists every order.
    pub account_key: Option<AccountKey>,
    pub before: Option<PageCursor>,
    pub limit: usize,
}

impl OrderQuery {
    /// Lists every order (operator view).
    pub fn all() -> Self {
        Self {
            account_key: None,
            before: None,
            limit: MAX_PAGE_LIMIT,
        }
    }

    /// Lists one account's orders.
    pub fn for_account(account_key: AccountKey) -> Self {
        Self {
            account_key: Some(account_key),
            ..Self::all()
        }
    }

    pub fn before(mut self, cursor: Option<PageCursor>) -> Self {
        self.before = cursor;
        self
    }

    /// Sets the page size, clamped to `1..=MAX_PAGE_LIMIT`.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit.clamp(1, MAX_PAGE_LIMIT);
        self
    }

    /// Returns true if `order` belongs on a page of this query.
    pub fn matches(&self, order: &OrderRecord) -> bool {
        if let Some(ref key) = self.account_key
            && &order.account_key != key
        {
            return false;
        }
        if let Some(ref cursor) = self.before
            && !cursor.admits(order)
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cursor_roundtrips_through_display() {
        let cursor = PageCursor {
            created_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap(),
            id: Some(OrderId::new()),
        };
        let parsed = PageCursor::parse(&cursor.to_string()).unwrap();
        assert_eq!(parsed, cursor);
    }

    #[test]
    fn cursor_accepts_bare_timestamp() {
        let parsed = PageCursor::parse("2025-03-01T12:30:00Z").unwrap();
        assert_eq!(parsed.id, None);
        assert_eq!(
            parsed.created_at,
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap()
        );
    }

    #[test]
    fn cursor_rejects_garbage() {
        assert!(PageCursor::parse("").is_none());
        assert!(PageCursor::parse("yesterday").is_none());
        assert!(PageCursor::parse("2025-03-01T12:30:00Z_nope").is_none());
    }

    #[test]
    fn limit_is_clamped() {
        assert_eq!(OrderQuery::all().limit(0).limit, 1);
        assert_eq!(OrderQuery::all().limit(5000).limit, MAX_PAGE_LIMIT);
        assert_eq!(OrderQuery::all().limit(25).limit, 25);
    }
}
