//! Caller identity derived from request headers.
//!
//! Sessions are issued elsewhere. Operators present `X-Admin-Token`, customers
//! present their account key in `X-Account-Key`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use common::AccountKey;

use crate::error::ApiError;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";
pub const ACCOUNT_KEY_HEADER: &str = "x-account-key";

/// The operator credential. `None` disables operator access entirely.
#[derive(Debug, Clone, Default)]
pub struct AdminToken(pub Option<Arc<str>>);

impl AdminToken {
    pub fn new(token: Option<String>) -> Self {
        Self(token.map(Arc::from))
    }

    fn matches(&self, presented: &str) -> bool {
        self.0.as_deref().is_some_and(|token| token == presented)
    }
}

/// Who is making the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Operator,
    Customer(AccountKey),
    Anonymous,
}

impl Caller {
    pub fn from_headers(headers: &HeaderMap, admin_token: &AdminToken) -> Self {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

        if header(ADMIN_TOKEN_HEADER).is_some_and(|t| admin_token.matches(t.trim())) {
            return Caller::Operator;
        }
        match header(ACCOUNT_KEY_HEADER).and_then(AccountKey::parse) {
            Some(key) => Caller::Customer(key),
            None => Caller::Anonymous,
        }
    }

    pub fn is_operator(&self) -> bool {
        matches!(self, Caller::Operator)
    }

    pub fn account_key(&self) -> Option<&AccountKey> {
        match self {
            Caller::Customer(key) => Some(key),
            _ => None,
        }
    }

    pub fn require_operator(&self) -> Result<(), ApiError> {
        match self {
            Caller::Operator => Ok(()),
            Caller::Customer(_) => Err(ApiError::Forbidden("Admin access required".to_string())),
            Caller::Anonymous => Err(ApiError::Unauthorized("Admin token required".to_string())),
        }
    }

    pub fn require_account(&self) -> Result<AccountKey, ApiError> {
        self.account_key()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("Account key required".to_string()))
    }
}

impl<S> FromRequestParts<S> for Caller
where
    AdminToken: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = AdminToken::from_ref(state);
        Ok(Caller::from_headers(&parts.headers, &token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn admin_token_wins_over_account_key() {
        let token = AdminToken::new(Some("secret".to_string()));
        let caller = Caller::from_headers(
            &headers(&[(ADMIN_TOKEN_HEADER, "secret"), (ACCOUNT_KEY_HEADER, "a@klu.ac.in")]),
            &token,
        );
        assert_eq!(caller, Caller::Operator);
    }

    #[test]
    fn wrong_token_falls_back_to_account() {
        let token = AdminToken::new(Some("secret".to_string()));
        let caller = Caller::from_headers(
            &headers(&[(ADMIN_TOKEN_HEADER, "guess"), (ACCOUNT_KEY_HEADER, " A@KLU.ac.in ")]),
            &token,
        );
        assert_eq!(caller.account_key().unwrap().as_str(), "a@klu.ac.in");
        assert!(caller.require_operator().is_err());
    }

    #[test]
    fn unset_token_disables_operator_access() {
        let caller = Caller::from_headers(&headers(&[(ADMIN_TOKEN_HEADER, "")]), &AdminToken::default());
        assert_eq!(caller, Caller::Anonymous);
        assert!(caller.require_account().is_err());
    }
}
