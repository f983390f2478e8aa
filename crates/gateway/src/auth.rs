//! Bearer credential propagation
//!
//! The gateway never looks inside a token. It lifts the caller's bearer
//! credential into a per-request [`AuthContext`] and re-attaches it to the
//! upstream request; the backend decides whether it is valid.

use axum::http::{HeaderMap, HeaderValue, header::AUTHORIZATION};
use reqwest::RequestBuilder;

const BEARER_SCHEME: &str = "bearer";

/// Optional bearer token carried by a single request or client session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    token: Option<String>,
}

impl AuthContext {
    /// A context without credentials
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A context holding `token`. An empty token is treated as absent.
    pub fn with_token(token: impl Into<String>) -> Self {
        let token = token.into();
        let token = token.trim();
        if token.is_empty() {
            Self::anonymous()
        } else {
            Self {
                token: Some(token.to_string()),
            }
        }
    }

    /// Extract a bearer token from an inbound `Authorization` header.
    ///
    /// Other authorization schemes yield an anonymous context; those headers
    /// are forwarded as ordinary headers instead.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_bearer)
            .map(Self::with_token)
            .unwrap_or_default()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// `Authorization` header value for this context, if it has a token
    pub fn header_value(&self) -> Option<HeaderValue> {
        let token = self.token.as_deref()?;
        HeaderValue::from_str(&format!("Bearer {token}")).ok()
    }

    /// Attach the bearer credential to an outgoing request.
    ///
    /// Returns the request unchanged when there is no token.
    pub fn attach(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Same as [`AuthContext::attach`] for a bare header map
    pub fn attach_headers(&self, headers: &mut HeaderMap) {
        if let Some(value) = self.header_value() {
            headers.insert(AUTHORIZATION, value);
        }
    }
}

fn parse_bearer(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        Some(token.trim())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with_auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_from_headers_extracts_bearer_token() {
        let ctx = AuthContext::from_headers(&headers_with_auth("Bearer abc.def.ghi"));
        assert_eq!(ctx.token(), Some("abc.def.ghi"));
        assert!(ctx.is_authenticated());
    }

    #[test]
    fn test_from_headers_scheme_is_case_insensitive() {
        let ctx = AuthContext::from_headers(&headers_with_auth("bearer token-1"));
        assert_eq!(ctx.token(), Some("token-1"));
    }

    #[test]
    fn test_from_headers_without_header_is_anonymous() {
        let ctx = AuthContext::from_headers(&HeaderMap::new());
        assert_eq!(ctx, AuthContext::anonymous());
        assert!(!ctx.is_authenticated());
    }

    #[test]
    fn test_from_headers_ignores_other_schemes() {
        let ctx = AuthContext::from_headers(&headers_with_auth("Basic dXNlcjpwYXNz"));
        assert!(!ctx.is_authenticated());
    }

    #[test]
    fn test_literal_null_token_is_still_forwarded() {
        // The gateway does not judge token contents.
        let ctx = AuthContext::from_headers(&headers_with_auth("Bearer null"));
        assert_eq!(ctx.token(), Some("null"));
    }

    #[test]
    fn test_empty_token_is_anonymous() {
        assert!(!AuthContext::with_token("").is_authenticated());
        assert!(!AuthContext::with_token("   ").is_authenticated());
        assert!(!AuthContext::from_headers(&headers_with_auth("Bearer ")).is_authenticated());
    }

    #[test]
    fn test_attach_headers_sets_bearer() {
        let mut headers = HeaderMap::new();
        AuthContext::with_token("t0k3n").attach_headers(&mut headers);
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer t0k3n");
    }

    #[test]
    fn test_attach_headers_noop_without_token() {
        let mut headers = HeaderMap::new();
        AuthContext::anonymous().attach_headers(&mut headers);
        assert!(headers.is_empty());
    }

    #[test]
    fn test_attach_request_builder() {
        let client = reqwest::Client::new();

        let request = AuthContext::with_token("abc")
            .attach(client.get("http://localhost/api/me"))
            .build()
            .unwrap();
        assert_eq!(request.headers().get(AUTHORIZATION).unwrap(), "Bearer abc");

        let request = AuthContext::anonymous()
            .attach(client.get("http://localhost/api/me"))
            .build()
            .unwrap();
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }
}
