//! Prefix route table and path rewriting
//!
//! Each inbound path is matched against a fixed set of rules, loaded once at
//! startup. The longest matching prefix wins; prefixes only match on whole
//! path segments, so `/api/user` matches `/api/user/me` but never
//! `/api/username`. The matched prefix is replaced by the rule's substitution
//! and the original query string is carried over untouched.
//!
//! Upstream URIs are assembled from raw parts and never normalized: dot
//! segments, percent-escapes and query bytes reach the backend exactly as the
//! caller sent them.

use axum::http::Uri;
use axum::http::uri::PathAndQuery;
use url::{Position, Url};

use crate::config::ServicesConfig;
use crate::error::{GatewayError, Result};

/// Inbound prefix served by the user service
pub const USER_PREFIX: &str = "/api/user";
/// Path the user prefix is rewritten to
pub const USER_REWRITE: &str = "/api";
/// Inbound prefix served by the chatbot service
pub const CHATBOT_PREFIX: &str = "/api/chatbot";
/// Path the chatbot prefix is rewritten to
pub const CHATBOT_REWRITE: &str = "/api/chat";

/// Capability shared by anything that can claim and rewrite an inbound path
pub trait Route {
    /// Whether this route is responsible for `path`
    fn resolves(&self, path: &str) -> bool;

    /// Rewrite `path` into the path expected by the upstream.
    ///
    /// Only meaningful when [`Route::resolves`] returned `true`.
    fn rewrite(&self, path: &str) -> String;
}

/// A single prefix → backend mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    prefix: String,
    replacement: String,
    target: Url,
}

impl RouteRule {
    /// Build and validate a rule.
    ///
    /// # Errors
    /// Returns `GatewayError::Config` when the prefix or replacement is not an
    /// absolute path, the prefix has a trailing slash, or the target is not an
    /// `http`/`https` base URL without query or fragment.
    pub fn new(prefix: &str, replacement: &str, target: &str) -> Result<Self> {
        if !prefix.starts_with('/') {
            return Err(GatewayError::Config(format!(
                "Route prefix '{prefix}' must start with '/'"
            )));
        }
        if prefix.len() > 1 && prefix.ends_with('/') {
            return Err(GatewayError::Config(format!(
                "Route prefix '{prefix}' must not end with '/'"
            )));
        }
        if !replacement.starts_with('/') {
            return Err(GatewayError::Config(format!(
                "Rewrite target '{replacement}' for prefix '{prefix}' must start with '/'"
            )));
        }

        let target = Url::parse(target.trim())
            .map_err(|e| GatewayError::Config(format!("Invalid service URL '{target}': {e}")))?;

        let scheme = target.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(GatewayError::Config(format!(
                "Unsupported service URL scheme '{scheme}': only http and https are allowed"
            )));
        }
        if target.host_str().is_none() {
            return Err(GatewayError::Config(format!(
                "Service URL '{target}' has no host"
            )));
        }
        if target.query().is_some() || target.fragment().is_some() {
            return Err(GatewayError::Config(format!(
                "Service URL '{target}' must not carry a query or fragment"
            )));
        }

        Ok(Self {
            prefix: prefix.to_string(),
            replacement: replacement.to_string(),
            target,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    /// Base URL of the backend this rule forwards to
    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Full upstream URI for an inbound path and raw query string
    pub fn upstream_uri(&self, path: &str, query: Option<&str>) -> Result<Uri> {
        let base_path = self.target.path().trim_end_matches('/');
        let mut path_and_query = format!("{base_path}{}", self.rewrite(path));
        if let Some(q) = query {
            path_and_query.push('?');
            path_and_query.push_str(q);
        }

        let path_and_query = PathAndQuery::try_from(path_and_query.as_str()).map_err(|e| {
            GatewayError::Proxy(format!("Invalid upstream path '{path_and_query}': {e}"))
        })?;

        Uri::builder()
            .scheme(self.target.scheme())
            .authority(&self.target[Position::BeforeHost..Position::AfterPort])
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| GatewayError::Proxy(format!("Invalid upstream URI: {e}")))
    }
}

impl Route for RouteRule {
    fn resolves(&self, path: &str) -> bool {
        if self.prefix == "/" {
            return path.starts_with('/');
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    fn rewrite(&self, path: &str) -> String {
        let rest = if self.prefix == "/" {
            path
        } else {
            path.get(self.prefix.len()..).unwrap_or_default()
        };

        if rest.is_empty() {
            return self.replacement.clone();
        }
        format!("{}{rest}", self.replacement.trim_end_matches('/'))
    }
}

/// Immutable set of route rules, ordered longest prefix first
#[derive(Debug, Clone)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
}

impl RouteTable {
    /// Build a table, rejecting duplicate prefixes.
    pub fn new(mut rules: Vec<RouteRule>) -> Result<Self> {
        rules.sort_by(|a, b| {
            b.prefix
                .len()
                .cmp(&a.prefix.len())
                .then_with(|| a.prefix.cmp(&b.prefix))
        });

        if let Some(pair) = rules.windows(2).find(|w| w[0].prefix == w[1].prefix) {
            return Err(GatewayError::Config(format!(
                "Route prefix '{}' is configured more than once",
                pair[0].prefix
            )));
        }

        Ok(Self { rules })
    }

    /// The gateway's standard table: user and chatbot services
    pub fn from_services(services: &ServicesConfig) -> Result<Self> {
        let user = required(&services.user_service_url, "USER_SERVICE_URL")?;
        let chatbot = required(&services.chatbot_service_url, "CHATBOT_SERVICE_URL")?;

        Self::new(vec![
            RouteRule::new(USER_PREFIX, USER_REWRITE, user)?,
            RouteRule::new(CHATBOT_PREFIX, CHATBOT_REWRITE, chatbot)?,
        ])
    }

    /// Find the rule responsible for `path`, if any
    pub fn resolve(&self, path: &str) -> Option<&RouteRule> {
        self.rules.iter().find(|rule| rule.resolves(path))
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| GatewayError::Config(format!("{name} is not defined")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable {
        RouteTable::from_services(&ServicesConfig {
            user_service_url: Some("http://user-service:8000".to_string()),
            chatbot_service_url: Some("http://chatbot-service:5000/".to_string()),
        })
        .unwrap()
    }

    #[test]
    fn test_resolve_user_routes() {
        let table = table();
        for path in ["/api/user", "/api/user/login", "/api/user/me", "/api/user/a/b"] {
            let rule = table.resolve(path).unwrap();
            assert_eq!(rule.prefix(), USER_PREFIX, "path {path}");
        }
    }

    #[test]
    fn test_resolve_chatbot_routes() {
        let table = table();
        let rule = table.resolve("/api/chatbot").unwrap();
        assert_eq!(rule.prefix(), CHATBOT_PREFIX);
        assert_eq!(rule.target().host_str(), Some("chatbot-service"));
    }

    #[test]
    fn test_resolve_respects_segment_boundaries() {
        let table = table();
        assert!(table.resolve("/api/username").is_none());
        assert!(table.resolve("/api/chatbots").is_none());
        assert!(table.resolve("/api").is_none());
        assert!(table.resolve("/").is_none());
        assert!(table.resolve("/health").is_none());
    }

    #[test]
    fn test_rewrite_user_paths() {
        let table = table();
        let rule = table.resolve("/api/user/login").unwrap();
        assert_eq!(rule.rewrite("/api/user/login"), "/api/login");
        assert_eq!(rule.rewrite("/api/user/me"), "/api/me");
        assert_eq!(rule.rewrite("/api/user"), "/api");
        assert_eq!(rule.rewrite("/api/user/"), "/api/");
    }

    #[test]
    fn test_rewrite_chatbot_paths() {
        let table = table();
        let rule = table.resolve("/api/chatbot").unwrap();
        assert_eq!(rule.rewrite("/api/chatbot"), "/api/chat");
        assert_eq!(rule.rewrite("/api/chatbot/history"), "/api/chat/history");
    }

    #[test]
    fn test_upstream_uri_appends_query_unmodified() {
        let table = table();
        let rule = table.resolve("/api/user/me").unwrap();

        let uri = rule.upstream_uri("/api/user/me", None).unwrap();
        assert_eq!(uri.to_string(), "http://user-service:8000/api/me");

        let uri = rule
            .upstream_uri("/api/user/search", Some("q=a%20b&page=2"))
            .unwrap();
        assert_eq!(uri.to_string(), "http://user-service:8000/api/search?q=a%20b&page=2");

        let uri = rule
            .upstream_uri("/api/user/search", Some("q=it's&sep=a%2Fb&plus=1+2"))
            .unwrap();
        assert_eq!(uri.query(), Some("q=it's&sep=a%2Fb&plus=1+2"));
    }

    #[test]
    fn test_upstream_uri_keeps_dot_segments() {
        let rule = RouteRule::new(CHATBOT_PREFIX, CHATBOT_REWRITE, "http://bots:5000").unwrap();

        let uri = rule.upstream_uri("/api/chatbot/../../admin", None).unwrap();
        assert_eq!(uri.path(), "/api/chat/../../admin");

        let uri = rule.upstream_uri("/api/chatbot/%2e%2e/secret", None).unwrap();
        assert_eq!(uri.path(), "/api/chat/%2e%2e/secret");
        assert!(uri.path().starts_with(CHATBOT_REWRITE));
    }

    #[test]
    fn test_upstream_uri_keeps_base_path() {
        let rule = RouteRule::new("/api/user", "/api", "http://users.internal/v2/").unwrap();
        let uri = rule.upstream_uri("/api/user/login", None).unwrap();
        assert_eq!(uri.to_string(), "http://users.internal/v2/api/login");
    }

    #[test]
    fn test_upstream_uri_keeps_port_and_ipv6_host() {
        let rule = RouteRule::new("/api/user", "/api", "http://[::1]:8000").unwrap();
        let uri = rule.upstream_uri("/api/user/me", None).unwrap();
        assert_eq!(uri.authority().unwrap().as_str(), "[::1]:8000");
        assert_eq!(uri.scheme_str(), Some("http"));
    }

    #[test]
    fn test_trailing_slash_in_target_base_is_ignored() {
        let table = table();
        let rule = table.resolve("/api/chatbot").unwrap();
        let uri = rule.upstream_uri("/api/chatbot", None).unwrap();
        assert_eq!(uri.to_string(), "http://chatbot-service:5000/api/chat");
    }

    #[test]
    fn test_longest_prefix_wins() {
        let table = RouteTable::new(vec![
            RouteRule::new("/api", "/", "http://generic:1").unwrap(),
            RouteRule::new("/api/user", "/api", "http://users:2").unwrap(),
        ])
        .unwrap();

        assert_eq!(table.resolve("/api/user/me").unwrap().prefix(), "/api/user");
        assert_eq!(table.resolve("/api/other").unwrap().prefix(), "/api");
        assert_eq!(table.resolve("/api/other").unwrap().rewrite("/api/other"), "/other");
    }

    #[test]
    fn test_root_prefix_rewrite() {
        let rule = RouteRule::new("/", "/v1", "http://backend:1").unwrap();
        assert!(rule.resolves("/anything"));
        assert_eq!(rule.rewrite("/anything"), "/v1/anything");
    }

    #[test]
    fn test_duplicate_prefix_is_config_error() {
        let result = RouteTable::new(vec![
            RouteRule::new("/api/user", "/api", "http://a:1").unwrap(),
            RouteRule::new("/api/user", "/v2", "http://b:2").unwrap(),
        ]);
        assert!(matches!(result, Err(GatewayError::Config(msg)) if msg.contains("/api/user")));
    }

    #[test]
    fn test_rule_validation() {
        assert!(RouteRule::new("api/user", "/api", "http://a:1").is_err());
        assert!(RouteRule::new("/api/user/", "/api", "http://a:1").is_err());
        assert!(RouteRule::new("/api/user", "api", "http://a:1").is_err());
        assert!(RouteRule::new("/api/user", "/api", "not-a-url").is_err());
        assert!(RouteRule::new("/api/user", "/api", "ftp://files:21").is_err());
        assert!(RouteRule::new("/api/user", "/api", "http://a:1/?x=1").is_err());
    }

    #[test]
    fn test_from_services_requires_urls() {
        let result = RouteTable::from_services(&ServicesConfig {
            user_service_url: Some("http://u:1".to_string()),
            chatbot_service_url: None,
        });
        assert!(matches!(result, Err(GatewayError::Config(msg)) if msg.contains("CHATBOT_SERVICE_URL")));
    }

    #[test]
    fn test_table_order_and_len() {
        let table = table();
        assert_eq!(table.len(), 2);
        assert!(!table.is_empty());
        assert_eq!(table.rules()[0].prefix(), CHATBOT_PREFIX);
        assert_eq!(table.rules()[1].prefix(), USER_PREFIX);
    }
}
