//! Host environment capability and request-scoped context.
//!
//! A hosting target (a CMS plugin, a web framework module) supplies one
//! [`HostEnvironment`] implementation. Core operations receive it through an
//! explicit [`RequestContext`]; there is no global registry.

use crate::Result;
use crate::dialect::Dialect;
use crate::error::{ConfigError, Error};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Already-resolved configuration handed to the core by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Prefix prepended to every logical table name (e.g. `wp_`)
    pub table_prefix: String,
    /// Connection URL, used for dialect detection and diagnostics
    pub connection_url: Option<String>,
    /// Explicit dialect; overrides detection from the URL
    pub dialect: Option<Dialect>,
}

impl Config {
    /// Parse configuration from JSON text.
    #[allow(clippy::result_large_err)]
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            Error::Config(ConfigError {
                message: format!("invalid configuration: {e}"),
            })
        })
    }

    /// Physical table name for a logical table name.
    pub fn table_name(&self, logical: &str) -> String {
        prefixed_table_name(&self.table_prefix, logical)
    }

    /// The configured dialect, falling back to the URL scheme.
    pub fn resolved_dialect(&self) -> Option<Dialect> {
        self.dialect
            .or_else(|| self.connection_url.as_deref().and_then(Dialect::from_url))
    }
}

/// `logical` under `prefix`; names already carrying the prefix are kept.
pub fn prefixed_table_name(prefix: &str, logical: &str) -> String {
    if prefix.is_empty() || logical.starts_with(prefix) {
        logical.to_string()
    } else {
        format!("{prefix}{logical}")
    }
}

/// Key/value session storage owned by the host.
pub trait SessionStore: Send + Sync {
    /// Read a stored value.
    fn get(&self, key: &str) -> Option<serde_json::Value>;

    /// Store a value, replacing any previous one.
    fn set(&self, key: &str, value: serde_json::Value);

    /// Remove a value, returning it if present.
    fn remove(&self, key: &str) -> Option<serde_json::Value>;
}

/// Session store backed by an in-process map.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    values: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        let values = self
            .values
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: serde_json::Value) {
        let mut values = self
            .values
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        values.insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) -> Option<serde_json::Value> {
        let mut values = self
            .values
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        values.remove(key)
    }
}

/// Capabilities a hosting target provides to the core.
pub trait HostEnvironment: Send + Sync {
    /// Resolved configuration.
    fn config(&self) -> &Config;

    /// Build a URL for a route with query parameters.
    fn build_url(&self, route: &str, params: &[(&str, String)]) -> String;

    /// Session storage for the current request.
    fn session_store(&self) -> &dyn SessionStore;
}

/// A fixed environment: static config, a base URL and an in-memory session.
///
/// Suitable for command-line tools and tests.
#[derive(Debug, Default)]
pub struct StaticEnvironment {
    config: Config,
    base_url: String,
    session: MemorySessionStore,
}

impl StaticEnvironment {
    pub fn new(config: Config, base_url: impl Into<String>) -> Self {
        Self {
            config,
            base_url: base_url.into(),
            session: MemorySessionStore::new(),
        }
    }
}

impl HostEnvironment for StaticEnvironment {
    fn config(&self) -> &Config {
        &self.config
    }

    fn build_url(&self, route: &str, params: &[(&str, String)]) -> String {
        let mut url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            route.trim_start_matches('/')
        );
        for (i, (key, value)) in params.iter().enumerate() {
            url.push(if i == 0 { '?' } else { '&' });
            url.push_str(&encode_query_component(key));
            url.push('=');
            url.push_str(&encode_query_component(value));
        }
        url
    }

    fn session_store(&self) -> &dyn SessionStore {
        &self.session
    }
}

fn encode_query_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// The current user as seen by permission checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserContext {
    roles: Vec<String>,
}

impl UserContext {
    /// A user with no roles.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A user holding the given roles.
    pub fn with_roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }
}

/// Request-scoped context passed explicitly into core operations.
#[derive(Clone, Copy)]
pub struct RequestContext<'a> {
    env: &'a dyn HostEnvironment,
    user: &'a UserContext,
}

impl<'a> RequestContext<'a> {
    pub fn new(env: &'a dyn HostEnvironment, user: &'a UserContext) -> Self {
        Self { env, user }
    }

    pub fn config(&self) -> &'a Config {
        self.env.config()
    }

    pub fn user(&self) -> &'a UserContext {
        self.user
    }

    pub fn session(&self) -> &'a dyn SessionStore {
        self.env.session_store()
    }

    /// Physical name of a logical table under the configured prefix.
    pub fn table_name(&self, logical: &str) -> String {
        self.env.config().table_name(logical)
    }

    pub fn url(&self, route: &str, params: &[(&str, String)]) -> String {
        self.env.build_url(route, params)
    }
}

impl std::fmt::Debug for RequestContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("config", self.env.config())
            .field("user", self.user)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_json_defaults() {
        let config = Config::from_json(r#"{"table_prefix": "wp_"}"#).unwrap();
        assert_eq!(config.table_prefix, "wp_");
        assert_eq!(config.connection_url, None);
        assert_eq!(config.table_name("posts"), "wp_posts");
        assert_eq!(config.table_name("wp_posts"), "wp_posts");
    }

    #[test]
    fn test_config_invalid_json_is_config_error() {
        let err = Config::from_json("{").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_resolved_dialect() {
        let mut config = Config {
            connection_url: Some("mysql://localhost/app".to_string()),
            ..Config::default()
        };
        assert_eq!(config.resolved_dialect(), Some(Dialect::Mysql));
        config.dialect = Some(Dialect::Sqlite);
        assert_eq!(config.resolved_dialect(), Some(Dialect::Sqlite));
    }

    #[test]
    fn test_static_environment_urls() {
        let env = StaticEnvironment::new(Config::default(), "https://example.com/admin/");
        assert_eq!(env.build_url("/products", &[]), "https://example.com/admin/products");
        assert_eq!(
            env.build_url("products/edit", &[("id", "7".to_string()), ("q", "a b&c".to_string())]),
            "https://example.com/admin/products/edit?id=7&q=a%20b%26c"
        );
    }

    #[test]
    fn test_request_context_session_round_trip() {
        let env = StaticEnvironment::new(
            Config {
                table_prefix: "app_".to_string(),
                ..Config::default()
            },
            "/admin",
        );
        let user = UserContext::with_roles(["editor"]);
        let ctx = RequestContext::new(&env, &user);

        ctx.session().set("sort", serde_json::json!({"field": "name"}));
        assert_eq!(
            ctx.session().get("sort"),
            Some(serde_json::json!({"field": "name"}))
        );
        assert!(ctx.session().remove("sort").is_some());
        assert_eq!(ctx.session().get("sort"), None);
        assert_eq!(ctx.table_name("products"), "app_products");
        assert!(ctx.user().has_role("editor"));
        assert!(!ctx.user().has_role("admin"));
    }
}
