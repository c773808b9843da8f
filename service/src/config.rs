//! Service configuration: store address, credentials and pool sizing.
//!
//! Every setting has a default and an environment override. Out-of-range
//! values are rejected by `validate()`; a non-positive pool size falls back
//! to the default instead.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VocabError};

pub const DEFAULT_URI: &str = "bolt://127.0.0.1:7687";
pub const DEFAULT_USER: &str = "neo4j";
pub const DEFAULT_MAX_CONNECTIONS: usize = 20;
pub const MAX_CONNECTIONS_LIMIT: usize = 1024;
pub const DEFAULT_FETCH_SIZE: usize = 200;
pub const FETCH_SIZE_LIMIT: usize = 100_000;

pub const ENV_URI: &str = "VOCAB_GRAPH_URI";
pub const ENV_USER: &str = "VOCAB_GRAPH_USER";
pub const ENV_PASSWORD: &str = "VOCAB_GRAPH_PASSWORD";
pub const ENV_DATABASE: &str = "VOCAB_GRAPH_DATABASE";
pub const ENV_MAX_CONNECTIONS: &str = "VOCAB_GRAPH_MAX_CONNECTIONS";
pub const ENV_FETCH_SIZE: &str = "VOCAB_GRAPH_FETCH_SIZE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Graph store address. A bare `host:port` gets the `bolt://` scheme.
    pub uri: String,
    pub user: String,
    pub password: String,
    /// Target database; the server default when unset.
    pub database: Option<String>,
    /// Upper bound on simultaneously leased connections.
    pub max_connections: usize,
    /// Rows pulled per round trip by the Bolt backend.
    pub fetch_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            user: DEFAULT_USER.to_string(),
            password: String::new(),
            database: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            fetch_size: DEFAULT_FETCH_SIZE,
        }
    }
}

impl ServiceConfig {
    /// Defaults overridden by any `VOCAB_GRAPH_*` variables that are set.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(uri) = get(ENV_URI) {
            config = config.with_uri(&uri);
        }
        if let Some(user) = get(ENV_USER) {
            config.user = user;
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            config.password = password;
        }
        config.database = get(ENV_DATABASE);
        if let Some(raw) = get(ENV_MAX_CONNECTIONS) {
            let n = parse_int("max_connections", &raw)?;
            config = config.with_max_connections(n);
        }
        if let Some(raw) = get(ENV_FETCH_SIZE) {
            let n = parse_int("fetch_size", &raw)?;
            config.fetch_size = usize::try_from(n).map_err(|_| VocabError::Config {
                setting: "fetch_size",
                message: format!("must be positive, got {n}"),
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_uri(mut self, uri: &str) -> Self {
        self.uri = normalize_uri(uri);
        self
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    /// Set the pool size. Zero or negative selects the default.
    pub fn with_max_connections(mut self, max_connections: i64) -> Self {
        self.max_connections = if max_connections <= 0 {
            DEFAULT_MAX_CONNECTIONS
        } else {
            max_connections as usize
        };
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.uri.trim().is_empty() {
            return Err(VocabError::Config {
                setting: "uri",
                message: "cannot be empty".to_string(),
            });
        }
        if self.max_connections == 0 || self.max_connections > MAX_CONNECTIONS_LIMIT {
            return Err(VocabError::Config {
                setting: "max_connections",
                message: format!(
                    "must be between 1 and {MAX_CONNECTIONS_LIMIT}, got {}",
                    self.max_connections
                ),
            });
        }
        if self.fetch_size == 0 || self.fetch_size > FETCH_SIZE_LIMIT {
            return Err(VocabError::Config {
                setting: "fetch_size",
                message: format!(
                    "must be between 1 and {FETCH_SIZE_LIMIT}, got {}",
                    self.fetch_size
                ),
            });
        }
        Ok(())
    }
}

/// Prefix `bolt://` unless the address already carries a scheme.
pub fn normalize_uri(uri: &str) -> String {
    let uri = uri.trim();
    if uri.contains("://") {
        uri.to_string()
    } else {
        format!("bolt://{uri}")
    }
}

fn parse_int(setting: &'static str, raw: &str) -> Result<i64> {
    raw.trim().parse::<i64>().map_err(|e| VocabError::Config {
        setting,
        message: format!("'{raw}' is not an integer: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.uri, "bolt://127.0.0.1:7687");
        assert_eq!(config.max_connections, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_normalize_uri() {
        assert_eq!(normalize_uri("localhost:7687"), "bolt://localhost:7687");
        assert_eq!(normalize_uri("bolt://db:7687"), "bolt://db:7687");
        assert_eq!(normalize_uri("neo4j+s://db.example"), "neo4j+s://db.example");
    }

    #[test]
    fn test_non_positive_pool_size_uses_default() {
        assert_eq!(ServiceConfig::default().with_max_connections(-1).max_connections, 20);
        assert_eq!(ServiceConfig::default().with_max_connections(0).max_connections, 20);
        assert_eq!(ServiceConfig::default().with_max_connections(3).max_connections, 3);
    }

    #[test]
    fn test_with_credentials() {
        let config = ServiceConfig::default().with_credentials("reader", "secret");
        assert_eq!(config.user, "reader");
        assert_eq!(config.password, "secret");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ServiceConfig::from_lookup(lookup(&[
            (ENV_URI, "graph.internal:7687"),
            (ENV_USER, "reader"),
            (ENV_PASSWORD, "secret"),
            (ENV_DATABASE, "vocab"),
            (ENV_MAX_CONNECTIONS, "8"),
            (ENV_FETCH_SIZE, "500"),
        ]))
        .unwrap();
        assert_eq!(config.uri, "bolt://graph.internal:7687");
        assert_eq!(config.user, "reader");
        assert_eq!(config.password, "secret");
        assert_eq!(config.database.as_deref(), Some("vocab"));
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.fetch_size, 500);
    }

    #[test]
    fn test_from_lookup_empty_is_default() {
        let config = ServiceConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = ServiceConfig::from_lookup(lookup(&[(ENV_MAX_CONNECTIONS, "lots")])).unwrap_err();
        assert!(matches!(err, VocabError::Config { setting: "max_connections", .. }));
    }

    #[test]
    fn test_validate_upper_bound() {
        let mut config = ServiceConfig::default();
        config.max_connections = MAX_CONNECTIONS_LIMIT + 1;
        assert!(config.validate().is_err());
        config.max_connections = 4;
        config.fetch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ServiceConfig =
            serde_json::from_str(r#"{"uri": "bolt://x:1", "max_connections": 5}"#).unwrap();
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.user, "neo4j");
    }
}
