//! Server configuration module
//!
//! Handles loading configuration from environment variables with sensible defaults.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3000)
    pub port: u16,
    /// Bind address, IPv4 or IPv6 (default: 127.0.0.1)
    pub host: IpAddr,
    /// Allowed CORS origins, comma-separated (default: allow all in dev)
    pub allowed_origins: Option<Vec<String>>,
    /// Request body limit in KB (default: 256)
    pub body_limit_kb: usize,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
    /// Enable rate limiting (default: false for tests, true when loaded from env)
    pub rate_limit_enabled: bool,
    /// Rate limit: requests per second (default: 10)
    pub rate_limit_per_sec: u64,
    /// Rate limit: burst size (default: 20)
    pub rate_limit_burst: u32,
    /// PostgreSQL URL; in-memory storage when unset
    pub database_url: Option<String>,
    /// Database connection pool maximum connections (default: 20)
    pub database_max_connections: u32,
    /// Database connection pool minimum connections (default: 2)
    pub database_min_connections: u32,
    /// WebAuthn Relying Party ID (default: localhost)
    pub rp_id: String,
    /// WebAuthn Relying Party name
    pub rp_name: String,
    /// Public origin of the service; WebAuthn origin and NIP-98 URL base
    pub rp_origin: String,
    /// Pod server base URL; provisioning disabled when unset
    pub pod_base_url: Option<String>,
    /// Overall pod provisioning deadline in seconds (default: 15)
    pub provisioning_timeout_secs: u64,
    /// Expired challenge sweep interval in seconds (default: 60)
    pub challenge_sweep_secs: u64,
    /// Accept `Authorization: Basic base64("nostr:" + token)` (default: false)
    pub allow_basic_nostr: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            allowed_origins: None, // None = allow all (dev mode)
            body_limit_kb: 256,
            timeout_secs: 30,
            rate_limit_enabled: false, // Disabled by default (for tests)
            rate_limit_per_sec: 10,
            rate_limit_burst: 20,
            database_url: None,
            database_max_connections: 20,
            database_min_connections: 2,
            rp_id: "localhost".to_string(),
            rp_name: "Nostr Passkey".to_string(),
            rp_origin: "http://localhost:5173".to_string(),
            pod_base_url: None,
            provisioning_timeout_secs: 15,
            challenge_sweep_secs: 60,
            allow_basic_nostr: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let allowed_origins = lookup("ALLOWED_ORIGINS").map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        // Rate limiting enabled by default in production, can be disabled with RATE_LIMIT_ENABLED=false
        let rate_limit_enabled = lookup("RATE_LIMIT_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        let allow_basic_nostr = lookup("ALLOW_BASIC_NOSTR")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);

        Self {
            port: parse_var(lookup("PORT")).unwrap_or(defaults.port),
            host: parse_var(lookup("HOST")).unwrap_or(defaults.host),
            allowed_origins,
            body_limit_kb: parse_var(lookup("BODY_LIMIT_KB")).unwrap_or(defaults.body_limit_kb),
            timeout_secs: parse_var(lookup("REQUEST_TIMEOUT_SECS")).unwrap_or(defaults.timeout_secs),
            rate_limit_enabled,
            rate_limit_per_sec: parse_var(lookup("RATE_LIMIT_PER_SEC")).unwrap_or(defaults.rate_limit_per_sec),
            rate_limit_burst: parse_var(lookup("RATE_LIMIT_BURST")).unwrap_or(defaults.rate_limit_burst),
            database_url: non_empty("DATABASE_URL"),
            database_max_connections: parse_var(lookup("DATABASE_MAX_CONNECTIONS"))
                .unwrap_or(defaults.database_max_connections),
            database_min_connections: parse_var(lookup("DATABASE_MIN_CONNECTIONS"))
                .unwrap_or(defaults.database_min_connections),
            rp_id: non_empty("RP_ID").unwrap_or(defaults.rp_id),
            rp_name: non_empty("RP_NAME").unwrap_or(defaults.rp_name),
            rp_origin: non_empty("RP_ORIGIN").unwrap_or(defaults.rp_origin),
            pod_base_url: non_empty("POD_BASE_URL").or_else(|| non_empty("JSS_BASE_URL")),
            provisioning_timeout_secs: parse_var(lookup("PROVISIONING_TIMEOUT_SECS"))
                .unwrap_or(defaults.provisioning_timeout_secs),
            challenge_sweep_secs: parse_var(lookup("CHALLENGE_SWEEP_SECS"))
                .filter(|secs: &u64| *secs > 0)
                .unwrap_or(defaults.challenge_sweep_secs),
            allow_basic_nostr,
        }
    }

    /// Get socket address from config
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Public origin without a trailing slash
    pub fn public_origin(&self) -> &str {
        self.rp_origin.trim_end_matches('/')
    }

    pub fn provisioning_timeout(&self) -> Duration {
        Duration::from_secs(self.provisioning_timeout_secs)
    }

    pub fn challenge_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.challenge_sweep_secs)
    }
}

fn parse_var<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 3000);
        assert!(config.database_url.is_none());
        assert!(config.pod_base_url.is_none());
        assert!(!config.allow_basic_nostr);
        assert!(!config.rate_limit_enabled);
    }

    #[test]
    fn test_empty_environment_uses_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.provisioning_timeout_secs, 15);
        assert_eq!(config.challenge_sweep_secs, 60);
        assert!(config.rate_limit_enabled);
    }

    #[test]
    fn test_environment_overrides() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("HOST", "0.0.0.0"),
            ("ALLOWED_ORIGINS", "https://a.example, https://b.example,"),
            ("DATABASE_URL", "postgres://localhost/auth"),
            ("RP_ID", "forum.example.com"),
            ("RP_ORIGIN", "https://forum.example.com/"),
            ("ALLOW_BASIC_NOSTR", "TRUE"),
            ("RATE_LIMIT_ENABLED", "false"),
        ]);
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:8080");
        assert_eq!(
            config.allowed_origins,
            Some(vec!["https://a.example".to_string(), "https://b.example".to_string()])
        );
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/auth"));
        assert_eq!(config.public_origin(), "https://forum.example.com");
        assert!(config.allow_basic_nostr);
        assert!(!config.rate_limit_enabled);
    }

    #[test]
    fn test_pod_base_url_alias() {
        let config = config_from(&[("JSS_BASE_URL", "https://pods.example.com")]);
        assert_eq!(config.pod_base_url.as_deref(), Some("https://pods.example.com"));

        let config = config_from(&[
            ("POD_BASE_URL", "https://primary.example.com"),
            ("JSS_BASE_URL", "https://legacy.example.com"),
        ]);
        assert_eq!(config.pod_base_url.as_deref(), Some("https://primary.example.com"));
    }

    #[test]
    fn test_host_accepts_any_ip() {
        let config = config_from(&[("HOST", "10.1.2.3"), ("PORT", "4000")]);
        assert_eq!(config.socket_addr().to_string(), "10.1.2.3:4000");

        let config = config_from(&[("HOST", "::")]);
        assert_eq!(config.socket_addr().to_string(), "[::]:3000");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("PORT", "http"),
            ("HOST", "localhost"),
            ("CHALLENGE_SWEEP_SECS", "0"),
        ]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:3000");
        assert_eq!(config.challenge_sweep_secs, 60);
    }
}
