//! Configuration management for the talkboard server.
//!
//! Loads configuration from environment variables with sensible defaults.
//! The server binary reads a `.env` file first, if one exists.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// `PostgreSQL` configuration
    pub database: DatabaseConfig,
    /// Document store call policy
    pub store: StoreConfig,
    /// Sign-in configuration
    pub auth: AuthConfig,
    /// Secret for certificate tokens. Unset means a random per-process key.
    pub certificate_secret: Option<String>,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Log filter (`RUST_LOG` syntax)
    pub log_level: String,
    /// Metrics server host (for Prometheus scraping)
    pub metrics_host: String,
    /// Metrics server port
    pub metrics_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
}

/// `PostgreSQL` configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Connection URL. `None` runs on the in-memory store.
    pub url: Option<String>,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

/// Retry and timeout policy for document store calls
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Retries after the first attempt of a read-check-commit cycle
    pub max_retries: usize,
    /// Delay before the first retry, in milliseconds
    pub retry_initial_ms: u64,
    /// Deadline for a single store call, in milliseconds
    pub request_timeout_ms: u64,
}

/// Sign-in configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Public base URL; the OAuth callback is `{base_url}/auth/google/callback`
    pub base_url: String,
    /// Google OAuth client id
    pub google_client_id: Option<String>,
    /// Google OAuth client secret
    pub google_client_secret: Option<String>,
    /// Session TTL in seconds (default: 24 hours)
    pub session_ttl: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unparseable values fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parsed("PORT", 8080),
                log_level: env::var("RUST_LOG")
                    .unwrap_or_else(|_| "info,talkboard=debug,sqlx=warn".to_string()),
                metrics_host: env::var("METRICS_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                metrics_port: parsed("METRICS_PORT", 9090),
                shutdown_timeout: parsed("SHUTDOWN_TIMEOUT", 30),
            },
            database: DatabaseConfig {
                url: non_empty("DATABASE_URL"),
                max_connections: parsed("DATABASE_MAX_CONNECTIONS", 10),
            },
            store: StoreConfig {
                max_retries: parsed("STORE_MAX_RETRIES", 3),
                retry_initial_ms: parsed("STORE_RETRY_INITIAL_MS", 50),
                request_timeout_ms: parsed("STORE_REQUEST_TIMEOUT_MS", 5000),
            },
            auth: AuthConfig {
                base_url: env::var("AUTH_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:8080".to_string()),
                google_client_id: non_empty("GOOGLE_CLIENT_ID"),
                google_client_secret: non_empty("GOOGLE_CLIENT_SECRET"),
                session_ttl: parsed("AUTH_SESSION_TTL", 86_400), // 24 hours
            },
            certificate_secret: non_empty("CERTIFICATE_SECRET"),
        }
    }

    /// Configuration for tests and local runs: in-memory store, no sign-in
    /// provider, fast retries.
    #[must_use]
    pub fn local() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                log_level: "info".to_string(),
                metrics_host: "127.0.0.1".to_string(),
                metrics_port: 0,
                shutdown_timeout: 1,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 1,
            },
            store: StoreConfig {
                max_retries: 5,
                retry_initial_ms: 1,
                request_timeout_ms: 5000,
            },
            auth: AuthConfig {
                base_url: "http://localhost:8080".to_string(),
                google_client_id: None,
                google_client_secret: None,
                session_ttl: 3600,
            },
            certificate_secret: Some("local-certificate-secret".to_string()),
        }
    }

    /// Address the HTTP server binds to.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Address the metrics exporter binds to.
    #[must_use]
    pub fn metrics_address(&self) -> String {
        format!("{}:{}", self.server.metrics_host, self.server.metrics_port)
    }

    /// Per-call store deadline.
    #[must_use]
    pub const fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store.request_timeout_ms)
    }

    /// Graceful shutdown budget.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout)
    }
}

fn parsed<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_config() {
        let config = Config::local();
        assert!(config.database.url.is_none());
        assert_eq!(config.bind_address(), "127.0.0.1:0");
        assert_eq!(config.store_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_unset_variables_use_defaults() {
        assert_eq!(parsed("TALKBOARD_TEST_UNSET_PORT", 8080_u16), 8080);
        assert_eq!(non_empty("TALKBOARD_TEST_UNSET_SECRET"), None);
    }
}
