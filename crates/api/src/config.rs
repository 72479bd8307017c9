//! Application configuration loaded from environment variables.

use std::time::Duration;

use saga::SagaConfig;
use saga::config::{DEFAULT_COURIER, DEFAULT_TASK_TIMEOUT};
use store::StoreConfig;

const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: Postgres URL; in-memory stores when unset
/// - `BOOK_TABLE`, `USER_TABLE`: table names (default: `books`, `users`)
/// - `COURIER_ID`: courier identity the worker assigns
/// - `TASK_TIMEOUT_SECS`: how long an order waits on its courier (default: `30`)
/// - `QUEUE_CAPACITY`: work queue bound (default: `256`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub book_table: String,
    pub user_table: String,
    pub courier: String,
    pub task_timeout: Duration,
    pub queue_capacity: usize,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from any key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            book_table: lookup("BOOK_TABLE").unwrap_or(defaults.book_table),
            user_table: lookup("USER_TABLE").unwrap_or(defaults.user_table),
            courier: lookup("COURIER_ID").unwrap_or(defaults.courier),
            task_timeout: lookup("TASK_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.task_timeout),
            queue_capacity: lookup("QUEUE_CAPACITY")
                .and_then(|c| c.parse().ok())
                .filter(|c| *c > 0)
                .unwrap_or(defaults.queue_capacity),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new(self.book_table.clone(), self.user_table.clone())
    }

    pub fn saga_config(&self) -> SagaConfig {
        SagaConfig {
            courier: self.courier.clone(),
            task_timeout: self.task_timeout,
            ..SagaConfig::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let store = StoreConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            book_table: store.book_table,
            user_table: store.user_table,
            courier: DEFAULT_COURIER.to_string(),
            task_timeout: DEFAULT_TASK_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}
