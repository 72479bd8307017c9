//! Inventory and loyalty record stores.
//!
//! Both stores are plain key-value records with single-record conditional
//! updates. Saga-level consistency across them is achieved through
//! compensation, never through multi-record transactions.

pub mod config;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use memory::{InMemoryBookStore, InMemoryUserStore};
pub use postgres::{PostgresBookStore, PostgresUserStore, run_migrations};
pub use record::{Book, User};
pub use store::{BookStore, UserStore};
