use thiserror::Error;

/// Errors that can occur when interacting with the record stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional update was rejected.
    ///
    /// Raised when the record does not exist, or when a decrement would
    /// take a counter below zero.
    #[error("Condition check failed for {record} {key}")]
    ConditionFailed { record: &'static str, key: String },

    /// The store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored value is outside the range the domain allows.
    #[error("Invalid {record} record: {reason}")]
    InvalidRecord { record: &'static str, reason: String },

    /// The store configuration is unusable.
    #[error("Invalid store configuration: {0}")]
    InvalidConfig(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub(crate) fn condition_failed(record: &'static str, key: impl Into<String>) -> Self {
        StoreError::ConditionFailed {
            record,
            key: key.into(),
        }
    }

    /// Returns true if this is a rejected conditional update.
    pub fn is_condition_failed(&self) -> bool {
        matches!(self, StoreError::ConditionFailed { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
