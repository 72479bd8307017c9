//! Store configuration.

use crate::{Result, StoreError};

/// Table names the stores read and write.
///
/// Passed to each store at construction; nothing in this crate keeps
/// process-wide table state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub book_table: String,
    pub user_table: String,
}

impl StoreConfig {
    /// Creates a configuration with custom table names.
    pub fn new(book_table: impl Into<String>, user_table: impl Into<String>) -> Self {
        Self {
            book_table: book_table.into(),
            user_table: user_table.into(),
        }
    }

    /// Checks that both table names are plain SQL identifiers.
    ///
    /// Table names are interpolated into statements, so only
    /// `[A-Za-z_][A-Za-z0-9_]*` is accepted.
    pub fn validate(&self) -> Result<()> {
        for table in [&self.book_table, &self.user_table] {
            if !is_identifier(table) {
                return Err(StoreError::InvalidConfig(format!(
                    "table name {table:?} is not a valid identifier"
                )));
            }
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            book_table: "books".to_string(),
            user_table: "users".to_string(),
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
