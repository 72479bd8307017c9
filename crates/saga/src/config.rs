//! Saga configuration.

use std::time::Duration;

use common::Quantity;

/// Stock that must remain after an order for it to pass the inventory check.
///
/// `1` gives the strict `stored - requested > 0` rule: an order that would
/// exactly exhaust stock is rejected.
pub const DEFAULT_MIN_REMAINING_STOCK: Quantity = 1;

/// Courier identity returned by the placeholder courier seam.
pub const DEFAULT_COURIER: &str = "dispatch@bookstore.local";

/// How long the coordinator waits on a continuation token.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings shared by the step handlers, the worker and the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaConfig {
    pub courier: String,
    pub task_timeout: Duration,
    pub min_remaining_stock: Quantity,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            courier: DEFAULT_COURIER.to_string(),
            task_timeout: DEFAULT_TASK_TIMEOUT,
            min_remaining_stock: DEFAULT_MIN_REMAINING_STOCK,
        }
    }
}
