//! Shared identifiers and value types for the bookstore fulfillment saga.

mod money;
mod types;

pub use money::Money;
pub use types::{BookId, OrderId, Points, Quantity, TaskToken, UserId};
