//! Saga error types.

use common::{BookId, Money, OrderId, Points, Quantity, TaskToken, UserId};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during saga operations.
///
/// Business rejections (`BookNotFound`, `OutOfStock`, `UserNotFound`,
/// `InsufficientTotal`, ...) are kept apart from infrastructure failures
/// (`StoreUnavailable`) so the orchestrator can route each to the right
/// compensation or termination path.
#[derive(Debug, Error)]
pub enum SagaError {
    /// No record exists for the book.
    #[error("Book not found: {0}")]
    BookNotFound(BookId),

    /// Stock does not cover the order under the availability policy.
    #[error("The book {book_id} is out of stock: requested {requested}, in stock {available}")]
    OutOfStock {
        book_id: BookId,
        requested: Quantity,
        available: Quantity,
    },

    /// The store refused a stock debit.
    #[error("Stock debit of {quantity} rejected for book {book_id}")]
    DebitRejected { book_id: BookId, quantity: Quantity },

    /// No record exists for the user.
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// Redemption is only permitted while the balance is below the order total.
    #[error("Order total is less than redeem points: total {total}, points {points}")]
    InsufficientTotal {
        user_id: UserId,
        total: Money,
        points: Points,
    },

    /// The balance kept changing under a redemption.
    #[error("Points balance for user {0} changed during redemption")]
    ConcurrentUpdate(UserId),

    /// The order cannot be priced.
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    /// The courier step could not be completed.
    #[error("No courier available: {0}")]
    NoCourierAvailable(String),

    /// The billing collaborator rejected the charge.
    #[error("Billing failed: {0}")]
    Billing(String),

    /// A record store failed for reasons unrelated to the request.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// A queue message could not be understood.
    #[error("Invalid work item: {0}")]
    InvalidWorkItem(String),

    /// The token is unknown, already resolved, or expired.
    #[error("Unknown or already resolved task token: {0}")]
    InvalidTaskToken(TaskToken),

    /// The suspended step was not resumed in time.
    #[error("Timed out waiting on task token: {0}")]
    TaskTimedOut(TaskToken),

    /// The work queue no longer accepts messages.
    #[error("Work queue is closed")]
    QueueClosed,

    /// A saga for this order already exists.
    #[error("Saga already started for order {0}")]
    AlreadyStarted(OrderId),

    /// A state machine transition was not allowed.
    #[error("Invalid state: expected {expected}, actual {actual}")]
    InvalidState { expected: String, actual: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SagaError {
    /// Stable routing name reported to the orchestrator.
    pub fn error_name(&self) -> &'static str {
        match self {
            SagaError::BookNotFound(_) => "BookNotFound",
            SagaError::OutOfStock { .. } => "BookOutOfStock",
            SagaError::DebitRejected { .. } => "DebitRejected",
            SagaError::UserNotFound(_) => "UserNotFound",
            SagaError::InsufficientTotal { .. } => "InsufficientTotal",
            SagaError::ConcurrentUpdate(_) => "ConcurrentUpdate",
            SagaError::InvalidOrder(_) => "InvalidOrder",
            SagaError::NoCourierAvailable(_) => "NoCourierAvailable",
            SagaError::Billing(_) => "BillingFailed",
            SagaError::StoreUnavailable(_) => "StoreUnavailable",
            SagaError::InvalidWorkItem(_) => "InvalidWorkItem",
            SagaError::InvalidTaskToken(_) => "InvalidTaskToken",
            SagaError::TaskTimedOut(_) => "TaskTimedOut",
            SagaError::QueueClosed => "QueueClosed",
            SagaError::AlreadyStarted(_) => "SagaAlreadyStarted",
            SagaError::InvalidState { .. } => "InvalidState",
            SagaError::Serialization(_) => "SerializationError",
        }
    }

    /// Returns true for rejections decided by business rules rather than infrastructure.
    pub fn is_business(&self) -> bool {
        matches!(
            self,
            SagaError::BookNotFound(_)
                | SagaError::OutOfStock { .. }
                | SagaError::DebitRejected { .. }
                | SagaError::UserNotFound(_)
                | SagaError::InsufficientTotal { .. }
                | SagaError::ConcurrentUpdate(_)
                | SagaError::InvalidOrder(_)
                | SagaError::NoCourierAvailable(_)
                | SagaError::Billing(_)
        )
    }

    /// Returns true when the token can no longer be resolved by anyone.
    ///
    /// Any other resolver error leaves the token open for a retry.
    pub fn is_token_closed(&self) -> bool {
        matches!(
            self,
            SagaError::InvalidTaskToken(_) | SagaError::TaskTimedOut(_)
        )
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_and_unavailable_are_distinct() {
        let missing = SagaError::BookNotFound(BookId::new("b1"));
        let down = SagaError::from(StoreError::Unavailable("timeout".to_string()));

        assert_eq!(missing.error_name(), "BookNotFound");
        assert_eq!(down.error_name(), "StoreUnavailable");
        assert!(missing.is_business());
        assert!(!down.is_business());
    }

    #[test]
    fn test_insufficient_total_message() {
        let err = SagaError::InsufficientTotal {
            user_id: UserId::new("u1"),
            total: Money::from_cents(30),
            points: 50,
        };
        assert_eq!(
            err.to_string(),
            "Order total is less than redeem points: total 30, points 50"
        );
    }
}
