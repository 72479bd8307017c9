//! Price calculation.

use common::{Money, Quantity};
use serde::{Deserialize, Serialize};
use store::Book;

use crate::error::SagaError;

/// Running amount owed, threaded between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotal {
    pub total: Money,
}

/// Input to [`calculate_total`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRequest {
    pub book: Book,
    pub quantity: Quantity,
}

/// Computes `book.price * quantity`.
///
/// Fails with `InvalidOrder` for a negative price or a total that does not
/// fit in the money range.
pub fn calculate_total(book: &Book, quantity: Quantity) -> Result<OrderTotal, SagaError> {
    if book.price.is_negative() {
        return Err(SagaError::InvalidOrder(format!(
            "price of book {} is negative: {}",
            book.book_id, book.price
        )));
    }
    let total = book.price.checked_times(quantity).ok_or_else(|| {
        SagaError::InvalidOrder(format!(
            "total for {quantity} x book {} at {} overflows",
            book.book_id, book.price
        ))
    })?;
    Ok(OrderTotal { total })
}
