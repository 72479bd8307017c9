//! Inventory check, stock debit, and the restore-quantity compensation.

use common::{BookId, Quantity};
use serde::{Deserialize, Serialize};
use store::{Book, BookStore, StoreError};

use crate::config::SagaConfig;
use crate::error::SagaError;

/// A book and a number of copies; input to check, debit and restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRequest {
    pub book_id: BookId,
    pub quantity: Quantity,
}

/// Confirmation returned by the restore-quantity compensation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantityRestored {
    pub book_id: BookId,
    pub restored: Quantity,
    pub quantity: Quantity,
    pub message: String,
}

/// Returns true if `quantity` copies can be ordered leaving at least
/// `min_remaining` in stock.
pub fn is_book_available(book: &Book, quantity: Quantity, min_remaining: Quantity) -> bool {
    book.quantity
        .checked_sub(quantity)
        .is_some_and(|left| left >= min_remaining)
}

/// Step handlers backed by the inventory store.
#[derive(Clone)]
pub struct InventorySteps<B> {
    books: B,
    min_remaining_stock: Quantity,
}

impl<B: BookStore> InventorySteps<B> {
    /// Creates the inventory handlers.
    pub fn new(books: B, config: &SagaConfig) -> Self {
        Self {
            books,
            min_remaining_stock: config.min_remaining_stock,
        }
    }

    /// Returns the underlying store.
    pub fn books(&self) -> &B {
        &self.books
    }

    /// Looks up the book and checks the order against current stock.
    ///
    /// Read-only: nothing is reserved, the debit happens later in the
    /// fulfillment worker.
    #[tracing::instrument(skip(self), fields(%book_id))]
    pub async fn check_inventory(
        &self,
        book_id: &BookId,
        quantity: Quantity,
    ) -> Result<Book, SagaError> {
        let book = self
            .books
            .get_book(book_id)
            .await?
            .ok_or_else(|| SagaError::BookNotFound(book_id.clone()))?;

        if !is_book_available(&book, quantity, self.min_remaining_stock) {
            tracing::info!(requested = quantity, in_stock = book.quantity, "book out of stock");
            return Err(SagaError::OutOfStock {
                book_id: book_id.clone(),
                requested: quantity,
                available: book.quantity,
            });
        }

        Ok(book)
    }

    /// Debits stock once an order is confirmed.
    ///
    /// No availability rule is applied here; the store only refuses to go
    /// below zero or to touch a missing record.
    #[tracing::instrument(skip(self), fields(%book_id))]
    pub async fn debit_quantity(
        &self,
        book_id: &BookId,
        quantity: Quantity,
    ) -> Result<Book, SagaError> {
        match self.books.decrement_quantity(book_id, quantity).await {
            Ok(book) => {
                tracing::info!(remaining = book.quantity, "stock debited");
                Ok(book)
            }
            Err(StoreError::ConditionFailed { .. }) => Err(SagaError::DebitRejected {
                book_id: book_id.clone(),
                quantity,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Compensation for [`Self::debit_quantity`]: adds the copies back.
    ///
    /// Not deduplicated; the orchestrator invokes it at most once per
    /// failed fulfillment.
    #[tracing::instrument(skip(self), fields(%book_id))]
    pub async fn restore_quantity(
        &self,
        book_id: &BookId,
        quantity: Quantity,
    ) -> Result<QuantityRestored, SagaError> {
        match self.books.increment_quantity(book_id, quantity).await {
            Ok(book) => {
                tracing::info!(stock = book.quantity, "quantity restored");
                Ok(QuantityRestored {
                    book_id: book.book_id,
                    restored: quantity,
                    quantity: book.quantity,
                    message: "Quantity restored".to_string(),
                })
            }
            Err(StoreError::ConditionFailed { .. }) => Err(SagaError::BookNotFound(book_id.clone())),
            Err(e) => Err(e.into()),
        }
    }
}
