//! Records held by the inventory and loyalty stores.

use common::{BookId, Money, Points, Quantity, UserId};
use serde::{Deserialize, Serialize};

/// A book and its current stock level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub book_id: BookId,
    pub price: Money,
    pub quantity: Quantity,
}

impl Book {
    /// Creates a book record.
    pub fn new(book_id: impl Into<BookId>, price: Money, quantity: Quantity) -> Self {
        Self {
            book_id: book_id.into(),
            price,
            quantity,
        }
    }
}

/// A customer's loyalty balance.
///
/// `held_points` are points taken from the balance by a redemption whose
/// saga has not yet completed. They are returned by a restore or released
/// by a settle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: UserId,
    pub points: Points,
    #[serde(default)]
    pub held_points: Points,
}

impl User {
    /// Creates a user record with no held points.
    pub fn new(user_id: impl Into<UserId>, points: Points) -> Self {
        Self {
            user_id: user_id.into(),
            points,
            held_points: 0,
        }
    }
}
