use std::sync::Arc;

use async_trait::async_trait;
use common::{BookId, Points, Quantity, UserId};

use crate::{Book, Result, User};

/// Key-value record of book stock levels.
///
/// All mutations are single-record updates. Implementations must be
/// thread-safe (Send + Sync).
#[async_trait]
pub trait BookStore: Send + Sync {
    /// Looks up a book. Returns `Ok(None)` only when no record exists.
    async fn get_book(&self, book_id: &BookId) -> Result<Option<Book>>;

    /// Creates or replaces a book record.
    async fn put_book(&self, book: Book) -> Result<()>;

    /// Decrements the stored quantity and returns the updated record.
    ///
    /// Fails with `ConditionFailed` if the book does not exist or the
    /// stock would drop below zero.
    async fn decrement_quantity(&self, book_id: &BookId, quantity: Quantity) -> Result<Book>;

    /// Increments the stored quantity and returns the updated record.
    ///
    /// Fails with `ConditionFailed` if the book does not exist.
    async fn increment_quantity(&self, book_id: &BookId, quantity: Quantity) -> Result<Book>;
}

/// Key-value record of user loyalty balances.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Looks up a user. Returns `Ok(None)` only when no record exists.
    async fn get_user(&self, user_id: &UserId) -> Result<Option<User>>;

    /// Creates or replaces a user record.
    async fn put_user(&self, user: User) -> Result<()>;

    /// Moves the whole balance into `held_points` and zeroes `points`, in one
    /// update guarded on the balance still being `expected`.
    ///
    /// Returns `Ok(None)` without changing anything if the balance is no
    /// longer `expected`. Fails with `ConditionFailed` if the user does not
    /// exist.
    async fn reset_points(&self, user_id: &UserId, expected: Points) -> Result<Option<User>>;

    /// Moves `points` from `held_points` back to `points`.
    ///
    /// Returns `Ok(false)` without changing anything if fewer than `points`
    /// are held. Fails with `ConditionFailed` if the user does not exist.
    async fn restore_points(&self, user_id: &UserId, points: Points) -> Result<bool>;

    /// Releases `points` from `held_points` once a redemption is final.
    ///
    /// Returns `Ok(false)` without changing anything if fewer than `points`
    /// are held. Fails with `ConditionFailed` if the user does not exist.
    async fn settle_points(&self, user_id: &UserId, points: Points) -> Result<bool>;
}

#[async_trait]
impl<T: BookStore + ?Sized> BookStore for Arc<T> {
    async fn get_book(&self, book_id: &BookId) -> Result<Option<Book>> {
        (**self).get_book(book_id).await
    }

    async fn put_book(&self, book: Book) -> Result<()> {
        (**self).put_book(book).await
    }

    async fn decrement_quantity(&self, book_id: &BookId, quantity: Quantity) -> Result<Book> {
        (**self).decrement_quantity(book_id, quantity).await
    }

    async fn increment_quantity(&self, book_id: &BookId, quantity: Quantity) -> Result<Book> {
        (**self).increment_quantity(book_id, quantity).await
    }
}

#[async_trait]
impl<T: UserStore + ?Sized> UserStore for Arc<T> {
    async fn get_user(&self, user_id: &UserId) -> Result<Option<User>> {
        (**self).get_user(user_id).await
    }

    async fn put_user(&self, user: User) -> Result<()> {
        (**self).put_user(user).await
    }

    async fn reset_points(&self, user_id: &UserId, expected: Points) -> Result<Option<User>> {
        (**self).reset_points(user_id, expected).await
    }

    async fn restore_points(&self, user_id: &UserId, points: Points) -> Result<bool> {
        (**self).restore_points(user_id, points).await
    }

    async fn settle_points(&self, user_id: &UserId, points: Points) -> Result<bool> {
        (**self).settle_points(user_id, points).await
    }
}
