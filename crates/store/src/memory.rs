use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{BookId, Points, Quantity, UserId};
use tokio::sync::RwLock;

use crate::{
    Book, Result, StoreError, User,
    store::{BookStore, UserStore},
};

const BOOK: &str = "book";
const USER: &str = "user";

/// In-memory book store for testing and single-process deployments.
///
/// Provides the same conditional-update semantics as the PostgreSQL
/// implementation. Can be switched into an unavailable mode to simulate
/// infrastructure failures.
#[derive(Clone, Default)]
pub struct InMemoryBookStore {
    books: Arc<RwLock<HashMap<BookId, Book>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryBookStore {
    /// Creates a new empty book store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with the given books.
    pub fn with_books(books: impl IntoIterator<Item = Book>) -> Self {
        let books = books
            .into_iter()
            .map(|book| (book.book_id.clone(), book))
            .collect();
        Self {
            books: Arc::new(RwLock::new(books)),
            unavailable: Arc::default(),
        }
    }

    /// Makes every subsequent call fail with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns the stored quantity for a book, bypassing availability checks.
    pub async fn quantity_of(&self, book_id: &BookId) -> Option<Quantity> {
        self.books.read().await.get(book_id).map(|b| b.quantity)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("book store is unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BookStore for InMemoryBookStore {
    async fn get_book(&self, book_id: &BookId) -> Result<Option<Book>> {
        self.check_available()?;
        Ok(self.books.read().await.get(book_id).cloned())
    }

    async fn put_book(&self, book: Book) -> Result<()> {
        self.check_available()?;
        self.books.write().await.insert(book.book_id.clone(), book);
        Ok(())
    }

    async fn decrement_quantity(&self, book_id: &BookId, quantity: Quantity) -> Result<Book> {
        self.check_available()?;
        let mut books = self.books.write().await;
        let book = books
            .get_mut(book_id)
            .ok_or_else(|| StoreError::condition_failed(BOOK, book_id.as_str()))?;

        book.quantity = book
            .quantity
            .checked_sub(quantity)
            .ok_or_else(|| StoreError::condition_failed(BOOK, book_id.as_str()))?;
        Ok(book.clone())
    }

    async fn increment_quantity(&self, book_id: &BookId, quantity: Quantity) -> Result<Book> {
        self.check_available()?;
        let mut books = self.books.write().await;
        let book = books
            .get_mut(book_id)
            .ok_or_else(|| StoreError::condition_failed(BOOK, book_id.as_str()))?;

        book.quantity =
            book.quantity
                .checked_add(quantity)
                .ok_or_else(|| StoreError::InvalidRecord {
                    record: BOOK,
                    reason: format!("quantity overflow for {book_id}"),
                })?;
        Ok(book.clone())
    }
}

/// In-memory user store for testing and single-process deployments.
#[derive(Clone, Default)]
pub struct InMemoryUserStore {
    users: Arc<RwLock<HashMap<UserId, User>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryUserStore {
    /// Creates a new empty user store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with the given users.
    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let users = users
            .into_iter()
            .map(|user| (user.user_id.clone(), user))
            .collect();
        Self {
            users: Arc::new(RwLock::new(users)),
            unavailable: Arc::default(),
        }
    }

    /// Makes every subsequent call fail with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Removes a user record, simulating a concurrent deletion.
    pub async fn remove_user(&self, user_id: &UserId) -> Option<User> {
        self.users.write().await.remove(user_id)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("user store is unavailable".to_string()));
        }
        Ok(())
    }

    /// Applies a held-points transfer. `restore` returns the points to the balance.
    async fn release_held(&self, user_id: &UserId, points: Points, restore: bool) -> Result<bool> {
        self.check_available()?;
        let mut users = self.users.write().await;
        let user = users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::condition_failed(USER, user_id.as_str()))?;

        if user.held_points < points {
            return Ok(false);
        }
        if restore {
            user.points =
                user.points
                    .checked_add(points)
                    .ok_or_else(|| StoreError::InvalidRecord {
                        record: USER,
                        reason: format!("points overflow for {user_id}"),
                    })?;
        }
        user.held_points -= points;
        Ok(true)
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn get_user(&self, user_id: &UserId) -> Result<Option<User>> {
        self.check_available()?;
        Ok(self.users.read().await.get(user_id).cloned())
    }

    async fn put_user(&self, user: User) -> Result<()> {
        self.check_available()?;
        self.users.write().await.insert(user.user_id.clone(), user);
        Ok(())
    }

    async fn reset_points(&self, user_id: &UserId, expected: Points) -> Result<Option<User>> {
        self.check_available()?;
        let mut users = self.users.write().await;
        let user = users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::condition_failed(USER, user_id.as_str()))?;
        if user.points != expected {
            return Ok(None);
        }

        user.held_points =
            user.held_points
                .checked_add(user.points)
                .ok_or_else(|| StoreError::InvalidRecord {
                    record: USER,
                    reason: format!("held points overflow for {user_id}"),
                })?;
        user.points = 0;
        Ok(Some(user.clone()))
    }

    async fn restore_points(&self, user_id: &UserId, points: Points) -> Result<bool> {
        self.release_held(user_id, points, true).await
    }

    async fn settle_points(&self, user_id: &UserId, points: Points) -> Result<bool> {
        self.release_held(user_id, points, false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Money;

    fn book_store() -> InMemoryBookStore {
        InMemoryBookStore::with_books([Book::new("b1", Money::from_cents(10), 5)])
    }

    #[tokio::test]
    async fn test_get_missing_book_is_none() {
        let store = book_store();
        assert!(store.get_book(&BookId::new("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_decrement_then_increment_round_trips() {
        let store = book_store();
        let id = BookId::new("b1");

        let after_debit = store.decrement_quantity(&id, 3).await.unwrap();
        assert_eq!(after_debit.quantity, 2);

        let after_restore = store.increment_quantity(&id, 3).await.unwrap();
        assert_eq!(after_restore.quantity, 5);
    }

    #[tokio::test]
    async fn test_decrement_never_goes_negative() {
        let store = book_store();
        let id = BookId::new("b1");

        let err = store.decrement_quantity(&id, 6).await.unwrap_err();
        assert!(err.is_condition_failed());
        assert_eq!(store.quantity_of(&id).await, Some(5));
    }

    #[tokio::test]
    async fn test_decrement_missing_book_does_not_create_it() {
        let store = book_store();
        let id = BookId::new("ghost");

        let err = store.decrement_quantity(&id, 1).await.unwrap_err();
        assert!(err.is_condition_failed());
        assert!(store.get_book(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let store = book_store();
        store.set_unavailable(true);

        let err = store.get_book(&BookId::new("b1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));

        store.set_unavailable(false);
        assert!(store.get_book(&BookId::new("b1")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reset_points_holds_redeemed_balance() {
        let store = InMemoryUserStore::with_users([User::new("u1", 20)]);
        let id = UserId::new("u1");

        let user = store.reset_points(&id, 20).await.unwrap().unwrap();
        assert_eq!(user.points, 0);
        assert_eq!(user.held_points, 20);
    }

    #[tokio::test]
    async fn test_reset_points_refuses_a_changed_balance() {
        let store = InMemoryUserStore::with_users([User::new("u1", 20)]);
        let id = UserId::new("u1");
        store.reset_points(&id, 20).await.unwrap().unwrap();

        // A second redemption that also read 20 finds the balance gone.
        assert!(store.reset_points(&id, 20).await.unwrap().is_none());

        let user = store.get_user(&id).await.unwrap().unwrap();
        assert_eq!(user.points, 0);
        assert_eq!(user.held_points, 20);
    }

    #[tokio::test]
    async fn test_reset_points_requires_existing_user() {
        let store = InMemoryUserStore::new();
        let err = store.reset_points(&UserId::new("u1"), 5).await.unwrap_err();
        assert!(err.is_condition_failed());
    }

    #[tokio::test]
    async fn test_restore_points_is_idempotent() {
        let store = InMemoryUserStore::with_users([User::new("u1", 20)]);
        let id = UserId::new("u1");
        store.reset_points(&id, 20).await.unwrap().unwrap();

        assert!(store.restore_points(&id, 20).await.unwrap());
        assert!(!store.restore_points(&id, 20).await.unwrap());

        let user = store.get_user(&id).await.unwrap().unwrap();
        assert_eq!(user.points, 20);
        assert_eq!(user.held_points, 0);
    }

    #[tokio::test]
    async fn test_restore_without_redemption_is_noop() {
        let store = InMemoryUserStore::with_users([User::new("u1", 7)]);
        let id = UserId::new("u1");

        assert!(!store.restore_points(&id, 20).await.unwrap());
        assert_eq!(store.get_user(&id).await.unwrap().unwrap().points, 7);
    }

    #[tokio::test]
    async fn test_settle_releases_hold_without_returning_points() {
        let store = InMemoryUserStore::with_users([User::new("u1", 20)]);
        let id = UserId::new("u1");
        store.reset_points(&id, 20).await.unwrap().unwrap();

        assert!(store.settle_points(&id, 20).await.unwrap());
        // A late compensation after settlement has nothing to restore.
        assert!(!store.restore_points(&id, 20).await.unwrap());

        let user = store.get_user(&id).await.unwrap().unwrap();
        assert_eq!(user.points, 0);
        assert_eq!(user.held_points, 0);
    }
}
