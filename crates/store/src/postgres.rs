use async_trait::async_trait;
use common::{BookId, Money, Points, Quantity, UserId};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    Book, Result, StoreConfig, StoreError, User,
    store::{BookStore, UserStore},
};

const BOOK: &str = "book";
const USER: &str = "user";

/// Runs the database migrations that create the default `books` and `users` tables.
pub async fn run_migrations(pool: &PgPool) -> std::result::Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await
}

fn to_column(record: &'static str, value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| StoreError::InvalidRecord {
        record,
        reason: format!("value {value} does not fit a BIGINT column"),
    })
}

fn from_column<T: TryFrom<i64>>(record: &'static str, column: &str, value: i64) -> Result<T> {
    T::try_from(value).map_err(|_| StoreError::InvalidRecord {
        record,
        reason: format!("{column} = {value} is out of range"),
    })
}

/// PostgreSQL-backed book store.
#[derive(Clone)]
pub struct PostgresBookStore {
    pool: PgPool,
    table: String,
}

impl PostgresBookStore {
    /// Creates a new book store over the configured table.
    pub fn new(pool: PgPool, config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            pool,
            table: config.book_table.clone(),
        })
    }

    fn row_to_book(row: PgRow) -> Result<Book> {
        Ok(Book {
            book_id: BookId::new(row.try_get::<String, _>("book_id")?),
            price: Money::from_cents(row.try_get("price")?),
            quantity: from_column(BOOK, "quantity", row.try_get("quantity")?)?,
        })
    }

    async fn adjust_quantity(&self, book_id: &BookId, delta: i64) -> Result<Book> {
        // The `quantity + $2 >= 0` guard keeps debits from overdrawing stock.
        let sql = format!(
            "UPDATE {} SET quantity = quantity + $2 \
             WHERE book_id = $1 AND quantity + $2 >= 0 \
             RETURNING book_id, price, quantity",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(book_id.as_str())
            .bind(delta)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Self::row_to_book(row),
            None => Err(StoreError::condition_failed(BOOK, book_id.as_str())),
        }
    }
}

#[async_trait]
impl BookStore for PostgresBookStore {
    async fn get_book(&self, book_id: &BookId) -> Result<Option<Book>> {
        let sql = format!(
            "SELECT book_id, price, quantity FROM {} WHERE book_id = $1",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(book_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_book).transpose()
    }

    async fn put_book(&self, book: Book) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (book_id, price, quantity) VALUES ($1, $2, $3) \
             ON CONFLICT (book_id) DO UPDATE SET price = EXCLUDED.price, quantity = EXCLUDED.quantity",
            self.table
        );
        sqlx::query(&sql)
            .bind(book.book_id.as_str())
            .bind(book.price.cents())
            .bind(i64::from(book.quantity))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(table = %self.table))]
    async fn decrement_quantity(&self, book_id: &BookId, quantity: Quantity) -> Result<Book> {
        self.adjust_quantity(book_id, -i64::from(quantity)).await
    }

    #[tracing::instrument(skip(self), fields(table = %self.table))]
    async fn increment_quantity(&self, book_id: &BookId, quantity: Quantity) -> Result<Book> {
        self.adjust_quantity(book_id, i64::from(quantity)).await
    }
}

/// PostgreSQL-backed user store.
#[derive(Clone)]
pub struct PostgresUserStore {
    pool: PgPool,
    table: String,
}

impl PostgresUserStore {
    /// Creates a new user store over the configured table.
    pub fn new(pool: PgPool, config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            pool,
            table: config.user_table.clone(),
        })
    }

    fn row_to_user(row: PgRow) -> Result<User> {
        Ok(User {
            user_id: UserId::new(row.try_get::<String, _>("user_id")?),
            points: from_column(USER, "points", row.try_get("points")?)?,
            held_points: from_column(USER, "held_points", row.try_get("held_points")?)?,
        })
    }

    async fn exists(&self, user_id: &UserId) -> Result<bool> {
        let sql = format!("SELECT 1 FROM {} WHERE user_id = $1", self.table);
        let row = sqlx::query(&sql)
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Moves `points` out of `held_points`, back into `points` when `restore` is set.
    async fn release_held(&self, user_id: &UserId, points: Points, restore: bool) -> Result<bool> {
        let balance = if restore { "points + $2" } else { "points" };
        let sql = format!(
            "UPDATE {} SET points = {balance}, held_points = held_points - $2 \
             WHERE user_id = $1 AND held_points >= $2",
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(user_id.as_str())
            .bind(to_column(USER, points)?)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        if self.exists(user_id).await? {
            Ok(false)
        } else {
            Err(StoreError::condition_failed(USER, user_id.as_str()))
        }
    }
}

#[async_trait]
impl UserStore for PostgresUserStore {
    async fn get_user(&self, user_id: &UserId) -> Result<Option<User>> {
        let sql = format!(
            "SELECT user_id, points, held_points FROM {} WHERE user_id = $1",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_user).transpose()
    }

    async fn put_user(&self, user: User) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (user_id, points, held_points) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id) DO UPDATE SET points = EXCLUDED.points, held_points = EXCLUDED.held_points",
            self.table
        );
        sqlx::query(&sql)
            .bind(user.user_id.as_str())
            .bind(to_column(USER, user.points)?)
            .bind(to_column(USER, user.held_points)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(table = %self.table))]
    async fn reset_points(&self, user_id: &UserId, expected: Points) -> Result<Option<User>> {
        let sql = format!(
            "UPDATE {} SET held_points = held_points + points, points = 0 \
             WHERE user_id = $1 AND points = $2 \
             RETURNING user_id, points, held_points",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(user_id.as_str())
            .bind(to_column(USER, expected)?)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Self::row_to_user(row).map(Some),
            None if self.exists(user_id).await? => Ok(None),
            None => Err(StoreError::condition_failed(USER, user_id.as_str())),
        }
    }

    #[tracing::instrument(skip(self), fields(table = %self.table))]
    async fn restore_points(&self, user_id: &UserId, points: Points) -> Result<bool> {
        self.release_held(user_id, points, true).await
    }

    #[tracing::instrument(skip(self), fields(table = %self.table))]
    async fn settle_points(&self, user_id: &UserId, points: Points) -> Result<bool> {
        self.release_held(user_id, points, false).await
    }
}
