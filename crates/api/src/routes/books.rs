//! Book record endpoints for seeding and inspecting stock.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::BookId;
use store::{Book, BookStore};

use super::AppState;
use crate::error::ApiError;

/// POST /books: create or replace a book record.
#[tracing::instrument(skip(state, book), fields(book_id = %book.book_id))]
pub async fn put(
    State(state): State<Arc<AppState>>,
    Json(book): Json<Book>,
) -> Result<(StatusCode, Json<Book>), ApiError> {
    if book.price.is_negative() {
        return Err(ApiError::BadRequest(format!(
            "price must be non-negative, got {}",
            book.price
        )));
    }
    state.inventory.books().put_book(book.clone()).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

/// GET /books/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Book>, ApiError> {
    let book_id = BookId::new(id);
    state
        .inventory
        .books()
        .get_book(&book_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Book {book_id} not found")))
}
