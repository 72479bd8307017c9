//! Order execution and saga status endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::OrderId;
use saga::{OrderRequest, SagaInstance};

use super::AppState;
use crate::error::ApiError;

/// POST /orders: run the order through the saga and return the result.
///
/// A saga that fails and compensates is still a `201`; its `state` is `Failed`.
#[tracing::instrument(skip(state, req), fields(book_id = %req.book_id, user_id = %req.user_id))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OrderRequest>,
) -> Result<(StatusCode, Json<SagaInstance>), ApiError> {
    if req.quantity == 0 {
        return Err(ApiError::BadRequest("quantity must be positive".to_string()));
    }
    let saga = state.coordinator.execute_saga(req).await?;
    Ok((StatusCode::CREATED, Json(saga)))
}

/// GET /sagas/{id}: the saga recorded for an order.
#[tracing::instrument(skip(state))]
pub async fn saga_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SagaInstance>, ApiError> {
    let order_id = parse_order_id(&id)?;
    state
        .coordinator
        .get_saga(order_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No saga for order {id}")))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    uuid::Uuid::parse_str(id)
        .map(OrderId::from_uuid)
        .map_err(|e| ApiError::BadRequest(format!("Invalid order ID: {e}")))
}
