//! Saga step endpoints the orchestrator invokes one at a time.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use saga::BillingConfirmation;
use saga::steps::{
    InventoryRequest, OrderTotal, PointsAdjustment, PointsRequest, PriceRequest, QuantityRestored,
    RedeemRequest, Redemption, bill_customer, calculate_total,
};
use store::Book;

use super::AppState;
use crate::error::ApiError;

/// POST /steps/check-inventory
#[tracing::instrument(skip(state, req), fields(book_id = %req.book_id))]
pub async fn check_inventory(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InventoryRequest>,
) -> Result<Json<Book>, ApiError> {
    let book = state
        .inventory
        .check_inventory(&req.book_id, req.quantity)
        .await?;
    Ok(Json(book))
}

/// POST /steps/calculate-total
pub async fn calculate(Json(req): Json<PriceRequest>) -> Result<Json<OrderTotal>, ApiError> {
    Ok(Json(calculate_total(&req.book, req.quantity)?))
}

/// POST /steps/redeem-points
#[tracing::instrument(skip(state, req), fields(user_id = %req.user_id))]
pub async fn redeem_points(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RedeemRequest>,
) -> Result<Json<Redemption>, ApiError> {
    let redemption = state
        .loyalty
        .redeem_points(&req.user_id, req.total.total)
        .await?;
    Ok(Json(redemption))
}

/// POST /steps/bill-customer
#[tracing::instrument(skip(state, params))]
pub async fn bill(
    State(state): State<Arc<AppState>>,
    Json(params): Json<serde_json::Value>,
) -> Result<Json<BillingConfirmation>, ApiError> {
    let confirmation = bill_customer(state.billing.as_ref(), &params).await?;
    Ok(Json(confirmation))
}

/// POST /steps/restore-redeem-points
#[tracing::instrument(skip(state, req), fields(user_id = %req.user_id))]
pub async fn restore_redeem_points(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PointsRequest>,
) -> Result<Json<PointsAdjustment>, ApiError> {
    let ack = state
        .loyalty
        .restore_redeem_points(&req.user_id, req.points)
        .await?;
    Ok(Json(ack))
}

/// POST /steps/settle-redeemed-points
#[tracing::instrument(skip(state, req), fields(user_id = %req.user_id))]
pub async fn settle_redeemed_points(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PointsRequest>,
) -> Result<Json<PointsAdjustment>, ApiError> {
    let ack = state
        .loyalty
        .settle_redeemed_points(&req.user_id, req.points)
        .await?;
    Ok(Json(ack))
}

/// POST /steps/restore-quantity
#[tracing::instrument(skip(state, req), fields(book_id = %req.book_id))]
pub async fn restore_quantity(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InventoryRequest>,
) -> Result<Json<QuantityRestored>, ApiError> {
    let ack = state
        .inventory
        .restore_quantity(&req.book_id, req.quantity)
        .await?;
    Ok(Json(ack))
}
