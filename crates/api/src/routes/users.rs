//! User record endpoints for seeding and inspecting point balances.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::UserId;
use store::{User, UserStore};

use super::AppState;
use crate::error::ApiError;

/// POST /users: create or replace a user record.
#[tracing::instrument(skip(state, user), fields(user_id = %user.user_id))]
pub async fn put(
    State(state): State<Arc<AppState>>,
    Json(user): Json<User>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    state.loyalty.users().put_user(user.clone()).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /users/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    let user_id = UserId::new(id);
    state
        .loyalty
        .users()
        .get_user(&user_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("User {user_id} not found")))
}
