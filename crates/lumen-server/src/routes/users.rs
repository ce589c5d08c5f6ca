//! User provisioning routes.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use lumen_duckdb::user::{create_user, delete_user, get_user, list_users, NewUser};
use lumen_duckdb::StoreError;

use crate::auth::password::{hash_password, validate_password_strength};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub id: Option<String>,
    pub username: String,
    pub password: String,
    pub role: Option<String>,
}

/// `POST /api/users`. Duplicate usernames are a 409, not a silent upsert.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateUser>,
) -> Result<impl IntoResponse, AppError> {
    if body.username.trim().is_empty() {
        return Err(AppError::BadRequest("username is required".into()));
    }
    validate_password_strength(&body.password)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let password_hash = hash_password(&body.password)?;

    let user = create_user(
        &state.db,
        NewUser {
            id: body.id,
            username: body.username,
            password_hash,
            role: body.role.unwrap_or_else(|| "user".to_string()),
        },
    )
    .await
    .map_err(|e| match e {
        StoreError::UniqueViolation(_) => {
            AppError::Conflict("username already exists".into())
        }
        other => AppError::Internal(other.into()),
    })?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn list(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(list_users(&state.db).await?))
}

/// `GET /api/users/{id}` — an unknown or deleted user is an explicit 404.
pub async fn show(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = get_user(&state.db, &id, false, false)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user not found: {id}")))?;
    Ok(Json(user))
}

/// `DELETE /api/users/{id}` — cascades over owned websites and their data.
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let soft = state.config.deploy_mode.soft_delete();
    let removed = delete_user(&state.db, &state.cache, &id, soft).await?;
    if !removed {
        return Err(AppError::NotFound(format!("user not found: {id}")));
    }
    Ok(StatusCode::NO_CONTENT)
}
