use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    auth::extractors::AuthUser,
    error::ApiError,
    state::AppState,
    users::{
        dto::{CreateUserRequest, PatchUserRequest, UpdateUserRequest, UserResponse},
        service,
    },
};

pub fn create_routes() -> Router<AppState> {
    Router::new().route("/user", post(create_user))
}

pub fn account_routes() -> Router<AppState> {
    Router::new().route(
        "/user/:id",
        get(get_user)
            .put(put_user)
            .patch(patch_user)
            .delete(delete_user),
    )
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(mut payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if !service::is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::Invalid("invalid email".into()));
    }
    if payload.password.len() < 8 {
        warn!("password too short");
        return Err(ApiError::Invalid("password too short".into()));
    }

    let user = service::create_user(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = service::get_user(&state.db, caller, id).await?;
    Ok(Json(user))
}

#[instrument(skip(state, payload))]
pub async fn put_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<Uuid>,
    Json(mut payload): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if !service::is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::Invalid("invalid email".into()));
    }
    if payload.password.len() < 8 {
        warn!("password too short");
        return Err(ApiError::Invalid("password too short".into()));
    }

    let user = service::update_user(&state.db, caller, id, payload).await?;
    Ok(Json(user))
}

#[instrument(skip(state, payload))]
pub async fn patch_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<Uuid>,
    Json(mut payload): Json<PatchUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    if let Some(email) = payload.email.as_mut() {
        *email = email.trim().to_lowercase();
        if !service::is_valid_email(email) {
            warn!(email = %email, "invalid email");
            return Err(ApiError::Invalid("invalid email".into()));
        }
    }
    if let Some(password) = &payload.password {
        if password.len() < 8 {
            warn!("password too short");
            return Err(ApiError::Invalid("password too short".into()));
        }
    }

    let user = service::patch_user(&state.db, caller, id, payload).await?;
    Ok(Json(user))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    service::delete_user(&state.db, caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
