// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! `/user` routes: registration, login, profile, deletion and token refresh.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{LoginRequest, NewUser, PublicUser, RegisterRequest, UpdateRequest, UserChanges};
use crate::routes::body::JsonBody;
use crate::services::password::verify_password;
use crate::validation::validate;
use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/user/register", post(register))
        .route(
            "/user",
            post(login).get(get_user).put(update_user).delete(delete_user),
        )
        .route("/user/refreshtoken", post(refresh_token))
}

/// Every success body is wrapped in `{"data": ...}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

impl<T> ApiResponse<T> {
    fn json(data: T) -> Json<Self> {
        Json(Self { data })
    }
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RegisteredUser {
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct DeletedResponse {
    pub deleted_at: String,
}

// ─── Public ──────────────────────────────────────────────────

/// `POST /user/register`
async fn register(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RegisteredUser>>)> {
    let payload = validate(payload)?;

    let user = state
        .users
        .create(NewUser {
            first_name: payload.first_name.unwrap_or_default(),
            last_name: payload.last_name.unwrap_or_default(),
            email: payload.email.unwrap_or_default(),
            password: payload.password.unwrap_or_default(),
        })
        .await?;

    tracing::info!(user_id = %user.id, "User registered");
    Ok((
        StatusCode::CREATED,
        ApiResponse::json(RegisteredUser { user: user.into() }),
    ))
}

/// `POST /user` - exchange email and password for a bearer token.
///
/// Unknown email, soft-deleted account and wrong password all answer 404.
async fn login(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Json<ApiResponse<TokenResponse>>> {
    let payload = validate(payload)?;
    let email = payload.email.unwrap_or_default();
    let password = payload.password.unwrap_or_default();

    let not_found = || AppError::NotFound("User was not found".to_string());

    let Some(user) = state.users.find_by_email(&email).await? else {
        tracing::info!("Login for unknown email");
        return Err(not_found());
    };

    if !verify_password(&password, &user.password_hash)? {
        tracing::info!(user_id = %user.id, "Login with wrong password");
        return Err(not_found());
    }

    let token = state.tokens.issue(&user.id).await?;
    tracing::info!(user_id = %user.id, "User logged in");
    Ok(ApiResponse::json(TokenResponse { token }))
}

// ─── Bearer token required ───────────────────────────────────

/// `GET /user`
async fn get_user(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<PublicUser>>> {
    let user = state
        .users
        .find_by_id(&auth.user_id)
        .await?
        .filter(|user| !user.is_deleted())
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", auth.user_id)))?;

    Ok(ApiResponse::json(user.into()))
}

/// `PUT /user`
async fn update_user(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    JsonBody(payload): JsonBody<UpdateRequest>,
) -> Result<Json<ApiResponse<PublicUser>>> {
    let payload = validate(payload)?;

    let user = state
        .users
        .update(
            &auth.user_id,
            UserChanges {
                first_name: payload.first_name,
                last_name: payload.last_name,
                email: payload.email,
                password: payload.password,
            },
        )
        .await?;

    Ok(ApiResponse::json(user.into()))
}

/// `DELETE /user` - soft delete; the record is kept with `deletedAt` set.
async fn delete_user(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<DeletedResponse>>> {
    tracing::info!(user_id = %auth.user_id, "User-initiated account deletion");

    let user = state.users.soft_delete(&auth.user_id).await?;
    let deleted_at = user
        .deleted_at
        .ok_or_else(|| anyhow::anyhow!("soft delete returned a record without deletedAt"))?;

    Ok(ApiResponse::json(DeletedResponse { deleted_at }))
}

/// `POST /user/refreshtoken`
async fn refresh_token(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<TokenResponse>>> {
    let token = state.tokens.refresh(&auth.user_id, &auth.token).await?;
    tracing::info!(user_id = %auth.user_id, "Token refreshed");
    Ok(ApiResponse::json(TokenResponse { token }))
}
