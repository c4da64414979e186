// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bearer token authorization.
//!
//! `AuthUser` plays the part of the gateway authorizer: any handler that
//! takes it as an argument only runs once the presented token has been
//! verified, and receives the resolved subject.

use crate::error::AppError;
use crate::services::tokens::{Claims, TokenError};
use crate::AppState;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use std::sync::Arc;

/// Authenticated user extracted from a verified bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    /// The token as presented, needed for refresh
    pub token: String,
    pub claims: Claims,
}

/// Pull the token out of `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, TokenError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(TokenError::MissingToken)?;

    let (scheme, token) = value.split_once(' ').ok_or(TokenError::MissingToken)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(TokenError::MissingToken);
    }
    Ok(token)
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?.to_string();
        let verified = state.tokens.verify(&token).await?;

        Ok(AuthUser {
            user_id: verified.user_id,
            token,
            claims: verified.claims,
        })
    }
}
