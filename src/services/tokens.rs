// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bearer token issuance and verification.
//!
//! Each user has at most one live token: the one recorded in
//! `User::last_token`. Issuing a new token (login, refresh) replaces it,
//! and a password change clears it, so older tokens stop verifying even
//! though their signature and expiry are still fine.

use crate::error::Result;
use crate::services::users::UserRepository;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Why a presented token was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Token signature is invalid or the token is malformed")]
    InvalidSignature,
    #[error("Token has expired")]
    Expired,
    #[error("Token is no longer the current token for its subject")]
    StaleToken,
    #[error("No bearer token presented")]
    MissingToken,
}

impl TokenError {
    /// Stable machine-readable code for error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            TokenError::InvalidSignature => "invalid_token",
            TokenError::Expired => "token_expired",
            TokenError::StaleToken => "stale_token",
            TokenError::MissingToken => "missing_token",
        }
    }
}

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Unique token id; keeps two tokens issued in the same second distinct
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: usize,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
}

/// A token that passed every check.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub user_id: String,
    pub claims: Claims,
}

#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_seconds: i64,
    users: UserRepository,
}

impl TokenService {
    pub fn new(signing_key: &[u8], ttl_seconds: i64, users: UserRepository) -> Self {
        Self {
            encoding: EncodingKey::from_secret(signing_key),
            decoding: DecodingKey::from_secret(signing_key),
            ttl_seconds,
            users,
        }
    }

    /// Sign a new token for `user_id` and record it as the user's last token.
    pub async fn issue(&self, user_id: &str) -> Result<String> {
        let token = self.sign(user_id)?;
        self.users.set_last_token(user_id, Some(&token)).await?;
        tracing::debug!(user_id, "Token issued");
        Ok(token)
    }

    /// Check signature, expiry, and that `token` is still the subject's
    /// current token.
    pub async fn verify(&self, token: &str) -> Result<VerifiedToken> {
        let validation = Validation::new(Algorithm::HS256);
        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::InvalidSignature,
            })?
            .claims;

        let current = match self.users.find_by_id(&claims.sub).await? {
            Some(user) if !user.is_deleted() => user.last_token,
            _ => None,
        };
        let is_current = current
            .map(|current| bool::from(current.as_bytes().ct_eq(token.as_bytes())))
            .unwrap_or(false);
        if !is_current {
            tracing::debug!(user_id = %claims.sub, "Stale token presented");
            return Err(TokenError::StaleToken.into());
        }

        Ok(VerifiedToken {
            user_id: claims.sub.clone(),
            claims,
        })
    }

    /// Exchange `presented`, already verified for `user_id`, for a new
    /// token. The swap only happens if `presented` is still the token on
    /// record, so of two concurrent refreshes at most one succeeds.
    pub async fn refresh(&self, user_id: &str, presented: &str) -> Result<String> {
        let token = self.sign(user_id)?;
        self.users
            .rotate_last_token(user_id, presented, &token)
            .await?;
        tracing::debug!(user_id, "Token rotated");
        Ok(token)
    }

    fn sign(&self, user_id: &str) -> anyhow::Result<String> {
        let now = chrono::Utc::now().timestamp();
        let exp = now
            .checked_add(self.ttl_seconds)
            .ok_or_else(|| anyhow::anyhow!("token lifetime {}s overflows", self.ttl_seconds))?;
        let claims = Claims {
            sub: user_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now as usize,
            exp: exp as usize,
        };

        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{InMemoryUserStore, UserEdit, UserStore};
    use crate::error::AppError;
    use crate::models::{NewUser, User, UserChanges};
    use crate::services::password::verify_password;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::{Notify, Semaphore};

    const KEY: &[u8] = b"123Abc123_test_signing_key_bytes";

    async fn setup() -> (TokenService, UserRepository, String) {
        let users = UserRepository::new(Arc::new(InMemoryUserStore::new()));
        let user = users
            .create(NewUser {
                first_name: "John".to_string(),
                last_name: "Doe".to_string(),
                email: "john@doe.com".to_string(),
                password: "abc1234rfd".to_string(),
            })
            .await
            .unwrap();
        (TokenService::new(KEY, 3600, users.clone()), users, user.id)
    }

    fn token_error(result: Result<VerifiedToken>) -> TokenError {
        match result {
            Err(AppError::Token(err)) => err,
            other => panic!("expected token error, got {:?}", other.map(|v| v.user_id)),
        }
    }

    #[tokio::test]
    async fn issued_token_verifies_and_is_recorded() {
        let (tokens, users, user_id) = setup().await;
        let token = tokens.issue(&user_id).await.unwrap();

        let verified = tokens.verify(&token).await.unwrap();
        assert_eq!(verified.user_id, user_id);
        assert!(verified.claims.exp > verified.claims.iat);

        let stored = users.find_by_id(&user_id).await.unwrap().unwrap();
        assert_eq!(stored.last_token.as_deref(), Some(token.as_str()));
    }

    #[tokio::test]
    async fn reissue_makes_previous_token_stale() {
        let (tokens, _, user_id) = setup().await;
        let first = tokens.issue(&user_id).await.unwrap();
        let second = tokens.issue(&user_id).await.unwrap();
        assert_ne!(first, second);

        assert_eq!(token_error(tokens.verify(&first).await), TokenError::StaleToken);
        assert!(tokens.verify(&second).await.is_ok());
    }

    #[tokio::test]
    async fn refresh_rotates_token() {
        let (tokens, _, user_id) = setup().await;
        let old = tokens.issue(&user_id).await.unwrap();

        let new = tokens.refresh(&user_id, &old).await.unwrap();
        assert_eq!(token_error(tokens.verify(&old).await), TokenError::StaleToken);
        assert_eq!(tokens.verify(&new).await.unwrap().user_id, user_id);

        // A stale token cannot be refreshed either.
        assert!(matches!(
            tokens.refresh(&user_id, &old).await,
            Err(AppError::Token(TokenError::StaleToken))
        ));
        assert!(tokens.verify(&new).await.is_ok());
    }

    #[tokio::test]
    async fn refresh_of_deleted_subject_is_not_found() {
        let (tokens, users, user_id) = setup().await;
        let token = tokens.issue(&user_id).await.unwrap();
        users.soft_delete(&user_id).await.unwrap();

        assert!(matches!(
            tokens.refresh(&user_id, &token).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn overflowing_lifetime_is_an_error() {
        let (_, users, user_id) = setup().await;
        let tokens = TokenService::new(KEY, i64::MAX, users.clone());

        assert!(matches!(
            tokens.issue(&user_id).await,
            Err(AppError::Internal(_))
        ));
        let stored = users.find_by_id(&user_id).await.unwrap().unwrap();
        assert!(stored.last_token.is_none());
    }

    #[tokio::test]
    async fn password_change_invalidates_token() {
        let (tokens, users, user_id) = setup().await;
        let token = tokens.issue(&user_id).await.unwrap();

        users
            .update(
                &user_id,
                UserChanges {
                    password: Some("123abcd432".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(token_error(tokens.verify(&token).await), TokenError::StaleToken);
    }

    #[tokio::test]
    async fn soft_deleted_subject_is_stale() {
        let (tokens, users, user_id) = setup().await;
        let token = tokens.issue(&user_id).await.unwrap();
        users.soft_delete(&user_id).await.unwrap();

        assert_eq!(token_error(tokens.verify(&token).await), TokenError::StaleToken);
    }

    #[tokio::test]
    async fn wrong_key_is_invalid_signature() {
        let (tokens, users, user_id) = setup().await;
        let forger = TokenService::new(b"some_other_key_entirely_32bytes!", 3600, users);
        let forged = forger.sign(&user_id).unwrap();

        assert_eq!(
            token_error(tokens.verify(&forged).await),
            TokenError::InvalidSignature
        );
        assert_eq!(
            token_error(tokens.verify("not.a.jwt").await),
            TokenError::InvalidSignature
        );
    }

    #[tokio::test]
    async fn expired_token_is_reported_as_expired() {
        let (tokens, _, user_id) = setup().await;
        let now = chrono::Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: user_id,
            jti: Uuid::new_v4().to_string(),
            iat: now - 7200,
            exp: now - 3600,
        };
        let expired = encode(&Header::new(Algorithm::HS256), &claims, &tokens.encoding).unwrap();

        assert_eq!(token_error(tokens.verify(&expired).await), TokenError::Expired);
    }

    #[tokio::test]
    async fn token_for_unknown_subject_is_stale() {
        let (tokens, _, _) = setup().await;
        let orphan = tokens.sign("no-such-user").unwrap();
        assert_eq!(token_error(tokens.verify(&orphan).await), TokenError::StaleToken);
    }

    /// Store whose next `modify_user` waits at a gate until released.
    struct GatedStore {
        inner: InMemoryUserStore,
        armed: AtomicBool,
        entered: Notify,
        release: Semaphore,
        reads: AtomicUsize,
    }

    impl GatedStore {
        fn new() -> Self {
            Self {
                inner: InMemoryUserStore::new(),
                armed: AtomicBool::new(false),
                entered: Notify::new(),
                release: Semaphore::new(0),
                reads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl UserStore for GatedStore {
        async fn get_user(&self, id: &str) -> Result<Option<User>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get_user(id).await
        }

        async fn put_user(&self, user: &User) -> Result<()> {
            self.inner.put_user(user).await
        }

        async fn modify_user(&self, id: &str, edit: UserEdit<'_>) -> Result<Option<User>> {
            if self.armed.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.acquire().await.unwrap().forget();
            }
            self.inner.modify_user(id, edit).await
        }

        async fn find_users_by_email(&self, email: &str) -> Result<Vec<User>> {
            self.inner.find_users_by_email(email).await
        }
    }

    /// Start `issue` for a fresh user and hold its token write at the gate.
    async fn gated_issue() -> (
        Arc<GatedStore>,
        UserRepository,
        String,
        tokio::task::JoinHandle<Result<String>>,
    ) {
        let store = Arc::new(GatedStore::new());
        let users = UserRepository::new(store.clone());
        let user = users
            .create(NewUser {
                first_name: "John".to_string(),
                last_name: "Doe".to_string(),
                email: "john@doe.com".to_string(),
                password: "abc1234rfd".to_string(),
            })
            .await
            .unwrap();
        let tokens = TokenService::new(KEY, 3600, users.clone());

        store.armed.store(true, Ordering::SeqCst);
        let user_id = user.id.clone();
        let issue = tokio::spawn(async move { tokens.issue(&user_id).await });
        store.entered.notified().await;

        (store, users, user.id, issue)
    }

    #[tokio::test]
    async fn token_write_cannot_undo_concurrent_soft_delete() {
        let (store, users, user_id, issue) = gated_issue().await;

        users.soft_delete(&user_id).await.unwrap();
        store.release.add_permits(1);

        assert!(matches!(issue.await.unwrap(), Err(AppError::NotFound(_))));
        let stored = users.find_by_id(&user_id).await.unwrap().unwrap();
        assert!(stored.is_deleted());
        assert!(stored.last_token.is_none());
        assert!(users.find_by_email("john@doe.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn token_write_cannot_undo_concurrent_password_change() {
        let (store, users, user_id, issue) = gated_issue().await;

        users
            .update(
                &user_id,
                UserChanges {
                    password: Some("123abcd432".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store.release.add_permits(1);

        let token = issue.await.unwrap().unwrap();
        let stored = users.find_by_id(&user_id).await.unwrap().unwrap();
        assert!(verify_password("123abcd432", &stored.password_hash).unwrap());
        assert!(!verify_password("abc1234rfd", &stored.password_hash).unwrap());
        assert_eq!(stored.last_token.as_deref(), Some(token.as_str()));
    }

    #[tokio::test]
    async fn refresh_swaps_without_a_second_lookup() {
        let store = Arc::new(GatedStore::new());
        let users = UserRepository::new(store.clone());
        let user = users
            .create(NewUser {
                first_name: "John".to_string(),
                last_name: "Doe".to_string(),
                email: "john@doe.com".to_string(),
                password: "abc1234rfd".to_string(),
            })
            .await
            .unwrap();
        let tokens = TokenService::new(KEY, 3600, users.clone());
        let old = tokens.issue(&user.id).await.unwrap();

        let reads_before = store.reads.load(Ordering::SeqCst);
        let new = tokens.refresh(&user.id, &old).await.unwrap();
        assert_eq!(store.reads.load(Ordering::SeqCst), reads_before);

        let stored = users.find_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(stored.last_token.as_deref(), Some(new.as_str()));
    }
}
