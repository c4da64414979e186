// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User repository: lifecycle rules on top of a `UserStore`.
//!
//! Edits to an existing record go through `UserStore::modify_user`, which
//! is atomic per document, so a token rotation can never undo a
//! concurrent soft delete or password change. The email uniqueness check
//! is still a separate read: two concurrent registrations for the same
//! email can both pass it.

use crate::db::{UserEdit, UserStore};
use crate::error::{AppError, Result};
use crate::models::{AccessLevel, NewUser, User, UserChanges};
use crate::services::password::hash_password;
use crate::services::tokens::TokenError;
use crate::time_utils::now_rfc3339;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Canonical form used for storage and lookups.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Cheap to clone; all clones share the same store.
#[derive(Clone)]
pub struct UserRepository {
    store: Arc<dyn UserStore>,
}

impl UserRepository {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Find the active (not soft-deleted) user with this email.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = normalize_email(email);
        let mut active: Vec<User> = self
            .store
            .find_users_by_email(&email)
            .await?
            .into_iter()
            .filter(|user| !user.is_deleted())
            .collect();

        if active.len() > 1 {
            // Only reachable through a registration race.
            tracing::warn!(
                count = active.len(),
                "Multiple active users share an email, using the oldest"
            );
            active.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        }
        Ok(active.into_iter().next())
    }

    /// Keyed lookup. Soft-deleted records are returned as well.
    pub async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        self.store.get_user(id).await
    }

    /// Register a new user. Fails with `Conflict` if the email is taken.
    pub async fn create(&self, new_user: NewUser) -> Result<User> {
        let email = normalize_email(&new_user.email);
        self.ensure_email_available(&email, None).await?;

        let now = now_rfc3339();
        let user = User {
            id: Uuid::new_v4().to_string(),
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            email,
            password_hash: hash_password(&new_user.password)?,
            level: AccessLevel::Standard,
            last_token: None,
            created_at: now.clone(),
            updated_at: now,
            deleted_at: None,
        };
        self.store.put_user(&user).await?;

        tracing::info!(user_id = %user.id, "User created");
        Ok(user)
    }

    /// Merge name, email and password changes into an active user.
    ///
    /// A password change clears `last_token`, so every outstanding token
    /// stops verifying and the user has to log in again.
    pub async fn update(&self, id: &str, changes: UserChanges) -> Result<User> {
        let current = self.find_active(id).await?;

        let email = changes.email.as_deref().map(normalize_email);
        if let Some(email) = email.as_deref() {
            if email != current.email {
                self.ensure_email_available(email, Some(id)).await?;
            }
        }
        let password_hash = changes
            .password
            .as_deref()
            .map(hash_password)
            .transpose()?;
        let password_changed = password_hash.is_some();

        let user = self
            .modify(id, &|user: &mut User| {
                if let Some(first_name) = &changes.first_name {
                    user.first_name = first_name.clone();
                }
                if let Some(last_name) = &changes.last_name {
                    user.last_name = last_name.clone();
                }
                if let Some(email) = &email {
                    user.email = email.clone();
                }
                if let Some(hash) = &password_hash {
                    user.password_hash = hash.clone();
                    user.last_token = None;
                }
                user.updated_at = now_rfc3339();
                Ok(())
            })
            .await?;

        tracing::info!(user_id = %user.id, password_changed, "User updated");
        Ok(user)
    }

    /// Mark an active user as deleted. The record itself is kept.
    pub async fn soft_delete(&self, id: &str) -> Result<User> {
        let user = self
            .modify(id, &|user: &mut User| {
                let now = now_rfc3339();
                user.deleted_at = Some(now.clone());
                user.updated_at = now;
                Ok(())
            })
            .await?;

        tracing::info!(user_id = %user.id, "User soft-deleted");
        Ok(user)
    }

    /// Record the only token that will be accepted for this user.
    pub async fn set_last_token(&self, id: &str, token: Option<&str>) -> Result<()> {
        self.modify(id, &|user: &mut User| {
            user.last_token = token.map(str::to_string);
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// Replace `current` with `next` as the accepted token, failing with
    /// `StaleToken` if `current` is no longer the one on record.
    pub async fn rotate_last_token(&self, id: &str, current: &str, next: &str) -> Result<()> {
        self.modify(id, &|user: &mut User| {
            let on_record = user
                .last_token
                .as_deref()
                .map(|stored| bool::from(stored.as_bytes().ct_eq(current.as_bytes())))
                .unwrap_or(false);
            if !on_record {
                return Err(TokenError::StaleToken.into());
            }
            user.last_token = Some(next.to_string());
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn modify(&self, id: &str, edit: UserEdit<'_>) -> Result<User> {
        self.store
            .modify_user(id, edit)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
    }

    async fn find_active(&self, id: &str) -> Result<User> {
        match self.store.get_user(id).await? {
            Some(user) if !user.is_deleted() => Ok(user),
            _ => Err(AppError::NotFound(format!("User {} not found", id))),
        }
    }

    async fn ensure_email_available(&self, email: &str, except_id: Option<&str>) -> Result<()> {
        match self.find_by_email(email).await? {
            Some(existing) if Some(existing.id.as_str()) != except_id => {
                tracing::warn!(existing_id = %existing.id, "Email already registered");
                Err(AppError::Conflict("Email already registered".to_string()))
            }
            _ => Ok(()),
        }
    }
}
