// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Process-local `UserStore` used for local development and tests.

use crate::db::{UserEdit, UserStore};
use crate::error::AppError;
use crate::models::User;
use async_trait::async_trait;
use dashmap::DashMap;

/// Users keyed by id. Lost on restart.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: DashMap<String, User>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.get(id).map(|entry| entry.value().clone()))
    }

    async fn put_user(&self, user: &User) -> Result<(), AppError> {
        self.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn modify_user(&self, id: &str, edit: UserEdit<'_>) -> Result<Option<User>, AppError> {
        // The shard stays write-locked until `entry` drops.
        let Some(mut entry) = self.users.get_mut(id) else {
            return Ok(None);
        };
        if entry.is_deleted() {
            return Ok(None);
        }

        let mut user = entry.value().clone();
        edit(&mut user)?;
        *entry = user.clone();
        Ok(Some(user))
    }

    async fn find_users_by_email(&self, email: &str) -> Result<Vec<User>, AppError> {
        Ok(self
            .users
            .iter()
            .filter(|entry| entry.email == email)
            .map(|entry| entry.value().clone())
            .collect())
    }
}
