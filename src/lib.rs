// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! User accounts: registration, login and profile management
//!
//! This crate provides the backend API for a serverless user-account
//! service backed by a Firestore `users` collection.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;
pub mod validation;

use config::Config;
use db::UserStore;
use services::{TokenService, UserRepository};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub users: UserRepository,
    pub tokens: TokenService,
}

impl AppState {
    /// Wire the repository and token service over the given store.
    pub fn new(config: Config, store: Arc<dyn UserStore>) -> Self {
        let users = UserRepository::new(store);
        let tokens = TokenService::new(
            &config.jwt_signing_key,
            config.jwt_ttl_seconds,
            users.clone(),
        );
        Self {
            config,
            users,
            tokens,
        }
    }
}
