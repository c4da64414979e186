// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod password;
pub mod tokens;
pub mod users;

pub use password::verify_password;
pub use tokens::TokenService;
pub use users::UserRepository;
