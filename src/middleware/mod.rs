// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware and request extractors (authorization, security headers).

pub mod auth;
pub mod security;

pub use auth::AuthUser;
pub use security::add_security_headers;
