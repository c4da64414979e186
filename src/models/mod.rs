// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod requests;
pub mod user;

pub use requests::{LoginRequest, RegisterRequest, UpdateRequest};
pub use user::{AccessLevel, NewUser, PublicUser, User, UserChanges};
