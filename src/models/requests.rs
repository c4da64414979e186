// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Request payloads and their validation schemas.
//!
//! Every field is an `Option` so that a missing property reaches the
//! validator as a `required` violation instead of a deserialization error.

use crate::validation::Schema;
use serde::Deserialize;
use validator::Validate;

/// `POST /user/register`
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(required, length(min = 1))]
    pub first_name: Option<String>,
    #[validate(required, length(min = 1))]
    pub last_name: Option<String>,
    #[validate(required, email)]
    pub email: Option<String>,
    #[validate(required, length(min = 6))]
    pub password: Option<String>,
}

impl Schema for RegisterRequest {
    const NAME: &'static str = "register";
    const FIELDS: &'static [(&'static str, &'static str)] = &[
        ("first_name", "firstName"),
        ("last_name", "lastName"),
        ("email", "email"),
        ("password", "password"),
    ];
}

/// `POST /user`
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(required, email)]
    pub email: Option<String>,
    #[validate(required, length(min = 1))]
    pub password: Option<String>,
}

impl Schema for LoginRequest {
    const NAME: &'static str = "login";
    const FIELDS: &'static [(&'static str, &'static str)] =
        &[("email", "email"), ("password", "password")];
}

/// `PUT /user`. Both names must be sent together; email and password are
/// optional.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    #[validate(required, length(min = 1))]
    pub first_name: Option<String>,
    #[validate(required, length(min = 1))]
    pub last_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 6))]
    pub password: Option<String>,
}

impl Schema for UpdateRequest {
    const NAME: &'static str = "update";
    const FIELDS: &'static [(&'static str, &'static str)] = &[
        ("first_name", "firstName"),
        ("last_name", "lastName"),
        ("email", "email"),
        ("password", "password"),
    ];
}
