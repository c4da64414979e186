// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Request payload validation.
//!
//! Schemas are declared with `validator` derives on the request structs.
//! This module flattens `validator::ValidationErrors` into an ordered list
//! of [`Violation`]s that is returned to clients in a 422 response.

use serde::Serialize;
use serde_json::Value;
use validator::{Validate, ValidationError};

/// A payload type with a named validation schema.
pub trait Schema: Validate {
    /// Schema name, used in logs.
    const NAME: &'static str;
    /// `(rust_field, json_property)` pairs in declaration order.
    const FIELDS: &'static [(&'static str, &'static str)];
}

/// Rule a field failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Rule {
    Required,
    Format,
    MinLength,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_property: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// One failed rule on one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub field: String,
    pub keyword: Rule,
    pub params: ViolationParams,
    pub message: String,
}

impl Violation {
    fn from_error(field: &str, error: &ValidationError) -> Self {
        match error.code.as_ref() {
            "required" => Self {
                field: field.to_string(),
                keyword: Rule::Required,
                params: ViolationParams {
                    missing_property: Some(field.to_string()),
                    ..Default::default()
                },
                message: format!("should have required property '{}'", field),
            },
            "length" => {
                let limit = error.params.get("min").and_then(Value::as_u64).unwrap_or(0);
                Self {
                    field: field.to_string(),
                    keyword: Rule::MinLength,
                    params: ViolationParams {
                        limit: Some(limit),
                        ..Default::default()
                    },
                    message: format!("should NOT be shorter than {} characters", limit),
                }
            }
            code => {
                let format = if code == "email" { "email" } else { code };
                Self {
                    field: field.to_string(),
                    keyword: Rule::Format,
                    params: ViolationParams {
                        format: Some(format.to_string()),
                        ..Default::default()
                    },
                    message: format!("should match format \"{}\"", format),
                }
            }
        }
    }
}

/// Check `payload` against its schema.
///
/// Violations are ordered by the schema's field order, then by rule.
pub fn validate<T: Schema>(payload: T) -> Result<T, Vec<Violation>> {
    let errors = match payload.validate() {
        Ok(()) => return Ok(payload),
        Err(errors) => errors,
    };

    let mut ranked = Vec::new();
    for (field, field_errors) in errors.field_errors() {
        let field: &str = &field;
        let (rank, property) = T::FIELDS
            .iter()
            .enumerate()
            .find(|(_, (rust, json))| *rust == field || *json == field)
            .map(|(i, (_, json))| (i, *json))
            .unwrap_or((T::FIELDS.len(), field));

        for error in field_errors.iter() {
            ranked.push((rank, Violation::from_error(property, error)));
        }
    }
    ranked.sort_by(|(a_rank, a), (b_rank, b)| {
        a_rank.cmp(b_rank).then(a.keyword.cmp(&b.keyword))
    });

    let violations: Vec<Violation> = ranked.into_iter().map(|(_, v)| v).collect();
    tracing::debug!(
        schema = T::NAME,
        count = violations.len(),
        "Payload failed validation"
    );
    Err(violations)
}
