//! User model for storage and API.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Access level granted to a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    #[default]
    Standard,
    Admin,
}

/// User record stored in Firestore (document ID is `id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Opaque identifier (UUID v4), immutable
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    /// Trimmed, lower-cased email
    pub email: String,
    /// Argon2 PHC string, never the plaintext
    pub password_hash: String,
    #[serde(default)]
    pub level: AccessLevel,
    /// Most recently issued bearer token; the only one accepted
    #[serde(default)]
    pub last_token: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    /// Set on soft deletion
    #[serde(default)]
    pub deleted_at: Option<String>,
}

impl User {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// User fields safe to return to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub level: AccessLevel,
    pub last_token: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            level: user.level,
            last_token: user.last_token,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Fields supplied at registration. The password is plaintext here and
/// is hashed by the repository before anything is persisted.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

/// Partial update; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}
