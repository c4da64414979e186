//! Database layer (Firestore, or in-memory for local runs and tests).

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::InMemoryUserStore;

use crate::error::AppError;
use crate::models::User;
use async_trait::async_trait;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
}

/// In-place edit applied by [`UserStore::modify_user`]. Returning an
/// error aborts the write.
pub type UserEdit<'a> = &'a (dyn Fn(&mut User) -> Result<(), AppError> + Send + Sync);

/// Raw access to the user collection, keyed by user id.
///
/// Implementations move documents and keep soft-deleted records out of
/// `modify_user`; uniqueness and hashing rules live in
/// `services::UserRepository`.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Direct keyed lookup. Returns soft-deleted records too.
    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError>;

    /// Create or overwrite the document for `user.id`.
    async fn put_user(&self, user: &User) -> Result<(), AppError>;

    /// Read, edit and write back the active record for `id` as one atomic
    /// step, so fields the edit does not touch cannot be lost to a
    /// concurrent write. Returns `None`, without writing, if the record is
    /// missing or soft-deleted.
    async fn modify_user(&self, id: &str, edit: UserEdit<'_>) -> Result<Option<User>, AppError>;

    /// Every record whose stored email equals `email`, deleted or not.
    async fn find_users_by_email(&self, email: &str) -> Result<Vec<User>, AppError>;
}
