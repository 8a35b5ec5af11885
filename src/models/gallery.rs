//! Represents a gallery owned by an authenticated user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A gallery created by a signed-in user.
///
/// Owned galleries never expire. Visibility and password are changed only by
/// the owner, and the gallery lives until the owner deletes it.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Gallery {
    /// Unique identifier for this gallery.
    pub id: Uuid,

    /// The user that owns this gallery.
    pub user_id: Uuid,

    /// Public share code, unique across both gallery kinds.
    pub short_code: String,

    /// Whether the gallery can be read through its short code.
    pub is_public: bool,

    /// Opaque PHC hash, present iff password protection is enabled.
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,

    /// When this gallery was created.
    pub created_at: DateTime<Utc>,
}

impl Gallery {
    pub fn new(user_id: Uuid, short_code: String, is_public: bool, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            short_code,
            is_public,
            password_hash: None,
            created_at: now,
        }
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.as_deref().is_some_and(|h| !h.is_empty())
    }

    pub fn set_password(&mut self, password_hash: String) {
        self.password_hash = Some(password_hash);
    }

    pub fn clear_password(&mut self) {
        self.password_hash = None;
    }
}
