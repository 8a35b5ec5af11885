//! Represents a gallery created without an account.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifetime of an anonymous gallery, fixed at creation.
pub const ANONYMOUS_GALLERY_TTL_DAYS: i64 = 30;

/// A gallery managed through its access key rather than an account.
///
/// The short code grants read access; the access key grants write access.
/// `expires_at` is set once at construction and never extended.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct AnonymousGallery {
    pub id: Uuid,

    /// Public share code, unique across both gallery kinds.
    pub short_code: String,

    /// Write credential. Only ever returned to the creator.
    #[serde(skip_serializing)]
    pub access_key: String,

    /// Absolute expiry, `created_at + 30 days`.
    pub expires_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
}

impl AnonymousGallery {
    pub fn new(short_code: String, access_key: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            short_code,
            access_key,
            expires_at: now + Duration::days(ANONYMOUS_GALLERY_TTL_DAYS),
            created_at: now,
        }
    }
}
