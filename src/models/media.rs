//! Represents a single uploaded photo or video.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The gallery a media item belongs to. Exactly one parent, always.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MediaParent {
    Anonymous(Uuid),
    Owned(Uuid),
}

impl MediaParent {
    pub fn gallery_id(&self) -> Uuid {
        match self {
            MediaParent::Anonymous(id) | MediaParent::Owned(id) => *id,
        }
    }

    fn into_columns(self) -> (Option<Uuid>, Option<Uuid>) {
        match self {
            MediaParent::Anonymous(id) => (Some(id), None),
            MediaParent::Owned(id) => (None, Some(id)),
        }
    }
}

/// Lazily filled description of the stored object.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct MediaMetadata {
    pub media_type: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub file_size: Option<i64>,
}

impl MediaMetadata {
    pub fn is_empty(&self) -> bool {
        self.media_type.is_none()
            && self.width.is_none()
            && self.height.is_none()
            && self.file_size.is_none()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Media {
    pub id: Uuid,
    pub parent: MediaParent,

    /// Object-store key; unique across all media.
    pub storage_key: String,

    /// `None` until a backfill succeeds.
    pub metadata: Option<MediaMetadata>,

    pub created_at: DateTime<Utc>,
}

impl Media {
    pub fn new(parent: MediaParent, storage_key: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent,
            storage_key,
            metadata: None,
            created_at: now,
        }
    }

    pub fn belongs_to(&self, parent: MediaParent) -> bool {
        self.parent == parent
    }

    /// Backfill only runs while no media type is known.
    pub fn needs_metadata(&self) -> bool {
        self.metadata
            .as_ref()
            .is_none_or(|m| m.media_type.is_none())
    }
}

/// Flat database shape of [`Media`].
///
/// The table keeps two nullable parent columns behind a CHECK constraint;
/// conversion into [`Media`] rejects rows that break it.
#[derive(Clone, FromRow, Debug)]
pub struct MediaRow {
    pub id: Uuid,
    pub anonymous_gallery_id: Option<Uuid>,
    pub gallery_id: Option<Uuid>,
    pub storage_key: String,
    pub media_type: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub file_size: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
#[error("media `{0}` must reference exactly one gallery")]
pub struct InvalidMediaParent(pub Uuid);

impl TryFrom<MediaRow> for Media {
    type Error = InvalidMediaParent;

    fn try_from(row: MediaRow) -> Result<Self, Self::Error> {
        let parent = match (row.anonymous_gallery_id, row.gallery_id) {
            (Some(id), None) => MediaParent::Anonymous(id),
            (None, Some(id)) => MediaParent::Owned(id),
            _ => return Err(InvalidMediaParent(row.id)),
        };
        let metadata = MediaMetadata {
            media_type: row.media_type,
            width: row.width,
            height: row.height,
            file_size: row.file_size,
        };
        Ok(Media {
            id: row.id,
            parent,
            storage_key: row.storage_key,
            metadata: (!metadata.is_empty()).then_some(metadata),
            created_at: row.created_at,
        })
    }
}

impl From<&Media> for MediaRow {
    fn from(media: &Media) -> Self {
        let (anonymous_gallery_id, gallery_id) = media.parent.into_columns();
        let metadata = media.metadata.clone().unwrap_or_default();
        MediaRow {
            id: media.id,
            anonymous_gallery_id,
            gallery_id,
            storage_key: media.storage_key.clone(),
            media_type: metadata.media_type,
            width: metadata.width,
            height: metadata.height,
            file_size: metadata.file_size,
            created_at: media.created_at,
        }
    }
}
