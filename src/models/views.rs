//! Response shapes returned by the JSON API.
//!
//! Field names are camelCase to stay wire-compatible with existing clients.

use super::{anonymous_gallery::AnonymousGallery, gallery::Gallery, media::Media};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MediaView {
    pub id: Uuid,
    pub media_type: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub file_size: Option<i64>,
    pub download_url: String,
    pub created_at: DateTime<Utc>,
}

impl MediaView {
    pub fn new(media: &Media, download_url: String) -> Self {
        let metadata = media.metadata.clone().unwrap_or_default();
        Self {
            id: media.id,
            media_type: metadata.media_type,
            width: metadata.width,
            height: metadata.height,
            file_size: metadata.file_size,
            download_url,
            created_at: media.created_at,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MediaList {
    pub media: Vec<MediaView>,
    pub total_count: usize,
}

impl From<Vec<MediaView>> for MediaList {
    fn from(media: Vec<MediaView>) -> Self {
        let total_count = media.len();
        Self { media, total_count }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GalleryView {
    pub id: Uuid,
    pub short_code: String,
    pub is_public: bool,
    pub has_password: bool,
    pub created_at: DateTime<Utc>,
    pub media: MediaList,
}

impl GalleryView {
    pub fn new(gallery: &Gallery, media: Vec<MediaView>) -> Self {
        Self {
            id: gallery.id,
            short_code: gallery.short_code.clone(),
            is_public: gallery.is_public,
            has_password: gallery.has_password(),
            created_at: gallery.created_at,
            media: media.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GalleryList {
    pub galleries: Vec<GalleryView>,
    pub total_count: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AnonymousGalleryView {
    pub id: Uuid,
    pub short_code: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub media: MediaList,
}

impl AnonymousGalleryView {
    pub fn new(gallery: &AnonymousGallery, media: Vec<MediaView>) -> Self {
        Self {
            id: gallery.id,
            short_code: gallery.short_code.clone(),
            expires_at: gallery.expires_at,
            created_at: gallery.created_at,
            media: media.into(),
        }
    }
}

/// Returned once, on creation; the only place the access key is exposed.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreatedAnonymousGallery {
    pub gallery_id: Uuid,
    pub short_code: String,
    pub access_key: String,
    pub expires_at: DateTime<Utc>,
}

impl From<&AnonymousGallery> for CreatedAnonymousGallery {
    fn from(gallery: &AnonymousGallery) -> Self {
        Self {
            gallery_id: gallery.id,
            short_code: gallery.short_code.clone(),
            access_key: gallery.access_key.clone(),
            expires_at: gallery.expires_at,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UploadTicket {
    pub media_id: Uuid,
    pub upload_url: String,
    #[serde(rename = "s3Key")]
    pub storage_key: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SuccessResponse {
    pub message: String,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self {
            message: "success".into(),
        }
    }
}
