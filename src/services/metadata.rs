//! Metadata lookup for uploaded media.
//!
//! The extractor runs out of band and records what it found as object tags.
//! [`TagMetadataSource`] reads those tags back; a miss is a normal outcome,
//! not an error, and the caller simply tries again on a later read.

use crate::{
    models::media::MediaMetadata,
    services::object_store::ObjectStore,
};
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, warn};

#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// `None` when the object is missing or carries nothing usable.
    async fn fetch(&self, storage_key: &str) -> Option<MediaMetadata>;
}

#[derive(Clone)]
pub struct TagMetadataSource {
    store: Arc<dyn ObjectStore>,
}

impl TagMetadataSource {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MetadataSource for TagMetadataSource {
    async fn fetch(&self, storage_key: &str) -> Option<MediaMetadata> {
        let tags = match self.store.object_tags(storage_key).await {
            Ok(Some(tags)) => tags,
            Ok(None) => {
                warn!(storage_key, "could not fetch tags, object not found");
                return None;
            }
            Err(err) => {
                warn!(storage_key, error = %err, "failed to read object tags");
                return None;
            }
        };

        let media_type = first_tag(&tags, &["mediaType", "media_type", "MediaType"])
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        let width = first_tag(&tags, &["width", "Width"]).and_then(|v| v.parse().ok());
        let height = first_tag(&tags, &["height", "Height"]).and_then(|v| v.parse().ok());
        let file_size = match self.store.object_size(storage_key).await {
            Ok(size) => size,
            Err(err) => {
                warn!(storage_key, error = %err, "failed to read object size");
                None
            }
        };

        let metadata = MediaMetadata {
            media_type,
            width,
            height,
            file_size,
        };
        if metadata.is_empty() {
            warn!(storage_key, "no metadata tags found");
            return None;
        }
        debug!(storage_key, ?metadata, "fetched media metadata");
        Some(metadata)
    }
}

fn first_tag<'a>(tags: &'a HashMap<String, String>, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .find_map(|name| tags.get(*name))
        .map(String::as_str)
}
