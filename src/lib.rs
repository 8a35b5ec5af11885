//! Kappi: share photo and video galleries by short code.
//!
//! Owned galleries belong to an authenticated user and may be public and
//! password protected. Anonymous galleries need no account; whoever holds the
//! access key may upload, and the gallery expires after thirty days.

use axum::Router;
use sqlx::SqlitePool;
use std::{path::PathBuf, sync::Arc};

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

use services::{
    clock::Clock,
    gallery_service::GalleryService,
    metadata::TagMetadataSource,
    object_store::LocalObjectStore,
    password::Argon2Hasher,
    repository::SqliteGalleryStore,
    signing::Signer,
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub galleries: GalleryService,
    /// Backs the `/objects` routes that pre-signed URLs point at.
    pub objects: Arc<LocalObjectStore>,
    /// Verifies owner bearer tokens.
    pub signer: Signer,
    pub db: Arc<SqlitePool>,
}

impl AppState {
    pub fn new(
        db: Arc<SqlitePool>,
        storage_dir: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
        presign_ttl: chrono::Duration,
        signer: Signer,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let objects = Arc::new(LocalObjectStore::new(
            storage_dir,
            public_base_url,
            presign_ttl,
            signer.clone(),
            clock.clone(),
        ));
        let galleries = GalleryService::new(
            Arc::new(SqliteGalleryStore::new(db.clone())),
            objects.clone(),
            Arc::new(TagMetadataSource::new(objects.clone())),
            Arc::new(Argon2Hasher::new()),
            clock,
        );
        Self {
            galleries,
            objects,
            signer,
            db,
        }
    }

    pub fn storage_dir(&self) -> &std::path::Path {
        &self.objects.base_path
    }
}

/// Build the full router over `state`.
pub fn create_app(state: AppState) -> Router {
    routes::routes::routes().with_state(state)
}
