//! src/services/gallery_service.rs
//!
//! GalleryService: lifecycle of owned and anonymous galleries and their media.
//!
//! Flow for an upload:
//! - `request_upload` creates a media row without metadata and returns a
//!   pre-signed PUT URL scoped to a fresh storage key
//! - the client uploads straight to object storage
//! - `confirm_upload` checks the object exists and backfills metadata
//!
//! Reads go through `fetch_media_for_display`, which retries the backfill for
//! any media still lacking metadata and signs one download URL per item.
//! Anonymous galleries are refused with `Gone` once expired; the cleanup sweep
//! removes them later through `delete_gallery`.

use crate::{
    models::{
        anonymous_gallery::AnonymousGallery,
        gallery::Gallery,
        media::{Media, MediaParent},
        views::{AnonymousGalleryView, GalleryView, MediaView, UploadTicket},
    },
    services::{
        access,
        clock::Clock,
        metadata::MetadataSource,
        object_store::{ObjectStore, ObjectStoreError},
        password::PasswordHasher,
        repository::{GalleryStore, ShortCodeRegistry, StoreError},
        short_code::ShortCodeGenerator,
    },
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Inserts retried after the unique constraint rejects a short code or key.
const PERSIST_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("not found: {0}")]
    NotFound(&'static str),
    #[error("gone: {0}")]
    Gone(&'static str),
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),
    #[error("could not generate a unique short code")]
    ShortCodeExhausted,
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for GalleryError {
    fn from(err: StoreError) -> Self {
        GalleryError::Internal(err.to_string())
    }
}

impl From<ObjectStoreError> for GalleryError {
    fn from(err: ObjectStoreError) -> Self {
        GalleryError::Internal(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for GalleryError {
    fn from(err: argon2::password_hash::Error) -> Self {
        GalleryError::Internal(format!("password hashing failed: {}", err))
    }
}

pub type GalleryResult<T> = Result<T, GalleryError>;

/// Either gallery kind, as far as short-code allocation is concerned.
#[async_trait]
trait Shareable: Send + Sync {
    async fn insert_into(&self, store: &dyn GalleryStore) -> Result<(), StoreError>;
}

#[async_trait]
impl Shareable for Gallery {
    async fn insert_into(&self, store: &dyn GalleryStore) -> Result<(), StoreError> {
        store.insert_gallery(self).await
    }
}

#[async_trait]
impl Shareable for AnonymousGallery {
    async fn insert_into(&self, store: &dyn GalleryStore) -> Result<(), StoreError> {
        store.insert_anonymous_gallery(self).await
    }
}

/// A gallery whose credential has already been checked by the caller.
#[derive(Debug, Clone)]
pub enum GalleryRef {
    Anonymous(AnonymousGallery),
    Owned(Gallery),
}

impl GalleryRef {
    pub fn id(&self) -> Uuid {
        match self {
            GalleryRef::Anonymous(g) => g.id,
            GalleryRef::Owned(g) => g.id,
        }
    }

    pub fn media_parent(&self) -> MediaParent {
        match self {
            GalleryRef::Anonymous(g) => MediaParent::Anonymous(g.id),
            GalleryRef::Owned(g) => MediaParent::Owned(g.id),
        }
    }

    fn storage_key(&self, file_name: &str) -> String {
        let file_name = sanitize_file_name(file_name);
        match self {
            GalleryRef::Anonymous(g) => {
                format!("galleries/anonymous/{}/{}-{}", g.id, Uuid::new_v4(), file_name)
            }
            GalleryRef::Owned(g) => format!(
                "galleries/user/{}/{}/{}/{}",
                g.user_id,
                g.id,
                Uuid::new_v4(),
                file_name
            ),
        }
    }
}

#[derive(Clone)]
pub struct GalleryService {
    store: Arc<dyn GalleryStore>,
    objects: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataSource>,
    hasher: Arc<dyn PasswordHasher>,
    clock: Arc<dyn Clock>,
    codes: ShortCodeGenerator,
}

impl GalleryService {
    pub fn new<S>(
        store: Arc<S>,
        objects: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataSource>,
        hasher: Arc<dyn PasswordHasher>,
        clock: Arc<dyn Clock>,
    ) -> Self
    where
        S: GalleryStore + 'static,
    {
        let registry: Arc<dyn ShortCodeRegistry> = store.clone();
        Self {
            store,
            objects,
            metadata,
            hasher,
            clock,
            codes: ShortCodeGenerator::new(registry),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Draw a fresh code, build the gallery around it and insert. A code
    /// claimed by a concurrent insert since the draw is redrawn.
    async fn insert_with_fresh_code<T, F>(&self, build: F) -> GalleryResult<T>
    where
        T: Shareable,
        F: Fn(String) -> T + Send,
    {
        for _ in 0..PERSIST_ATTEMPTS {
            let code = self.codes.generate_unique_code().await?;
            let gallery = build(code);
            match gallery.insert_into(self.store.as_ref()).await {
                Ok(()) => return Ok(gallery),
                Err(StoreError::ShortCodeTaken(code)) => {
                    warn!(short_code = %code, "short code claimed concurrently, regenerating");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(GalleryError::ShortCodeExhausted)
    }

    pub async fn create_owned(
        &self,
        owner: Uuid,
        is_public: bool,
        password: Option<&str>,
    ) -> GalleryResult<Gallery> {
        let password_hash = match password.filter(|p| !p.is_empty()) {
            Some(p) => Some(self.hasher.hash(p)?),
            None => None,
        };
        let now = self.now();

        let gallery = self
            .insert_with_fresh_code(|code| {
                let mut gallery = Gallery::new(owner, code, is_public, now);
                gallery.password_hash = password_hash.clone();
                gallery
            })
            .await?;
        info!(gallery_id = %gallery.id, user_id = %owner, "created gallery");
        Ok(gallery)
    }

    pub async fn create_anonymous(&self) -> GalleryResult<AnonymousGallery> {
        let now = self.now();
        let gallery = self
            .insert_with_fresh_code(|code| AnonymousGallery::new(code, generate_access_key(), now))
            .await?;
        info!(
            gallery_id = %gallery.id,
            short_code = %gallery.short_code,
            "created anonymous gallery"
        );
        Ok(gallery)
    }

    /// Resolve an access key to a gallery that may still be written to.
    pub async fn resolve_access_key(&self, access_key: &str) -> GalleryResult<GalleryRef> {
        let gallery = self
            .store
            .find_anonymous_by_access_key(access_key)
            .await?
            .ok_or(GalleryError::NotFound("gallery_not_found"))?;
        access::ensure_not_expired(&gallery, self.now())?;
        Ok(GalleryRef::Anonymous(gallery))
    }

    /// Resolve an owned gallery for its owner. Other users get `NotFound`.
    pub async fn owned_by(&self, owner: Uuid, gallery_id: Uuid) -> GalleryResult<GalleryRef> {
        let gallery = self
            .store
            .find_gallery(gallery_id)
            .await?
            .ok_or(GalleryError::NotFound("gallery_not_found"))?;
        access::can_write(&gallery, owner)?;
        Ok(GalleryRef::Owned(gallery))
    }

    fn ensure_live(&self, target: &GalleryRef) -> GalleryResult<()> {
        match target {
            GalleryRef::Anonymous(g) => access::ensure_not_expired(g, self.now()),
            GalleryRef::Owned(_) => Ok(()),
        }
    }

    pub async fn request_upload(
        &self,
        target: &GalleryRef,
        file_name: &str,
        content_type: &str,
    ) -> GalleryResult<UploadTicket> {
        self.ensure_live(target)?;

        for _ in 0..PERSIST_ATTEMPTS {
            let storage_key = target.storage_key(file_name);
            let upload_url = self
                .objects
                .presign_upload(&storage_key, content_type)
                .await?;
            let media = Media::new(target.media_parent(), storage_key, self.now());
            match self.store.insert_media(&media).await {
                Ok(()) => {
                    info!(
                        media_id = %media.id,
                        gallery_id = %target.id(),
                        "generated upload url"
                    );
                    return Ok(UploadTicket {
                        media_id: media.id,
                        upload_url,
                        storage_key: media.storage_key,
                    });
                }
                Err(StoreError::StorageKeyTaken(key)) => {
                    warn!(storage_key = %key, "storage key collision, regenerating");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(GalleryError::Internal(
            "could not allocate a unique storage key".into(),
        ))
    }

    /// Media of `target` by id. A media row of another gallery is `NotFound`,
    /// same as a missing one.
    async fn media_in(&self, target: &GalleryRef, media_id: Uuid) -> GalleryResult<Media> {
        match self.store.find_media(media_id).await? {
            Some(media) if media.belongs_to(target.media_parent()) => Ok(media),
            _ => {
                warn!(media_id = %media_id, gallery_id = %target.id(), "media not found in gallery");
                Err(GalleryError::NotFound("media_not_found"))
            }
        }
    }

    pub async fn confirm_upload(&self, target: &GalleryRef, media_id: Uuid) -> GalleryResult<()> {
        self.ensure_live(target)?;
        let mut media = self.media_in(target, media_id).await?;

        if !self.objects.object_exists(&media.storage_key).await? {
            warn!(media_id = %media.id, "media not found in storage");
            return Err(GalleryError::NotFound("media_not_uploaded"));
        }

        self.backfill_metadata(&mut media).await;
        info!(media_id = %media.id, gallery_id = %target.id(), "confirmed upload");
        Ok(())
    }

    /// Fill missing metadata from the extractor. Never fails the caller.
    async fn backfill_metadata(&self, media: &mut Media) {
        if !media.needs_metadata() {
            return;
        }
        let Some(metadata) = self.metadata.fetch(&media.storage_key).await else {
            return;
        };
        if let Err(err) = self.store.update_media_metadata(media.id, &metadata).await {
            warn!(media_id = %media.id, error = %err, "failed to persist media metadata");
        }
        media.metadata = Some(metadata);
    }

    /// Media of `target`, newest first, each with its own download URL.
    pub async fn fetch_media_for_display(&self, target: &GalleryRef) -> GalleryResult<Vec<MediaView>> {
        self.ensure_live(target)?;
        self.media_views(target.media_parent()).await
    }

    async fn media_views(&self, parent: MediaParent) -> GalleryResult<Vec<MediaView>> {
        let media = self.store.list_media(parent).await?;

        let mut views = Vec::with_capacity(media.len());
        for mut item in media {
            self.backfill_metadata(&mut item).await;
            let download_url = self.objects.presign_download(&item.storage_key).await?;
            views.push(MediaView::new(&item, download_url));
        }
        Ok(views)
    }

    pub async fn delete_media(&self, target: &GalleryRef, media_id: Uuid) -> GalleryResult<()> {
        self.ensure_live(target)?;
        let media = self.media_in(target, media_id).await?;

        self.objects.delete_object(&media.storage_key).await?;
        self.store.delete_media(media.id).await?;
        info!(media_id = %media.id, gallery_id = %target.id(), "deleted media");
        Ok(())
    }

    /// Delete every stored object of `target`, then the gallery row and its
    /// media rows. Storage failures are logged; the rows go regardless.
    pub async fn delete_gallery(&self, target: &GalleryRef) -> GalleryResult<()> {
        let keys = self
            .store
            .list_media(target.media_parent())
            .await?
            .into_iter()
            .map(|m| m.storage_key)
            .collect::<Vec<_>>();

        if !keys.is_empty() {
            info!(gallery_id = %target.id(), count = keys.len(), "deleting media objects");
            if let Err(err) = self.objects.delete_objects(&keys).await {
                error!(gallery_id = %target.id(), error = %err, "failed to delete media objects");
            }
        }

        let deleted = match target {
            GalleryRef::Anonymous(g) => self.store.delete_anonymous_gallery(g.id).await?,
            GalleryRef::Owned(g) => self.store.delete_gallery(g.id).await?,
        };
        if !deleted {
            return Err(GalleryError::NotFound("gallery_not_found"));
        }
        info!(gallery_id = %target.id(), "deleted gallery");
        Ok(())
    }

    /// Set visibility; a non-empty password replaces the hash, none clears it.
    pub async fn update_owned(
        &self,
        owner: Uuid,
        gallery_id: Uuid,
        is_public: bool,
        password: Option<&str>,
    ) -> GalleryResult<GalleryView> {
        let GalleryRef::Owned(mut gallery) = self.owned_by(owner, gallery_id).await? else {
            return Err(GalleryError::NotFound("gallery_not_found"));
        };

        gallery.is_public = is_public;
        match password.filter(|p| !p.is_empty()) {
            Some(p) => gallery.set_password(self.hasher.hash(p)?),
            None => gallery.clear_password(),
        }
        self.store.update_gallery(&gallery).await?;
        info!(gallery_id = %gallery.id, user_id = %owner, "updated gallery");

        self.gallery_view(gallery).await
    }

    pub async fn gallery_view(&self, gallery: Gallery) -> GalleryResult<GalleryView> {
        let media = self.media_views(MediaParent::Owned(gallery.id)).await?;
        Ok(GalleryView::new(&gallery, media))
    }

    pub async fn get_owned(&self, owner: Uuid, gallery_id: Uuid) -> GalleryResult<GalleryView> {
        match self.owned_by(owner, gallery_id).await? {
            GalleryRef::Owned(gallery) => self.gallery_view(gallery).await,
            GalleryRef::Anonymous(_) => Err(GalleryError::NotFound("gallery_not_found")),
        }
    }

    /// Owner's galleries, newest first.
    pub async fn list_owned(&self, owner: Uuid) -> GalleryResult<Vec<GalleryView>> {
        let galleries = self.store.list_galleries_by_user(owner).await?;
        let mut views = Vec::with_capacity(galleries.len());
        for gallery in galleries {
            views.push(self.gallery_view(gallery).await?);
        }
        Ok(views)
    }

    async fn find_by_short_code(&self, short_code: &str) -> GalleryResult<Gallery> {
        self.store
            .find_gallery_by_short_code(short_code)
            .await?
            .ok_or(GalleryError::NotFound("gallery_not_found"))
    }

    /// Public read by short code: visibility first, then password.
    pub async fn read_public(&self, short_code: &str) -> GalleryResult<GalleryView> {
        let gallery = self.find_by_short_code(short_code).await?;
        if let Err(denial) = access::can_read_publicly(&gallery, false) {
            warn!(gallery_id = %gallery.id, reason = denial.reason(), "public read denied");
            return Err(denial.into());
        }
        self.gallery_view(gallery).await
    }

    pub async fn verify_password(
        &self,
        short_code: &str,
        password: &str,
    ) -> GalleryResult<GalleryView> {
        let gallery = self.find_by_short_code(short_code).await?;
        let decision = access::can_read_publicly(&gallery, true)
            .and_then(|()| access::verify_password(&gallery, password, self.hasher.as_ref()));
        if let Err(denial) = decision {
            warn!(gallery_id = %gallery.id, reason = denial.reason(), "password check denied");
            return Err(denial.into());
        }
        info!(gallery_id = %gallery.id, "verified gallery password");
        self.gallery_view(gallery).await
    }

    pub async fn read_anonymous(&self, short_code: &str) -> GalleryResult<AnonymousGalleryView> {
        let gallery = self
            .store
            .find_anonymous_by_short_code(short_code)
            .await?
            .ok_or(GalleryError::NotFound("gallery_not_found"))?;
        access::ensure_not_expired(&gallery, self.now())?;
        let media = self.media_views(MediaParent::Anonymous(gallery.id)).await?;
        Ok(AnonymousGalleryView::new(&gallery, media))
    }

    pub async fn expired_anonymous(&self) -> GalleryResult<Vec<AnonymousGallery>> {
        Ok(self.store.list_expired_anonymous(self.now()).await?)
    }
}

/// 256 bits from the thread CSPRNG, 43 URL-safe characters.
pub fn generate_access_key() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Last path component of a client file name, restricted to `[A-Za-z0-9._-]`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let mut cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    while cleaned.contains("..") {
        cleaned = cleaned.replace("..", ".");
    }
    if cleaned.trim_matches('.').is_empty() {
        return "file".to_string();
    }
    cleaned
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        models::media::MediaMetadata,
        services::{
            clock::ManualClock,
            media_probe::tests::encoded_png,
            metadata::TagMetadataSource,
            object_store::{LocalObjectStore, ObjectStoreResult},
            password::Argon2Hasher,
            repository::{SqliteGalleryStore, StoreResult, tests::memory_store},
            signing::Signer,
        },
    };
    use bytes::Bytes;
    use chrono::Duration;
    use futures::stream;
    use std::{
        collections::HashMap,
        io,
        sync::{
            Mutex,
            atomic::{AtomicBool, Ordering},
        },
    };
    use tempfile::TempDir;

    /// Switches flipped by tests to make the wrapped stores misbehave.
    #[derive(Default)]
    pub(crate) struct Faults {
        /// The next anonymous insert finds its short code claimed by a rival.
        pub rival_takes_next_code: AtomicBool,
        pub rival_codes: Mutex<Vec<String>>,
        /// Deleting this anonymous gallery's row fails.
        pub refuse_gallery: Mutex<Option<Uuid>>,
        pub fail_object_deletes: AtomicBool,
    }

    pub(crate) struct Fixture {
        pub service: GalleryService,
        pub store: Arc<SqliteGalleryStore>,
        pub objects: Arc<LocalObjectStore>,
        pub faults: Arc<Faults>,
        pub clock: ManualClock,
        _dir: TempDir,
    }

    impl Fixture {
        pub(crate) async fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let clock = ManualClock::new(Utc::now());
            let store = Arc::new(memory_store().await);
            let objects = Arc::new(LocalObjectStore::new(
                dir.path(),
                "http://media.test",
                Duration::minutes(15),
                Signer::new("test-secret").unwrap(),
                Arc::new(clock.clone()),
            ));
            let faults = Arc::new(Faults::default());
            let service = GalleryService::new(
                Arc::new(FaultyStore {
                    inner: store.clone(),
                    faults: faults.clone(),
                }),
                Arc::new(FaultyObjects {
                    inner: objects.clone(),
                    faults: faults.clone(),
                }),
                Arc::new(TagMetadataSource::new(objects.clone())),
                Arc::new(Argon2Hasher::new()),
                Arc::new(clock.clone()),
            );
            Fixture {
                service,
                store,
                objects,
                faults,
                clock,
                _dir: dir,
            }
        }

        pub(crate) async fn upload_png(&self, storage_key: &str) {
            let body = Bytes::from(encoded_png(640, 480));
            self.objects
                .ingest_upload(storage_key, "image/png", stream::iter(vec![Ok(body)]))
                .await
                .unwrap();
        }
    }

    /// Delegates to SQLite unless a fault is switched on.
    struct FaultyStore {
        inner: Arc<SqliteGalleryStore>,
        faults: Arc<Faults>,
    }

    #[async_trait]
    impl ShortCodeRegistry for FaultyStore {
        async fn short_code_taken(&self, code: &str) -> StoreResult<bool> {
            self.inner.short_code_taken(code).await
        }
    }

    #[async_trait]
    impl GalleryStore for FaultyStore {
        async fn insert_gallery(&self, gallery: &Gallery) -> StoreResult<()> {
            self.inner.insert_gallery(gallery).await
        }
        async fn update_gallery(&self, gallery: &Gallery) -> StoreResult<()> {
            self.inner.update_gallery(gallery).await
        }
        async fn find_gallery(&self, id: Uuid) -> StoreResult<Option<Gallery>> {
            self.inner.find_gallery(id).await
        }
        async fn find_gallery_by_short_code(&self, code: &str) -> StoreResult<Option<Gallery>> {
            self.inner.find_gallery_by_short_code(code).await
        }
        async fn list_galleries_by_user(&self, user_id: Uuid) -> StoreResult<Vec<Gallery>> {
            self.inner.list_galleries_by_user(user_id).await
        }
        async fn delete_gallery(&self, id: Uuid) -> StoreResult<bool> {
            self.inner.delete_gallery(id).await
        }
        async fn insert_anonymous_gallery(&self, gallery: &AnonymousGallery) -> StoreResult<()> {
            if self.faults.rival_takes_next_code.swap(false, Ordering::SeqCst) {
                let rival = AnonymousGallery::new(
                    gallery.short_code.clone(),
                    generate_access_key(),
                    gallery.created_at,
                );
                self.inner.insert_anonymous_gallery(&rival).await?;
                self.faults.rival_codes.lock().unwrap().push(rival.short_code);
            }
            self.inner.insert_anonymous_gallery(gallery).await
        }
        async fn find_anonymous_by_short_code(
            &self,
            code: &str,
        ) -> StoreResult<Option<AnonymousGallery>> {
            self.inner.find_anonymous_by_short_code(code).await
        }
        async fn find_anonymous_by_access_key(
            &self,
            access_key: &str,
        ) -> StoreResult<Option<AnonymousGallery>> {
            self.inner.find_anonymous_by_access_key(access_key).await
        }
        async fn list_expired_anonymous(
            &self,
            now: DateTime<Utc>,
        ) -> StoreResult<Vec<AnonymousGallery>> {
            self.inner.list_expired_anonymous(now).await
        }
        async fn delete_anonymous_gallery(&self, id: Uuid) -> StoreResult<bool> {
            if *self.faults.refuse_gallery.lock().unwrap() == Some(id) {
                return Err(sqlx::Error::PoolTimedOut.into());
            }
            self.inner.delete_anonymous_gallery(id).await
        }
        async fn insert_media(&self, media: &Media) -> StoreResult<()> {
            self.inner.insert_media(media).await
        }
        async fn find_media(&self, id: Uuid) -> StoreResult<Option<Media>> {
            self.inner.find_media(id).await
        }
        async fn list_media(&self, parent: MediaParent) -> StoreResult<Vec<Media>> {
            self.inner.list_media(parent).await
        }
        async fn update_media_metadata(
            &self,
            id: Uuid,
            metadata: &MediaMetadata,
        ) -> StoreResult<()> {
            self.inner.update_media_metadata(id, metadata).await
        }
        async fn delete_media(&self, id: Uuid) -> StoreResult<bool> {
            self.inner.delete_media(id).await
        }
    }

    /// Delegates to the disk store; deletes fail while the fault is on.
    struct FaultyObjects {
        inner: Arc<LocalObjectStore>,
        faults: Arc<Faults>,
    }

    impl FaultyObjects {
        fn refuse_delete(&self) -> ObjectStoreResult<()> {
            if self.faults.fail_object_deletes.load(Ordering::SeqCst) {
                return Err(io::Error::other("disk unavailable").into());
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ObjectStore for FaultyObjects {
        async fn presign_upload(&self, key: &str, content_type: &str) -> ObjectStoreResult<String> {
            self.inner.presign_upload(key, content_type).await
        }
        async fn presign_download(&self, key: &str) -> ObjectStoreResult<String> {
            self.inner.presign_download(key).await
        }
        async fn object_exists(&self, key: &str) -> ObjectStoreResult<bool> {
            self.inner.object_exists(key).await
        }
        async fn delete_object(&self, key: &str) -> ObjectStoreResult<()> {
            self.refuse_delete()?;
            self.inner.delete_object(key).await
        }
        async fn delete_objects(&self, keys: &[String]) -> ObjectStoreResult<()> {
            self.refuse_delete()?;
            self.inner.delete_objects(keys).await
        }
        async fn object_tags(&self, key: &str) -> ObjectStoreResult<Option<HashMap<String, String>>> {
            self.inner.object_tags(key).await
        }
        async fn object_size(&self, key: &str) -> ObjectStoreResult<Option<i64>> {
            self.inner.object_size(key).await
        }
    }

    #[tokio::test]
    async fn anonymous_gallery_gets_key_and_thirty_day_expiry() {
        let fx = Fixture::new().await;
        let gallery = fx.service.create_anonymous().await.unwrap();

        assert_eq!(gallery.access_key.len(), 43);
        assert_eq!(gallery.short_code.len(), 4);
        assert_eq!(gallery.expires_at - gallery.created_at, Duration::days(30));

        let resolved = fx.service.resolve_access_key(&gallery.access_key).await.unwrap();
        assert_eq!(resolved.id(), gallery.id);
    }

    #[tokio::test]
    async fn unknown_access_key_is_not_found() {
        let fx = Fixture::new().await;
        let err = fx.service.resolve_access_key("nope").await.unwrap_err();
        assert!(matches!(err, GalleryError::NotFound("gallery_not_found")));
    }

    #[tokio::test]
    async fn upload_must_land_before_confirmation() {
        let fx = Fixture::new().await;
        let gallery = fx.service.create_anonymous().await.unwrap();
        let target = GalleryRef::Anonymous(gallery.clone());

        let ticket = fx
            .service
            .request_upload(&target, "holiday photo.png", "image/png")
            .await
            .unwrap();
        assert!(ticket.storage_key.starts_with(&format!("galleries/anonymous/{}/", gallery.id)));
        assert!(ticket.storage_key.ends_with("-holiday_photo.png"));
        assert!(ticket.upload_url.contains("op=put"));

        let err = fx.service.confirm_upload(&target, ticket.media_id).await.unwrap_err();
        assert!(matches!(err, GalleryError::NotFound("media_not_uploaded")));

        fx.upload_png(&ticket.storage_key).await;
        fx.service.confirm_upload(&target, ticket.media_id).await.unwrap();

        let view = fx.service.read_anonymous(&gallery.short_code).await.unwrap();
        assert_eq!(view.media.total_count, 1);
        let media = &view.media.media[0];
        assert_eq!(media.media_type.as_deref(), Some("image"));
        assert_eq!((media.width, media.height), (Some(640), Some(480)));
        assert!(media.download_url.contains("op=get"));
    }

    #[tokio::test]
    async fn metadata_is_backfilled_on_read() {
        let fx = Fixture::new().await;
        let gallery = fx.service.create_anonymous().await.unwrap();
        let target = GalleryRef::Anonymous(gallery.clone());
        let ticket = fx
            .service
            .request_upload(&target, "a.png", "image/png")
            .await
            .unwrap();

        let view = fx.service.read_anonymous(&gallery.short_code).await.unwrap();
        assert_eq!(view.media.media[0].media_type, None);

        // Uploaded but never confirmed: the next read fills it in and keeps it.
        fx.upload_png(&ticket.storage_key).await;
        fx.service.read_anonymous(&gallery.short_code).await.unwrap();
        let stored = fx.store.find_media(ticket.media_id).await.unwrap().unwrap();
        assert!(!stored.needs_metadata());
    }

    #[tokio::test]
    async fn media_of_another_gallery_is_not_found() {
        let fx = Fixture::new().await;
        let first = GalleryRef::Anonymous(fx.service.create_anonymous().await.unwrap());
        let second = GalleryRef::Anonymous(fx.service.create_anonymous().await.unwrap());
        let ticket = fx
            .service
            .request_upload(&first, "a.png", "image/png")
            .await
            .unwrap();

        let err = fx.service.delete_media(&second, ticket.media_id).await.unwrap_err();
        assert!(matches!(err, GalleryError::NotFound("media_not_found")));
        let err = fx.service.confirm_upload(&second, ticket.media_id).await.unwrap_err();
        assert!(matches!(err, GalleryError::NotFound("media_not_found")));
    }

    #[tokio::test]
    async fn expired_anonymous_gallery_is_gone() {
        let fx = Fixture::new().await;
        let gallery = fx.service.create_anonymous().await.unwrap();

        fx.clock.set(gallery.expires_at);
        fx.service.read_anonymous(&gallery.short_code).await.unwrap();

        fx.clock.advance(Duration::seconds(1));
        let err = fx.service.read_anonymous(&gallery.short_code).await.unwrap_err();
        assert!(matches!(err, GalleryError::Gone("gallery_expired")));
        let err = fx.service.resolve_access_key(&gallery.access_key).await.unwrap_err();
        assert!(matches!(err, GalleryError::Gone("gallery_expired")));
    }

    #[tokio::test]
    async fn owned_gallery_is_invisible_to_other_users() {
        let fx = Fixture::new().await;
        let owner = Uuid::new_v4();
        let gallery = fx.service.create_owned(owner, false, None).await.unwrap();

        let err = fx.service.get_owned(Uuid::new_v4(), gallery.id).await.unwrap_err();
        assert!(matches!(err, GalleryError::NotFound("gallery_not_found")));
        assert!(fx.service.list_owned(Uuid::new_v4()).await.unwrap().is_empty());

        let view = fx.service.get_owned(owner, gallery.id).await.unwrap();
        assert_eq!(view.short_code, gallery.short_code);
    }

    #[tokio::test]
    async fn owned_storage_keys_are_scoped_to_user_and_gallery() {
        let fx = Fixture::new().await;
        let owner = Uuid::new_v4();
        let gallery = fx.service.create_owned(owner, true, None).await.unwrap();
        let target = fx.service.owned_by(owner, gallery.id).await.unwrap();

        let ticket = fx
            .service
            .request_upload(&target, "../../etc/passwd", "text/plain")
            .await
            .unwrap();
        let prefix = format!("galleries/user/{}/{}/", owner, gallery.id);
        assert!(ticket.storage_key.starts_with(&prefix));
        assert!(ticket.storage_key.ends_with("/passwd"));
    }

    #[tokio::test]
    async fn public_read_checks_visibility_then_password() {
        let fx = Fixture::new().await;
        let owner = Uuid::new_v4();
        let gallery = fx
            .service
            .create_owned(owner, true, Some("SecurePassword123"))
            .await
            .unwrap();
        let code = gallery.short_code.as_str();

        let err = fx.service.read_public(code).await.unwrap_err();
        assert!(matches!(err, GalleryError::Unauthorized("password_required")));

        let err = fx.service.verify_password(code, "wrong").await.unwrap_err();
        assert!(matches!(err, GalleryError::Unauthorized("invalid_password")));

        let view = fx.service.verify_password(code, "SecurePassword123").await.unwrap();
        assert!(view.has_password);

        fx.service
            .update_owned(owner, gallery.id, false, Some("SecurePassword123"))
            .await
            .unwrap();
        let err = fx.service.verify_password(code, "SecurePassword123").await.unwrap_err();
        assert!(matches!(err, GalleryError::Unauthorized("gallery_not_public")));
    }

    #[tokio::test]
    async fn empty_password_on_update_clears_protection() {
        let fx = Fixture::new().await;
        let owner = Uuid::new_v4();
        let gallery = fx.service.create_owned(owner, true, Some("secret")).await.unwrap();

        let view = fx.service.update_owned(owner, gallery.id, true, Some("")).await.unwrap();
        assert!(!view.has_password);

        fx.service.read_public(&gallery.short_code).await.unwrap();
        let err = fx
            .service
            .verify_password(&gallery.short_code, "secret")
            .await
            .unwrap_err();
        assert!(matches!(err, GalleryError::Unauthorized("password_not_required")));
    }

    #[tokio::test]
    async fn deleting_a_gallery_removes_objects_and_rows() {
        let fx = Fixture::new().await;
        let owner = Uuid::new_v4();
        let gallery = fx.service.create_owned(owner, true, None).await.unwrap();
        let target = fx.service.owned_by(owner, gallery.id).await.unwrap();
        let ticket = fx
            .service
            .request_upload(&target, "a.png", "image/png")
            .await
            .unwrap();
        fx.upload_png(&ticket.storage_key).await;

        fx.service.delete_gallery(&target).await.unwrap();

        assert!(!fx.objects.object_exists(&ticket.storage_key).await.unwrap());
        assert!(fx.store.find_media(ticket.media_id).await.unwrap().is_none());
        assert!(!fx.store.short_code_taken(&gallery.short_code).await.unwrap());
        let err = fx.service.delete_gallery(&target).await.unwrap_err();
        assert!(matches!(err, GalleryError::NotFound(_)));
    }

    #[tokio::test]
    async fn deleting_media_removes_object_and_row() {
        let fx = Fixture::new().await;
        let target = GalleryRef::Anonymous(fx.service.create_anonymous().await.unwrap());
        let ticket = fx
            .service
            .request_upload(&target, "a.png", "image/png")
            .await
            .unwrap();
        fx.upload_png(&ticket.storage_key).await;

        fx.service.delete_media(&target, ticket.media_id).await.unwrap();
        assert!(!fx.objects.object_exists(&ticket.storage_key).await.unwrap());
        assert!(fx.service.fetch_media_for_display(&target).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn short_code_lost_to_a_concurrent_insert_is_redrawn() {
        let fx = Fixture::new().await;
        fx.faults.rival_takes_next_code.store(true, Ordering::SeqCst);

        let mine = fx.service.create_anonymous().await.unwrap();
        let rival = fx.faults.rival_codes.lock().unwrap().pop().unwrap();
        assert_ne!(mine.short_code, rival);

        let stored = fx.store.find_anonymous_by_short_code(&mine.short_code).await.unwrap();
        assert_eq!(stored.map(|g| g.id), Some(mine.id));
        assert!(fx.store.find_anonymous_by_short_code(&rival).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn failed_object_delete_keeps_the_media_row() {
        let fx = Fixture::new().await;
        let target = GalleryRef::Anonymous(fx.service.create_anonymous().await.unwrap());
        let ticket = fx
            .service
            .request_upload(&target, "a.png", "image/png")
            .await
            .unwrap();
        fx.upload_png(&ticket.storage_key).await;

        fx.faults.fail_object_deletes.store(true, Ordering::SeqCst);
        let err = fx.service.delete_media(&target, ticket.media_id).await.unwrap_err();
        assert!(matches!(err, GalleryError::Internal(_)));
        assert!(fx.store.find_media(ticket.media_id).await.unwrap().is_some());
        assert!(fx.objects.object_exists(&ticket.storage_key).await.unwrap());
    }

    #[tokio::test]
    async fn gallery_rows_go_even_when_object_deletes_fail() {
        let fx = Fixture::new().await;
        let owner = Uuid::new_v4();
        let gallery = fx.service.create_owned(owner, false, None).await.unwrap();
        let target = fx.service.owned_by(owner, gallery.id).await.unwrap();
        let ticket = fx
            .service
            .request_upload(&target, "a.png", "image/png")
            .await
            .unwrap();
        fx.upload_png(&ticket.storage_key).await;

        fx.faults.fail_object_deletes.store(true, Ordering::SeqCst);
        fx.service.delete_gallery(&target).await.unwrap();

        assert!(fx.store.find_gallery(gallery.id).await.unwrap().is_none());
        assert!(fx.store.find_media(ticket.media_id).await.unwrap().is_none());
        // Orphaned object stays behind.
        assert!(fx.objects.object_exists(&ticket.storage_key).await.unwrap());
    }

    #[test]
    fn file_names_are_reduced_to_a_safe_component() {
        assert_eq!(sanitize_file_name("photo.jpg"), "photo.jpg");
        assert_eq!(sanitize_file_name("dir/sub/clip.mp4"), "clip.mp4");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\cat.png"), "cat.png");
        assert_eq!(sanitize_file_name("my pic (1).jpeg"), "my_pic__1_.jpeg");
        assert_eq!(sanitize_file_name("a..b"), "a.b");
        assert_eq!(sanitize_file_name(".."), "file");
        assert_eq!(sanitize_file_name("uploads/"), "file");
        assert_eq!(sanitize_file_name(""), "file");
    }

    #[test]
    fn access_keys_are_url_safe_and_distinct() {
        let a = generate_access_key();
        let b = generate_access_key();
        assert_eq!(a.len(), 43);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
