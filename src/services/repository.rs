//! src/services/repository.rs
//!
//! Persistence for galleries and media, backed by SQLite through `sqlx`.
//!
//! The schema carries the two uniqueness constraints the rest of the service
//! leans on: one shared `short_codes` table for both gallery kinds, and a
//! unique `media.storage_key`. Violations of either surface as dedicated
//! [`StoreError`] variants so callers can retry instead of failing.

use crate::models::{
    anonymous_gallery::AnonymousGallery,
    gallery::Gallery,
    media::{InvalidMediaParent, Media, MediaMetadata, MediaParent, MediaRow},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

const MIGRATION_SQL: &str = include_str!("../../migrations/0001_init.sql");

const GALLERY_COLUMNS: &str = "id, user_id, short_code, is_public, password_hash, created_at";
const ANONYMOUS_COLUMNS: &str = "id, short_code, access_key, expires_at, created_at";
const MEDIA_COLUMNS: &str = "id, anonymous_gallery_id, gallery_id, storage_key, media_type, \
                             width, height, file_size, created_at";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("short code `{0}` is already taken")]
    ShortCodeTaken(String),
    #[error("storage key `{0}` is already taken")]
    StorageKeyTaken(String),
    #[error(transparent)]
    CorruptMedia(#[from] InvalidMediaParent),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Existence check over the short-code namespace of both gallery kinds.
#[async_trait]
pub trait ShortCodeRegistry: Send + Sync {
    async fn short_code_taken(&self, code: &str) -> StoreResult<bool>;
}

/// Persistence contract for galleries and their media.
#[async_trait]
pub trait GalleryStore: ShortCodeRegistry {
    // Owned galleries
    async fn insert_gallery(&self, gallery: &Gallery) -> StoreResult<()>;
    async fn update_gallery(&self, gallery: &Gallery) -> StoreResult<()>;
    async fn find_gallery(&self, id: Uuid) -> StoreResult<Option<Gallery>>;
    async fn find_gallery_by_short_code(&self, code: &str) -> StoreResult<Option<Gallery>>;
    async fn list_galleries_by_user(&self, user_id: Uuid) -> StoreResult<Vec<Gallery>>;
    async fn delete_gallery(&self, id: Uuid) -> StoreResult<bool>;

    // Anonymous galleries
    async fn insert_anonymous_gallery(&self, gallery: &AnonymousGallery) -> StoreResult<()>;
    async fn find_anonymous_by_short_code(
        &self,
        code: &str,
    ) -> StoreResult<Option<AnonymousGallery>>;
    async fn find_anonymous_by_access_key(
        &self,
        access_key: &str,
    ) -> StoreResult<Option<AnonymousGallery>>;
    async fn list_expired_anonymous(
        &self,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<AnonymousGallery>>;
    async fn delete_anonymous_gallery(&self, id: Uuid) -> StoreResult<bool>;

    // Media
    async fn insert_media(&self, media: &Media) -> StoreResult<()>;
    async fn find_media(&self, id: Uuid) -> StoreResult<Option<Media>>;
    async fn list_media(&self, parent: MediaParent) -> StoreResult<Vec<Media>>;
    async fn update_media_metadata(&self, id: Uuid, metadata: &MediaMetadata)
    -> StoreResult<()>;
    async fn delete_media(&self, id: Uuid) -> StoreResult<bool>;
}

#[derive(Clone)]
pub struct SqliteGalleryStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl SqliteGalleryStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Apply the embedded schema one statement at a time.
    ///
    /// Every statement is `IF NOT EXISTS`, so running this twice is harmless.
    pub async fn run_migrations(&self) -> StoreResult<()> {
        let statements = MIGRATION_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        tracing::info!("Running {} migration statements...", statements.len());

        for stmt in statements {
            tracing::debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    async fn delete_gallery_rows(
        &self,
        table: &str,
        media_column: &str,
        id: Uuid,
    ) -> StoreResult<bool> {
        let mut tx = self.db.begin().await?;

        let code: Option<String> =
            sqlx::query_scalar(&format!("SELECT short_code FROM {table} WHERE id = ?"))
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(code) = code else {
            return Ok(false);
        };

        sqlx::query(&format!("DELETE FROM media WHERE {media_column} = ?"))
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM {table} WHERE id = ?"))
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM short_codes WHERE code = ?")
            .bind(&code)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}

/// Reserve `code` inside an open transaction.
async fn claim_short_code(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    code: &str,
    kind: &str,
) -> StoreResult<()> {
    match sqlx::query("INSERT INTO short_codes (code, gallery_kind) VALUES (?, ?)")
        .bind(code)
        .bind(kind)
        .execute(&mut **tx)
        .await
    {
        Ok(_) => Ok(()),
        Err(err) if is_unique_violation(&err) => Err(StoreError::ShortCodeTaken(code.to_string())),
        Err(err) => Err(StoreError::Sqlx(err)),
    }
}

#[async_trait]
impl ShortCodeRegistry for SqliteGalleryStore {
    async fn short_code_taken(&self, code: &str) -> StoreResult<bool> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM short_codes WHERE code = ?)
                 OR EXISTS(SELECT 1 FROM galleries WHERE short_code = ?)
                 OR EXISTS(SELECT 1 FROM anonymous_galleries WHERE short_code = ?)",
        )
        .bind(code)
        .bind(code)
        .bind(code)
        .fetch_one(&*self.db)
        .await?;
        Ok(taken)
    }
}

#[async_trait]
impl GalleryStore for SqliteGalleryStore {
    async fn insert_gallery(&self, gallery: &Gallery) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;
        claim_short_code(&mut tx, &gallery.short_code, "owned").await?;
        sqlx::query(
            "INSERT INTO galleries (id, user_id, short_code, is_public, password_hash, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(gallery.id)
        .bind(gallery.user_id)
        .bind(&gallery.short_code)
        .bind(gallery.is_public)
        .bind(&gallery.password_hash)
        .bind(gallery.created_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_gallery(&self, gallery: &Gallery) -> StoreResult<()> {
        sqlx::query("UPDATE galleries SET is_public = ?, password_hash = ? WHERE id = ?")
            .bind(gallery.is_public)
            .bind(&gallery.password_hash)
            .bind(gallery.id)
            .execute(&*self.db)
            .await?;
        Ok(())
    }

    async fn find_gallery(&self, id: Uuid) -> StoreResult<Option<Gallery>> {
        let gallery = sqlx::query_as::<_, Gallery>(&format!(
            "SELECT {GALLERY_COLUMNS} FROM galleries WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(gallery)
    }

    async fn find_gallery_by_short_code(&self, code: &str) -> StoreResult<Option<Gallery>> {
        let gallery = sqlx::query_as::<_, Gallery>(&format!(
            "SELECT {GALLERY_COLUMNS} FROM galleries WHERE short_code = ?"
        ))
        .bind(code)
        .fetch_optional(&*self.db)
        .await?;
        Ok(gallery)
    }

    async fn list_galleries_by_user(&self, user_id: Uuid) -> StoreResult<Vec<Gallery>> {
        let galleries = sqlx::query_as::<_, Gallery>(&format!(
            "SELECT {GALLERY_COLUMNS} FROM galleries WHERE user_id = ? ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&*self.db)
        .await?;
        Ok(galleries)
    }

    async fn delete_gallery(&self, id: Uuid) -> StoreResult<bool> {
        self.delete_gallery_rows("galleries", "gallery_id", id).await
    }

    async fn insert_anonymous_gallery(&self, gallery: &AnonymousGallery) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;
        claim_short_code(&mut tx, &gallery.short_code, "anonymous").await?;
        sqlx::query(
            "INSERT INTO anonymous_galleries (id, short_code, access_key, expires_at, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(gallery.id)
        .bind(&gallery.short_code)
        .bind(&gallery.access_key)
        .bind(gallery.expires_at)
        .bind(gallery.created_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_anonymous_by_short_code(
        &self,
        code: &str,
    ) -> StoreResult<Option<AnonymousGallery>> {
        let gallery = sqlx::query_as::<_, AnonymousGallery>(&format!(
            "SELECT {ANONYMOUS_COLUMNS} FROM anonymous_galleries WHERE short_code = ?"
        ))
        .bind(code)
        .fetch_optional(&*self.db)
        .await?;
        Ok(gallery)
    }

    async fn find_anonymous_by_access_key(
        &self,
        access_key: &str,
    ) -> StoreResult<Option<AnonymousGallery>> {
        let gallery = sqlx::query_as::<_, AnonymousGallery>(&format!(
            "SELECT {ANONYMOUS_COLUMNS} FROM anonymous_galleries WHERE access_key = ?"
        ))
        .bind(access_key)
        .fetch_optional(&*self.db)
        .await?;
        Ok(gallery)
    }

    async fn list_expired_anonymous(
        &self,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<AnonymousGallery>> {
        let galleries = sqlx::query_as::<_, AnonymousGallery>(&format!(
            "SELECT {ANONYMOUS_COLUMNS} FROM anonymous_galleries
             WHERE expires_at <= ? ORDER BY expires_at ASC"
        ))
        .bind(now)
        .fetch_all(&*self.db)
        .await?;
        Ok(galleries)
    }

    async fn delete_anonymous_gallery(&self, id: Uuid) -> StoreResult<bool> {
        self.delete_gallery_rows("anonymous_galleries", "anonymous_gallery_id", id)
            .await
    }

    async fn insert_media(&self, media: &Media) -> StoreResult<()> {
        let row = MediaRow::from(media);
        match sqlx::query(&format!(
            "INSERT INTO media ({MEDIA_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(row.id)
        .bind(row.anonymous_gallery_id)
        .bind(row.gallery_id)
        .bind(&row.storage_key)
        .bind(&row.media_type)
        .bind(row.width)
        .bind(row.height)
        .bind(row.file_size)
        .bind(row.created_at)
        .execute(&*self.db)
        .await
        {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::StorageKeyTaken(row.storage_key.clone()))
            }
            Err(err) => Err(StoreError::Sqlx(err)),
        }
    }

    async fn find_media(&self, id: Uuid) -> StoreResult<Option<Media>> {
        let row = sqlx::query_as::<_, MediaRow>(&format!(
            "SELECT {MEDIA_COLUMNS} FROM media WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(row.map(Media::try_from).transpose()?)
    }

    async fn list_media(&self, parent: MediaParent) -> StoreResult<Vec<Media>> {
        let column = match parent {
            MediaParent::Anonymous(_) => "anonymous_gallery_id",
            MediaParent::Owned(_) => "gallery_id",
        };
        let rows = sqlx::query_as::<_, MediaRow>(&format!(
            "SELECT {MEDIA_COLUMNS} FROM media WHERE {column} = ? ORDER BY created_at DESC"
        ))
        .bind(parent.gallery_id())
        .fetch_all(&*self.db)
        .await?;

        rows.into_iter()
            .map(|row| Media::try_from(row).map_err(StoreError::from))
            .collect()
    }

    async fn update_media_metadata(
        &self,
        id: Uuid,
        metadata: &MediaMetadata,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE media SET media_type = ?, width = ?, height = ?, file_size = ? WHERE id = ?",
        )
        .bind(&metadata.media_type)
        .bind(metadata.width)
        .bind(metadata.height)
        .bind(metadata.file_size)
        .bind(id)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    async fn delete_media(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM media WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;
    use sqlx::sqlite::SqlitePoolOptions;

    /// One connection only: every `sqlite::memory:` connection is its own database.
    pub(crate) async fn memory_store() -> SqliteGalleryStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteGalleryStore::new(Arc::new(pool));
        store.run_migrations().await.unwrap();
        store
    }

    #[tokio::test]
    async fn migrations_can_run_twice() {
        let store = memory_store().await;
        store.run_migrations().await.unwrap();
    }

    #[tokio::test]
    async fn short_code_is_unique_across_gallery_kinds() {
        let store = memory_store().await;
        let now = Utc::now();
        let owned = Gallery::new(Uuid::new_v4(), "abcd".into(), true, now);
        store.insert_gallery(&owned).await.unwrap();

        assert!(store.short_code_taken("abcd").await.unwrap());
        assert!(!store.short_code_taken("wxyz").await.unwrap());

        let anonymous = AnonymousGallery::new("abcd".into(), "key".into(), now);
        let err = store.insert_anonymous_gallery(&anonymous).await.unwrap_err();
        assert!(matches!(err, StoreError::ShortCodeTaken(code) if code == "abcd"));
        assert!(
            store
                .find_anonymous_by_access_key("key")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn duplicate_storage_key_is_rejected() {
        let store = memory_store().await;
        let gallery = AnonymousGallery::new("abcd".into(), "key".into(), Utc::now());
        store.insert_anonymous_gallery(&gallery).await.unwrap();

        let parent = MediaParent::Anonymous(gallery.id);
        let first = Media::new(parent, "galleries/anonymous/a/b-c.jpg".into(), Utc::now());
        let second = Media::new(parent, first.storage_key.clone(), Utc::now());
        store.insert_media(&first).await.unwrap();
        let err = store.insert_media(&second).await.unwrap_err();
        assert!(matches!(err, StoreError::StorageKeyTaken(_)));
    }

    #[tokio::test]
    async fn deleting_a_gallery_removes_media_and_frees_the_code() {
        let store = memory_store().await;
        let gallery = Gallery::new(Uuid::new_v4(), "hjkm".into(), false, Utc::now());
        store.insert_gallery(&gallery).await.unwrap();
        let media = Media::new(MediaParent::Owned(gallery.id), "k1".into(), Utc::now());
        store.insert_media(&media).await.unwrap();

        assert!(store.delete_gallery(gallery.id).await.unwrap());
        assert!(store.find_media(media.id).await.unwrap().is_none());
        assert!(!store.short_code_taken("hjkm").await.unwrap());
        assert!(!store.delete_gallery(gallery.id).await.unwrap());
    }

    #[tokio::test]
    async fn expired_query_uses_expiry_timestamp() {
        let store = memory_store().await;
        let now = Utc::now();
        let old = AnonymousGallery::new("old1".into(), "k-old".into(), now - Duration::days(31));
        let fresh = AnonymousGallery::new("new1".into(), "k-new".into(), now);
        store.insert_anonymous_gallery(&old).await.unwrap();
        store.insert_anonymous_gallery(&fresh).await.unwrap();

        let expired = store.list_expired_anonymous(now).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, old.id);
    }

    #[tokio::test]
    async fn media_lists_newest_first_and_metadata_persists() {
        let store = memory_store().await;
        let gallery = Gallery::new(Uuid::new_v4(), "pqrs".into(), true, Utc::now());
        store.insert_gallery(&gallery).await.unwrap();
        let parent = MediaParent::Owned(gallery.id);
        let older = Media::new(parent, "k-old".into(), Utc::now() - Duration::minutes(5));
        let newer = Media::new(parent, "k-new".into(), Utc::now());
        store.insert_media(&older).await.unwrap();
        store.insert_media(&newer).await.unwrap();

        let metadata = MediaMetadata {
            media_type: Some("image".into()),
            width: Some(640),
            height: Some(480),
            file_size: Some(1234),
        };
        store.update_media_metadata(older.id, &metadata).await.unwrap();

        let listed = store.list_media(parent).await.unwrap();
        assert_eq!(
            listed.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![newer.id, older.id]
        );
        assert_eq!(listed[1].metadata.as_ref(), Some(&metadata));
        assert!(listed[0].metadata.is_none());
    }
}
