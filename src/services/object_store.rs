//! src/services/object_store.rs
//!
//! Object storage for uploaded media.
//!
//! [`ObjectStore`] is the contract the gallery lifecycle depends on: pre-signed
//! upload/download URLs, existence and size checks, tags, and deletes.
//! [`LocalObjectStore`] implements it on local disk, sharded beneath
//! `base_path/objects/{shard}/{shard}/{key}`, and hands out HMAC-signed URLs
//! that this same process serves through the `/objects/{*key}` routes.

use crate::services::{clock::Clock, media_probe::probe, signing::Signer};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;
use futures::{Stream, StreamExt, pin_mut};
use std::{
    collections::HashMap,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::{debug, warn};
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;

/// Bytes read from the front of an object when sniffing its type.
pub const PROBE_HEAD_LEN: usize = 64 * 1024;

/// Tag holding the content type the upload was signed for.
pub const CONTENT_TYPE_TAG: &str = "contentType";

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error("object `{0}` not found")]
    ObjectNotFound(String),
    #[error("{failed} of {total} objects could not be deleted")]
    PartialDelete { failed: usize, total: usize },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type ObjectStoreResult<T> = Result<T, ObjectStoreError>;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// URL authorizing a single PUT of `content_type` to `key`.
    async fn presign_upload(&self, key: &str, content_type: &str) -> ObjectStoreResult<String>;

    /// URL authorizing GETs of `key`. URLs are never valid for another key.
    async fn presign_download(&self, key: &str) -> ObjectStoreResult<String>;

    async fn object_exists(&self, key: &str) -> ObjectStoreResult<bool>;

    /// Deleting a missing object succeeds.
    async fn delete_object(&self, key: &str) -> ObjectStoreResult<()>;

    /// Attempts every key even when some fail; missing objects succeed.
    async fn delete_objects(&self, keys: &[String]) -> ObjectStoreResult<()>;

    /// `None` when the object does not exist.
    async fn object_tags(&self, key: &str) -> ObjectStoreResult<Option<HashMap<String, String>>>;

    /// `None` when the object does not exist.
    async fn object_size(&self, key: &str) -> ObjectStoreResult<Option<i64>>;
}

/// Operation a pre-signed URL was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOp {
    Put,
    Get,
}

impl GrantOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantOp::Put => "put",
            GrantOp::Get => "get",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "put" => Some(GrantOp::Put),
            "get" => Some(GrantOp::Get),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GrantError {
    #[error("signed url has expired")]
    Expired,
    #[error("signature does not match")]
    BadSignature,
}

#[derive(Clone)]
pub struct LocalObjectStore {
    /// Base directory on disk where object payloads and tags are stored.
    pub base_path: PathBuf,

    /// Origin used in pre-signed URLs, e.g. `http://localhost:3000`.
    pub public_base_url: String,

    pub presign_ttl: Duration,

    signer: Signer,
    clock: Arc<dyn Clock>,
}

impl LocalObjectStore {
    pub fn new(
        base_path: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
        presign_ttl: Duration,
        signer: Signer,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            base_path: base_path.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            presign_ttl,
            signer,
            clock,
        }
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    ///
    /// Rejects keys that begin with `/`, contain `..`, backslashes or control
    /// bytes.
    fn ensure_key_safe(key: &str) -> ObjectStoreResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(ObjectStoreError::InvalidObjectKey);
        }
        if key.starts_with('/') || key.ends_with('/') || key.contains("..") {
            return Err(ObjectStoreError::InvalidObjectKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(ObjectStoreError::InvalidObjectKey);
        }
        Ok(())
    }

    /// Two-level shard identifiers for an object key.
    ///
    /// Uses MD5(key) and returns the first two bytes as lowercase hex (00–ff).
    /// Reduces file count per directory.
    fn object_shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn objects_root(&self) -> PathBuf {
        self.base_path.join("objects")
    }

    fn tags_root(&self) -> PathBuf {
        self.base_path.join("tags")
    }

    fn sharded_path(root: PathBuf, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(key);
        let mut path = root;
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    fn object_path(&self, key: &str) -> ObjectStoreResult<PathBuf> {
        Self::ensure_key_safe(key)?;
        Ok(Self::sharded_path(self.objects_root(), key))
    }

    fn tags_path(&self, key: &str) -> ObjectStoreResult<PathBuf> {
        Self::ensure_key_safe(key)?;
        let mut path = Self::sharded_path(self.tags_root(), key);
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tags.json");
        path.set_file_name(name);
        Ok(path)
    }

    fn signed_url(&self, op: GrantOp, key: &str, content_type: &str) -> String {
        let expires = (self.clock.now() + self.presign_ttl).timestamp();
        let signature = self
            .signer
            .sign(&grant_payload(op, key, expires, content_type));
        let encoded_key = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!(
            "{}/objects/{}?op={}&expires={}&contentType={}&signature={}",
            self.public_base_url,
            encoded_key,
            op.as_str(),
            expires,
            urlencoding::encode(content_type),
            signature
        )
    }

    /// Check a pre-signed URL presented back to the object routes.
    pub fn verify_grant(
        &self,
        op: GrantOp,
        key: &str,
        expires: i64,
        content_type: &str,
        signature: &str,
    ) -> Result<(), GrantError> {
        if !self
            .signer
            .verify(&grant_payload(op, key, expires, content_type), signature)
        {
            return Err(GrantError::BadSignature);
        }
        if self.clock.now().timestamp() > expires {
            return Err(GrantError::Expired);
        }
        Ok(())
    }

    /// Stream-upload an object to disk.
    ///
    /// Writes to a temporary file, fsyncs, then renames into place so readers
    /// never observe a partial object. Returns the stored size in bytes.
    pub async fn put_object_stream<S>(&self, key: &str, stream: S) -> ObjectStoreResult<i64>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let file_path = self.object_path(key)?;
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            ObjectStoreError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(ObjectStoreError::Io(err));
                }
            };
            size_bytes += chunk.len() as i64;
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(ObjectStoreError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ObjectStoreError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ObjectStoreError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(ObjectStoreError::Io(err));
            }
        }

        debug!("stored object {} ({} bytes)", key, size_bytes);
        Ok(size_bytes)
    }

    /// Open an object for streaming out, with its size.
    pub async fn open_object(&self, key: &str) -> ObjectStoreResult<(File, u64)> {
        let path = self.object_path(key)?;
        let file = File::open(&path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                ObjectStoreError::ObjectNotFound(key.to_string())
            } else {
                ObjectStoreError::Io(err)
            }
        })?;
        let len = file.metadata().await?.len();
        Ok((file, len))
    }

    /// First [`PROBE_HEAD_LEN`] bytes of an object.
    pub async fn read_head(&self, key: &str) -> ObjectStoreResult<Vec<u8>> {
        let (file, _) = self.open_object(key).await?;
        let mut head = Vec::with_capacity(PROBE_HEAD_LEN);
        file.take(PROBE_HEAD_LEN as u64).read_to_end(&mut head).await?;
        Ok(head)
    }

    /// Replace the tag set of an existing object.
    pub async fn put_tags(
        &self,
        key: &str,
        tags: &HashMap<String, String>,
    ) -> ObjectStoreResult<()> {
        if !self.object_exists(key).await? {
            return Err(ObjectStoreError::ObjectNotFound(key.to_string()));
        }
        let path = self.tags_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, serde_json::to_vec(tags)?).await?;
        Ok(())
    }

    /// Store an uploaded body, then tag it with whatever the sniffer finds.
    ///
    /// Stands in for the extraction job that would otherwise react to the
    /// upload event. A tagging failure is logged and the upload still counts.
    pub async fn ingest_upload<S>(
        &self,
        key: &str,
        content_type: &str,
        stream: S,
    ) -> ObjectStoreResult<i64>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let size = self.put_object_stream(key, stream).await?;

        let head = self.read_head(key).await?;
        let content_type = Some(content_type).filter(|ct| !ct.is_empty());
        let mut tags = probe(&head, content_type, key).into_tags(size);
        if let Some(ct) = content_type {
            tags.insert(CONTENT_TYPE_TAG.to_string(), ct.to_string());
        }
        if let Err(err) = self.put_tags(key, &tags).await {
            warn!(storage_key = key, error = %err, "failed to tag uploaded object");
        }
        Ok(size)
    }

    async fn remove_file_if_present(&self, path: &Path, root: &Path) -> ObjectStoreResult<()> {
        match fs::remove_file(path).await {
            Ok(_) => debug!("removed file {}", path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", path.display());
                return Ok(());
            }
            Err(err) => return Err(ObjectStoreError::Io(err)),
        }
        if let Some(parent) = path.parent() {
            self.prune_empty_dirs(parent, root).await;
        }
        Ok(())
    }

    /// Recursively remove empty directories up to `stop`.
    ///
    /// Stops when:
    /// - directory not empty
    /// - directory not found
    /// - reached root
    /// - encountered unexpected I/O errors
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

fn grant_payload(op: GrantOp, key: &str, expires: i64, content_type: &str) -> String {
    format!("{}\n{}\n{}\n{}", op.as_str(), key, expires, content_type)
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn presign_upload(&self, key: &str, content_type: &str) -> ObjectStoreResult<String> {
        Self::ensure_key_safe(key)?;
        Ok(self.signed_url(GrantOp::Put, key, content_type))
    }

    async fn presign_download(&self, key: &str) -> ObjectStoreResult<String> {
        Self::ensure_key_safe(key)?;
        Ok(self.signed_url(GrantOp::Get, key, ""))
    }

    async fn object_exists(&self, key: &str) -> ObjectStoreResult<bool> {
        let path = self.object_path(key)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(ObjectStoreError::Io(err)),
        }
    }

    async fn delete_object(&self, key: &str) -> ObjectStoreResult<()> {
        let object_path = self.object_path(key)?;
        let tags_path = self.tags_path(key)?;
        self.remove_file_if_present(&object_path, &self.objects_root())
            .await?;
        self.remove_file_if_present(&tags_path, &self.tags_root())
            .await
    }

    async fn delete_objects(&self, keys: &[String]) -> ObjectStoreResult<()> {
        let mut failed = 0;
        for key in keys {
            if let Err(err) = self.delete_object(key).await {
                debug!("failed to delete object {}: {}", key, err);
                failed += 1;
            }
        }
        if failed > 0 {
            return Err(ObjectStoreError::PartialDelete {
                failed,
                total: keys.len(),
            });
        }
        Ok(())
    }

    async fn object_tags(&self, key: &str) -> ObjectStoreResult<Option<HashMap<String, String>>> {
        if !self.object_exists(key).await? {
            return Ok(None);
        }
        let path = self.tags_path(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Some(HashMap::new())),
            Err(err) => Err(ObjectStoreError::Io(err)),
        }
    }

    async fn object_size(&self, key: &str) -> ObjectStoreResult<Option<i64>> {
        let path = self.object_path(key)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len() as i64)),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ObjectStoreError::Io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;
    use chrono::Utc;
    use futures::stream;
    use tempfile::TempDir;

    fn store(dir: &TempDir, clock: ManualClock) -> LocalObjectStore {
        LocalObjectStore::new(
            dir.path(),
            "http://media.test/",
            Duration::minutes(15),
            Signer::new("test-secret").unwrap(),
            Arc::new(clock),
        )
    }

    async fn put(store: &LocalObjectStore, key: &str, body: &'static [u8]) {
        let chunks = stream::iter(vec![Ok(Bytes::from_static(body))]);
        store.put_object_stream(key, chunks).await.unwrap();
    }

    #[tokio::test]
    async fn stored_objects_exist_and_report_size() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, ManualClock::new(Utc::now()));
        let key = "galleries/anonymous/g/u-photo.jpg";

        assert!(!store.object_exists(key).await.unwrap());
        assert_eq!(store.object_size(key).await.unwrap(), None);
        assert_eq!(store.object_tags(key).await.unwrap(), None);

        put(&store, key, b"hello world").await;
        assert!(store.object_exists(key).await.unwrap());
        assert_eq!(store.object_size(key).await.unwrap(), Some(11));
        assert_eq!(store.object_tags(key).await.unwrap(), Some(HashMap::new()));
    }

    #[tokio::test]
    async fn deletes_are_idempotent_and_remove_tags() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, ManualClock::new(Utc::now()));
        let key = "galleries/user/u/g/x/pic.png";
        put(&store, key, b"png").await;
        let tags = HashMap::from([("mediaType".to_string(), "image".to_string())]);
        store.put_tags(key, &tags).await.unwrap();
        assert_eq!(store.object_tags(key).await.unwrap(), Some(tags));

        store.delete_object(key).await.unwrap();
        assert!(!store.object_exists(key).await.unwrap());
        store.delete_object(key).await.unwrap();
        store
            .delete_objects(&[key.to_string(), "never/existed.jpg".to_string()])
            .await
            .unwrap();
        assert!(!store.tags_path(key).unwrap().exists());
    }

    #[tokio::test]
    async fn unsafe_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, ManualClock::new(Utc::now()));
        for key in ["", "/abs", "a/../b", "a\\b", "dir/"] {
            assert!(matches!(
                store.object_exists(key).await,
                Err(ObjectStoreError::InvalidObjectKey)
            ));
        }
    }

    #[tokio::test]
    async fn presigned_urls_are_scoped_to_key_and_expire() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(Utc::now());
        let store = store(&dir, clock.clone());
        let key = "galleries/anonymous/g/u-my photo.jpg";

        let url = store.presign_upload(key, "image/jpeg").await.unwrap();
        assert!(url.starts_with("http://media.test/objects/galleries/anonymous/g/u-my%20photo.jpg?op=put"));

        let expires = (clock.now() + Duration::minutes(15)).timestamp();
        let signature = url.rsplit("signature=").next().unwrap();
        assert_eq!(
            store.verify_grant(GrantOp::Put, key, expires, "image/jpeg", signature),
            Ok(())
        );
        assert_eq!(
            store.verify_grant(GrantOp::Put, "galleries/other.jpg", expires, "image/jpeg", signature),
            Err(GrantError::BadSignature)
        );
        assert_eq!(
            store.verify_grant(GrantOp::Get, key, expires, "image/jpeg", signature),
            Err(GrantError::BadSignature)
        );

        clock.advance(Duration::minutes(16));
        assert_eq!(
            store.verify_grant(GrantOp::Put, key, expires, "image/jpeg", signature),
            Err(GrantError::Expired)
        );
    }

    #[tokio::test]
    async fn ingested_uploads_are_tagged() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, ManualClock::new(Utc::now()));
        let key = "galleries/anonymous/g/u-shot.png";
        let body = Bytes::from(crate::services::media_probe::tests::encoded_png(320, 200));
        let len = body.len() as i64;

        let size = store
            .ingest_upload(key, "image/png", stream::iter(vec![Ok(body)]))
            .await
            .unwrap();
        assert_eq!(size, len);

        let tags = store.object_tags(key).await.unwrap().unwrap();
        assert_eq!(tags["mediaType"], "image");
        assert_eq!(tags["format"], "png");
        assert_eq!(tags["width"], "320");
        assert_eq!(tags["height"], "200");
        assert_eq!(tags[CONTENT_TYPE_TAG], "image/png");
        assert_eq!(tags["fileSize"], len.to_string());
    }

    #[tokio::test]
    async fn download_urls_differ_per_key() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, ManualClock::new(Utc::now()));
        let a = store.presign_download("k/a.jpg").await.unwrap();
        let b = store.presign_download("k/b.jpg").await.unwrap();
        assert_ne!(a, b);
    }
}
