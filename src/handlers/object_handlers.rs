//! HTTP handlers behind pre-signed object URLs.
//! Streams object bodies to avoid buffering in memory and delegates storage
//! concerns to `LocalObjectStore`. Every request must carry a grant issued by
//! the gallery service: `op`, `expires`, `contentType` and `signature`.

use crate::{
    AppState,
    errors::AppError,
    services::object_store::{
        CONTENT_TYPE_TAG, GrantError, GrantOp, ObjectStore, ObjectStoreError,
    },
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::Deserialize;
use std::io;
use tokio_util::io::ReaderStream;

/// Query string of a pre-signed URL.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantQuery {
    pub op: String,
    pub expires: i64,
    #[serde(default)]
    pub content_type: String,
    pub signature: String,
}

impl GrantQuery {
    fn authorize(&self, state: &AppState, expected: GrantOp, key: &str) -> Result<(), AppError> {
        if GrantOp::parse(&self.op) != Some(expected) {
            return Err(AppError::forbidden("invalid_signature"));
        }
        state
            .objects
            .verify_grant(expected, key, self.expires, &self.content_type, &self.signature)
            .map_err(|err| {
                tracing::warn!(storage_key = key, error = %err, "rejected signed url");
                match err {
                    GrantError::Expired => AppError::forbidden("url_expired"),
                    GrantError::BadSignature => AppError::forbidden("invalid_signature"),
                }
            })
    }
}

fn storage_error(err: ObjectStoreError, failure_code: &'static str) -> AppError {
    match err {
        ObjectStoreError::InvalidObjectKey => AppError::bad_request("invalid_object_key"),
        ObjectStoreError::ObjectNotFound(_) => {
            AppError::new(StatusCode::NOT_FOUND, "object_not_found")
        }
        other => {
            tracing::error!(error = %other, code = failure_code, "object request failed");
            AppError::internal(failure_code)
        }
    }
}

/// `PUT /objects/{*key}`: upload through a pre-signed URL.
///
/// The request `Content-Type` must match the one the URL was signed for.
pub async fn upload_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(grant): Query<GrantQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, AppError> {
    grant.authorize(&state, GrantOp::Put, &key)?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !grant.content_type.is_empty() && content_type != grant.content_type {
        tracing::warn!(storage_key = %key, content_type, "content type differs from signed one");
        return Err(AppError::forbidden("content_type_mismatch"));
    }

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other));

    let size = state
        .objects
        .ingest_upload(&key, &grant.content_type, stream)
        .await
        .map_err(|err| storage_error(err, "failed_to_store_object"))?;

    tracing::info!(storage_key = %key, size, "stored uploaded object");
    Ok(StatusCode::OK)
}

/// `GET /objects/{*key}`: download through a pre-signed URL as a stream.
pub async fn get_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(grant): Query<GrantQuery>,
) -> Result<Response, AppError> {
    grant.authorize(&state, GrantOp::Get, &key)?;

    let (file, len) = state
        .objects
        .open_object(&key)
        .await
        .map_err(|err| storage_error(err, "failed_to_read_object"))?;
    let content_type = match state.objects.object_tags(&key).await {
        Ok(Some(tags)) => tags.get(CONTENT_TYPE_TAG).cloned(),
        Ok(None) => None,
        Err(err) => {
            tracing::debug!(storage_key = %key, error = %err, "no tags for object");
            None
        }
    };

    let body = Body::from_stream(ReaderStream::new(file));
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), content_type.as_deref(), len);

    Ok(response)
}

fn set_object_headers(headers: &mut HeaderMap, content_type: Option<&str>, len: u64) {
    let content_type = content_type.unwrap_or("application/octet-stream");
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("private, max-age=300"),
    );
}
