//! HTTP handlers for owned galleries.
//!
//! Everything under `/api/galleries/{id}` requires the owner's bearer token;
//! the `by-short-code` reads are public and go through the access policy.

use crate::{
    AppState,
    errors::AppError,
    handlers::auth::Owner,
    models::views::{GalleryList, GalleryView, SuccessResponse, UploadTicket},
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

/// Body of `POST /api/galleries` and `PUT /api/galleries/{id}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GallerySettings {
    #[serde(default)]
    pub is_public: bool,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestUploadReq {
    pub file_name: String,
    pub content_type: String,
}

impl RequestUploadReq {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.file_name.trim().is_empty() {
            return Err(AppError::bad_request("file_name_required"));
        }
        if self.content_type.trim().is_empty() {
            return Err(AppError::bad_request("content_type_required"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmUploadReq {
    pub media_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct VerifyPasswordReq {
    pub password: String,
}

/// `POST /api/galleries`
pub async fn create_gallery(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Json(req): Json<GallerySettings>,
) -> Result<(StatusCode, Json<GalleryView>), AppError> {
    let on_err = || AppError::gallery("failed_to_create_gallery");
    let gallery = state
        .galleries
        .create_owned(owner, req.is_public, req.password.as_deref())
        .await
        .map_err(on_err())?;
    let view = state.galleries.gallery_view(gallery).await.map_err(on_err())?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// `GET /api/galleries`
pub async fn list_galleries(
    State(state): State<AppState>,
    Owner(owner): Owner,
) -> Result<Json<GalleryList>, AppError> {
    let galleries = state
        .galleries
        .list_owned(owner)
        .await
        .map_err(AppError::gallery("failed_to_list_galleries"))?;
    Ok(Json(GalleryList {
        total_count: galleries.len(),
        galleries,
    }))
}

/// `GET /api/galleries/{id}`
pub async fn get_gallery(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<Uuid>,
) -> Result<Json<GalleryView>, AppError> {
    let view = state
        .galleries
        .get_owned(owner, id)
        .await
        .map_err(AppError::gallery("failed_to_get_gallery"))?;
    Ok(Json(view))
}

/// `PUT /api/galleries/{id}`
pub async fn update_gallery(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<Uuid>,
    Json(req): Json<GallerySettings>,
) -> Result<Json<GalleryView>, AppError> {
    let view = state
        .galleries
        .update_owned(owner, id, req.is_public, req.password.as_deref())
        .await
        .map_err(AppError::gallery("failed_to_update_gallery"))?;
    Ok(Json(view))
}

/// `DELETE /api/galleries/{id}`
pub async fn delete_gallery(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<Uuid>,
) -> Result<Json<SuccessResponse>, AppError> {
    let on_err = || AppError::gallery("failed_to_delete_gallery");
    let target = state.galleries.owned_by(owner, id).await.map_err(on_err())?;
    state.galleries.delete_gallery(&target).await.map_err(on_err())?;
    Ok(Json(SuccessResponse::ok()))
}

/// `POST /api/galleries/{id}/media/request-upload`
pub async fn request_upload(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<Uuid>,
    Json(req): Json<RequestUploadReq>,
) -> Result<Json<UploadTicket>, AppError> {
    req.validate()?;
    let on_err = || AppError::gallery("failed_to_generate_upload_url");
    let target = state.galleries.owned_by(owner, id).await.map_err(on_err())?;
    let ticket = state
        .galleries
        .request_upload(&target, &req.file_name, &req.content_type)
        .await
        .map_err(on_err())?;
    Ok(Json(ticket))
}

/// `POST /api/galleries/{id}/media/confirm-upload`
pub async fn confirm_upload(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<Uuid>,
    Json(req): Json<ConfirmUploadReq>,
) -> Result<Json<SuccessResponse>, AppError> {
    let on_err = || AppError::gallery("failed_to_confirm_upload");
    let target = state.galleries.owned_by(owner, id).await.map_err(on_err())?;
    state
        .galleries
        .confirm_upload(&target, req.media_id)
        .await
        .map_err(on_err())?;
    Ok(Json(SuccessResponse::ok()))
}

/// `DELETE /api/galleries/{id}/media/{mediaId}`
pub async fn delete_media(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path((id, media_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<SuccessResponse>, AppError> {
    let on_err = || AppError::gallery("failed_to_delete_media");
    let target = state.galleries.owned_by(owner, id).await.map_err(on_err())?;
    state
        .galleries
        .delete_media(&target, media_id)
        .await
        .map_err(on_err())?;
    Ok(Json(SuccessResponse::ok()))
}

/// `GET /api/galleries/by-short-code/{shortCode}`
pub async fn get_by_short_code(
    State(state): State<AppState>,
    Path(short_code): Path<String>,
) -> Result<Json<GalleryView>, AppError> {
    let view = state
        .galleries
        .read_public(&short_code)
        .await
        .map_err(AppError::gallery("failed_to_get_gallery"))?;
    Ok(Json(view))
}

/// `POST /api/galleries/by-short-code/{shortCode}/verify-password`
pub async fn verify_password(
    State(state): State<AppState>,
    Path(short_code): Path<String>,
    Json(req): Json<VerifyPasswordReq>,
) -> Result<Json<GalleryView>, AppError> {
    let view = state
        .galleries
        .verify_password(&short_code, &req.password)
        .await
        .map_err(AppError::gallery("failed_to_verify_password"))?;
    Ok(Json(view))
}
