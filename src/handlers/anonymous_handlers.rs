//! HTTP handlers for anonymous galleries.
//!
//! The access key in the path is the only credential. Unknown keys are 404,
//! expired galleries 410.

use crate::{
    AppState,
    errors::AppError,
    handlers::gallery_handlers::{ConfirmUploadReq, RequestUploadReq},
    models::views::{AnonymousGalleryView, CreatedAnonymousGallery, SuccessResponse, UploadTicket},
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

/// `POST /api/galleries/anonymous`
pub async fn create_anonymous_gallery(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<CreatedAnonymousGallery>), AppError> {
    let gallery = state
        .galleries
        .create_anonymous()
        .await
        .map_err(AppError::gallery("failed_to_create_gallery"))?;
    Ok((StatusCode::CREATED, Json(CreatedAnonymousGallery::from(&gallery))))
}

/// `POST /api/galleries/anonymous/{accessKey}/media/request-upload`
pub async fn request_upload(
    State(state): State<AppState>,
    Path(access_key): Path<String>,
    Json(req): Json<RequestUploadReq>,
) -> Result<Json<UploadTicket>, AppError> {
    req.validate()?;
    let on_err = || AppError::gallery("failed_to_generate_upload_url");
    let target = state
        .galleries
        .resolve_access_key(&access_key)
        .await
        .map_err(on_err())?;
    let ticket = state
        .galleries
        .request_upload(&target, &req.file_name, &req.content_type)
        .await
        .map_err(on_err())?;
    Ok(Json(ticket))
}

/// `POST /api/galleries/anonymous/{accessKey}/media/confirm-upload`
pub async fn confirm_upload(
    State(state): State<AppState>,
    Path(access_key): Path<String>,
    Json(req): Json<ConfirmUploadReq>,
) -> Result<Json<SuccessResponse>, AppError> {
    let on_err = || AppError::gallery("failed_to_confirm_upload");
    let target = state
        .galleries
        .resolve_access_key(&access_key)
        .await
        .map_err(on_err())?;
    state
        .galleries
        .confirm_upload(&target, req.media_id)
        .await
        .map_err(on_err())?;
    Ok(Json(SuccessResponse::ok()))
}

/// `DELETE /api/galleries/anonymous/{accessKey}/media/{mediaId}`
pub async fn delete_media(
    State(state): State<AppState>,
    Path((access_key, media_id)): Path<(String, Uuid)>,
) -> Result<Json<SuccessResponse>, AppError> {
    let on_err = || AppError::gallery("failed_to_delete_media");
    let target = state
        .galleries
        .resolve_access_key(&access_key)
        .await
        .map_err(on_err())?;
    state
        .galleries
        .delete_media(&target, media_id)
        .await
        .map_err(on_err())?;
    Ok(Json(SuccessResponse::ok()))
}

/// `GET /api/galleries/anonymous/by-short-code/{shortCode}`
pub async fn get_by_short_code(
    State(state): State<AppState>,
    Path(short_code): Path<String>,
) -> Result<Json<AnonymousGalleryView>, AppError> {
    let view = state
        .galleries
        .read_anonymous(&short_code)
        .await
        .map_err(AppError::gallery("failed_to_get_gallery"))?;
    Ok(Json(view))
}
