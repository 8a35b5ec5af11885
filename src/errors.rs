use crate::services::gallery_service::GalleryError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// HTTP-facing error. `message` is a stable reason code, never internal detail.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Map a lifecycle error, reporting internal failures as `failure_code`.
    ///
    /// Use as `.map_err(AppError::gallery("failed_to_create_gallery"))`.
    pub fn gallery(failure_code: &'static str) -> impl FnOnce(GalleryError) -> AppError {
        move |err| match err {
            GalleryError::NotFound(reason) => Self::new(StatusCode::NOT_FOUND, reason),
            GalleryError::Gone(reason) => Self::new(StatusCode::GONE, reason),
            GalleryError::Unauthorized(reason) => Self::unauthorized(reason),
            err @ (GalleryError::ShortCodeExhausted | GalleryError::Internal(_)) => {
                tracing::error!(error = %err, code = failure_code, "request failed");
                Self::internal(failure_code)
            }
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<GalleryError> for AppError {
    fn from(err: GalleryError) -> Self {
        AppError::gallery("internal_error")(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_errors_map_to_status_and_reason() {
        let cases = [
            (GalleryError::NotFound("media_not_found"), 404, "media_not_found"),
            (GalleryError::Gone("gallery_expired"), 410, "gallery_expired"),
            (GalleryError::Unauthorized("invalid_password"), 401, "invalid_password"),
            (GalleryError::ShortCodeExhausted, 500, "failed_to_create_gallery"),
        ];
        for (err, status, reason) in cases {
            let app = AppError::gallery("failed_to_create_gallery")(err);
            assert_eq!(app.status.as_u16(), status);
            assert_eq!(app.message, reason);
        }
    }

    #[test]
    fn internal_detail_is_not_exposed() {
        let app = AppError::gallery("failed_to_delete_media")(GalleryError::Internal(
            "disk on fire at /srv/media".into(),
        ));
        assert_eq!(app.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(app.message, "failed_to_delete_media");
    }
}
