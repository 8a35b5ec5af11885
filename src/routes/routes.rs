//! Defines routes for the gallery API and the object routes behind it.
//!
//! ## Structure
//! - **Anonymous galleries** (access key in the path)
//!   - `POST   /api/galleries/anonymous`
//!   - `POST   /api/galleries/anonymous/{accessKey}/media/request-upload`
//!   - `POST   /api/galleries/anonymous/{accessKey}/media/confirm-upload`
//!   - `DELETE /api/galleries/anonymous/{accessKey}/media/{mediaId}`
//!   - `GET    /api/galleries/anonymous/by-short-code/{shortCode}`
//!
//! - **Owned galleries** (bearer token)
//!   - `GET|POST          /api/galleries`
//!   - `GET|PUT|DELETE    /api/galleries/{id}`
//!   - `POST              /api/galleries/{id}/media/request-upload`
//!   - `POST              /api/galleries/{id}/media/confirm-upload`
//!   - `DELETE            /api/galleries/{id}/media/{mediaId}`
//!
//! - **Public reads**
//!   - `GET  /api/galleries/by-short-code/{shortCode}`
//!   - `POST /api/galleries/by-short-code/{shortCode}/verify-password`
//!
//! - **Objects** (pre-signed query string)
//!   - `PUT|GET /objects/{*key}`
//!
//! The wildcard `*key` allows nested keys like `galleries/user/{uid}/{gid}/{mid}/a.jpg`.

use crate::{
    AppState,
    handlers::{
        anonymous_handlers, gallery_handlers,
        health_handlers::{healthz, readyz},
        object_handlers::{get_object, upload_object},
    },
};
use axum::{
    Router,
    routing::{delete, get, post, put},
};

/// Build and return the router for every route the service exposes.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/objects/{*key}", put(upload_object).get(get_object))
        // Anonymous galleries
        .route(
            "/api/galleries/anonymous",
            post(anonymous_handlers::create_anonymous_gallery),
        )
        .route(
            "/api/galleries/anonymous/by-short-code/{short_code}",
            get(anonymous_handlers::get_by_short_code),
        )
        .route(
            "/api/galleries/anonymous/{access_key}/media/request-upload",
            post(anonymous_handlers::request_upload),
        )
        .route(
            "/api/galleries/anonymous/{access_key}/media/confirm-upload",
            post(anonymous_handlers::confirm_upload),
        )
        .route(
            "/api/galleries/anonymous/{access_key}/media/{media_id}",
            delete(anonymous_handlers::delete_media),
        )
        // Public reads
        .route(
            "/api/galleries/by-short-code/{short_code}",
            get(gallery_handlers::get_by_short_code),
        )
        .route(
            "/api/galleries/by-short-code/{short_code}/verify-password",
            post(gallery_handlers::verify_password),
        )
        // Owned galleries
        .route(
            "/api/galleries",
            get(gallery_handlers::list_galleries).post(gallery_handlers::create_gallery),
        )
        .route(
            "/api/galleries/{id}",
            get(gallery_handlers::get_gallery)
                .put(gallery_handlers::update_gallery)
                .delete(gallery_handlers::delete_gallery),
        )
        .route(
            "/api/galleries/{id}/media/request-upload",
            post(gallery_handlers::request_upload),
        )
        .route(
            "/api/galleries/{id}/media/confirm-upload",
            post(gallery_handlers::confirm_upload),
        )
        .route(
            "/api/galleries/{id}/media/{media_id}",
            delete(gallery_handlers::delete_media),
        )
}
