//! Health and readiness handlers.
//!
//! - GET /healthz  -> liveness ("ok")
//! - GET /readyz   -> SQLite and media storage checks

use crate::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::SqlitePool;
use std::{collections::HashMap, path::Path};
use tokio::fs;
use uuid::Uuid;

const SCRATCH_BODY: &[u8] = b"readyz";

/// `GET /healthz`
///
/// Liveness probe. Always 200, performs no I/O.
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// `GET /readyz`
///
/// `SELECT 1` against SQLite, then a write/read/delete of a scratch file in
/// the media storage directory. 503 if either fails.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let sqlite = CheckStatus::from(check_sqlite(&state.db).await);
    let storage = CheckStatus::from(check_storage(state.storage_dir()).await);

    let ready = sqlite.ok && storage.ok;
    if !ready {
        tracing::warn!(
            sqlite_ok = sqlite.ok,
            storage_ok = storage.ok,
            "readiness check failed"
        );
    }

    let checks = HashMap::from([("sqlite", sqlite), ("disk", storage)]);
    let (status, label) = if ready {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "error")
    };
    (
        status,
        Json(ReadyResponse {
            status: label,
            checks,
        }),
    )
}

async fn check_sqlite(db: &SqlitePool) -> Result<(), String> {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(db).await {
        Ok(1) => Ok(()),
        Ok(v) => Err(format!("unexpected result: {}", v)),
        Err(e) => Err(format!("error: {}", e)),
    }
}

/// The storage directory may not exist until the first upload lands.
async fn check_storage(dir: &Path) -> Result<(), String> {
    fs::create_dir_all(dir)
        .await
        .map_err(|e| format!("could not create storage dir: {}", e))?;

    let scratch = dir.join(format!(".readyz-{}", Uuid::new_v4()));
    if let Err(e) = fs::write(&scratch, SCRATCH_BODY).await {
        return Err(format!("could not write scratch file: {}", e));
    }
    let read_back = fs::read(&scratch).await;
    let removed = fs::remove_file(&scratch).await;

    match read_back {
        Ok(bytes) if bytes == SCRATCH_BODY => {}
        Ok(_) => return Err("scratch file content mismatch".to_string()),
        Err(e) => return Err(format!("could not read scratch file: {}", e)),
    }
    if let Err(e) = removed {
        tracing::debug!(path = %scratch.display(), error = %e, "scratch file left behind");
    }
    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl From<Result<(), String>> for CheckStatus {
    fn from(result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self {
                ok: true,
                error: None,
            },
            Err(error) => Self {
                ok: false,
                error: Some(error),
            },
        }
    }
}
