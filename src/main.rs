use anyhow::{Context, Result};
use kappi::{
    AppState,
    config::{AppConfig, Command},
    create_app,
    services::{
        cleanup::CleanupScheduler, clock::SystemClock, repository::SqliteGalleryStore,
        signing::Signer,
    },
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + command ---
    let (cfg, command) = AppConfig::from_env_and_args()?;
    let signer = Signer::new(&cfg.signing_secret)
        .map_err(|err| anyhow::anyhow!("invalid signing secret: {}", err))?;

    if let Command::IssueToken(user_id) = command {
        println!("{}", signer.issue_owner_token(user_id));
        return Ok(());
    }

    tracing::info!(
        host = %cfg.host,
        port = cfg.port,
        storage_dir = %cfg.storage_dir,
        database_url = %cfg.database_url,
        public_base_url = %cfg.public_base_url,
        "starting kappi"
    );

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let options = SqliteConnectOptions::from_str(db_url)
        .with_context(|| format!("parsing database url `{}`", db_url))?
        .create_if_missing(true)
        .foreign_keys(true);
    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?,
    );

    // --- Handle migration mode ---
    let store = SqliteGalleryStore::new(db.clone());
    if command == Command::Migrate {
        store.run_migrations().await?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize core services ---
    let presign_ttl = chrono::Duration::from_std(cfg.presign_ttl)
        .context("presign ttl out of range")?;
    let state = AppState::new(
        db.clone(),
        cfg.storage_dir.clone(),
        cfg.public_base_url.clone(),
        presign_ttl,
        signer,
        Arc::new(SystemClock),
    );

    let cancel = CancellationToken::new();
    let cleanup = CleanupScheduler::spawn(
        state.galleries.clone(),
        cfg.cleanup_interval,
        cancel.clone(),
    );

    // --- Build router ---
    let app = create_app(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    if let Err(err) = cleanup.await {
        tracing::error!(error = %err, "cleanup task ended abnormally");
    }
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received (Ctrl+C)");
}
