use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};
use uuid::Uuid;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Root of the on-disk object store.
    pub storage_dir: String,
    pub database_url: String,
    /// Origin clients use to reach this server; pre-signed URLs start with it.
    pub public_base_url: String,
    pub signing_secret: String,
    pub presign_ttl: Duration,
    pub cleanup_interval: Duration,
}

/// What to do after loading configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Serve,
    Migrate,
    IssueToken(Uuid),
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Photo and video gallery sharing API")]
pub struct Args {
    /// Host to bind to (overrides KAPPI_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides KAPPI_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where uploaded media is stored (overrides KAPPI_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides KAPPI_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Public origin used in pre-signed URLs (overrides KAPPI_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Seconds a pre-signed URL stays valid (overrides KAPPI_PRESIGN_TTL_SECS)
    #[arg(long)]
    pub presign_ttl_secs: Option<u64>,

    /// Seconds between expiry sweeps (overrides KAPPI_CLEANUP_INTERVAL_SECS)
    #[arg(long)]
    pub cleanup_interval_secs: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,

    /// Print an owner bearer token for this user id and exit
    #[arg(long, value_name = "USER_ID")]
    pub issue_token: Option<Uuid>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the command to run.
    pub fn from_env_and_args() -> Result<(Self, Command)> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<(Self, Command)> {
        // --- Environment fallback ---
        let env_host = env::var("KAPPI_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parse("KAPPI_PORT", 3000u16)?;
        let env_storage =
            env::var("KAPPI_STORAGE_DIR").unwrap_or_else(|_| "./data/media".into());
        let env_db = env::var("KAPPI_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/kappi.db".into());
        let env_ttl = env_parse("KAPPI_PRESIGN_TTL_SECS", 15 * 60u64)?;
        let env_interval = env_parse("KAPPI_CLEANUP_INTERVAL_SECS", 60 * 60u64)?;

        let port = args.port.unwrap_or(env_port);
        let env_base_url = env::var("KAPPI_PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", port));

        let signing_secret = match env::var("KAPPI_SIGNING_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            Ok(_) | Err(env::VarError::NotPresent) => {
                bail!("KAPPI_SIGNING_SECRET must be set to a non-empty value")
            }
            Err(err) => return Err(err).context("reading KAPPI_SIGNING_SECRET"),
        };

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port,
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            public_base_url: args.public_base_url.unwrap_or(env_base_url),
            signing_secret,
            presign_ttl: Duration::from_secs(args.presign_ttl_secs.unwrap_or(env_ttl)),
            cleanup_interval: Duration::from_secs(
                args.cleanup_interval_secs.unwrap_or(env_interval).max(1),
            ),
        };

        let command = match (args.migrate, args.issue_token) {
            (true, Some(_)) => bail!("--migrate and --issue-token cannot be combined"),
            (true, None) => Command::Migrate,
            (false, Some(user_id)) => Command::IssueToken(user_id),
            (false, None) => Command::Serve,
        };

        Ok((cfg, command))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
