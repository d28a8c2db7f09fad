use std::time::Duration;

use anyhow::{Context, Result};

/// S3 / MinIO settings. Present only when `S3_BUCKET` is set; otherwise reports
/// are kept on local disk under `upload_dir`.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub jwt_secret: String,
    pub assessment_base_url: String,
    pub assessment_timeout: Duration,
    pub s3: Option<S3Config>,
    pub upload_dir: String,
    pub poll_interval: Duration,
    pub poll_max_attempts: i32,
    pub poll_concurrency: usize,
    pub cors_origins: Vec<String>,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let s3 = match std::env::var("S3_BUCKET") {
            Ok(bucket) if !bucket.is_empty() => Some(S3Config {
                bucket,
                endpoint: require_env("S3_ENDPOINT")?,
                access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
                secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            }),
            _ => None,
        };

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            db_max_connections: parse_env("DB_MAX_CONNECTIONS", 10)?,
            jwt_secret: require_env("JWT_SECRET")?,
            assessment_base_url: require_env("ASSESSMENT_BASE_URL")?
                .trim_end_matches('/')
                .to_string(),
            assessment_timeout: Duration::from_secs(parse_env("ASSESSMENT_TIMEOUT_SECS", 30)?),
            s3,
            upload_dir: std::env::var("UPLOAD_DIR")
                .unwrap_or_else(|_| "Uploads/Resources".to_string()),
            poll_interval: Duration::from_secs(parse_env("POLL_INTERVAL_SECS", 5)?),
            poll_max_attempts: parse_env("POLL_MAX_ATTEMPTS", 120)?,
            poll_concurrency: parse_env("POLL_CONCURRENCY", 16)?,
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|v| split_origins(&v))
                .unwrap_or_default(),
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: '{raw}'")),
        Err(_) => Ok(default),
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
