use std::path::PathBuf;

use axum::http::HeaderValue;
use scenegen_core::config::{env_optional, env_parse_or, parse_value, split_list, ConfigError};

use crate::auth::jwt::JwtConfig;

const DEFAULT_MAX_ARTIFACT_BYTES: usize = 32 * 1024 * 1024;

/// Where stored blobs live and how they are addressed.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory blobs are written under.
    pub root: PathBuf,
    /// Prefix joined with the storage path to form `storage_url`.
    pub public_base_url: String,
}

/// Server configuration loaded from environment variables.
///
/// Every field except the JWT secret has a default suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Graceful shutdown timeout in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Timeout for fetching a remote artifact (default: `60`).
    pub fetch_timeout_secs: u64,
    /// Body limit of `POST /api/v1/assets`, which carries inline data URIs
    /// (default: 32 MiB).
    pub max_artifact_bytes: usize,
    /// JWT token configuration.
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                    |
    /// |---------------------------|----------------------------|
    /// | `HOST`                    | `0.0.0.0`                  |
    /// | `PORT`                    | `3000`                     |
    /// | `CORS_ORIGINS`            | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`   | `30`                       |
    /// | `FETCH_TIMEOUT_SECS`      | `60`                       |
    /// | `MAX_ARTIFACT_BYTES`      | `33554432`                 |
    /// | `STORAGE_ROOT`            | `./storage/assets`         |
    /// | `STORAGE_PUBLIC_BASE_URL` | `file://storage/assets`    |
    ///
    /// Invalid CORS origins are rejected here so a misconfigured server
    /// fails at startup.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env_optional("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = env_parse_or("PORT", 3000)?;

        let raw_origins =
            env_optional("CORS_ORIGINS").unwrap_or_else(|| "http://localhost:5173".into());
        let cors_origins = split_list(&raw_origins);
        for origin in &cors_origins {
            parse_value::<HeaderValue>("CORS_ORIGINS", origin)?;
        }

        let request_timeout_secs: u64 = env_parse_or("REQUEST_TIMEOUT_SECS", 30)?;
        let shutdown_timeout_secs: u64 = env_parse_or("SHUTDOWN_TIMEOUT_SECS", 30)?;
        let fetch_timeout_secs: u64 = env_parse_or("FETCH_TIMEOUT_SECS", 60)?;
        let max_artifact_bytes: usize =
            env_parse_or("MAX_ARTIFACT_BYTES", DEFAULT_MAX_ARTIFACT_BYTES)?;

        let jwt = JwtConfig::from_env()?;

        let storage = StorageConfig {
            root: env_optional("STORAGE_ROOT")
                .unwrap_or_else(|| "./storage/assets".into())
                .into(),
            public_base_url: env_optional("STORAGE_PUBLIC_BASE_URL")
                .unwrap_or_else(|| "file://storage/assets".into()),
        };

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            fetch_timeout_secs,
            max_artifact_bytes,
            jwt,
            storage,
        })
    }
}
