//! Application configuration loaded from environment variables.
//!
//! On Cloud Run the JWT signing key is injected as an environment variable
//! through a Secret Manager binding, so nothing here talks to GCP directly.

use std::env;

/// Default bearer token lifetime (24 hours).
pub const DEFAULT_JWT_TTL_SECONDS: i64 = 24 * 60 * 60;

/// Longest accepted bearer token lifetime (one year).
pub const MAX_JWT_TTL_SECONDS: i64 = 365 * 24 * 60 * 60;

/// Which `UserStore` implementation backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    /// Process-local store, for local development only.
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(Self::Firestore),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::Invalid("USER_STORE", s.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// Storage backend for user records
    pub user_store: StoreBackend,
    /// Lifetime of issued bearer tokens
    pub jwt_ttl_seconds: i64,

    // --- Secrets ---
    /// JWT signing key for bearer tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let jwt_ttl_seconds = match env::var("JWT_TTL_SECONDS") {
            Ok(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|ttl| (1..=MAX_JWT_TTL_SECONDS).contains(ttl))
                .ok_or_else(|| ConfigError::Invalid("JWT_TTL_SECONDS", raw.clone()))?,
            Err(_) => DEFAULT_JWT_TTL_SECONDS,
        };

        let user_store = match env::var("USER_STORE") {
            Ok(raw) => raw.parse()?,
            Err(_) => StoreBackend::Firestore,
        };

        let jwt_signing_key = env::var("JWT_SIGNING_KEY")
            .map(|v| v.trim().to_string())
            .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?;
        if jwt_signing_key.is_empty() {
            return Err(ConfigError::Missing("JWT_SIGNING_KEY"));
        }

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            user_store,
            jwt_ttl_seconds,
            jwt_signing_key: jwt_signing_key.into_bytes(),
        })
    }

    /// Config for tests: in-memory store and a fixed signing key.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            user_store: StoreBackend::Memory,
            jwt_ttl_seconds: 3600,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
