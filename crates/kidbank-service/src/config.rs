//! Service configuration.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Configuration problems that stop the service from starting.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No JWT secret in the environment or the secrets file.
    #[error("JWT_SECRET is not set and no .secrets/auth.json was found")]
    MissingJwtSecret,

    /// A tick interval of zero would spin.
    #[error("{0} must be at least 1 second")]
    ZeroInterval(&'static str),
}

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Port to listen on, bound on all interfaces (default: 8080).
    pub server_port: u16,

    /// `SQLite` database URL (default: "sqlite://kidbank.db").
    pub database_url: String,

    /// Connection pool size (default: 5).
    pub database_max_connections: u32,

    /// HS256 secret used to verify bearer tokens.
    pub jwt_secret: Option<String>,

    /// Frontend URL, always allowed by CORS when origins are restricted.
    pub frontend_url: String,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Seconds between allowance ticker scans.
    pub allowance_tick_seconds: u64,

    /// Seconds between interest ticker scans.
    pub interest_tick_seconds: u64,
}

/// Auth secrets file structure.
#[derive(Debug, Deserialize)]
struct AuthSecrets {
    jwt_secret: String,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            server_port: env_or("SERVER_PORT", defaults.server_port),
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            database_max_connections: env_or(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            ),
            jwt_secret: load_jwt_secret(),
            frontend_url: std::env::var("FRONTEND_URL").unwrap_or(defaults.frontend_url),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            max_body_bytes: env_or("MAX_BODY_BYTES", defaults.max_body_bytes),
            request_timeout_seconds: env_or(
                "REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout_seconds,
            ),
            allowance_tick_seconds: env_or(
                "ALLOWANCE_TICK_SECONDS",
                defaults.allowance_tick_seconds,
            ),
            interest_tick_seconds: env_or("INTEREST_TICK_SECONDS", defaults.interest_tick_seconds),
        }
    }

    /// Check that the configuration can run the service.
    ///
    /// # Errors
    ///
    /// Returns an error if the JWT secret is missing or empty, or a tick
    /// interval is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingJwtSecret);
        }
        if self.allowance_tick_seconds == 0 {
            return Err(ConfigError::ZeroInterval("ALLOWANCE_TICK_SECONDS"));
        }
        if self.interest_tick_seconds == 0 {
            return Err(ConfigError::ZeroInterval("INTEREST_TICK_SECONDS"));
        }
        Ok(())
    }

    /// Socket address to bind.
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.server_port)
    }

    /// Allowance scan interval.
    #[must_use]
    pub const fn allowance_tick(&self) -> Duration {
        Duration::from_secs(self.allowance_tick_seconds)
    }

    /// Interest scan interval.
    #[must_use]
    pub const fn interest_tick(&self) -> Duration {
        Duration::from_secs(self.interest_tick_seconds)
    }
}

/// Load the JWT secret from file or environment.
fn load_jwt_secret() -> Option<String> {
    let secret_paths = [".secrets/auth.json", "../.secrets/auth.json"];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<AuthSecrets>(path) {
            tracing::info!(path = %path, "Loaded auth secrets from file");
            return Some(secrets.jwt_secret);
        }
    }

    tracing::debug!("Auth secrets file not found, using environment variables");
    std::env::var("JWT_SECRET").ok()
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server_port: 8080,
            database_url: "sqlite://kidbank.db".into(),
            database_max_connections: 5,
            jwt_secret: None,
            frontend_url: "http://localhost:3000".into(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 64 * 1024,
            request_timeout_seconds: 30,
            allowance_tick_seconds: 60,
            interest_tick_seconds: 60,
        }
    }
}
