//! Application state.

use std::sync::Arc;

use kidbank_store::Store;

use crate::auth::JwtKeys;
use crate::config::{ConfigError, ServiceConfig};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Bearer token verification keys.
    pub keys: JwtKeys,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate.
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let secret = config
            .jwt_secret
            .as_deref()
            .ok_or(ConfigError::MissingJwtSecret)?;
        let keys = JwtKeys::from_secret(secret.as_bytes());

        Ok(Self {
            store,
            config,
            keys,
        })
    }
}
