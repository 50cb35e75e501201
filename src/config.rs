//! Server configuration module
//! Handles environment-driven configuration for the broker

use crate::constants::{DEFAULT_BASE_PATH, DEFAULT_HOST, DEFAULT_MAX_FRAME_BYTES, DEFAULT_PORT};
use crate::error::{RelayError, Result};
use std::env;

/// Log output encoding selected via LOG_ENCODING
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEncoding {
    Console,
    Json,
}

/// Server configuration parameters
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Shared secret for verifying session tokens
    pub jwt_secret: String,
    /// Pre-shared keys accepted on the HTTP publish endpoint
    pub api_keys: Vec<String>,
    /// Single path segment all routes are mounted under
    pub base_path: String,
    pub log_encoding: LogEncoding,
    /// Maximum inbound WebSocket frame size in bytes
    pub max_frame_bytes: usize,
    /// Message history backend ("memory"), None disables history replay
    pub history_backend: Option<String>,
}

impl ServerConfig {
    /// Create a test configuration - only for tests
    #[cfg(test)]
    pub fn for_testing() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            jwt_secret: "test-jwt-secret-only-for-unit-tests".to_string(),
            api_keys: vec!["test-api-key".to_string()],
            base_path: DEFAULT_BASE_PATH.to_string(),
            log_encoding: LogEncoding::Console,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            history_backend: None,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let host = env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| {
            RelayError::internal("JWT_SECRET environment variable is required")
        })?;

        let api_keys: Vec<String> = env::var("API_KEYS")
            .map_err(|_| RelayError::internal("API_KEYS environment variable is required"))?
            .split(',')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        if api_keys.is_empty() {
            return Err(RelayError::internal("API_KEYS must contain at least one key"));
        }

        let base_path = env::var("BASE_PATH")
            .map(|p| p.trim_matches('/').to_string())
            .unwrap_or_else(|_| DEFAULT_BASE_PATH.to_string());

        let log_encoding = match env::var("LOG_ENCODING").as_deref() {
            Ok("json") => LogEncoding::Json,
            _ => LogEncoding::Console,
        };

        let max_frame_bytes = env::var("MAX_FRAME_BYTES")
            .ok()
            .and_then(|b| b.parse().ok())
            .unwrap_or(DEFAULT_MAX_FRAME_BYTES);

        let history_backend = env::var("HISTORY_BACKEND").ok().filter(|b| !b.is_empty());

        if let Some(ref backend) = history_backend {
            if backend != "memory" {
                return Err(RelayError::internal(format!(
                    "unsupported HISTORY_BACKEND: {}",
                    backend
                )));
            }
        }

        Ok(Self {
            host,
            port,
            jwt_secret,
            api_keys,
            base_path,
            log_encoding,
            max_frame_bytes,
            history_backend,
        })
    }
}
