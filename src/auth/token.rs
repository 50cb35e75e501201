use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::auth::{Authorization, Scope};
use crate::constants::{TOKEN_AUDIENCE, TOKEN_LEEWAY_SECS};
use crate::error::{RelayError, Result};
use crate::security::timing::constant_time_eq;

/// Session token claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    #[serde(default)]
    pub sub: String,
    /// Channels this subject may subscribe or publish to
    #[serde(default, rename = "authorizedChannels")]
    pub authorized_channels: Vec<String>,
    /// Granted scopes; recognized values are "publish" and "subscribe"
    #[serde(default)]
    pub scope: Vec<String>,
}

/// Verifies session tokens and pre-shared API keys
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
    api_keys: Vec<String>,
}

impl TokenVerifier {
    pub fn new(secret: &str, api_keys: Vec<String>) -> Self {
        // HMAC-SHA256 only; expiration required; audience pinned
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = TOKEN_LEEWAY_SECS;
        validation.set_audience(&[TOKEN_AUDIENCE]);
        validation.set_required_spec_claims(&["exp", "aud"]);

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            api_keys,
        }
    }

    /// Validate a signed session token and derive its authorization record
    pub fn verify_token(&self, token: &str) -> Result<Authorization> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| RelayError::unauthenticated(format!("invalid token: {}", e)))?;

        let claims = token_data.claims;

        if claims.sub.is_empty() {
            return Err(RelayError::invalid_argument("invalid subject claim"));
        }

        if claims.authorized_channels.is_empty() {
            return Err(RelayError::invalid_argument(
                "authorized channels cannot be empty",
            ));
        }

        let scopes: HashSet<Scope> = claims
            .scope
            .iter()
            .filter_map(|s| Scope::parse(s))
            .collect();

        Ok(Authorization {
            subject: claims.sub,
            authorized_channels: claims.authorized_channels.into_iter().collect(),
            scopes,
            is_admin: false,
        })
    }

    /// Verify a pre-shared API key using a constant-time comparison
    pub fn verify_api_key(&self, candidate: &str) -> Result<Authorization> {
        for key in &self.api_keys {
            if constant_time_eq(candidate, key) {
                return Ok(Authorization {
                    subject: "api".to_string(),
                    authorized_channels: HashSet::new(),
                    scopes: [Scope::Publish].into_iter().collect(),
                    is_admin: true,
                });
            }
        }

        Err(RelayError::unauthenticated("invalid api key"))
    }
}

/// Extracts bearer token from an Authorization header value
pub fn extract_bearer_token(auth_header: &str) -> Option<String> {
    auth_header
        .strip_prefix("Bearer ")
        .map(|token| token.to_string())
}
