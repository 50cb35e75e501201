//! Subscriber upgrade of a live connection

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::error::{RelayError, Result};
use crate::handlers::RequestContext;

#[derive(Debug, Deserialize)]
pub struct AuthenticateRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct AuthenticateResponse {
    pub success: bool,
}

pub struct AuthenticateHandler {
    verifier: Arc<TokenVerifier>,
}

impl AuthenticateHandler {
    pub fn new(verifier: Arc<TokenVerifier>) -> Self {
        Self { verifier }
    }

    pub fn handle(
        &self,
        ctx: &RequestContext,
        request: AuthenticateRequest,
    ) -> Result<AuthenticateResponse> {
        let connection = ctx
            .connection()
            .ok_or_else(|| RelayError::internal("connection not available"))?;

        if connection.is_authenticated() {
            return Err(RelayError::failed_precondition(
                "connection is already authenticated",
            ));
        }

        let authorization = self.verifier.verify_token(&request.token)?;

        if !authorization.is_subscriber() {
            return Err(RelayError::invalid_argument(
                "subscribe scope required to authenticate a connection",
            ));
        }

        connection.install_authorization(authorization)?;

        Ok(AuthenticateResponse { success: true })
    }
}
