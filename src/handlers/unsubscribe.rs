use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::channel::ChannelValidator;
use crate::core::registry::Registry;
use crate::error::{RelayError, Result};
use crate::handlers::RequestContext;

#[derive(Debug, Deserialize)]
pub struct UnsubscribeRequest {
    pub channel: String,
}

#[derive(Debug, Serialize)]
pub struct UnsubscribeResponse {
    pub success: bool,
}

pub struct UnsubscribeHandler {
    validator: Arc<ChannelValidator>,
    registry: Arc<Registry>,
}

impl UnsubscribeHandler {
    pub fn new(validator: Arc<ChannelValidator>, registry: Arc<Registry>) -> Self {
        Self {
            validator,
            registry,
        }
    }

    pub fn handle(
        &self,
        ctx: &RequestContext,
        request: UnsubscribeRequest,
    ) -> Result<UnsubscribeResponse> {
        self.validator.validate(&request.channel)?;

        let connection = ctx
            .connection()
            .ok_or_else(|| RelayError::internal("connection not available"))?;

        self.registry.unsubscribe(&request.channel, &connection.id);

        Ok(UnsubscribeResponse { success: true })
    }
}
