use serde::Deserialize;
use std::sync::Arc;

use crate::core::channel::ChannelValidator;
use crate::core::message::Message;
use crate::core::registry::Registry;
use crate::error::{RelayError, Result};
use crate::handlers::RequestContext;
use crate::storage::SharedPersistenceEngine;

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub channel: String,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

pub struct PublishHandler {
    validator: Arc<ChannelValidator>,
    registry: Arc<Registry>,
    store: Option<SharedPersistenceEngine>,
}

impl PublishHandler {
    pub fn new(
        validator: Arc<ChannelValidator>,
        registry: Arc<Registry>,
        store: Option<SharedPersistenceEngine>,
    ) -> Self {
        Self {
            validator,
            registry,
            store,
        }
    }

    /// Build the message, persist it when a store is configured, then
    /// fan it out. The constructed message is the result.
    pub async fn handle(&self, ctx: &RequestContext, request: PublishRequest) -> Result<Message> {
        let authorization = ctx
            .authorization()
            .ok_or_else(|| RelayError::unauthenticated("not authenticated"))?;

        if !authorization.is_publisher() {
            return Err(RelayError::permission_denied(
                "publish scope required to publish messages",
            ));
        }

        if !authorization.is_authorized(&request.channel) {
            return Err(RelayError::permission_denied(
                "not authorized to publish to this channel",
            ));
        }

        self.validator.validate(&request.channel)?;

        let message = Message::new(request.channel, request.event, request.payload);

        if let Some(store) = &self.store {
            store.save(&message).await.map_err(|e| {
                RelayError::internal(format!("failed to persist message: {}", e.message))
            })?;
        }

        self.registry.broadcast(message.clone());

        Ok(message)
    }
}
