use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::channel::ChannelValidator;
use crate::core::message::Message;
use crate::core::registry::Registry;
use crate::error::{RelayError, Result};
use crate::handlers::RequestContext;
use crate::storage::SharedPersistenceEngine;

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub channel: String,
    /// Marker for history replay; ignored when no persistence engine is
    /// configured
    #[serde(rename = "lastSeenMessageId")]
    pub last_seen_message_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubscribeResponse {
    #[serde(rename = "subscriptionId")]
    pub subscription_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
    #[serde(rename = "historyRecovered", skip_serializing_if = "Option::is_none")]
    pub history_recovered: Option<bool>,
}

pub struct SubscribeHandler {
    validator: Arc<ChannelValidator>,
    registry: Arc<Registry>,
    store: Option<SharedPersistenceEngine>,
}

impl SubscribeHandler {
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

    pub async fn handle(
        &self,
        ctx: &RequestContext,
        request: SubscribeRequest,
    ) -> Result<SubscribeResponse> {
        self.validator.validate(&request.channel)?;

        let connection = ctx
            .connection()
            .ok_or_else(|| RelayError::internal("connection not available"))?;

        let authorization = connection
            .authorization()
            .ok_or_else(|| RelayError::unauthenticated("authentication required"))?;

        if !authorization.is_subscriber() {
            return Err(RelayError::permission_denied(
                "subscribe scope required to subscribe to a channel",
            ));
        }

        if !authorization.is_authorized(&request.channel) {
            return Err(RelayError::unauthenticated(
                "not authorized to access this channel",
            ));
        }

        self.registry.subscribe(&request.channel, &connection.id)?;

        // History is read after the subscription is registered; a message
        // published in between may appear in both
        let (messages, history_recovered) = match (&self.store, &request.last_seen_message_id) {
            (Some(store), Some(marker)) => {
                let page = store.list(&request.channel, marker).await?;
                (Some(page.messages), Some(page.marker_found))
            }
            _ => (None, None),
        };

        Ok(SubscribeResponse {
            subscription_id: connection.id.clone(),
            timestamp: Utc::now(),
            messages,
            history_recovered,
        })
    }
}
