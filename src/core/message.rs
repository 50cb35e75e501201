use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single published message, fanned out verbatim to every subscriber
/// of its channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "createTime")]
    pub create_time: DateTime<Utc>,
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    pub payload: serde_json::Value,
}

impl Message {
    /// Create a message with a freshly generated id and the current
    /// wall-clock time
    pub fn new(channel: String, event: Option<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            create_time: Utc::now(),
            channel,
            event,
            payload,
        }
    }
}
