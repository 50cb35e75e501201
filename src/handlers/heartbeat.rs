use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub timestamp: i64,
}

pub struct HeartbeatHandler;

impl HeartbeatHandler {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self) -> HeartbeatResponse {
        HeartbeatResponse {
            timestamp: Utc::now().timestamp(),
        }
    }
}

impl Default for HeartbeatHandler {
    fn default() -> Self {
        Self::new()
    }
}
