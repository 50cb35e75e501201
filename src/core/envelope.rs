//! Framed request/response envelopes with correlation ids
//!
//! A request with id 0 (or no id on the wire) is a notification and must
//! never be replied to.

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

fn is_zero(id: &i64) -> bool {
    *id == 0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: i64,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Request {
    pub fn notification(method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            id: 0,
            method: method.into(),
            params: Some(params),
        }
    }

    pub fn reply_expected(&self) -> bool {
        self.id != 0
    }

    pub fn reply(&self, result: serde_json::Value) -> Response {
        Response {
            request_id: self.id,
            result: Some(result),
            error: None,
        }
    }

    pub fn reply_with_error(&self, error: RelayError) -> Response {
        Response {
            request_id: self.id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "requestId", default, skip_serializing_if = "is_zero")]
    pub request_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RelayError>,
}

impl Response {
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}
