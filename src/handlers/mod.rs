//! Request handlers, one per wire method, plus the router and the
//! transport-facing servers

pub mod authenticate;
pub mod heartbeat;
pub mod http;
pub mod publish;
pub mod router;
pub mod subscribe;
pub mod unsubscribe;
pub mod websocket;

use std::sync::Arc;

use crate::auth::Authorization;
use crate::core::connection::Connection;

// Re-export main components
pub use router::Router;
pub use websocket::handle_ws_client;

/// Per-request carrier for the two authorization sources: the calling
/// connection (persistent stream) or an ambient record attached by the
/// HTTP publish endpoint
#[derive(Clone, Default)]
pub struct RequestContext {
    connection: Option<Arc<Connection>>,
    ambient_authorization: Option<Arc<Authorization>>,
}

impl RequestContext {
    pub fn for_connection(connection: Arc<Connection>) -> Self {
        Self {
            connection: Some(connection),
            ambient_authorization: None,
        }
    }

    pub fn for_ambient(authorization: Arc<Authorization>) -> Self {
        Self {
            connection: None,
            ambient_authorization: Some(authorization),
        }
    }

    pub fn connection(&self) -> Option<&Arc<Connection>> {
        self.connection.as_ref()
    }

    /// Authorization in priority order: the connection's installed
    /// record, then the ambient record
    pub fn authorization(&self) -> Option<Arc<Authorization>> {
        if let Some(connection) = &self.connection {
            if let Some(auth) = connection.authorization() {
                return Some(auth);
            }
        }

        self.ambient_authorization.clone()
    }
}
