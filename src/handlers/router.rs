//! Dispatches parsed requests to the method handlers and marshals
//! results and errors back into envelopes

use log::{debug, error};
use serde::de::DeserializeOwned;
use tokio::time::timeout;

use crate::constants::HANDLER_DEADLINE;
use crate::core::envelope::{Request, Response};
use crate::error::{RelayError, Result};
use crate::handlers::authenticate::AuthenticateHandler;
use crate::handlers::heartbeat::HeartbeatHandler;
use crate::handlers::publish::PublishHandler;
use crate::handlers::subscribe::SubscribeHandler;
use crate::handlers::unsubscribe::UnsubscribeHandler;
use crate::handlers::RequestContext;

pub struct Router {
    heartbeat: HeartbeatHandler,
    authenticate: AuthenticateHandler,
    subscribe: SubscribeHandler,
    unsubscribe: UnsubscribeHandler,
    publish: std::sync::Arc<PublishHandler>,
}

impl Router {
    pub fn new(
        heartbeat: HeartbeatHandler,
        authenticate: AuthenticateHandler,
        subscribe: SubscribeHandler,
        unsubscribe: UnsubscribeHandler,
        publish: std::sync::Arc<PublishHandler>,
    ) -> Self {
        Self {
            heartbeat,
            authenticate,
            subscribe,
            unsubscribe,
            publish,
        }
    }

    /// Route one request. Returns the reply envelope, or None for
    /// notifications, which are never replied to.
    pub async fn route(&self, ctx: &RequestContext, request: Request) -> Option<Response> {
        debug!(
            "request received: method={} id={}",
            request.method, request.id
        );

        let result = match timeout(HANDLER_DEADLINE, self.dispatch(ctx, &request)).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::internal("handler deadline exceeded")),
        };

        match result {
            Ok(value) => {
                if !request.reply_expected() {
                    debug!(
                        "dropping result for notification: method={}",
                        request.method
                    );
                    return None;
                }

                Some(request.reply(value))
            }
            Err(err) => {
                if err.code == crate::error::ErrorKind::Internal {
                    error!("internal error in handler {}: {}", request.method, err);
                }

                if !request.reply_expected() {
                    return None;
                }

                Some(request.reply_with_error(err))
            }
        }
    }

    async fn dispatch(&self, ctx: &RequestContext, request: &Request) -> Result<serde_json::Value> {
        match request.method.as_str() {
            "heartbeat" => Ok(serde_json::to_value(self.heartbeat.handle())?),
            "authenticate" => {
                let req = decode_params(&request.params)?;
                Ok(serde_json::to_value(self.authenticate.handle(ctx, req)?)?)
            }
            "subscribe" => {
                let req = decode_params(&request.params)?;
                Ok(serde_json::to_value(self.subscribe.handle(ctx, req).await?)?)
            }
            "unsubscribe" => {
                let req = decode_params(&request.params)?;
                Ok(serde_json::to_value(self.unsubscribe.handle(ctx, req)?)?)
            }
            "publish" => {
                let req = decode_params(&request.params)?;
                Ok(serde_json::to_value(self.publish.handle(ctx, req).await?)?)
            }
            _ => Err(RelayError::not_found(format!(
                "method not found: {}",
                request.method
            ))),
        }
    }
}

fn decode_params<T: DeserializeOwned>(params: &Option<serde_json::Value>) -> Result<T> {
    let params = params
        .clone()
        .ok_or_else(|| RelayError::invalid_argument("missing params"))?;

    serde_json::from_value(params)
        .map_err(|e| RelayError::invalid_argument(format!("invalid params: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenVerifier;
    use crate::core::channel::ChannelValidator;
    use crate::core::connection::Connection;
    use crate::core::registry::Registry;
    use crate::error::ErrorKind;
    use std::sync::Arc;

    fn router() -> (Router, Arc<Registry>) {
        let registry = Arc::new(Registry::new());
        let validator = Arc::new(ChannelValidator::new());
        let verifier = Arc::new(TokenVerifier::new("router-test-secret", Vec::new()));

        let router = Router::new(
            HeartbeatHandler::new(),
            AuthenticateHandler::new(verifier),
            SubscribeHandler::new(validator.clone(), registry.clone(), None),
            UnsubscribeHandler::new(validator.clone(), registry.clone()),
            Arc::new(PublishHandler::new(validator, registry.clone(), None)),
        );

        (router, registry)
    }

    fn connected(registry: &Registry) -> RequestContext {
        let (connection, _rx) = Connection::with_id("a".to_string(), 4);
        let connection = Arc::new(connection);
        registry.connect(connection.clone()).unwrap();
        RequestContext::for_connection(connection)
    }

    fn request(id: i64, method: &str, params: Option<serde_json::Value>) -> Request {
        Request {
            id,
            method: method.to_string(),
            params,
        }
    }

    #[tokio::test]
    async fn test_heartbeat_round_trip() {
        let (router, registry) = router();
        let ctx = connected(&registry);

        let response = router.route(&ctx, request(1, "heartbeat", None)).await.unwrap();
        assert_eq!(response.request_id, 1);
        assert!(response.result.unwrap()["timestamp"].is_i64());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let (router, registry) = router();
        let ctx = connected(&registry);

        let response = router.route(&ctx, request(2, "teleport", None)).await.unwrap();
        assert_eq!(response.error.unwrap().code, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_missing_params() {
        let (router, registry) = router();
        let ctx = connected(&registry);

        let response = router.route(&ctx, request(3, "subscribe", None)).await.unwrap();
        assert_eq!(response.error.unwrap().code, ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_undecodable_params() {
        let (router, registry) = router();
        let ctx = connected(&registry);

        let response = router
            .route(
                &ctx,
                request(4, "subscribe", Some(serde_json::json!({"channel": 7}))),
            )
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_notification_gets_no_reply() {
        let (router, registry) = router();
        let ctx = connected(&registry);

        assert!(router.route(&ctx, request(0, "heartbeat", None)).await.is_none());
    }

    #[tokio::test]
    async fn test_notification_error_gets_no_reply() {
        let (router, registry) = router();
        let ctx = connected(&registry);

        assert!(router.route(&ctx, request(0, "teleport", None)).await.is_none());
    }

    #[tokio::test]
    async fn test_handler_error_maps_to_envelope() {
        let (router, registry) = router();
        let ctx = connected(&registry);

        let response = router
            .route(
                &ctx,
                request(5, "subscribe", Some(serde_json::json!({"channel": "c1"}))),
            )
            .await
            .unwrap();
        assert_eq!(response.request_id, 5);
        assert_eq!(response.error.unwrap().code, ErrorKind::Unauthenticated);
    }
}
