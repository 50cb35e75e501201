//! HTTP surface: health check, WebSocket upgrade, and the out-of-band
//! publish endpoint authenticated with a pre-shared API key

use log::debug;
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::auth::TokenVerifier;
use crate::config::ServerConfig;
use crate::constants::WS_PATH;
use crate::core::registry::Registry;
use crate::error::{ErrorKind, RelayError};
use crate::handlers::publish::{PublishHandler, PublishRequest};
use crate::handlers::router::Router;
use crate::handlers::websocket::handle_ws_client;
use crate::handlers::RequestContext;

/// Assemble every route under the configured base path
pub fn routes(
    config: &ServerConfig,
    registry: Arc<Registry>,
    router: Arc<Router>,
    verifier: Arc<TokenVerifier>,
    publish_handler: Arc<PublishHandler>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let base_path = config.base_path.clone();
    let max_frame_bytes = config.max_frame_bytes;

    let health_route = warp::path(base_path.clone())
        .and(warp::path("health"))
        .and(warp::path::end())
        .and(warp::get())
        .map(|| "ok");

    let ws_route = warp::path(base_path.clone())
        .and(warp::path(WS_PATH))
        .and(warp::path::end())
        .and(warp::ws())
        .map(move |ws: warp::ws::Ws| {
            let registry = registry.clone();
            let router = router.clone();
            ws.max_message_size(max_frame_bytes)
                .on_upgrade(move |socket| handle_ws_client(socket, registry, router, max_frame_bytes))
        });

    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(["content-type", "authorization"])
        .allow_methods(["POST", "OPTIONS"]);

    let publish_route = warp::path(base_path)
        .and(warp::path("publish"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::body::json())
        .and_then(move |auth_header: Option<String>, body: PublishRequest| {
            let verifier = verifier.clone();
            let publish_handler = publish_handler.clone();
            async move { handle_publish(auth_header, body, verifier, publish_handler).await }
        })
        .with(cors);

    health_route.or(ws_route).or(publish_route)
}

async fn handle_publish(
    auth_header: Option<String>,
    body: PublishRequest,
    verifier: Arc<TokenVerifier>,
    publish_handler: Arc<PublishHandler>,
) -> Result<impl Reply, Infallible> {
    let header = match auth_header {
        Some(header) => header,
        None => {
            return Ok(error_reply(RelayError::unauthenticated(
                "missing authorization header",
            )))
        }
    };

    let candidate = header.strip_prefix("Bearer ").unwrap_or(&header);

    let authorization = match verifier.verify_api_key(candidate) {
        Ok(authorization) => authorization,
        Err(err) => return Ok(error_reply(err)),
    };

    if !authorization.is_publisher() {
        return Ok(error_reply(RelayError::unauthenticated(
            "invalid key for publisher authentication",
        )));
    }

    let ctx = RequestContext::for_ambient(Arc::new(authorization));

    match publish_handler.handle(&ctx, body).await {
        Ok(message) => Ok(warp::reply::with_status(
            warp::reply::json(&message),
            StatusCode::OK,
        )),
        Err(err) => {
            debug!("publish request failed: {}", err);
            Ok(error_reply(err))
        }
    }
}

fn error_reply(err: RelayError) -> warp::reply::WithStatus<warp::reply::Json> {
    let status = error_status(err.code);
    warp::reply::with_status(warp::reply::json(&err), status)
}

fn error_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Unauthenticated | ErrorKind::PermissionDenied => StatusCode::UNAUTHORIZED,
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
