use log::{info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

use relaycast::auth::TokenVerifier;
use relaycast::config::{LogEncoding, ServerConfig};
use relaycast::constants::SHUTDOWN_GRACE;
use relaycast::core::channel::ChannelValidator;
use relaycast::core::registry::Registry;
use relaycast::handlers::authenticate::AuthenticateHandler;
use relaycast::handlers::heartbeat::HeartbeatHandler;
use relaycast::handlers::http;
use relaycast::handlers::publish::PublishHandler;
use relaycast::handlers::router::Router;
use relaycast::handlers::subscribe::SubscribeHandler;
use relaycast::handlers::unsubscribe::UnsubscribeHandler;
use relaycast::storage::{MemoryMessageStore, SharedPersistenceEngine};

#[tokio::main]
async fn main() {
    let dotenv_result = dotenv::dotenv();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logger(config.log_encoding);

    match dotenv_result {
        Ok(_) => info!("environment variables loaded from .env file"),
        Err(_) => info!("no .env file loaded"),
    }

    let store: Option<SharedPersistenceEngine> = match config.history_backend.as_deref() {
        Some("memory") => {
            info!("message history enabled (memory backend)");
            Some(Arc::new(MemoryMessageStore::new()))
        }
        _ => None,
    };

    if let Some(store) = &store {
        if let Err(e) = store.setup().await {
            eprintln!("failed to set up persistence engine: {}", e);
            std::process::exit(1);
        }
    }

    let verifier = Arc::new(TokenVerifier::new(&config.jwt_secret, config.api_keys.clone()));
    let validator = Arc::new(ChannelValidator::new());
    let registry = Arc::new(Registry::new());

    let publish_handler = Arc::new(PublishHandler::new(
        validator.clone(),
        registry.clone(),
        store.clone(),
    ));

    let router = Arc::new(Router::new(
        HeartbeatHandler::new(),
        AuthenticateHandler::new(verifier.clone()),
        SubscribeHandler::new(validator.clone(), registry.clone(), store.clone()),
        UnsubscribeHandler::new(validator, registry.clone()),
        publish_handler.clone(),
    ));

    let routes = http::routes(
        &config,
        registry.clone(),
        router,
        verifier,
        publish_handler,
    );

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "starting server on {} (base path /{})",
        addr, config.base_path
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let (_bound, server) = warp::serve(routes).bind_with_graceful_shutdown(addr, async move {
        shutdown_rx.await.ok();
    });

    let server_handle = tokio::spawn(server);

    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received, draining connections");

    // Closing every outbox terminates the write pumps, which send close
    // frames; clients then hang up and the read pumps drain
    registry.shutdown();
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(SHUTDOWN_GRACE, server_handle).await {
        Ok(_) => info!("server stopped"),
        Err(_) => warn!("shutdown grace period expired, exiting"),
    }
}

fn init_logger(encoding: LogEncoding) {
    match encoding {
        LogEncoding::Console => env_logger::init(),
        LogEncoding::Json => {
            use std::io::Write;

            env_logger::Builder::from_default_env()
                .format(|buf, record| {
                    let line = serde_json::json!({
                        "timestamp": chrono::Utc::now().to_rfc3339(),
                        "severity": record.level().to_string(),
                        "logger": record.target(),
                        "message": record.args().to_string(),
                    });
                    writeln!(buf, "{}", line)
                })
                .init();
        }
    }
}
