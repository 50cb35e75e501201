//! Per-connection streaming: read pump and write pump
//!
//! The read pump decodes and routes inbound frames and always ends by
//! disconnecting the connection from the registry. The write pump drains
//! the outbox into the transport and terminates when the outbox closes.

use futures_util::sink::SinkExt;
use futures_util::stream::{SplitSink, SplitStream, StreamExt};
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::timeout;
use warp::ws::{Message as WsMessage, WebSocket};

use crate::constants::{OUTBOX_CAPACITY, READ_DEADLINE, WRITE_DEADLINE};
use crate::core::connection::{Connection, OutboundFrame};
use crate::core::envelope::Request;
use crate::core::registry::Registry;
use crate::handlers::router::Router;
use crate::handlers::RequestContext;

/// Handle one upgraded WebSocket connection until it drains
pub async fn handle_ws_client(
    ws: WebSocket,
    registry: Arc<Registry>,
    router: Arc<Router>,
    max_frame_bytes: usize,
) {
    let (ws_tx, ws_rx) = ws.split();

    let (connection, outbox_rx) = Connection::new(OUTBOX_CAPACITY);
    let connection = Arc::new(connection);

    if let Err(e) = registry.connect(connection.clone()) {
        warn!("failed to register connection {}: {}", connection.id, e);
        return;
    }

    info!(
        "client connected: {} ({} connections)",
        connection.id,
        registry.connection_count()
    );

    tokio::task::spawn(write_pump(ws_tx, outbox_rx));

    read_pump(ws_rx, connection.clone(), router, max_frame_bytes).await;

    registry.disconnect(&connection.id);

    info!(
        "client disconnected: {} ({} connections)",
        connection.id,
        registry.connection_count()
    );
}

async fn read_pump(
    mut ws_rx: SplitStream<WebSocket>,
    connection: Arc<Connection>,
    router: Arc<Router>,
    max_frame_bytes: usize,
) {
    let ctx = RequestContext::for_connection(connection.clone());

    loop {
        let frame = match timeout(READ_DEADLINE, ws_rx.next()).await {
            Err(_) => {
                debug!("read deadline expired for connection {}", connection.id);
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!("websocket error on connection {}: {}", connection.id, e);
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        if frame.is_close() {
            break;
        }

        // Pings and pongs are answered by the transport layer
        let text = match frame.to_str() {
            Ok(text) => text,
            Err(_) => continue,
        };

        if text.len() > max_frame_bytes {
            debug!(
                "oversized frame ({} bytes) from connection {}",
                text.len(),
                connection.id
            );
            break;
        }

        let request: Request = match serde_json::from_str(text) {
            Ok(request) => request,
            Err(e) => {
                debug!("malformed frame from connection {}: {}", connection.id, e);
                break;
            }
        };

        if let Some(response) = router.route(&ctx, request).await {
            if connection
                .try_enqueue(OutboundFrame::Reply(response))
                .is_err()
            {
                break;
            }
        }
    }
}

async fn write_pump(
    mut ws_tx: SplitSink<WebSocket, WsMessage>,
    mut outbox_rx: mpsc::Receiver<OutboundFrame>,
) {
    while let Some(frame) = outbox_rx.recv().await {
        let text = match frame.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!("failed to serialize outbound frame: {}", e);
                continue;
            }
        };

        match timeout(WRITE_DEADLINE, ws_tx.send(WsMessage::text(text))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!("failed to write frame: {}", e);
                return;
            }
            Err(_) => {
                debug!("write deadline expired");
                return;
            }
        }
    }

    // Outbox closed by the registry: announce closure to the peer
    let _ = timeout(WRITE_DEADLINE, ws_tx.send(WsMessage::close())).await;
}
