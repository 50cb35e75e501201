//! Per-client connection state
//!
//! A connection owns the send side of its bounded outbox behind a mutex
//! so that the registry, and only the registry, can close it. The write
//! pump holds the receive side and treats closure as its terminal signal.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::auth::Authorization;
use crate::core::envelope::{Request, Response};
use crate::core::message::Message;
use crate::error::{RelayError, Result};

/// A frame waiting in a connection's outbox
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    Reply(Response),
    Broadcast(Message),
}

impl OutboundFrame {
    /// Wire encoding: replies as response envelopes, broadcasts as
    /// `broadcast` notifications
    pub fn to_json(&self) -> serde_json::Result<String> {
        match self {
            OutboundFrame::Reply(response) => serde_json::to_string(response),
            OutboundFrame::Broadcast(message) => {
                let params = serde_json::to_value(message)?;
                serde_json::to_string(&Request::notification("broadcast", params))
            }
        }
    }
}

/// Why a non-blocking enqueue did not deliver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    Full,
    Closed,
}

/// Represents the state of a single client connection
pub struct Connection {
    pub id: String,
    pub connected_at: Instant,
    outbox: Mutex<Option<mpsc::Sender<OutboundFrame>>>,
    authorization: Mutex<Option<Arc<Authorization>>>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl Connection {
    /// Create a new connection with a unique id and a bounded outbox,
    /// returning the receive side for the write pump
    pub fn new(outbox_capacity: usize) -> (Self, mpsc::Receiver<OutboundFrame>) {
        Self::with_id(Uuid::new_v4().simple().to_string(), outbox_capacity)
    }

    pub fn with_id(id: String, outbox_capacity: usize) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(outbox_capacity);

        let connection = Self {
            id,
            connected_at: Instant::now(),
            outbox: Mutex::new(Some(tx)),
            authorization: Mutex::new(None),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        };

        (connection, rx)
    }

    /// Non-blocking enqueue onto the outbox; never waits for a slow reader
    pub fn try_enqueue(&self, frame: OutboundFrame) -> std::result::Result<(), EnqueueError> {
        let guard = self.outbox.lock().map_err(|_| EnqueueError::Closed)?;

        let sender = guard.as_ref().ok_or(EnqueueError::Closed)?;
        match sender.try_send(frame) {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(EnqueueError::Full)
            }
            Err(TrySendError::Closed(_)) => Err(EnqueueError::Closed),
        }
    }

    /// Close the outbox, waking the write pump once the queue drains.
    /// Called exclusively by the registry from inside disconnect.
    pub(crate) fn close_outbox(&self) {
        if let Ok(mut guard) = self.outbox.lock() {
            guard.take();
        }
    }

    /// Install the authorization record. A connection can be authorized
    /// at most once.
    pub fn install_authorization(&self, auth: Authorization) -> Result<()> {
        let mut guard = self.authorization.lock()?;

        if guard.is_some() {
            return Err(RelayError::failed_precondition(
                "connection is already authenticated",
            ));
        }

        *guard = Some(Arc::new(auth));
        Ok(())
    }

    pub fn authorization(&self) -> Option<Arc<Authorization>> {
        self.authorization.lock().ok()?.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authorization().is_some()
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
