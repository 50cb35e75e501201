//! Abstract persistence interface for pluggable history backends
//!
//! Persistence is an optional collaborator: when an engine is configured,
//! every successful publish is saved before broadcast and subscribers may
//! request replay of messages they missed.

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::message::Message;
use crate::error::Result;

/// A bounded window of prior channel messages
#[derive(Debug, Clone)]
pub struct HistoryPage {
    /// Messages in publish order, capped by the history limit
    pub messages: Vec<Message>,
    /// Whether the requested marker id was found in the channel history
    pub marker_found: bool,
}

/// Pluggable message persistence
#[async_trait]
pub trait PersistenceEngine: Send + Sync {
    /// Prepare the backend (indexes, schema); called once at startup
    async fn setup(&self) -> Result<()>;

    /// Persist a published message
    async fn save(&self, message: &Message) -> Result<()>;

    /// List messages on a channel published after the given marker id.
    /// An unknown marker yields the most recent window with
    /// `marker_found` unset.
    async fn list(&self, channel: &str, last_seen_id: &str) -> Result<HistoryPage>;
}

pub type SharedPersistenceEngine = Arc<dyn PersistenceEngine>;
