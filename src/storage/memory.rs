//! In-memory persistence engine
//!
//! Retains a bounded number of messages per channel. Suitable for a
//! single-process deployment; state does not survive a restart.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

use crate::constants::HISTORY_LIMIT;
use crate::core::message::Message;
use crate::error::Result;
use crate::storage::traits::{HistoryPage, PersistenceEngine};

const DEFAULT_RETAINED_PER_CHANNEL: usize = 1024;

pub struct MemoryMessageStore {
    retained_per_channel: usize,
    channels: RwLock<HashMap<String, VecDeque<Message>>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETAINED_PER_CHANNEL)
    }

    pub fn with_retention(retained_per_channel: usize) -> Self {
        Self {
            retained_per_channel,
            channels: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistenceEngine for MemoryMessageStore {
    async fn setup(&self) -> Result<()> {
        Ok(())
    }

    async fn save(&self, message: &Message) -> Result<()> {
        let mut channels = self.channels.write().await;
        let retained = channels.entry(message.channel.clone()).or_default();

        retained.push_back(message.clone());
        while retained.len() > self.retained_per_channel {
            retained.pop_front();
        }

        Ok(())
    }

    async fn list(&self, channel: &str, last_seen_id: &str) -> Result<HistoryPage> {
        let channels = self.channels.read().await;

        let retained = match channels.get(channel) {
            Some(retained) => retained,
            None => {
                return Ok(HistoryPage {
                    messages: Vec::new(),
                    marker_found: false,
                })
            }
        };

        match retained.iter().position(|m| m.id == last_seen_id) {
            Some(position) => Ok(HistoryPage {
                messages: retained
                    .iter()
                    .skip(position + 1)
                    .take(HISTORY_LIMIT)
                    .cloned()
                    .collect(),
                marker_found: true,
            }),
            None => {
                let skip = retained.len().saturating_sub(HISTORY_LIMIT);
                Ok(HistoryPage {
                    messages: retained.iter().skip(skip).cloned().collect(),
                    marker_found: false,
                })
            }
        }
    }
}
