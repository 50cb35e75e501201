//! Concurrent many-to-many registry of channels and connections
//!
//! Three indexes live under a single reader/writer lock: the master
//! connection map, connections by channel, and channels by connection.
//! The two channel indexes never hold empty sets, and a connection id
//! present in any channel set is always present in the master map.
//! Detected violations of those invariants mean the in-memory state is
//! corrupted and abort the process.

use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::core::connection::{Connection, OutboundFrame};
use crate::core::message::Message;
use crate::error::{RelayError, Result};

#[derive(Default)]
struct Indexes {
    connections: HashMap<String, Arc<Connection>>,
    connections_by_channel: HashMap<String, HashSet<String>>,
    channels_by_connection: HashMap<String, HashSet<String>>,
}

/// Manages active subscriptions and fans out published messages
pub struct Registry {
    inner: RwLock<Indexes>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Indexes::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Indexes> {
        // A poisoned lock means a mutation panicked mid-flight and the
        // indexes can no longer be trusted.
        self.inner.read().expect("registry lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, Indexes> {
        self.inner.write().expect("registry lock poisoned")
    }

    /// Insert a connection with an empty subscription set
    pub fn connect(&self, connection: Arc<Connection>) -> Result<()> {
        let mut indexes = self.write();

        if indexes.connections.contains_key(&connection.id) {
            return Err(RelayError::already_exists("connection already registered"));
        }

        debug!("connection registered: {}", connection.id);
        indexes.connections.insert(connection.id.clone(), connection);

        Ok(())
    }

    /// Subscribe a registered connection to a channel. Duplicate
    /// subscriptions are rejected.
    pub fn subscribe(&self, channel: &str, connection_id: &str) -> Result<()> {
        let mut indexes = self.write();

        if !indexes.connections.contains_key(connection_id) {
            return Err(RelayError::not_found("connection is not registered"));
        }

        let members = indexes
            .connections_by_channel
            .entry(channel.to_string())
            .or_default();

        if !members.insert(connection_id.to_string()) {
            return Err(RelayError::already_exists(
                "connection already subscribed to channel",
            ));
        }

        indexes
            .channels_by_connection
            .entry(connection_id.to_string())
            .or_default()
            .insert(channel.to_string());

        debug!("subscribed connection {} to channel {}", connection_id, channel);

        Ok(())
    }

    /// Remove a subscription. Removing an absent pair is a no-op.
    pub fn unsubscribe(&self, channel: &str, connection_id: &str) {
        let mut indexes = self.write();

        let (was_subscribed, connection_drained) =
            match indexes.channels_by_connection.get_mut(connection_id) {
                Some(channels) => (channels.remove(channel), channels.is_empty()),
                None => (false, false),
            };

        if connection_drained {
            indexes.channels_by_connection.remove(connection_id);
        }

        if !was_subscribed {
            return;
        }

        let members = indexes
            .connections_by_channel
            .get_mut(channel)
            .unwrap_or_else(|| {
                panic!("inconsistent state: channel {} missing from channel index", channel)
            });

        members.remove(connection_id);
        if members.is_empty() {
            indexes.connections_by_channel.remove(channel);
        }

        debug!("unsubscribed connection {} from channel {}", connection_id, channel);
    }

    /// Fan a message out to every subscriber of its channel. Enqueueing
    /// never blocks; subscribers whose outbox is full are evicted before
    /// this call returns. Returns the number of deliveries.
    pub fn broadcast(&self, message: Message) -> usize {
        let mut delivered = 0;
        let mut stale_connection_ids = Vec::new();

        {
            let indexes = self.read();

            let subscriber_ids = match indexes.connections_by_channel.get(&message.channel) {
                Some(ids) => ids,
                None => return 0,
            };

            let connections: Vec<Arc<Connection>> = subscriber_ids
                .iter()
                .filter_map(|id| indexes.connections.get(id))
                .cloned()
                .collect();

            for connection in connections {
                match connection.try_enqueue(OutboundFrame::Broadcast(message.clone())) {
                    Ok(()) => delivered += 1,
                    Err(_) => {
                        warn!(
                            "outbox full for connection {}, scheduling eviction",
                            connection.id
                        );
                        stale_connection_ids.push(connection.id.clone());
                    }
                }
            }
        }

        if !stale_connection_ids.is_empty() {
            let mut indexes = self.write();
            for connection_id in stale_connection_ids {
                Self::disconnect_locked(&mut indexes, &connection_id);
            }
        }

        delivered
    }

    /// Remove a connection from every channel it subscribes to and close
    /// its outbox
    pub fn disconnect(&self, connection_id: &str) {
        let mut indexes = self.write();
        Self::disconnect_locked(&mut indexes, connection_id);
    }

    /// Disconnect every remaining connection. Used during graceful
    /// shutdown.
    pub fn shutdown(&self) {
        let mut indexes = self.write();

        let connection_ids: Vec<String> = indexes.connections.keys().cloned().collect();
        for connection_id in connection_ids {
            Self::disconnect_locked(&mut indexes, &connection_id);
        }
    }

    pub fn connection_count(&self) -> usize {
        self.read().connections.len()
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.read()
            .connections_by_channel
            .get(channel)
            .map(|members| members.len())
            .unwrap_or(0)
    }

    fn disconnect_locked(indexes: &mut Indexes, connection_id: &str) {
        let connection = match indexes.connections.remove(connection_id) {
            Some(connection) => connection,
            None => return,
        };

        if let Some(channels) = indexes.channels_by_connection.remove(connection_id) {
            for channel in channels {
                let members = indexes
                    .connections_by_channel
                    .get_mut(&channel)
                    .unwrap_or_else(|| {
                        panic!(
                            "inconsistent state: channel {} missing from channel index",
                            channel
                        )
                    });

                members.remove(connection_id);
                if members.is_empty() {
                    indexes.connections_by_channel.remove(&channel);
                }
            }
        }

        connection.close_outbox();

        debug!(
            "connection disconnected: {} (delivered {}, dropped {})",
            connection.id,
            connection.delivered_count(),
            connection.dropped_count()
        );
    }

    /// Verify the cross-index invariants hold at quiescence
    #[cfg(test)]
    fn assert_invariants(&self) {
        let indexes = self.read();

        for (channel, members) in &indexes.connections_by_channel {
            assert!(!members.is_empty(), "empty member set for channel {}", channel);
            for connection_id in members {
                assert!(
                    indexes.connections.contains_key(connection_id),
                    "channel {} references unknown connection {}",
                    channel,
                    connection_id
                );
                assert!(
                    indexes.channels_by_connection[connection_id].contains(channel),
                    "asymmetric subscription {} <-> {}",
                    channel,
                    connection_id
                );
            }
        }

        for (connection_id, channels) in &indexes.channels_by_connection {
            assert!(!channels.is_empty(), "empty channel set for {}", connection_id);
            for channel in channels {
                assert!(
                    indexes.connections_by_channel[channel].contains(connection_id),
                    "asymmetric subscription {} <-> {}",
                    connection_id,
                    channel
                );
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::Receiver;

    fn connect(registry: &Registry, id: &str, capacity: usize) -> (Arc<Connection>, Receiver<OutboundFrame>) {
        let (connection, rx) = Connection::with_id(id.to_string(), capacity);
        let connection = Arc::new(connection);
        registry.connect(connection.clone()).unwrap();
        (connection, rx)
    }

    fn message(channel: &str, payload: &str) -> Message {
        Message::new(channel.to_string(), None, serde_json::json!(payload))
    }

    #[test]
    fn test_duplicate_connect_rejected() {
        let registry = Registry::new();
        let _held = connect(&registry, "a", 4);

        let (duplicate, _rx) = Connection::with_id("a".to_string(), 4);
        let err = registry.connect(Arc::new(duplicate)).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_subscribe_requires_connection() {
        let registry = Registry::new();
        let err = registry.subscribe("c1", "ghost").unwrap_err();
        assert_eq!(err.code, crate::error::ErrorKind::NotFound);
    }

    #[test]
    fn test_duplicate_subscribe_rejected() {
        let registry = Registry::new();
        let _held = connect(&registry, "a", 4);

        registry.subscribe("c1", "a").unwrap();
        let err = registry.subscribe("c1", "a").unwrap_err();
        assert_eq!(err.code, crate::error::ErrorKind::AlreadyExists);
        registry.assert_invariants();
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let registry = Registry::new();
        let _held = connect(&registry, "a", 4);

        registry.unsubscribe("c1", "a");
        registry.subscribe("c1", "a").unwrap();
        registry.unsubscribe("c1", "a");
        registry.unsubscribe("c1", "a");

        assert_eq!(registry.subscriber_count("c1"), 0);
        registry.assert_invariants();
    }

    #[test]
    fn test_broadcast_reaches_all_subscribers() {
        let registry = Registry::new();
        let (_a, mut rx_a) = connect(&registry, "a", 4);
        let (_b, mut rx_b) = connect(&registry, "b", 4);

        registry.subscribe("c1", "a").unwrap();
        registry.subscribe("c1", "b").unwrap();

        let delivered = registry.broadcast(message("c1", "hello"));
        assert_eq!(delivered, 2);

        assert!(matches!(rx_a.try_recv(), Ok(OutboundFrame::Broadcast(_))));
        assert!(matches!(rx_b.try_recv(), Ok(OutboundFrame::Broadcast(_))));
    }

    #[test]
    fn test_no_cross_channel_leakage() {
        let registry = Registry::new();
        let (_a, mut rx_a) = connect(&registry, "a", 4);
        let (_b, mut rx_b) = connect(&registry, "b", 4);

        registry.subscribe("c1", "a").unwrap();
        registry.subscribe("c2", "b").unwrap();

        assert_eq!(registry.broadcast(message("c1", "only-a")), 1);

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_to_unknown_channel() {
        let registry = Registry::new();
        assert_eq!(registry.broadcast(message("nobody", "x")), 0);
    }

    #[test]
    fn test_slow_consumer_evicted() {
        let registry = Registry::new();
        let (slow, _rx_slow) = connect(&registry, "slow", 1);
        let (_fast, mut rx_fast) = connect(&registry, "fast", 4);

        registry.subscribe("c1", "slow").unwrap();
        registry.subscribe("c1", "fast").unwrap();

        // Fill the slow consumer's outbox without draining it
        assert_eq!(registry.broadcast(message("c1", "first")), 2);

        // The next broadcast evicts the slow consumer before returning
        let delivered = registry.broadcast(message("c1", "second"));
        assert_eq!(delivered, 1);

        assert_eq!(registry.connection_count(), 1);
        assert_eq!(registry.subscriber_count("c1"), 1);
        assert_eq!(slow.try_enqueue(OutboundFrame::Broadcast(message("c1", "x"))), Err(crate::core::connection::EnqueueError::Closed));

        assert!(rx_fast.try_recv().is_ok());
        assert!(rx_fast.try_recv().is_ok());
        registry.assert_invariants();
    }

    #[test]
    fn test_disconnect_removes_all_subscriptions() {
        let registry = Registry::new();
        let (_a, mut rx_a) = connect(&registry, "a", 4);

        registry.subscribe("c1", "a").unwrap();
        registry.subscribe("c2", "a").unwrap();

        registry.disconnect("a");

        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.subscriber_count("c1"), 0);
        assert_eq!(registry.subscriber_count("c2"), 0);
        assert!(rx_a.blocking_recv().is_none());
        registry.assert_invariants();
    }

    #[test]
    fn test_disconnect_unknown_connection_is_noop() {
        let registry = Registry::new();
        registry.disconnect("ghost");
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn test_resubscribe_after_unsubscribe() {
        let registry = Registry::new();
        let (_a, _rx) = connect(&registry, "a", 4);

        registry.subscribe("c1", "a").unwrap();
        registry.unsubscribe("c1", "a");
        registry.subscribe("c1", "a").unwrap();

        assert_eq!(registry.subscriber_count("c1"), 1);
        registry.assert_invariants();
    }

    #[test]
    fn test_shutdown_disconnects_everyone() {
        let registry = Registry::new();
        let (_a, mut rx_a) = connect(&registry, "a", 4);
        let (_b, mut rx_b) = connect(&registry, "b", 4);
        registry.subscribe("c1", "a").unwrap();

        registry.shutdown();

        assert_eq!(registry.connection_count(), 0);
        assert!(rx_a.blocking_recv().is_none());
        assert!(rx_b.blocking_recv().is_none());
        registry.assert_invariants();
    }

    #[test]
    fn test_concurrent_subscribe_and_broadcast() {
        let registry = Arc::new(Registry::new());
        let mut receivers = Vec::new();

        for i in 0..16 {
            let (_c, rx) = connect(&registry, &format!("conn-{}", i), 64);
            registry.subscribe("c1", &format!("conn-{}", i)).unwrap();
            receivers.push(rx);
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let registry = registry.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..8 {
                    registry.broadcast(Message::new(
                        "c1".to_string(),
                        None,
                        serde_json::json!("load"),
                    ));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        for rx in &mut receivers {
            let mut count = 0;
            while rx.try_recv().is_ok() {
                count += 1;
            }
            assert_eq!(count, 32);
        }
        registry.assert_invariants();
    }
}
