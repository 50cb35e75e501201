// Integration tests for the subscription registry: symmetry of the
// channel/connection relation, idempotent unsubscribe, fan-out scoping
// and slow-consumer eviction.

use std::sync::Arc;

use relaycast::constants::OUTBOX_CAPACITY;
use relaycast::core::connection::{Connection, EnqueueError, OutboundFrame};
use relaycast::core::message::Message;
use relaycast::core::registry::Registry;
use relaycast::error::ErrorKind;
use tokio::sync::mpsc::Receiver;

fn connect(registry: &Registry, id: &str, capacity: usize) -> Receiver<OutboundFrame> {
    let (connection, rx) = Connection::with_id(id.to_string(), capacity);
    registry.connect(Arc::new(connection)).unwrap();
    rx
}

fn message(channel: &str) -> Message {
    Message::new(channel.to_string(), None, serde_json::json!("payload"))
}

#[test]
fn test_subscription_lifecycle() {
    let registry = Registry::new();
    let _rx = connect(&registry, "a", 8);

    registry.subscribe("c1", "a").unwrap();
    registry.subscribe("c2", "a").unwrap();
    assert_eq!(registry.subscriber_count("c1"), 1);

    registry.unsubscribe("c1", "a");
    assert_eq!(registry.subscriber_count("c1"), 0);
    assert_eq!(registry.subscriber_count("c2"), 1);

    registry.disconnect("a");
    assert_eq!(registry.subscriber_count("c2"), 0);
    assert_eq!(registry.connection_count(), 0);
}

#[test]
fn test_unsubscribe_missing_pair_is_noop() {
    let registry = Registry::new();
    let _rx = connect(&registry, "a", 8);

    registry.unsubscribe("never-subscribed", "a");
    registry.unsubscribe("never-subscribed", "nobody");
    assert_eq!(registry.connection_count(), 1);
}

#[test]
fn test_broadcast_scoped_to_channel() {
    let registry = Registry::new();
    let mut rx_a = connect(&registry, "a", 8);
    let mut rx_b = connect(&registry, "b", 8);

    registry.subscribe("c1", "a").unwrap();
    registry.subscribe("c2", "b").unwrap();

    registry.broadcast(message("c1"));

    match rx_a.try_recv().unwrap() {
        OutboundFrame::Broadcast(msg) => assert_eq!(msg.channel, "c1"),
        other => panic!("unexpected frame: {:?}", other),
    }
    assert!(rx_b.try_recv().is_err());
}

#[test]
fn test_full_outbox_evicts_only_slow_consumer() {
    let registry = Registry::new();
    let _rx_slow = connect(&registry, "slow", OUTBOX_CAPACITY);
    let mut rx_fast = connect(&registry, "fast", OUTBOX_CAPACITY + 8);

    registry.subscribe("c1", "slow").unwrap();
    registry.subscribe("c1", "fast").unwrap();

    // Fill the slow consumer's outbox exactly to capacity
    for _ in 0..OUTBOX_CAPACITY {
        assert_eq!(registry.broadcast(message("c1")), 2);
    }
    assert_eq!(registry.connection_count(), 2);

    // One more message: the slow consumer is evicted before the call
    // returns, the fast consumer still gets the message
    assert_eq!(registry.broadcast(message("c1")), 1);
    assert_eq!(registry.connection_count(), 1);
    assert_eq!(registry.subscriber_count("c1"), 1);

    let mut received = 0;
    while rx_fast.try_recv().is_ok() {
        received += 1;
    }
    assert_eq!(received, OUTBOX_CAPACITY + 1);
}

#[test]
fn test_evicted_connection_outbox_is_closed() {
    let registry = Registry::new();
    let (slow, mut rx_slow) = Connection::with_id("slow".to_string(), 1);
    let slow = Arc::new(slow);
    registry.connect(slow.clone()).unwrap();
    registry.subscribe("c1", "slow").unwrap();

    registry.broadcast(message("c1"));
    registry.broadcast(message("c1"));

    assert_eq!(
        slow.try_enqueue(OutboundFrame::Broadcast(message("c1"))),
        Err(EnqueueError::Closed)
    );

    // The queued message drains before the closure is observed
    assert!(rx_slow.blocking_recv().is_some());
    assert!(rx_slow.blocking_recv().is_none());
}

#[test]
fn test_duplicate_subscription_rejected() {
    let registry = Registry::new();
    let _rx = connect(&registry, "a", 8);

    registry.subscribe("c1", "a").unwrap();
    let err = registry.subscribe("c1", "a").unwrap_err();
    assert_eq!(err.code, ErrorKind::AlreadyExists);
}

#[test]
fn test_connection_reuse_after_disconnect() {
    let registry = Registry::new();
    let _rx = connect(&registry, "a", 8);
    registry.subscribe("c1", "a").unwrap();

    registry.disconnect("a");

    let _rx2 = connect(&registry, "a", 8);
    registry.subscribe("c1", "a").unwrap();
    assert_eq!(registry.subscriber_count("c1"), 1);
}
