use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use parley_types::events::RelayEvent;

/// Identifies one live relay connection. Distinct from user identity —
/// a user with two tabs open holds two connection ids.
pub type ConnId = Uuid;

/// The broadcast hub. Owns the set of live connections exclusively; holds
/// no message content and no per-user state.
///
/// Delivery is fire-and-forget: at most once per recipient per publish,
/// no acknowledgement, no retry. A client that is not registered at publish
/// time misses the event and recovers only through its own next re-fetch.
#[derive(Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

struct RelayInner {
    connections: RwLock<HashMap<ConnId, mpsc::UnboundedSender<RelayEvent>>>,
}

impl Relay {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RelayInner {
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a new connection. Returns its id and the event receiver.
    pub async fn register(&self) -> (ConnId, mpsc::UnboundedReceiver<RelayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.connections.write().await.insert(conn_id, tx);
        (conn_id, rx)
    }

    pub async fn unregister(&self, conn_id: ConnId) {
        self.inner.connections.write().await.remove(&conn_id);
    }

    /// Fan a `MessageAdded` event out to every connection EXCEPT the
    /// publisher's own. Exclusion is by connection identity, not by sender
    /// name — the same user in another tab still gets the event.
    pub async fn notify(&self, publisher: ConnId, sender: &str) {
        let connections = self.inner.connections.read().await;
        for (&conn_id, tx) in connections.iter() {
            if conn_id == publisher {
                continue;
            }
            let _ = tx.send(RelayEvent::MessageAdded {
                sender: sender.to_string(),
            });
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publisher_never_receives_its_own_event() {
        let relay = Relay::new();
        let (alice_conn, mut alice_rx) = relay.register().await;
        let (_bob_conn, mut bob_rx) = relay.register().await;

        relay.notify(alice_conn, "alice").await;

        match bob_rx.recv().await {
            Some(RelayEvent::MessageAdded { sender }) => assert_eq!(sender, "alice"),
            other => panic!("expected MessageAdded, got {:?}", other),
        }
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn fan_out_reaches_every_other_connection_once() {
        let relay = Relay::new();
        let (publisher, _publisher_rx) = relay.register().await;
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (_, rx) = relay.register().await;
            receivers.push(rx);
        }

        relay.notify(publisher, "alice").await;

        for rx in &mut receivers {
            assert!(matches!(
                rx.try_recv(),
                Ok(RelayEvent::MessageAdded { .. })
            ));
            // at-most-once
            assert!(rx.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn unregistered_connection_misses_the_event() {
        let relay = Relay::new();
        let (publisher, _publisher_rx) = relay.register().await;
        let (gone_conn, mut gone_rx) = relay.register().await;

        relay.unregister(gone_conn).await;
        assert_eq!(relay.connection_count().await, 1);

        relay.notify(publisher, "alice").await;
        assert!(gone_rx.try_recv().is_err());
    }
}
