//! Two clients, one hub, one store: the full notify/re-fetch round trip.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use parley_client::engine::{FeedEntry, ReconciliationEngine, SendStatus};
use parley_client::error::ClientError;
use parley_client::traits::{MessageStore, NotificationPublisher};
use parley_db::Database;
use parley_relay::hub::{ConnId, Relay};
use parley_types::events::RelayEvent;
use parley_types::models::ChatMessage;

/// Message store backed by the real SQLite database.
struct DbStore {
    db: Arc<Database>,
}

#[async_trait]
impl MessageStore for DbStore {
    async fn list_messages(&self) -> Result<Vec<ChatMessage>, ClientError> {
        let rows = self
            .db
            .list_messages()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|row| ChatMessage {
                created_at: row.created_at.parse().unwrap(),
                sender: row.sender,
                body: row.body,
            })
            .collect())
    }

    async fn append_message(&self, sender: &str, body: &str) -> Result<(), ClientError> {
        self.db
            .append_message(&Uuid::new_v4().to_string(), sender, body)
            .map(|_| ())
            .map_err(|e| ClientError::Transport(e.to_string()))
    }
}

/// Publishes through the client's own hub connection.
struct HubPublisher {
    relay: Relay,
    conn: ConnId,
}

#[async_trait]
impl NotificationPublisher for HubPublisher {
    async fn notify(&self, sender: &str) {
        self.relay.notify(self.conn, sender).await;
    }
}

#[tokio::test]
async fn send_notify_refetch_round_trip() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let relay = Relay::new();

    let (alice_conn, mut alice_rx) = relay.register().await;
    let (bob_conn, mut bob_rx) = relay.register().await;

    let alice = ReconciliationEngine::new(
        "alice",
        DbStore { db: db.clone() },
        HubPublisher {
            relay: relay.clone(),
            conn: alice_conn,
        },
    );
    let bob = ReconciliationEngine::new(
        "bob",
        DbStore { db: db.clone() },
        HubPublisher {
            relay: relay.clone(),
            conn: bob_conn,
        },
    );
    bob.refresh().await.unwrap();
    assert!(bob.feed().is_empty());

    // Alice sends: persisted, reconciled, published
    let outcome = alice.send("hi").await.unwrap();
    assert_eq!(outcome.status, SendStatus::Delivered);
    assert!(!alice.has_pending());
    match alice.feed().last().unwrap() {
        FeedEntry::Confirmed(m) => {
            assert_eq!(m.sender, "alice");
            assert_eq!(m.body, "hi");
        }
        other => panic!("expected confirmed entry, got {:?}", other),
    }

    // Bob's connection got the event; Alice's own did not
    let event = bob_rx.recv().await.unwrap();
    let RelayEvent::MessageAdded { sender } = event else {
        panic!("expected MessageAdded");
    };
    assert_eq!(sender, "alice");
    assert!(alice_rx.try_recv().is_err());

    // Bob reacts the way his relay task would
    assert!(bob.handle_notification(&sender).await.unwrap());
    match bob.feed().last().unwrap() {
        FeedEntry::Confirmed(m) => {
            assert_eq!(m.sender, "alice");
            assert_eq!(m.body, "hi");
        }
        other => panic!("expected confirmed entry, got {:?}", other),
    }
}
