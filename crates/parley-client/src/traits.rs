//! Interfaces to the external collaborators the client core consumes.
//!
//! The real implementations (REST + WebSocket) live in [`crate::net`];
//! tests substitute in-memory fakes.

use std::sync::Arc;

use async_trait::async_trait;

use parley_types::api::UserEntry;
use parley_types::events::RelayEvent;
use parley_types::models::ChatMessage;

use crate::error::ClientError;

/// The authoritative message store: source of truth for all messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// The full canonical log, ordered by server-assigned `created_at`.
    async fn list_messages(&self) -> Result<Vec<ChatMessage>, ClientError>;

    /// Persist one message. The server assigns `created_at`.
    async fn append_message(&self, sender: &str, body: &str) -> Result<(), ClientError>;
}

/// Presence operations this client may request for itself or observe.
#[async_trait]
pub trait PresenceApi: Send + Sync {
    /// The idle-timeout signal: ask the server to show this user offline.
    async fn set_offline(&self) -> Result<(), ClientError>;

    async fn list_users(&self) -> Result<Vec<UserEntry>, ClientError>;
}

/// Token verification, doubling as the presence lease: a successful verify
/// refreshes `online`/`last_active` server-side.
#[async_trait]
pub trait IdentityApi: Send + Sync {
    async fn verify(&self) -> Result<(), ClientError>;
}

/// Publishes "message added" notifications through this client's OWN relay
/// connection, so the hub can exclude it from the fan-out.
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    /// Fire-and-forget; a lost notification degrades silently.
    async fn notify(&self, sender: &str);
}

/// The receive side of the relay connection.
#[async_trait]
pub trait RelayLink: Send {
    /// Next event from the hub; `None` once the connection is gone.
    async fn next_event(&mut self) -> Option<RelayEvent>;
}

#[async_trait]
impl<T: MessageStore + ?Sized> MessageStore for Arc<T> {
    async fn list_messages(&self) -> Result<Vec<ChatMessage>, ClientError> {
        (**self).list_messages().await
    }

    async fn append_message(&self, sender: &str, body: &str) -> Result<(), ClientError> {
        (**self).append_message(sender, body).await
    }
}

#[async_trait]
impl<T: PresenceApi + ?Sized> PresenceApi for Arc<T> {
    async fn set_offline(&self) -> Result<(), ClientError> {
        (**self).set_offline().await
    }

    async fn list_users(&self) -> Result<Vec<UserEntry>, ClientError> {
        (**self).list_users().await
    }
}

#[async_trait]
impl<T: IdentityApi + ?Sized> IdentityApi for Arc<T> {
    async fn verify(&self) -> Result<(), ClientError> {
        (**self).verify().await
    }
}

#[async_trait]
impl<T: NotificationPublisher + ?Sized> NotificationPublisher for Arc<T> {
    async fn notify(&self, sender: &str) {
        (**self).notify(sender).await
    }
}
