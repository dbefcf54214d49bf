//! Message reconciliation: one time-ordered, duplicate-free feed built from
//! the server-persisted log plus locally-originated, not-yet-confirmed
//! messages.
//!
//! Read-after-write optimism: a send is rendered immediately as a pending
//! entry, then reconciled against the canonical list once persistence
//! confirms. Failures stay visible with a retry affordance; nothing is
//! auto-retried or silently dropped.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::Utc;
use tracing::warn;

use parley_types::models::ChatMessage;

use crate::error::ClientError;
use crate::traits::{MessageStore, NotificationPublisher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingStatus {
    Sending,
    Failed,
}

/// A locally-originated message awaiting confirmation. Never persisted;
/// `client_ts` (epoch millis, unique per entry) is both its display time
/// and its reconciliation key.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMessage {
    pub sender: String,
    pub body: String,
    pub client_ts: i64,
    pub status: PendingStatus,
}

/// One entry of the rendered feed. Pending entries stay visually distinct
/// from confirmed ones until reconciliation removes them.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEntry {
    Confirmed(ChatMessage),
    Pending(PendingMessage),
}

impl FeedEntry {
    fn sort_key(&self) -> i64 {
        match self {
            FeedEntry::Confirmed(m) => m.created_at.timestamp_millis(),
            FeedEntry::Pending(p) => p.client_ts,
        }
    }

    pub fn sender(&self) -> &str {
        match self {
            FeedEntry::Confirmed(m) => &m.sender,
            FeedEntry::Pending(p) => &p.sender,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Delivered,
    Failed,
}

#[derive(Debug, Clone, Copy)]
pub struct SendOutcome {
    pub client_ts: i64,
    pub status: SendStatus,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum RetryError {
    #[error("no pending entry with that timestamp")]
    UnknownEntry,
    /// A send for this entry is already in flight; concurrent retries of the
    /// same entry would double-persist it.
    #[error("send already in flight for this entry")]
    InFlight,
}

struct EngineState {
    canonical: Vec<ChatMessage>,
    pending: BTreeMap<i64, PendingMessage>,
    last_client_ts: i64,
}

impl EngineState {
    /// Allocate a strictly-increasing client timestamp so two sends in the
    /// same millisecond cannot collide on the reconciliation key.
    fn alloc_client_ts(&mut self) -> i64 {
        let ts = Utc::now().timestamp_millis().max(self.last_client_ts + 1);
        self.last_client_ts = ts;
        ts
    }
}

pub struct ReconciliationEngine<S, N> {
    display_name: String,
    store: S,
    publisher: N,
    state: Mutex<EngineState>,
}

impl<S, N> ReconciliationEngine<S, N>
where
    S: MessageStore,
    N: NotificationPublisher,
{
    pub fn new(display_name: impl Into<String>, store: S, publisher: N) -> Self {
        Self {
            display_name: display_name.into(),
            store,
            publisher,
            state: Mutex::new(EngineState {
                canonical: Vec::new(),
                pending: BTreeMap::new(),
                last_client_ts: 0,
            }),
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Optimistically send a message. The pending entry appears in the feed
    /// before the persistence call starts. Returns `None` for blank input.
    pub async fn send(&self, body: &str) -> Option<SendOutcome> {
        let body = body.trim();
        if body.is_empty() {
            return None;
        }

        let client_ts = {
            let mut state = self.lock_state();
            let client_ts = state.alloc_client_ts();
            state.pending.insert(
                client_ts,
                PendingMessage {
                    sender: self.display_name.clone(),
                    body: body.to_string(),
                    client_ts,
                    status: PendingStatus::Sending,
                },
            );
            client_ts
        };

        let status = self.persist(client_ts, &self.display_name, body).await;
        Some(SendOutcome { client_ts, status })
    }

    /// Re-attempt a failed entry, reusing its original sender, body and
    /// reconciliation key — success replaces the entry, never duplicates it.
    /// Retries of the same entry are serialized through the Sending status;
    /// retries of different entries proceed independently.
    pub async fn retry(&self, client_ts: i64) -> Result<SendStatus, RetryError> {
        let (sender, body) = {
            let mut state = self.lock_state();
            let entry = state
                .pending
                .get_mut(&client_ts)
                .ok_or(RetryError::UnknownEntry)?;
            if entry.status == PendingStatus::Sending {
                return Err(RetryError::InFlight);
            }
            entry.status = PendingStatus::Sending;
            (entry.sender.clone(), entry.body.clone())
        };

        Ok(self.persist(client_ts, &sender, &body).await)
    }

    /// Shared tail of send and retry: attempt persistence, then either
    /// reconcile (drop pending, re-pull, publish) or mark the entry failed.
    async fn persist(&self, client_ts: i64, sender: &str, body: &str) -> SendStatus {
        match self.store.append_message(sender, body).await {
            Ok(()) => {
                self.lock_state().pending.remove(&client_ts);
                if let Err(e) = self.refresh().await {
                    warn!("re-pull after confirmed send failed: {}", e);
                }
                self.publisher.notify(sender).await;
                SendStatus::Delivered
            }
            Err(e) => {
                warn!("send failed, keeping entry for retry: {}", e);
                if let Some(entry) = self.lock_state().pending.get_mut(&client_ts) {
                    entry.status = PendingStatus::Failed;
                }
                SendStatus::Failed
            }
        }
    }

    /// Re-pull the canonical list and replace local canonical state
    /// wholesale. Event-driven only — there is no polling cadence.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let messages = self.store.list_messages().await?;
        self.lock_state().canonical = messages;
        Ok(())
    }

    /// React to a relay notification. Our own publishes are excluded at the
    /// hub by connection identity, but another tab of the same user still
    /// reaches us here — sender-name comparison filters that case.
    /// Returns whether a refresh happened.
    pub async fn handle_notification(&self, sender: &str) -> Result<bool, ClientError> {
        if sender == self.display_name {
            return Ok(false);
        }
        self.refresh().await?;
        Ok(true)
    }

    /// The merged render sequence: canonical entries keyed by `created_at`,
    /// local pending entries keyed by `client_ts`, stable-sorted ascending.
    pub fn feed(&self) -> Vec<FeedEntry> {
        let state = self.lock_state();
        let mut entries: Vec<FeedEntry> = state
            .canonical
            .iter()
            .cloned()
            .map(FeedEntry::Confirmed)
            .collect();
        entries.extend(state.pending.values().cloned().map(FeedEntry::Pending));
        entries.sort_by_key(FeedEntry::sort_key);
        entries
    }

    /// String equality on display names — two users sharing a name are
    /// indistinguishable here.
    pub fn is_mine(&self, entry: &FeedEntry) -> bool {
        entry.sender() == self.display_name
    }

    pub fn has_pending(&self) -> bool {
        !self.lock_state().pending.is_empty()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, EngineState> {
        self.state.lock().expect("engine state lock poisoned")
    }
}
