//! Client-side session lifecycle: three independent timers/tasks tied to
//! the connected lifetime of one client.
//!
//! 1. Idle timer — user-activity signals re-arm a countdown; 60 s of
//!    silence and the client asks to be shown offline.
//! 2. Token lease — every 30 s the token is re-verified; success refreshes
//!    the server-side presence lease, rejection ends the session.
//! 3. Relay link — forwards "message added" events into the reconciliation
//!    engine.
//!
//! The tasks communicate only through explicit channels and are aborted
//! together when the [`Session`] is dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use parley_types::events::RelayEvent;

use crate::engine::ReconciliationEngine;
use crate::error::ClientError;
use crate::traits::{IdentityApi, MessageStore, NotificationPublisher, PresenceApi, RelayLink};

/// Inactivity threshold before the client requests offline status.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// How often the token is re-verified (and the presence lease renewed).
pub const LEASE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Token verification was rejected. Terminal: the owner should drop the
    /// session and force re-authentication.
    Expired,
    /// The relay connection is gone. Notifications stop arriving; the view
    /// goes stale until reconnect or manual reload.
    RelayClosed,
}

/// Handle to a running session. Dropping it aborts all three tasks.
pub struct Session {
    activity_tx: mpsc::UnboundedSender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    pub fn start<P, I, L, S, N>(
        presence: Arc<P>,
        identity: Arc<I>,
        relay: L,
        engine: Arc<ReconciliationEngine<S, N>>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>)
    where
        P: PresenceApi + 'static,
        I: IdentityApi + 'static,
        L: RelayLink + 'static,
        S: MessageStore + 'static,
        N: NotificationPublisher + 'static,
    {
        let (activity_tx, activity_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let tasks = vec![
            tokio::spawn(idle_task(presence, activity_rx)),
            tokio::spawn(lease_task(identity, events_tx.clone())),
            tokio::spawn(relay_task(relay, engine, events_tx)),
        ];

        (
            Self { activity_tx, tasks },
            events_rx,
        )
    }

    /// Report a user-activity signal (pointer movement, key press, scroll,
    /// touch). Re-arms the idle countdown.
    pub fn activity(&self) {
        let _ = self.activity_tx.send(());
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn idle_task<P: PresenceApi>(presence: Arc<P>, mut activity_rx: mpsc::UnboundedReceiver<()>) {
    loop {
        tokio::select! {
            signal = activity_rx.recv() => {
                if signal.is_none() {
                    break;
                }
                // Re-arm the countdown
            }
            _ = tokio::time::sleep(IDLE_TIMEOUT) => {
                debug!("idle for {:?}, requesting offline", IDLE_TIMEOUT);
                if let Err(e) = presence.set_offline().await {
                    warn!("offline request failed: {}", e);
                }
                // Stay dormant until the next activity signal re-arms us;
                // repeating the request while still idle would be noise.
                if activity_rx.recv().await.is_none() {
                    break;
                }
            }
        }
    }
}

async fn lease_task<I: IdentityApi>(identity: Arc<I>, events_tx: mpsc::UnboundedSender<SessionEvent>) {
    let mut interval = tokio::time::interval(LEASE_INTERVAL);
    loop {
        interval.tick().await;
        match identity.verify().await {
            Ok(()) => {}
            Err(ClientError::Unauthorized) => {
                warn!("token rejected, session expired");
                let _ = events_tx.send(SessionEvent::Expired);
                break;
            }
            Err(e) => {
                // Best-effort lease: a flaky network is not a reason to log
                // the user out. The lease just stays unrenewed this round.
                warn!("lease renewal failed: {}", e);
            }
        }
    }
}

async fn relay_task<L, S, N>(
    mut relay: L,
    engine: Arc<ReconciliationEngine<S, N>>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
) where
    L: RelayLink,
    S: MessageStore,
    N: NotificationPublisher,
{
    while let Some(event) = relay.next_event().await {
        match event {
            RelayEvent::MessageAdded { sender } => {
                if let Err(e) = engine.handle_notification(&sender).await {
                    warn!("refresh after notification failed: {}", e);
                }
            }
            RelayEvent::Ready { display_name, .. } => {
                debug!("relay ready as {}", display_name);
            }
        }
    }
    let _ = events_tx.send(SessionEvent::RelayClosed);
}
