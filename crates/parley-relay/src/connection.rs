use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_db::Database;
use parley_types::events::{RelayCommand, RelayEvent};

use crate::hub::{ConnId, Relay};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a fresh connection gets to present its token.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle a single relay WebSocket connection.
///
/// Lifecycle: identify handshake -> bind connection handle to the user
/// record -> Ready -> event loop -> unbind (ownership-checked) on exit.
/// Disconnect clears only the handle; the online flag is left to the idle
/// signal and the server-side expiry sweep.
pub async fn handle_connection(
    socket: WebSocket,
    relay: Relay,
    db: Arc<Database>,
    jwt_secret: String,
) {
    let (mut sender, mut receiver) = socket.split();

    let (user_id, display_name) = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(identity) => identity,
        None => {
            warn!("relay client failed to identify, closing");
            return;
        }
    };

    info!("{} ({}) connected to relay", display_name, user_id);

    let (conn_id, mut events_rx) = relay.register().await;

    // Bind the live connection handle. Last writer wins: a second tab for
    // the same user simply overwrites this one's handle.
    {
        let db = db.clone();
        let uid = user_id.to_string();
        let handle = conn_id.to_string();
        let bound =
            tokio::task::spawn_blocking(move || db.bind_connection(&uid, &handle)).await;
        if !matches!(bound, Ok(Ok(()))) {
            warn!("failed to bind connection handle for {}", user_id);
        }
    }

    let ready = RelayEvent::Ready {
        user_id,
        display_name: display_name.clone(),
    };
    if sender
        .send(Message::Text(serde_json::to_string(&ready).unwrap().into()))
        .await
        .is_err()
    {
        teardown(&relay, &db, user_id, conn_id).await;
        return;
    }

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward relay events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = events_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };
                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let relay_recv = relay.clone();
    let name_recv = display_name.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<RelayCommand>(&text) {
                    Ok(RelayCommand::Identify { .. }) => {} // Already handled
                    Ok(RelayCommand::Notify { .. }) => {
                        // Fan out under the authenticated display name, not
                        // whatever the client put in the payload.
                        relay_recv.notify(conn_id, &name_recv).await;
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            name_recv,
                            user_id,
                            e,
                            &text[..text.len().min(200)]
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    teardown(&relay, &db, user_id, conn_id).await;
    info!("{} ({}) disconnected from relay", display_name, user_id);
}

/// Unregister from the hub and clear the stored connection handle — but only
/// if this connection still owns it. A concurrent reconnect from another tab
/// may already have overwritten the handle; leave it alone in that case.
async fn teardown(relay: &Relay, db: &Arc<Database>, user_id: Uuid, conn_id: ConnId) {
    relay.unregister(conn_id).await;

    let db = db.clone();
    let uid = user_id.to_string();
    let handle = conn_id.to_string();
    match tokio::task::spawn_blocking(move || db.unbind_connection(&uid, &handle)).await {
        Ok(Ok(true)) => {}
        Ok(Ok(false)) => {
            debug!("connection handle for {} already taken over", user_id);
        }
        _ => warn!("failed to unbind connection handle for {}", user_id),
    }
}

async fn wait_for_identify(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<(Uuid, String)> {
    use jsonwebtoken::{DecodingKey, Validation, decode};
    use parley_types::api::Claims;

    let timeout = tokio::time::timeout(IDENTIFY_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(RelayCommand::Identify { token }) =
                    serde_json::from_str::<RelayCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some((token_data.claims.sub, token_data.claims.name));
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}
