use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use parley_db::{Database, format_stamp};

/// Background task that demotes users whose presence lease went stale.
///
/// The idle-offline signal is client-initiated, so a client that crashes or
/// loses its network leaves `online = 1` behind forever. This sweep runs on
/// an interval and marks every user offline whose `last_active` is older
/// than the lease TTL.
pub async fn run_presence_sweep(db: Arc<Database>, interval_secs: u64, ttl_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let cutoff = format_stamp(Utc::now() - chrono::Duration::seconds(ttl_secs as i64));
        let db = db.clone();
        match tokio::task::spawn_blocking(move || db.expire_stale_presence(&cutoff)).await {
            Ok(Ok(count)) => {
                if count > 0 {
                    info!("Presence sweep: marked {} stale users offline", count);
                }
            }
            Ok(Err(e)) => {
                warn!("Presence sweep error: {}", e);
            }
            Err(e) => {
                warn!("Presence sweep join error: {}", e);
            }
        }
    }
}
