use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::state::SessionRegistry;

/// Periodically discards sessions nobody has touched for `max_idle`.
pub async fn start_session_sweeper(registry: Arc<SessionRegistry>, max_idle: Duration) {
    // sweep a few times per idle window, but not more than once a minute
    let every = (max_idle / 4).max(Duration::from_secs(60));
    info!(?max_idle, ?every, "Session sweeper started");

    loop {
        sleep(every).await;
        let expired = registry.expire_idle(max_idle).await;
        if expired > 0 {
            let open = registry.len().await;
            info!(expired, open, "Expired idle sessions");
        } else {
            debug!("No idle sessions to expire");
        }
    }
}
