use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::services::feedback_chat::ChatSession;
use crate::services::sessions::SessionStore;

pub(crate) const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Periodically drops idle chat sessions until `shutdown` flips to true.
pub(crate) fn spawn(
    sessions: Arc<dyn SessionStore<ChatSession>>,
    period: Duration,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(sweep_loop(sessions, period, shutdown))
}

async fn sweep_loop(
    sessions: Arc<dyn SessionStore<ChatSession>>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately.
    ticker.tick().await;

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let purged = sessions.purge_expired().await;
                if purged > 0 {
                    let remaining = sessions.len().await;
                    tracing::info!(purged, remaining, "Purged expired chat sessions");
                }
            }
        }
    }

    tracing::debug!("Chat session sweeper stopped");
}
