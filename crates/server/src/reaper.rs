use std::sync::Arc;
use std::time::Duration;

use flightdesk_agent::AgentRuntime;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Periodically drops sessions that have been idle past the configured timeout.
pub fn spawn(runtime: Arc<AgentRuntime>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            sweep(&runtime).await;
        }
    })
}

pub async fn sweep(runtime: &AgentRuntime) -> usize {
    let evicted = runtime.evict_idle().await;
    if evicted.is_empty() {
        debug!(event_name = "session.reaper.idle", correlation_id = "reaper", "no idle sessions");
        return 0;
    }

    let remaining = runtime.sessions().len().await;
    info!(
        event_name = "session.reaper.swept",
        correlation_id = "reaper",
        evicted = evicted.len(),
        remaining,
        "idle sessions swept"
    );
    evicted.len()
}
