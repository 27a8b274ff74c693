//! Scheduled cleanup of expired sessions and blacklist entries.

use crate::db::Database;
use std::time::Duration;
use tokio::time::{Instant, Interval, interval_at};
use tracing::{error, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once.
pub async fn run_cleanup(db: &Database) {
    match db.sessions().sweep_expired().await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired sessions", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up expired sessions: {}", e),
    }

    match db.blacklist().sweep_expired().await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired blacklist entries", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up token blacklist: {}", e),
    }
}

/// Ticker whose first tick is one full period away.
fn cleanup_interval(period: Duration) -> Interval {
    interval_at(Instant::now() + period, period)
}

/// Spawn a background task that runs cleanup periodically.
/// The first run happens one interval after spawning, since startup already
/// ran `run_cleanup`. Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(db: Database) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = cleanup_interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&db).await;
        }
    })
}
