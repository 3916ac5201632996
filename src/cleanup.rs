//! Scheduled garbage collection of refresh tokens.

use crate::db::Database;
use std::time::Duration;
use tracing::{error, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Delete expired and revoked refresh tokens once. Returns the number of
/// rows removed; failures are logged and count as zero.
pub async fn run_cleanup(db: &Database) -> u64 {
    match db.refresh_tokens().cleanup_expired().await {
        Ok(count) if count > 0 => {
            info!("Cleaned up {} expired or revoked refresh tokens", count);
            count
        }
        Ok(_) => 0,
        Err(e) => {
            error!("Failed to clean up refresh tokens: {}", e);
            0
        }
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(db: Database) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        // The first tick completes immediately; startup already ran once.
        interval.tick().await;

        loop {
            interval.tick().await;
            run_cleanup(&db).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_run_cleanup_removes_unusable_tokens() {
        let clock = Arc::new(ManualClock::new(1_000));
        let db = Database::open_with(":memory:", clock.clone(), Duration::from_secs(2))
            .await
            .unwrap();
        let store = db.refresh_tokens();

        store.store("u1", "live", 5_000).await.unwrap();
        store.store("u1", "stale", 1_500).await.unwrap();
        store.store("u1", "revoked", 5_000).await.unwrap();
        store.revoke("revoked").await.unwrap();

        clock.set(2_000);
        assert_eq!(run_cleanup(&db).await, 2);
        assert_eq!(run_cleanup(&db).await, 0);
        assert!(store.get_by_token("live").await.is_ok());
    }
}
