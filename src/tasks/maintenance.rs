//! Maintenance Task
//!
//! Background task that periodically sweeps expired entries from every
//! cache a [`CacheManager`] owns.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::manager::CacheManager;

/// Spawns a background task that runs maintenance every `interval_secs`.
///
/// Each pass runs on the blocking pool since the persistent cache does file
/// I/O. Abort the returned handle to stop the task.
///
/// # Example
/// ```ignore
/// let manager = Arc::new(CacheManager::new(ManagerConfig::from_env())?);
/// let handle = spawn_maintenance_task(manager.clone(), 60);
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_maintenance_task(manager: Arc<CacheManager>, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting cache maintenance task with interval of {} seconds",
            interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            let manager = Arc::clone(&manager);
            match tokio::task::spawn_blocking(move || manager.perform_maintenance()).await {
                Ok(report) if report.total_removed() > 0 => info!(
                    "Cache maintenance: removed {} expired entries ({} memory, {} persistent)",
                    report.total_removed(),
                    report.memory_expired_removed,
                    report.persistent_expired_removed
                ),
                Ok(_) => debug!("Cache maintenance: no expired entries found"),
                Err(e) => warn!("Cache maintenance pass failed: {}", e),
            }
        }
    })
}

/// Spawns the maintenance task on the manager's configured interval.
///
/// Intervals below one second are rounded up to one second.
pub fn spawn_configured_maintenance_task(manager: Arc<CacheManager>) -> JoinHandle<()> {
    let interval_secs = manager.config().maintenance_interval.as_secs().max(1);
    spawn_maintenance_task(manager, interval_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::config::ManagerConfig;
    use serde_json::json;

    fn manager_with_clock() -> (Arc<CacheManager>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let manager = CacheManager::with_clock(
            ManagerConfig::default().with_persistent_cache(false),
            clock.clone(),
        )
        .unwrap();
        (Arc::new(manager), clock)
    }

    #[tokio::test]
    async fn test_maintenance_task_removes_expired_entries() {
        let (manager, clock) = manager_with_clock();
        manager.cache_operation_result("op", "//t", &json!(1), "d", json!("r"));
        clock.advance(Duration::from_secs(601));

        let handle = spawn_maintenance_task(manager.clone(), 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert!(manager.operation_cache().inner().is_empty());
        handle.abort();
    }

    #[tokio::test]
    async fn test_maintenance_task_preserves_valid_entries() {
        let (manager, _clock) = manager_with_clock();
        manager.cache_operation_result("op", "//t", &json!(1), "d", json!("r"));

        let handle = spawn_maintenance_task(manager.clone(), 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(
            manager.get_cached_operation_result("op", "//t", &json!(1), "d"),
            Some(json!("r"))
        );
        handle.abort();
    }

    #[tokio::test]
    async fn test_configured_task_uses_manager_interval() {
        let clock = Arc::new(ManualClock::default());
        let config = ManagerConfig {
            maintenance_interval: Duration::from_secs(1),
            ..ManagerConfig::default().with_persistent_cache(false)
        };
        let manager = Arc::new(CacheManager::with_clock(config, clock.clone()).unwrap());
        manager.cache_operation_result("op", "//t", &json!(1), "d", json!("r"));
        clock.advance(Duration::from_secs(601));

        let handle = spawn_configured_maintenance_task(manager.clone());
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert!(manager.operation_cache().inner().is_empty());
        handle.abort();
    }

    #[tokio::test]
    async fn test_maintenance_task_can_be_aborted() {
        let (manager, _clock) = manager_with_clock();

        let handle = spawn_maintenance_task(manager, 1);
        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
