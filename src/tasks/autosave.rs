//! Persist the registry whenever timers are added or removed

use std::{path::PathBuf, sync::Arc};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use crate::registry::TimerRegistry;

/// Save `registry` to `path` after every registry change, until the registry is gone
pub async fn autosave_task(registry: Arc<TimerRegistry>, path: PathBuf) {
    info!("Starting autosave task for {}", path.display());

    let mut changes = registry.subscribe();
    let registry = Arc::downgrade(&registry);

    loop {
        match changes.recv().await {
            Ok(change) => debug!("Autosave received registry change: {:?}", change),
            Err(RecvError::Lagged(skipped)) => {
                warn!("Autosave lagged behind {} registry changes", skipped);
            }
            Err(RecvError::Closed) => break,
        }

        let Some(registry) = registry.upgrade() else {
            break;
        };
        if let Err(e) = registry.save_to_file(&path).await {
            error!("Failed to autosave timers to {}: {}", path.display(), e);
        }
    }

    debug!("Autosave task finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        actions::ActionExecutor,
        timer::{CountdownConfig, TimerConfig, TimerSpec},
    };
    use std::time::Duration;

    #[tokio::test]
    async fn test_changes_are_written_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timers.json");
        let registry = Arc::new(TimerRegistry::new(Arc::new(ActionExecutor::dry_run())));

        let task = tokio::spawn(autosave_task(Arc::clone(&registry), path.clone()));
        tokio::task::yield_now().await;

        let spec = TimerSpec::new(TimerConfig::Countdown(CountdownConfig { duration: 5 }));
        registry.create("eggs", spec).unwrap();

        let mut saved = String::new();
        for _ in 0..50 {
            saved = tokio::fs::read_to_string(&path).await.unwrap_or_default();
            if saved.contains("eggs") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(saved.contains("\"eggs\""));

        task.abort();
    }
}
