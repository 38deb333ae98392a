//! Retention sweeper for trimming check history.

use crate::config::ServerConfig;
use crate::db::Store;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

/// Background task that bounds per-application check history.
pub struct RetentionSweeper {
    store: Arc<Store>,
    keep: u32,
    sweep_interval: Duration,
    stop_tx: broadcast::Sender<()>,
}

impl RetentionSweeper {
    pub fn new(store: Arc<Store>, cfg: &ServerConfig) -> Self {
        let (stop_tx, _) = broadcast::channel(1);
        Self {
            store,
            keep: cfg.retention_keep,
            sweep_interval: cfg.retention_sweep_interval(),
            stop_tx,
        }
    }

    /// Start the sweep loop. The first sweep runs immediately, then on the
    /// configured cadence.
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        let store = self.store.clone();
        let keep = self.keep;
        let sweep_interval = self.sweep_interval;
        let mut stop_rx = self.stop_tx.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);

            loop {
                tokio::select! {
                    _ = stop_rx.recv() => break,
                    _ = interval.tick() => sweep(&store, keep),
                }
            }
        })
    }

    /// Signal the sweep loop to stop.
    pub fn shutdown(&self) {
        let _ = self.stop_tx.send(());
    }
}

/// Trim every application's history to its `keep` most recent checks.
///
/// Also invocable on demand. Failures are logged and retried on the next
/// cycle; the sweep never touches rows newer than the Nth-most-recent at
/// statement start, and row deletion is atomic.
pub fn sweep(store: &Store, keep: u32) {
    match store.trim_checks(keep) {
        Ok(0) => {}
        Ok(deleted) => tracing::info!("Retention: removed {} old check rows", deleted),
        Err(e) => tracing::error!("Retention: sweep failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CheckStatus, CheckType, NewApplication};
    use tempfile::NamedTempFile;

    #[test]
    fn test_sweep_trims_to_keep_count() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let server = store.add_server("s", "h").unwrap();
        let app = store
            .add_application(&NewApplication {
                server_id: server.id,
                name: "a".to_string(),
                port: Some(80),
                health_url: None,
                check_interval: 60,
                response_threshold: 4000,
            })
            .unwrap();

        for _ in 0..10 {
            store
                .insert_check(app.id, CheckType::Port, CheckStatus::Up, 1, None)
                .unwrap();
        }

        sweep(&store, 3);
        assert_eq!(store.count_checks(app.id).unwrap(), 3);

        // Idempotent: a second sweep deletes nothing further.
        sweep(&store, 3);
        assert_eq!(store.count_checks(app.id).unwrap(), 3);
    }
}
