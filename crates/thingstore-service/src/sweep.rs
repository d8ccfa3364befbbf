//! Periodic removal of abandoned cursors.

use std::sync::Arc;
use std::time::Duration;

use thingstore_history::History;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// Background task releasing expired cursors.
///
/// Lookups already evict expired cursors lazily; the sweep reclaims the ones
/// nobody asks for again.
pub struct CursorSweeper {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl CursorSweeper {
    /// Start sweeping `history` every `period`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(history: Arc<History>, period: Duration) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run(history, period, stop_rx));
        info!("Sweeping expired cursors every {}s", period.as_secs_f64());
        Self { stop_tx, handle }
    }

    /// Signal the task to stop and wait for it.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.handle.await {
            warn!("Cursor sweeper failed: {}", e);
        }
    }
}

async fn run(history: Arc<History>, period: Duration, mut stop_rx: watch::Receiver<bool>) {
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = timer.tick() => {
                match history.cursors().sweep_expired() {
                    Ok(0) => {}
                    Ok(n) => debug!("Released {} expired cursor(s)", n),
                    Err(e) => warn!("Cursor sweep failed: {}", e),
                }
            }
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
    }

    debug!("Cursor sweeper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use thingstore_store::MemoryBackend;

    #[tokio::test]
    async fn test_sweeps_expired_cursors() {
        let history = Arc::new(
            History::new(Arc::new(MemoryBackend::new()))
                .with_cursor_lifespan(Duration::from_millis(20)),
        );
        history.create_cursor("c1", "thing-1", None).unwrap();
        history.create_cursor("c2", "thing-2", None).unwrap();
        assert_eq!(history.cursors().len(), 2);

        let sweeper = CursorSweeper::start(Arc::clone(&history), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(150)).await;
        sweeper.stop().await;

        assert!(history.cursors().is_empty());
    }

    #[tokio::test]
    async fn test_keeps_live_cursors() {
        let history = Arc::new(History::new(Arc::new(MemoryBackend::new())));
        history.create_cursor("c1", "thing-1", None).unwrap();

        let sweeper = CursorSweeper::start(Arc::clone(&history), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        sweeper.stop().await;

        assert_eq!(history.cursors().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_is_prompt() {
        let history = Arc::new(History::new(Arc::new(MemoryBackend::new())));
        let sweeper = CursorSweeper::start(history, Duration::from_secs(3600));

        tokio::time::timeout(Duration::from_secs(5), sweeper.stop())
            .await
            .expect("sweeper should stop without waiting for the next tick");
    }
}
