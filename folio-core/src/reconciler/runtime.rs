use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

use super::Reconciler;

/// Runs the reconciler on a fixed cadence until stopped.
///
/// A failed pass is logged and the loop keeps ticking; a storage outage
/// heals on a later tick instead of killing the task.
pub struct BackgroundReconciler {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl std::fmt::Debug for BackgroundReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundReconciler")
            .field("running", &!self.handle.is_finished())
            .finish()
    }
}

impl BackgroundReconciler {
    /// Spawns the tick loop. The first pass runs after one full
    /// cadence, not immediately.
    pub fn spawn(reconciler: Reconciler, cadence: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let handle = tokio::spawn(async move {
            info!(
                interval_secs = cadence.as_secs(),
                "Background reconciler started"
            );
            let mut ticker = interval(cadence);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // A fresh interval yields its first tick immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) =
                            reconciler.sweep_overdue(Utc::now()).await
                        {
                            warn!(error = %err, "Overdue sweep failed");
                        }
                        if let Err(err) =
                            reconciler.refresh_waitlists().await
                        {
                            warn!(error = %err, "Waitlist refresh failed");
                        }
                        if let Err(err) =
                            reconciler.reconcile_stock().await
                        {
                            warn!(error = %err, "Stock reconciliation failed");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Background reconciler shutting down");
                        break;
                    }
                }
            }
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Signals the loop to exit and waits for the task to finish.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::database::infrastructure::memory::InMemoryDatabase;
    use crate::providers::{LogNotificationSink, StaticSubscriptionOracle};
    use crate::waitlist::WaitlistService;

    fn reconciler() -> Reconciler {
        let db = InMemoryDatabase::new();
        let borrows = Arc::new(db.borrows_repository());
        let waitlist = WaitlistService::new(
            Arc::new(db.waitlist_repository()),
            borrows.clone(),
            Arc::new(StaticSubscriptionOracle::default()),
            Arc::new(LogNotificationSink),
        );
        Reconciler::new(
            Arc::new(db.titles_repository()),
            borrows,
            waitlist,
            Arc::new(LogNotificationSink),
        )
    }

    #[tokio::test]
    async fn stop_interrupts_a_long_wait() {
        let background = BackgroundReconciler::spawn(
            reconciler(),
            Duration::from_secs(3600),
        );
        // Returns promptly rather than after the first hour-long tick.
        background.stop().await;
    }
}
