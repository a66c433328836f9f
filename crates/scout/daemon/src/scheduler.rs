//! Fixed-interval reconciliation loop

use crate::engine::Engine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::{interval, MissedTickBehavior};

/// Drives [`Engine::run_iteration`] on a timer and on demand
pub struct Scheduler {
    engine: Arc<Engine>,
    interval: Duration,
    reconcile_tx: mpsc::Sender<()>,
    running: Arc<RwLock<bool>>,
}

impl Scheduler {
    /// Create a new scheduler
    pub fn new(engine: Arc<Engine>, interval: Duration) -> (Arc<Self>, mpsc::Receiver<()>) {
        let (reconcile_tx, reconcile_rx) = mpsc::channel(1);

        let scheduler = Arc::new(Self {
            engine,
            interval,
            reconcile_tx,
            running: Arc::new(RwLock::new(false)),
        });

        (scheduler, reconcile_rx)
    }

    /// Request an immediate iteration. Returns false if one is already queued.
    pub fn trigger_reconcile(&self) -> bool {
        self.reconcile_tx.try_send(()).is_ok()
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Run until shutdown is signalled or [`Scheduler::stop`] is called.
    ///
    /// The first iteration runs immediately. An iteration in progress is
    /// allowed to finish; only the wait between iterations is cancelled.
    pub async fn start(
        self: Arc<Self>,
        mut reconcile_rx: mpsc::Receiver<()>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        {
            let mut running = self.running.write().await;
            *running = true;
        }

        tracing::info!(interval_secs = self.interval.as_secs(), "Scheduler started");

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    self.reconcile().await;
                }
                Some(_) = reconcile_rx.recv() => {
                    tracing::info!("Triggered reconciliation");
                    self.reconcile().await;
                    ticker.reset();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }

            let running = self.running.read().await;
            if !*running {
                break;
            }
        }

        *self.running.write().await = false;
        tracing::info!("Scheduler stopped");
    }

    /// Stop after the current iteration
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
    }

    async fn reconcile(&self) {
        match self.engine.run_iteration().await {
            Ok(report) if report.failed > 0 => {
                tracing::warn!(
                    iteration = report.iteration,
                    failed = report.failed,
                    "Reconciliation finished with failures"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Reconciliation failed"),
        }
    }
}
