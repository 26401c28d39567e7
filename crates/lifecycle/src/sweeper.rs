//! Periodic release of abandoned checkouts.

use std::sync::Arc;
use std::time::Duration;

use checkout::CheckoutBridge;
use chrono::Utc;
use store::Store;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::{OrderLifecycle, SweepReport};

/// Background task that runs [`OrderLifecycle::sweep_expired`] on a fixed
/// interval until its token is cancelled.
///
/// The first sweep runs immediately, which catches up on orders that went
/// stale while the process was down. A failed run is logged and retried on
/// the next tick.
pub struct ExpirySweeper<S, C>
where
    S: Store,
    C: CheckoutBridge,
{
    lifecycle: Arc<OrderLifecycle<S, C>>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl<S, C> ExpirySweeper<S, C>
where
    S: Store + 'static,
    C: CheckoutBridge + 'static,
{
    pub fn new(
        lifecycle: Arc<OrderLifecycle<S, C>>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            lifecycle,
            interval,
            shutdown,
        }
    }

    /// Runs a single sweep, logging instead of returning errors.
    pub async fn run_once(&self) -> Option<SweepReport> {
        match self.lifecycle.sweep_expired(Utc::now()).await {
            Ok(report) => Some(report),
            Err(e) => {
                metrics::counter!("sweep_failures_total").increment(1);
                tracing::error!(error = %e, "expiry sweep failed");
                None
            }
        }
    }

    /// Main loop: sweep on every tick until shutdown.
    pub async fn run(self) {
        tracing::info!(interval_secs = self.interval.as_secs(), "expiry sweeper started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("expiry sweeper received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    self.run_once().await;
                }
            }
        }

        tracing::info!("expiry sweeper stopped");
    }

    /// Spawns [`ExpirySweeper::run`] onto the runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
