//! Background worker.
//!
//! Drains the payload queue and refreshes rules on independent intervals.
//! Coordinator calls block on the network, so each one runs on tokio's
//! blocking pool; at most one drain and one refresh are in flight at a time.

use crate::config::MIN_WORKER_INTERVAL;
use crate::engine::Engagement;
use crate::error::{CoreError, CoreResult};
use engage_sync_engine::EngageTransport;
use std::sync::Arc;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Handle to a running background worker.
///
/// Dropping the handle stops the worker after its current step; call
/// [`WorkerHandle::shutdown`] to wait for it.
pub struct WorkerHandle {
    wake: Arc<Notify>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Requests a drain now instead of at the next interval.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// True once the worker loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the worker and waits for it to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker task panicked.
    pub async fn shutdown(mut self) -> CoreResult<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        (&mut self.task)
            .await
            .map_err(|e| CoreError::worker(e.to_string()))
    }
}

/// Spawns the background worker on the current tokio runtime.
pub fn spawn_worker<T>(engine: Arc<Engagement<T>>) -> WorkerHandle
where
    T: EngageTransport + 'static,
{
    let wake = Arc::new(Notify::new());
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(run(engine, Arc::clone(&wake), shutdown_rx));
    WorkerHandle {
        wake,
        shutdown: Some(shutdown_tx),
        task,
    }
}

async fn run<T>(engine: Arc<Engagement<T>>, wake: Arc<Notify>, mut shutdown: oneshot::Receiver<()>)
where
    T: EngageTransport + 'static,
{
    // The config fields are public, so a zero period can bypass the setters.
    let drain_period = engine.config().drain_interval.max(MIN_WORKER_INTERVAL);
    let refresh_period = engine.config().refresh_interval.max(MIN_WORKER_INTERVAL);
    let mut drain = time::interval(drain_period);
    drain.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut refresh = time::interval(refresh_period);
    refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        drain_ms = drain_period.as_millis() as u64,
        refresh_ms = refresh_period.as_millis() as u64,
        "engagement worker started"
    );

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = refresh.tick() => refresh_step(&engine).await,
            _ = drain.tick() => drain_step(&engine).await,
            _ = wake.notified() => drain_step(&engine).await,
        }
    }

    info!("engagement worker stopped");
}

async fn drain_step<T>(engine: &Arc<Engagement<T>>)
where
    T: EngageTransport + 'static,
{
    let engine = Arc::clone(engine);
    match tokio::task::spawn_blocking(move || engine.drain_all()).await {
        Ok(Ok(summary)) if summary.attempts() > 0 => debug!(
            delivered = summary.delivered,
            retrying = summary.retrying,
            rejected = summary.rejected,
            "drain pass finished"
        ),
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!(error = %e, "drain pass failed"),
        Err(e) => warn!(error = %e, "drain task aborted"),
    }
}

async fn refresh_step<T>(engine: &Arc<Engagement<T>>)
where
    T: EngageTransport + 'static,
{
    let engine = Arc::clone(engine);
    match tokio::task::spawn_blocking(move || engine.refresh_rules()).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => debug!(error = %e, "rule refresh failed; keeping cached rules"),
        Err(e) => warn!(error = %e, "refresh task aborted"),
    }
}
