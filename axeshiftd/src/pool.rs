//! Bounded worker pool for per-device fan-out.
//!
//! # Semantics
//!
//! - At most `width` tasks run at once (semaphore permits).
//! - Each task owns one device slot for its whole duration. A device whose
//!   slot is still held (e.g. by a task that timed out last round) is
//!   reported `Busy` instead of being scheduled twice.
//! - Each task gets its own deadline, measured from the moment it holds a
//!   permit. Time spent queued behind siblings does not count. A task that
//!   misses it is reported `TimedOut` and left running detached; its result
//!   is dropped. It stays tracked for the shutdown drain.
//! - Cancellation is checked before every dispatch.
//! - Sequential mode dispatches the next device only after the previous one
//!   has finished or timed out.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{oneshot, OwnedMutexGuard, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use axeshift_domain::{Device, DeviceId};

use crate::fleet::DeviceSlot;

/// What came back for one device in a round.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome<T> {
    Completed(T),
    /// Missed its deadline; still running detached
    TimedOut,
    /// Task panicked
    Failed(String),
    /// Slot still held by an earlier task
    Busy,
}

/// Counts for one fan-out round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundSummary {
    pub completed: usize,
    pub timed_out: usize,
    pub failed: usize,
    pub busy: usize,
}

impl RoundSummary {
    pub fn from_outcomes<T>(outcomes: &[(DeviceId, TaskOutcome<T>)]) -> Self {
        let mut summary = Self::default();
        for (_, outcome) in outcomes {
            match outcome {
                TaskOutcome::Completed(_) => summary.completed += 1,
                TaskOutcome::TimedOut => summary.timed_out += 1,
                TaskOutcome::Failed(_) => summary.failed += 1,
                TaskOutcome::Busy => summary.busy += 1,
            }
        }
        summary
    }
}

/// Fan-out executor shared by every round of the orchestrator.
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    width: usize,
    parallel: bool,
}

impl WorkerPool {
    pub fn new(width: usize, parallel: bool) -> Self {
        let width = width.max(1);
        Self {
            permits: Arc::new(Semaphore::new(width)),
            tracker: TaskTracker::new(),
            width,
            parallel,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Tasks spawned and not yet finished, including detached ones.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Run `op` once per device and collect every outcome.
    ///
    /// Devices not dispatched because of cancellation are absent from the result.
    pub async fn fan_out<T, F, Fut>(
        &self,
        devices: Vec<(DeviceId, DeviceSlot)>,
        per_task: Duration,
        cancel: &CancellationToken,
        op: F,
    ) -> Vec<(DeviceId, TaskOutcome<T>)>
    where
        F: Fn(OwnedMutexGuard<Device>) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.parallel {
            self.fan_out_parallel(devices, per_task, cancel, op).await
        } else {
            self.fan_out_sequential(devices, per_task, cancel, op).await
        }
    }

    async fn fan_out_parallel<T, F, Fut>(
        &self,
        devices: Vec<(DeviceId, DeviceSlot)>,
        per_task: Duration,
        cancel: &CancellationToken,
        op: F,
    ) -> Vec<(DeviceId, TaskOutcome<T>)>
    where
        F: Fn(OwnedMutexGuard<Device>) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let mut busy = Vec::new();
        let mut pending = Vec::with_capacity(devices.len());

        for (id, slot) in devices {
            if cancel.is_cancelled() {
                debug!("Cancellation requested, stopping dispatch");
                break;
            }
            match slot.try_lock_owned() {
                Ok(guard) => {
                    let task = self.spawn(op(guard));
                    pending.push((id, task));
                }
                Err(_) => {
                    warn!(device = %id, "Device still busy from an earlier task, skipping");
                    busy.push((id, TaskOutcome::Busy));
                }
            }
        }

        let collected = join_all(pending.into_iter().map(|(id, task)| async move {
            let outcome = task.outcome(&id, per_task).await;
            (id, outcome)
        }))
        .await;

        collected.into_iter().chain(busy).collect()
    }

    async fn fan_out_sequential<T, F, Fut>(
        &self,
        devices: Vec<(DeviceId, DeviceSlot)>,
        per_task: Duration,
        cancel: &CancellationToken,
        op: F,
    ) -> Vec<(DeviceId, TaskOutcome<T>)>
    where
        F: Fn(OwnedMutexGuard<Device>) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let mut outcomes = Vec::with_capacity(devices.len());

        for (id, slot) in devices {
            if cancel.is_cancelled() {
                debug!("Cancellation requested, stopping dispatch");
                break;
            }
            let outcome = match slot.try_lock_owned() {
                Ok(guard) => self.spawn(op(guard)).outcome(&id, per_task).await,
                Err(_) => {
                    warn!(device = %id, "Device still busy from an earlier task, skipping");
                    TaskOutcome::Busy
                }
            };
            outcomes.push((id, outcome));
        }

        outcomes
    }

    fn spawn<T, Fut>(&self, task: Fut) -> Spawned<T>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permits = self.permits.clone();
        let (started_tx, started) = oneshot::channel();
        let handle = self.tracker.spawn(async move {
            // Closed only after shutdown; run anyway
            let _permit = permits.acquire_owned().await.ok();
            let _ = started_tx.send(());
            task.await
        });
        Spawned { started, handle }
    }

    /// Stop accepting work and wait for in-flight tasks, up to `grace`.
    ///
    /// Returns `true` if everything finished in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();
        let in_flight = self.tracker.len();
        if in_flight > 0 {
            debug!(in_flight, "Waiting for in-flight device tasks");
        }
        match timeout(grace, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    still_running = self.tracker.len(),
                    "Shutdown grace elapsed with device tasks still running"
                );
                false
            }
        }
    }
}

/// A spawned task and its start signal.
struct Spawned<T> {
    /// Fires once the task holds a permit
    started: oneshot::Receiver<()>,
    handle: JoinHandle<T>,
}

impl<T> Spawned<T> {
    /// Wait for the task to start, then give it `per_task` to finish.
    async fn outcome(self, id: &DeviceId, per_task: Duration) -> TaskOutcome<T> {
        if self.started.await.is_err() {
            // Dropped before starting; the join error says why
            return collect(id, Ok(self.handle.await));
        }
        collect(id, timeout(per_task, self.handle).await)
    }
}

fn collect<T>(
    id: &DeviceId,
    result: Result<Result<T, tokio::task::JoinError>, tokio::time::error::Elapsed>,
) -> TaskOutcome<T> {
    match result {
        Ok(Ok(value)) => TaskOutcome::Completed(value),
        Ok(Err(e)) => {
            warn!(device = %id, error = %e, "Device task failed");
            TaskOutcome::Failed(e.to_string())
        }
        Err(_) => {
            warn!(device = %id, "Device task timed out, result will be dropped");
            TaskOutcome::TimedOut
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
