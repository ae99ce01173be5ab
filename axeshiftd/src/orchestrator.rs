//! Fleet Orchestrator: the control loop.
//!
//! # State machine
//!
//! ```text
//! Idle → Discovering → PeriodSteady ⇄ PeriodTransitioning → Shutdown
//! ```
//!
//! - **Discovering**: poll every enabled device once, apply nothing.
//! - **PeriodTransitioning**: the resolved period differs from the last
//!   applied one; broadcast the new target to every online device.
//! - **PeriodSteady**: poll, check safety, record stats, print status and
//!   flush on their own intervals, then sleep.
//! - **Shutdown**: drain in-flight device tasks, flush stats once.
//!
//! A period broadcast always completes (or times out per device) before the
//! poll round of the same cycle starts.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{watch, OwnedMutexGuard};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use axeshift_domain::{Device, Period, ProfileSet, SafetyLimits};
use axeshift_engine::{check_safety, resolve_period, resolve_target, Clock, SafetyVerdict, SafetyViolation};
use axeshift_exec::{DeviceClient, DevicePort, TransitionEngine, RESTART_GRACE};
use axeshift_store::{DeviceSnapshot, SnapshotStore, StatsAggregator, StatsSnapshot};

use crate::config::ControlConfig;
use crate::error::{DaemonError, DaemonResult};
use crate::event_bus::{EventBus, FleetEvent};
use crate::fleet::Fleet;
use crate::metrics::FleetMetrics;
use crate::pool::{RoundSummary, TaskOutcome, WorkerPool};
use crate::status::render_status_table;

// =============================================================================
// State
// =============================================================================

/// Orchestrator lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Idle,
    Discovering,
    PeriodSteady,
    PeriodTransitioning,
    Shutdown,
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrchestratorState::Idle => "idle",
            OrchestratorState::Discovering => "discovering",
            OrchestratorState::PeriodSteady => "period_steady",
            OrchestratorState::PeriodTransitioning => "period_transitioning",
            OrchestratorState::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Result of reconciling one device with its target.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyResult {
    Applied,
    /// Last written settings already matched
    AlreadyApplied,
    /// Inside the post-restart grace period; left untouched
    Rebooting,
    Failed(String),
}

/// Result of polling one device.
#[derive(Debug, Clone, PartialEq)]
pub enum PollResult {
    Healthy,
    /// Ceiling breached, day settings forced
    SafetyForced {
        violation: SafetyViolation,
        applied: ApplyResult,
    },
    Offline,
    /// Inside the post-restart grace period
    Rebooting,
}

/// When the periodic side jobs of a cycle last ran.
#[derive(Debug, Clone, Copy)]
pub struct CycleSchedule {
    last_status: Option<Instant>,
    last_flush: Instant,
}

impl CycleSchedule {
    /// Status prints on the first cycle; the first flush waits a full interval.
    pub fn new(now: Instant) -> Self {
        Self {
            last_status: None,
            last_flush: now,
        }
    }

    fn status_due(&mut self, now: Instant, interval: Duration) -> bool {
        let due = self
            .last_status
            .map_or(true, |last| now.duration_since(last) >= interval);
        if due {
            self.last_status = Some(now);
        }
        due
    }

    fn flush_due(&mut self, now: Instant, interval: Duration) -> bool {
        let due = now.duration_since(self.last_flush) >= interval;
        if due {
            self.last_flush = now;
        }
        due
    }
}

// =============================================================================
// Per-device work
// =============================================================================

/// Everything a device task needs. Cloned into each spawned task.
struct DeviceWork<P: DevicePort + 'static> {
    client: Arc<DeviceClient<P>>,
    transitions: Arc<TransitionEngine<P>>,
    profiles: ProfileSet,
    limits: SafetyLimits,
    fleet: Arc<Fleet>,
    stats: Arc<StatsAggregator>,
    events: Arc<EventBus>,
    metrics: Arc<FleetMetrics>,
}

impl<P: DevicePort + 'static> Clone for DeviceWork<P> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            transitions: self.transitions.clone(),
            profiles: self.profiles,
            limits: self.limits,
            fleet: self.fleet.clone(),
            stats: self.stats.clone(),
            events: self.events.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<P: DevicePort + 'static> DeviceWork<P> {
    /// Establish the online baseline without touching settings.
    async fn discover(&self, mut device: OwnedMutexGuard<Device>) -> bool {
        match self.client.read_status(&mut device).await {
            Ok(telemetry) => {
                self.metrics.observe(&device.id, &telemetry);
                self.fleet.record_telemetry(&device.id, Some(telemetry));
                info!(device = %device.id, address = %device.address, "Device online");
                true
            }
            Err(_) => {
                self.metrics.mark_offline(&device.id);
                self.fleet.record_telemetry(&device.id, None);
                warn!(device = %device.id, address = %device.address, "Device offline at startup");
                false
            }
        }
    }

    /// Period broadcast for one device. Rebooting devices are skipped.
    async fn broadcast(&self, device: &mut Device, period: Period) -> ApplyResult {
        if device.is_rebooting(Utc::now()) {
            debug!(device = %device.id, %period, "Device rebooting, skipping broadcast");
            return ApplyResult::Rebooting;
        }
        self.reconcile(device, period).await
    }

    /// Move a device to its resolved target for `period`.
    async fn reconcile(&self, device: &mut Device, period: Period) -> ApplyResult {
        let target = resolve_target(&device.overrides, period, &self.profiles, &self.limits);

        if device.is_at(target) {
            device.current_period = Some(period);
            debug!(device = %device.id, %period, settings = %target, "Settings already applied, skipping");
            return ApplyResult::AlreadyApplied;
        }

        match self.transitions.transition(device, target).await {
            Ok(_) => {
                device.current_period = Some(period);
                info!(device = %device.id, %period, settings = %target, "Switched device settings");
                self.events.send(FleetEvent::SettingsApplied {
                    device: device.id.clone(),
                    settings: target,
                    period,
                    timestamp: Utc::now(),
                });
                ApplyResult::Applied
            }
            Err(e) => {
                self.metrics.record_apply_failure();
                error!(device = %device.id, %period, error = %e, "Failed to apply settings");
                self.events.send(FleetEvent::TransitionFailed {
                    device: device.id.clone(),
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
                ApplyResult::Failed(e.to_string())
            }
        }
    }

    /// Read status, enforce safety, record stats under the global `period`.
    async fn poll(&self, mut device: OwnedMutexGuard<Device>, period: Period) -> PollResult {
        if device.is_rebooting(Utc::now()) {
            debug!(device = %device.id, "Device rebooting, skipping poll");
            return PollResult::Rebooting;
        }

        let telemetry = match self.client.read_status(&mut device).await {
            Ok(telemetry) => telemetry,
            Err(e) => {
                self.metrics.mark_offline(&device.id);
                self.fleet.record_telemetry(&device.id, None);
                self.events.send(FleetEvent::DeviceError {
                    device: device.id.clone(),
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
                return PollResult::Offline;
            }
        };

        self.metrics.observe(&device.id, &telemetry);
        self.fleet.record_telemetry(&device.id, Some(telemetry));
        self.stats.record(&device.id, period, &telemetry);

        match check_safety(&telemetry, &self.limits) {
            SafetyVerdict::Safe => PollResult::Healthy,
            SafetyVerdict::Violation(violation) => {
                warn!(device = %device.id, %violation, "Safety limit exceeded, forcing day settings");
                self.metrics.record_safety_violation();
                self.events.send(FleetEvent::SafetyViolation {
                    device: device.id.clone(),
                    violation,
                    timestamp: Utc::now(),
                });
                let applied = self.reconcile(&mut device, Period::Day).await;
                PollResult::SafetyForced { violation, applied }
            }
        }
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Owns the fleet and drives the periodic control loop.
pub struct Orchestrator<P: DevicePort + 'static, S: SnapshotStore + 'static> {
    control: ControlConfig,
    work: DeviceWork<P>,
    fleet: Arc<Fleet>,
    stats: Arc<StatsAggregator>,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    pool: WorkerPool,
    events: Arc<EventBus>,
    metrics: Arc<FleetMetrics>,
    state: watch::Sender<OrchestratorState>,
    period: watch::Sender<Option<Period>>,
    cancel: CancellationToken,
    shut_down: AtomicBool,
}

impl<P: DevicePort + 'static, S: SnapshotStore + 'static> Orchestrator<P, S> {
    /// Wire an orchestrator over a device port and snapshot store.
    pub fn new(
        control: ControlConfig,
        fleet: Arc<Fleet>,
        port: Arc<P>,
        store: Arc<S>,
        clock: Arc<dyn Clock>,
    ) -> DaemonResult<Self> {
        let client = Arc::new(DeviceClient::new(port, control.retry));
        let transitions = Arc::new(TransitionEngine::new(client.clone(), control.transition));
        let stats = Arc::new(StatsAggregator::new());
        let events = Arc::new(EventBus::default());
        let metrics = Arc::new(FleetMetrics::new()?);
        let pool = WorkerPool::new(control.max_workers, control.parallel);

        let work = DeviceWork {
            client,
            transitions,
            profiles: control.profiles,
            limits: control.limits,
            fleet: fleet.clone(),
            stats: stats.clone(),
            events: events.clone(),
            metrics: metrics.clone(),
        };

        Ok(Self {
            control,
            work,
            fleet,
            stats,
            store,
            clock,
            pool,
            events,
            metrics,
            state: watch::Sender::new(OrchestratorState::Idle),
            period: watch::Sender::new(None),
            cancel: CancellationToken::new(),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn state(&self) -> OrchestratorState {
        *self.state.borrow()
    }

    /// Watch state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<OrchestratorState> {
        self.state.subscribe()
    }

    /// Last applied global period, `None` before the first broadcast.
    pub fn current_period(&self) -> Option<Period> {
        *self.period.borrow()
    }

    pub fn fleet(&self) -> &Arc<Fleet> {
        &self.fleet
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn metrics(&self) -> &Arc<FleetMetrics> {
        &self.metrics
    }

    pub fn stats(&self) -> &Arc<StatsAggregator> {
        &self.stats
    }

    /// Token that stops the loop when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn set_state(&self, state: OrchestratorState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Orchestrator state changed");
        }
    }

    /// Poll every enabled device once to establish online status.
    pub async fn discover(&self) -> RoundSummary {
        self.set_state(OrchestratorState::Discovering);
        info!(devices = self.fleet.len(), "Discovering devices");

        let outcomes = self
            .pool
            .fan_out(
                self.fleet.enabled(),
                self.control.poll_timeout,
                &self.cancel,
                |device| {
                    let work = self.work.clone();
                    async move { work.discover(device).await }
                },
            )
            .await;
        self.fleet.refresh_view();

        let online = outcomes
            .iter()
            .filter(|(_, o)| matches!(o, TaskOutcome::Completed(true)))
            .count();
        info!(online, total = self.fleet.len(), "Discovery complete");
        RoundSummary::from_outcomes(&outcomes)
    }

    /// Broadcast the target for `to` to every enabled, online device.
    pub async fn switch_period(&self, from: Option<Period>, to: Period) -> RoundSummary {
        self.set_state(OrchestratorState::PeriodTransitioning);
        info!(from = ?from, to = %to, "Period changed, applying new settings");
        self.metrics.record_period_switch();
        self.events.send(FleetEvent::PeriodSwitched {
            from,
            to,
            timestamp: Utc::now(),
        });

        let outcomes = self
            .pool
            .fan_out(
                self.fleet.online(),
                self.control.apply_timeout,
                &self.cancel,
                |device| {
                    let work = self.work.clone();
                    async move {
                        let mut device = device;
                        work.broadcast(&mut device, to).await
                    }
                },
            )
            .await;

        self.period.send_replace(Some(to));
        self.fleet.refresh_view();

        let summary = RoundSummary::from_outcomes(&outcomes);
        let failed = outcomes
            .iter()
            .filter(|(_, o)| matches!(o, TaskOutcome::Completed(ApplyResult::Failed(_))))
            .count();
        info!(
            period = %to,
            completed = summary.completed,
            failed,
            timed_out = summary.timed_out,
            busy = summary.busy,
            "Period broadcast finished"
        );
        self.set_state(OrchestratorState::PeriodSteady);
        summary
    }

    /// Poll every enabled device under the global `period`.
    pub async fn poll_round(&self, period: Period) -> RoundSummary {
        let outcomes = self
            .pool
            .fan_out(
                self.fleet.enabled(),
                self.control.poll_timeout,
                &self.cancel,
                |device| {
                    let work = self.work.clone();
                    async move { work.poll(device, period).await }
                },
            )
            .await;
        self.fleet.refresh_view();

        let summary = RoundSummary::from_outcomes(&outcomes);
        debug!(
            completed = summary.completed,
            timed_out = summary.timed_out,
            busy = summary.busy,
            "Poll round finished"
        );
        summary
    }

    /// One pass of the control loop.
    pub async fn run_cycle(&self, schedule: &mut CycleSchedule) -> DaemonResult<()> {
        let period = resolve_period(self.clock.now(), self.control.profiles.day_window());
        let last = self.current_period();
        if last != Some(period) {
            self.switch_period(last, period).await;
        } else {
            self.set_state(OrchestratorState::PeriodSteady);
        }

        if self.cancel.is_cancelled() {
            return Ok(());
        }
        self.poll_round(period).await;

        let now = Instant::now();
        if schedule.status_due(now, self.control.status_interval) {
            info!("\n{}", render_status_table(&self.fleet.view(), Some(period)));
        }
        if schedule.flush_due(now, self.control.stats_interval) {
            self.flush_stats().await?;
        }
        Ok(())
    }

    /// Persist the current averages for every device.
    pub async fn flush_stats(&self) -> DaemonResult<StatsSnapshot> {
        let mut snapshot = StatsSnapshot::new(Utc::now());
        for device in self.fleet.view() {
            snapshot.insert(
                device.name.as_str(),
                DeviceSnapshot {
                    address: device.address,
                    online: device.online,
                    last_update: device.last_update,
                    periods: self.stats.device_performance(&device.name),
                },
            );
        }

        self.store.save(&snapshot).await?;
        info!(devices = snapshot.devices.len(), "Saved stats snapshot");
        self.events.send(FleetEvent::StatsFlushed {
            devices: snapshot.devices.len(),
            timestamp: snapshot.timestamp,
        });
        Ok(snapshot)
    }

    /// Restart one device and keep polls off it for the reboot grace period.
    pub async fn restart_device(&self, name: &str) -> DaemonResult<()> {
        let slot = self
            .fleet
            .get(name)
            .ok_or_else(|| DaemonError::DeviceNotFound(name.to_string()))?;
        let mut device = slot
            .try_lock()
            .map_err(|_| DaemonError::DeviceBusy(name.to_string()))?;

        self.work.client.restart(&mut device).await?;
        let grace = chrono::Duration::seconds(RESTART_GRACE.as_secs() as i64);
        device.begin_reboot(Utc::now() + grace);
        self.events.send(FleetEvent::DeviceRestarted {
            device: device.id.clone(),
            timestamp: Utc::now(),
        });
        drop(device);

        self.fleet.refresh_view();
        Ok(())
    }

    /// Run until cancelled, then drain and flush.
    pub async fn run(&self) -> DaemonResult<()> {
        info!(
            devices = self.fleet.len(),
            workers = self.pool.width(),
            check_interval_secs = self.control.check_interval.as_secs(),
            "Fleet orchestrator starting"
        );

        self.discover().await;
        let mut schedule = CycleSchedule::new(Instant::now());

        while !self.cancel.is_cancelled() {
            let pause = match self.run_cycle(&mut schedule).await {
                Ok(()) => self.control.check_interval,
                Err(e) => {
                    error!(error = %e, "Error in control cycle, backing off");
                    self.control.error_backoff
                }
            };

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = sleep(pause) => {}
            }
        }

        self.shutdown().await
    }

    /// Drain in-flight work and write the final snapshot. Runs at most once.
    pub async fn shutdown(&self) -> DaemonResult<()> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.cancel.cancel();
        self.set_state(OrchestratorState::Shutdown);
        info!("Initiating graceful shutdown");

        let drained = self.pool.shutdown(self.control.shutdown_grace).await;
        self.fleet.refresh_view();

        let result = self.flush_stats().await;
        self.events.send(FleetEvent::Shutdown);
        info!(drained, "Shutdown complete");
        result.map(|_| ())
    }
}

// =============================================================================
// Tests
// =============================================================================
