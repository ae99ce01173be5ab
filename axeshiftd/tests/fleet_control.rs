//! E2E tests: the control loop against stub devices.
//!
//! Time is paused, so sleeps and per-device deadlines advance instantly and
//! elapsed durations can be asserted exactly.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveTime;
use tokio::time::Instant;

use axeshift_domain::{Device, DeviceId, Period, Settings};
use axeshift_engine::FixedClock;
use axeshift_exec::{DeviceCall, StubDevicePort};
use axeshift_store::{
    MemorySnapshotStore, PeriodPerformance, SnapshotStore, StatsSnapshot, StoreError,
};
use axeshiftd::{
    ControlConfig, CycleSchedule, Fleet, FleetEvent, Orchestrator, OrchestratorState,
};

// =============================================================================
// Harness
// =============================================================================

const DAY: (u32, u32) = (1150, 450);
const NIGHT: (u32, u32) = (1250, 550);

fn settings((v, f): (u32, u32)) -> Settings {
    Settings::from_raw(v, f).unwrap()
}

fn address(name: &str) -> String {
    format!("http://{}.local", name)
}

struct Rig {
    port: Arc<StubDevicePort>,
    store: Arc<MemorySnapshotStore>,
    clock: Arc<FixedClock>,
    orchestrator: Arc<Orchestrator<StubDevicePort, MemorySnapshotStore>>,
}

/// `names` are enabled devices, `disabled` are configured but skipped.
fn rig(names: &[&str], disabled: &[&str], control: ControlConfig) -> Rig {
    let port = Arc::new(StubDevicePort::new());
    let mut devices = Vec::new();
    for (name, enabled) in names
        .iter()
        .map(|n| (n, true))
        .chain(disabled.iter().map(|n| (n, false)))
    {
        port.add_device(&address(name), settings(DAY));
        devices.push(Device::new(DeviceId::new(*name).unwrap(), address(name), enabled));
    }

    let store = Arc::new(MemorySnapshotStore::new());
    let clock = Arc::new(FixedClock::at(12, 0));
    let orchestrator = Orchestrator::new(
        control,
        Arc::new(Fleet::new(devices)),
        port.clone(),
        store.clone(),
        clock.clone(),
    )
    .unwrap();

    Rig {
        port,
        store,
        clock,
        orchestrator: Arc::new(orchestrator),
    }
}

/// Store whose first `failures` saves fail. Records when each save was attempted.
struct FlakyStore {
    failures: usize,
    attempts: Mutex<Vec<Instant>>,
}

impl FlakyStore {
    fn new(failures: usize) -> Self {
        Self {
            failures,
            attempts: Mutex::new(Vec::new()),
        }
    }

    fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SnapshotStore for FlakyStore {
    async fn save(&self, _snapshot: &StatsSnapshot) -> Result<(), StoreError> {
        let mut attempts = self.attempts.lock().unwrap();
        attempts.push(Instant::now());
        if attempts.len() <= self.failures {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        Ok(())
    }

    async fn latest(&self) -> Result<Option<StatsSnapshot>, StoreError> {
        Ok(None)
    }
}

fn at(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_day_to_night_switch_reaches_every_online_device() {
    let rig = rig(&["bitaxe1", "bitaxe2", "bitaxe3"], &[], ControlConfig::test());
    let mut events = rig.orchestrator.events().subscribe();
    rig.orchestrator.discover().await;
    let mut schedule = CycleSchedule::new(Instant::now());

    // 12:00 is inside the day window; devices already run day settings
    // but the daemon has never written them
    rig.orchestrator.run_cycle(&mut schedule).await.unwrap();
    assert_eq!(rig.orchestrator.current_period(), Some(Period::Day));

    rig.clock.set(at(20, 0));
    rig.orchestrator.run_cycle(&mut schedule).await.unwrap();

    assert_eq!(rig.orchestrator.current_period(), Some(Period::Night));
    for name in ["bitaxe1", "bitaxe2", "bitaxe3"] {
        assert_eq!(rig.port.live_settings(&address(name)), Some(settings(NIGHT)));
    }

    let switches: Vec<_> = events
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            FleetEvent::PeriodSwitched { from, to, .. } => Some((from, to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        switches,
        vec![(None, Period::Day), (Some(Period::Day), Period::Night)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_smooth_transition_walks_intermediate_steps() {
    let rig = rig(&["bitaxe1"], &[], ControlConfig::test());
    rig.orchestrator.discover().await;

    rig.orchestrator.switch_period(None, Period::Night).await;

    let voltages: Vec<u32> = rig
        .port
        .writes_for(&address("bitaxe1"))
        .into_iter()
        .filter_map(|call| match call {
            DeviceCall::WriteVoltage { voltage, .. } => Some(voltage.value()),
            _ => None,
        })
        .collect();
    assert_eq!(voltages, vec![1170, 1190, 1210, 1230, 1250]);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_devices_time_out_without_blocking_the_round() {
    let rig = rig(
        &["bitaxe1", "bitaxe2", "bitaxe3", "bitaxe4", "bitaxe5"],
        &[],
        ControlConfig::test(),
    );
    rig.orchestrator.discover().await;
    for name in ["bitaxe2", "bitaxe4"] {
        rig.port.set_read_delay(&address(name), Some(Duration::from_secs(600)));
    }

    let started = Instant::now();
    let summary = rig.orchestrator.poll_round(Period::Day).await;

    assert_eq!(summary.completed, 3);
    assert_eq!(summary.timed_out, 2);
    // Bounded by the per-device poll timeout, not by the hanging reads
    assert!(started.elapsed() <= Duration::from_secs(1));

    // The hanging tasks still own their devices next round
    let next = rig.orchestrator.poll_round(Period::Day).await;
    assert_eq!(next.completed, 3);
    assert_eq!(next.busy, 2);
}

#[tokio::test(start_paused = true)]
async fn test_offline_device_is_left_out_of_the_broadcast() {
    let rig = rig(&["bitaxe1", "bitaxe2"], &[], ControlConfig::test());
    rig.port.set_offline(&address("bitaxe2"), true);
    rig.orchestrator.discover().await;

    rig.orchestrator.switch_period(None, Period::Night).await;

    assert_eq!(rig.port.live_settings(&address("bitaxe1")), Some(settings(NIGHT)));
    assert!(rig.port.writes_for(&address("bitaxe2")).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_disabled_devices_are_never_contacted() {
    let rig = rig(&["bitaxe1"], &["spare"], ControlConfig::test());
    rig.orchestrator.discover().await;
    let mut schedule = CycleSchedule::new(Instant::now());

    rig.orchestrator.run_cycle(&mut schedule).await.unwrap();
    rig.clock.set(at(23, 0));
    rig.orchestrator.run_cycle(&mut schedule).await.unwrap();

    assert!(rig
        .port
        .calls()
        .iter()
        .all(|call| call.address() != address("spare")));
    let view = rig.orchestrator.fleet().view();
    assert_eq!(view.len(), 2);
    assert!(!view[1].enabled);
}

#[tokio::test(start_paused = true)]
async fn test_overheating_device_is_forced_to_day_at_night() {
    let rig = rig(&["cool", "hot"], &[], ControlConfig::test());
    rig.orchestrator.discover().await;
    rig.orchestrator.switch_period(None, Period::Night).await;

    rig.port.set_readings(&address("hot"), 520.0, 71.5, 13.0);
    rig.orchestrator.poll_round(Period::Night).await;

    assert_eq!(rig.port.live_settings(&address("hot")), Some(settings(DAY)));
    assert_eq!(rig.port.live_settings(&address("cool")), Some(settings(NIGHT)));
    // The global period is unaffected
    assert_eq!(rig.orchestrator.current_period(), Some(Period::Night));
}

#[tokio::test(start_paused = true)]
async fn test_stats_flush_with_and_without_samples() {
    let rig = rig(&["bitaxe1", "bitaxe2"], &[], ControlConfig::test());
    rig.orchestrator.discover().await;

    // Nothing polled yet: every period reports zero averages
    let empty = rig.orchestrator.flush_stats().await.unwrap();
    for device in empty.devices.values() {
        assert_eq!(device.periods[&Period::Day], PeriodPerformance::default());
        assert_eq!(device.periods[&Period::Night], PeriodPerformance::default());
    }

    rig.port.set_readings(&address("bitaxe1"), 500.0, 55.0, 12.0);
    rig.orchestrator.poll_round(Period::Day).await;
    rig.port.set_readings(&address("bitaxe1"), 520.0, 55.0, 13.0);
    rig.orchestrator.poll_round(Period::Day).await;

    let snapshot = rig.orchestrator.flush_stats().await.unwrap();
    let day = snapshot.devices["bitaxe1"].periods[&Period::Day];
    assert_eq!(day.sample_count, 2);
    assert!((day.average_hashrate - 510.0).abs() < 1e-9);
    assert!((day.average_power - 12.5).abs() < 1e-9);
    assert_eq!(snapshot.devices["bitaxe1"].periods[&Period::Night].sample_count, 0);
    assert_eq!(rig.store.save_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_switches_then_shuts_down_cleanly() {
    let rig = rig(&["bitaxe1", "bitaxe2"], &[], ControlConfig::test());
    let mut state = rig.orchestrator.subscribe_state();

    let handle = tokio::spawn({
        let orchestrator = rig.orchestrator.clone();
        async move { orchestrator.run().await }
    });

    state
        .wait_for(|s| *s == OrchestratorState::PeriodSteady)
        .await
        .unwrap();
    assert_eq!(rig.orchestrator.current_period(), Some(Period::Day));

    rig.clock.set(at(21, 30));
    tokio::time::sleep(Duration::from_secs(65)).await;
    assert_eq!(rig.orchestrator.current_period(), Some(Period::Night));
    assert_eq!(rig.port.live_settings(&address("bitaxe2")), Some(settings(NIGHT)));

    rig.orchestrator.cancellation_token().cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(rig.orchestrator.state(), OrchestratorState::Shutdown);
    assert_eq!(rig.store.save_count(), 1);
    // A second shutdown is a no-op
    rig.orchestrator.shutdown().await.unwrap();
    assert_eq!(rig.store.save_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_cycle_backs_off_then_resumes() {
    let mut control = ControlConfig::test();
    control.check_interval = Duration::from_secs(60);
    control.error_backoff = Duration::from_secs(5);
    // Flush is due on every cycle
    control.stats_interval = Duration::ZERO;

    let port = Arc::new(StubDevicePort::new());
    port.add_device(&address("bitaxe1"), settings(DAY));
    let store = Arc::new(FlakyStore::new(2));
    let orchestrator = Arc::new(
        Orchestrator::new(
            control,
            Arc::new(Fleet::new(vec![Device::new(
                DeviceId::new("bitaxe1").unwrap(),
                address("bitaxe1"),
                true,
            )])),
            port,
            store.clone(),
            Arc::new(FixedClock::at(12, 0)),
        )
        .unwrap(),
    );

    let handle = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.run().await }
    });
    tokio::time::sleep(Duration::from_secs(100)).await;

    // Two failed flushes, then a good one, then the regular interval
    let attempts = store.attempts();
    assert!(attempts.len() >= 4);
    let gaps: Vec<Duration> = attempts.windows(2).map(|w| w[1] - w[0]).collect();
    assert!(gaps[0] >= Duration::from_secs(5) && gaps[0] < Duration::from_secs(6));
    assert!(gaps[1] >= Duration::from_secs(5) && gaps[1] < Duration::from_secs(6));
    assert!(gaps[2] >= Duration::from_secs(60));
    assert_eq!(orchestrator.state(), OrchestratorState::PeriodSteady);

    orchestrator.cancellation_token().cancel();
    handle.await.unwrap().unwrap();
}
