//! AxeShift Daemon Library
//!
//! Runtime for day/night profile switching across a Bitaxe fleet.
//!
//! # Architecture
//!
//! ```text
//! API Server ──→ Orchestrator ──→ Worker Pool ──→ Device Client ──→ AxeOS
//!                     │                 │
//!                     │            Transition Engine
//!                     ↓
//!       Event Bus, Metrics, Stats Aggregator → Snapshot Store
//! ```
//!
//! # Components
//!
//! - **Daemon**: process wiring, signals, API server lifetime
//! - **Orchestrator**: period resolution, broadcasts, polling, safety, stats
//! - **Worker Pool**: bounded fan-out with per-device deadlines
//! - **Fleet**: device records, one exclusive slot per device
//! - **Event Bus**: fleet notifications
//! - **API**: health, status, metrics, restart
//! - **Config**: environment plus the fleet file
//!
//! # Example
//!
//! ```rust,ignore
//! use axeshiftd::{Config, Daemon, FleetConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     let fleet = FleetConfig::load(&config.fleet_path).expect("Failed to load fleet");
//!     let daemon = Daemon::from_config(config, fleet).expect("Failed to build daemon");
//!     daemon.run().await.expect("Daemon error");
//! }
//! ```

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod daemon;
pub mod error;
pub mod event_bus;
pub mod fleet;
pub mod metrics;
pub mod orchestrator;
pub mod pool;
pub mod status;

// Re-exports for convenience
pub use config::{ApiConfig, Config, ControlConfig, Environment, FleetConfig, FleetFile};
pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};
pub use event_bus::{EventBus, EventReceiver, EventRecord, FleetEvent};
pub use fleet::{DeviceSlot, DeviceView, Fleet};
pub use metrics::FleetMetrics;
pub use orchestrator::{ApplyResult, CycleSchedule, Orchestrator, OrchestratorState, PollResult};
pub use pool::{RoundSummary, TaskOutcome, WorkerPool};
pub use status::{render_status_table, FleetTotals};
