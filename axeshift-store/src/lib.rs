//! Axeshift Statistics Layer
//!
//! Accumulates per-device, per-period performance and persists snapshots.
//!
//! # Architecture
//!
//! - **Aggregator**: In-memory running sums, updated after every poll
//! - **Snapshot**: Serializable view of the aggregates at a point in time
//! - **Repository trait**: Where snapshots go (port)
//! - **File store**: JSON on disk, replaced atomically
//! - **In-memory store**: For testing
//!
//! # Usage
//!
//! ```rust
//! use axeshift_domain::{DeviceId, Period, Telemetry};
//! use axeshift_store::StatsAggregator;
//!
//! let stats = StatsAggregator::new();
//! let id = DeviceId::new("bitaxe1").unwrap();
//! let telemetry = Telemetry {
//!     hashrate: 500.0,
//!     temperature: 55.0,
//!     power: 12.0,
//!     voltage: None,
//!     frequency: None,
//! };
//!
//! stats.record(&id, Period::Day, &telemetry);
//! assert_eq!(stats.performance(&id, Period::Day).sample_count, 1);
//! ```

#![warn(clippy::all)]

// Modules
mod error;
mod file;
mod memory;
mod repository;
mod snapshot;
mod stats;

// Re-exports
pub use error::StoreError;
pub use file::FileSnapshotStore;
pub use memory::MemorySnapshotStore;
pub use repository::SnapshotStore;
pub use snapshot::{DeviceSnapshot, PeriodPerformance, StatsSnapshot};
pub use stats::StatsAggregator;
