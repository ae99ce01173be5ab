//! Axeshift Execution Layer
//!
//! Per-device operations with bounded retry and gradual transitions.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator → Transition Engine → Device Client → DevicePort → Device
//! ```
//!
//! # Components
//!
//! - **Ports**: Trait defining the device capability surface
//! - **Http**: `DevicePort` over the AxeOS REST API
//! - **Client**: read/apply/restart with side effects on the device record
//! - **Transition**: stepped or direct move to a target
//! - **Stub**: Scriptable in-memory devices for tests
//!
//! # Example
//!
//! ```rust,ignore
//! use axeshift_exec::{DeviceClient, HttpDevicePort, RetryPolicy, TransitionEngine};
//! use std::sync::Arc;
//!
//! let client = Arc::new(DeviceClient::new(
//!     Arc::new(HttpDevicePort::default()),
//!     RetryPolicy::default(),
//! ));
//! let engine = TransitionEngine::new(client, TransitionConfig::default());
//! engine.transition(&mut device, target).await?;
//! ```

#![warn(clippy::all)]

pub mod client;
pub mod error;
pub mod http;
pub mod ports;
pub mod stub;
pub mod transition;

// Re-exports for convenience
pub use client::{ApplyReport, Backoff, DeviceClient, RetryPolicy, RESTART_GRACE};
pub use error::{ExecError, ExecResult};
pub use http::HttpDevicePort;
pub use ports::DevicePort;
pub use stub::{DeviceCall, StubDevicePort};
pub use transition::{TransitionConfig, TransitionEngine, TransitionOutcome};
