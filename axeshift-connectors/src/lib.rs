//! Axeshift Device Connectors
//!
//! Adapters for device HTTP APIs.
//! Normalizes device-specific payloads for the execution layer.

#![warn(clippy::all)]

// Public modules
pub mod axeos_rest;

// Re-exports
pub use axeos_rest::{AxeOsClient, AxeOsError, SystemInfo, SystemPatch, DEFAULT_REQUEST_TIMEOUT};
