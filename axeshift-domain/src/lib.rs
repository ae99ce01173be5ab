//! Axeshift Domain Layer
//!
//! Pure domain logic with zero I/O dependencies.
//! Contains the device entity, settings value objects and fleet-wide limits.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod entities;
pub mod value_objects;

// Re-export commonly used types
pub use entities::{Device, DeviceId, DeviceOverrides, Profile, ProfileSet};
pub use value_objects::{
    efficiency, DomainError, Megahertz, Millivolts, Period, SafetyLimits, Settings, Telemetry,
    TimeWindow,
};
