//! Event bus for fleet observability.
//!
//! Every significant control-loop event is published here in addition to
//! the log stream:
//! - Orchestrator → period switches, stats flushes
//! - Device work → settings applied, transition failures, device errors
//! - Safety checks → violations
//!
//! Uses tokio broadcast channels for fan-out to multiple receivers. The
//! bus also keeps the last few events as flat [`EventRecord`]s so the
//! status endpoint can show recent activity without subscribing.

use std::collections::VecDeque;
use std::sync::Mutex;

use axeshift_domain::{DeviceId, Period, Settings};
use axeshift_engine::SafetyViolation;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

// =============================================================================
// Event Types
// =============================================================================

/// Events that flow through the fleet event bus.
#[derive(Debug, Clone)]
pub enum FleetEvent {
    /// Global period changed and a broadcast started
    PeriodSwitched {
        from: Option<Period>,
        to: Period,
        timestamp: DateTime<Utc>,
    },

    /// A device reached its target settings
    SettingsApplied {
        device: DeviceId,
        settings: Settings,
        period: Period,
        timestamp: DateTime<Utc>,
    },

    /// A device could not be moved to its target
    TransitionFailed {
        device: DeviceId,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Telemetry breached a ceiling
    SafetyViolation {
        device: DeviceId,
        violation: SafetyViolation,
        timestamp: DateTime<Utc>,
    },

    /// A status read failed
    DeviceError {
        device: DeviceId,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// A restart was accepted by the device
    DeviceRestarted {
        device: DeviceId,
        timestamp: DateTime<Utc>,
    },

    /// A stats snapshot was persisted
    StatsFlushed {
        devices: usize,
        timestamp: DateTime<Utc>,
    },

    /// Shutdown signal
    Shutdown,
}

impl FleetEvent {
    /// Short machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            FleetEvent::PeriodSwitched { .. } => "period_switched",
            FleetEvent::SettingsApplied { .. } => "settings_applied",
            FleetEvent::TransitionFailed { .. } => "transition_failed",
            FleetEvent::SafetyViolation { .. } => "safety_violation",
            FleetEvent::DeviceError { .. } => "device_error",
            FleetEvent::DeviceRestarted { .. } => "device_restarted",
            FleetEvent::StatsFlushed { .. } => "stats_flushed",
            FleetEvent::Shutdown => "shutdown",
        }
    }

    fn record(&self) -> EventRecord {
        let (device, detail, timestamp) = match self {
            FleetEvent::PeriodSwitched {
                from,
                to,
                timestamp,
            } => {
                let from = from.map_or("none", |p| p.as_str());
                (None, Some(format!("{from} -> {to}")), *timestamp)
            }
            FleetEvent::SettingsApplied {
                device,
                settings,
                period,
                timestamp,
            } => (
                Some(device.clone()),
                Some(format!("{settings} ({period})")),
                *timestamp,
            ),
            FleetEvent::TransitionFailed {
                device,
                error,
                timestamp,
            }
            | FleetEvent::DeviceError {
                device,
                error,
                timestamp,
            } => (Some(device.clone()), Some(error.clone()), *timestamp),
            FleetEvent::SafetyViolation {
                device,
                violation,
                timestamp,
            } => (Some(device.clone()), Some(violation.to_string()), *timestamp),
            FleetEvent::DeviceRestarted { device, timestamp } => {
                (Some(device.clone()), None, *timestamp)
            }
            FleetEvent::StatsFlushed { devices, timestamp } => {
                (None, Some(format!("{devices} devices")), *timestamp)
            }
            FleetEvent::Shutdown => (None, None, Utc::now()),
        };

        EventRecord {
            kind: self.kind(),
            device,
            detail,
            timestamp,
        }
    }
}

/// Flattened form of a [`FleetEvent`] kept in the bus history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// Event Bus
// =============================================================================

/// Event bus for fleet-wide notifications.
///
/// Multiple producers can send events, and multiple consumers can receive.
pub struct EventBus {
    sender: broadcast::Sender<FleetEvent>,
    history: Mutex<VecDeque<EventRecord>>,
    history_len: usize,
}

/// Events kept for the status endpoint.
pub const DEFAULT_HISTORY: usize = 50;

impl EventBus {
    /// Create a new event bus with specified capacity.
    ///
    /// Capacity determines how many events can be buffered before
    /// slow receivers start missing events (lagging).
    pub fn new(capacity: usize) -> Self {
        Self::with_history(capacity, DEFAULT_HISTORY)
    }

    /// Create a bus that remembers the last `history_len` events.
    pub fn with_history(capacity: usize, history_len: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            history: Mutex::new(VecDeque::with_capacity(history_len)),
            history_len,
        }
    }

    /// Send an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event.
    pub fn send(&self, event: FleetEvent) -> usize {
        if self.history_len > 0 {
            let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
            if history.len() == self.history_len {
                history.pop_front();
            }
            history.push_back(event.record());
        }

        // Err only means nobody is listening
        self.sender.send(event).unwrap_or(0)
    }

    /// Most recent events, newest first.
    pub fn recent(&self, limit: usize) -> Vec<EventRecord> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.iter().rev().take(limit).cloned().collect()
    }

    /// Subscribe to events sent after this call.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Receiver for fleet events.
pub struct EventReceiver {
    receiver: broadcast::Receiver<FleetEvent>,
}

impl EventReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` if the sender has been dropped.
    /// Returns error description if the receiver lagged (missed events).
    pub async fn recv(&mut self) -> Option<Result<FleetEvent, String>> {
        match self.receiver.recv().await {
            Ok(event) => Some(Ok(event)),
            Err(broadcast::error::RecvError::Closed) => None,
            Err(broadcast::error::RecvError::Lagged(count)) => {
                Some(Err(format!("Receiver lagged, missed {} events", count)))
            }
        }
    }

    /// Try to receive an event without blocking.
    ///
    /// Returns `None` if no event is immediately available.
    pub fn try_recv(&mut self) -> Option<Result<FleetEvent, String>> {
        match self.receiver.try_recv() {
            Ok(event) => Some(Ok(event)),
            Err(broadcast::error::TryRecvError::Empty) => None,
            Err(broadcast::error::TryRecvError::Closed) => None,
            Err(broadcast::error::TryRecvError::Lagged(count)) => {
                Some(Err(format!("Receiver lagged, missed {} events", count)))
            }
        }
    }

    /// Drain everything currently buffered.
    pub fn drain(&mut self) -> Vec<FleetEvent> {
        let mut events = Vec::new();
        while let Some(result) = self.try_recv() {
            if let Ok(event) = result {
                events.push(event);
            }
        }
        events
    }
}

// =============================================================================
// Tests
// =============================================================================
