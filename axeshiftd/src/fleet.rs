//! Fleet arena.
//!
//! Every device record sits behind its own async mutex: a task owns exactly
//! one record for its whole duration, so no two tasks ever touch the same
//! device. A read-only view is rebuilt after each round for the status
//! table, the API and stats flushes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use axeshift_domain::{Device, DeviceId, Period, Settings, Telemetry};

/// Exclusive slot for one device record.
pub type DeviceSlot = Arc<Mutex<Device>>;

/// Snapshot of one device for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceView {
    pub name: DeviceId,
    pub address: String,
    pub enabled: bool,
    pub online: bool,
    pub rebooting: bool,
    pub error_count: u32,
    /// Last settings written by the daemon
    pub last_settings: Option<Settings>,
    pub current_period: Option<Period>,
    pub last_update: Option<DateTime<Utc>>,
    /// Latest successful reading, cleared when the device goes offline
    pub telemetry: Option<Telemetry>,
}

impl DeviceView {
    fn from_device(device: &Device, telemetry: Option<Telemetry>, now: DateTime<Utc>) -> Self {
        Self {
            name: device.id.clone(),
            address: device.address.clone(),
            enabled: device.enabled,
            online: device.online,
            rebooting: device.rebooting_until.is_some_and(|until| now < until),
            error_count: device.error_count,
            last_settings: device.last_settings,
            current_period: device.current_period,
            last_update: device.last_update,
            telemetry,
        }
    }

    /// Settings the device is running: live readings first, then the last write.
    pub fn active_settings(&self) -> Option<Settings> {
        self.telemetry
            .and_then(|t| t.active_settings())
            .or(self.last_settings)
    }
}

struct Entry {
    id: DeviceId,
    enabled: bool,
    slot: DeviceSlot,
}

/// Owns every device record for the whole run. Devices are never removed.
pub struct Fleet {
    entries: Vec<Entry>,
    telemetry: StdMutex<HashMap<DeviceId, Telemetry>>,
    view: RwLock<Vec<DeviceView>>,
}

impl Fleet {
    pub fn new(devices: Vec<Device>) -> Self {
        let now = Utc::now();
        let view = devices
            .iter()
            .map(|d| DeviceView::from_device(d, None, now))
            .collect();
        let entries = devices
            .into_iter()
            .map(|device| Entry {
                id: device.id.clone(),
                enabled: device.enabled,
                slot: Arc::new(Mutex::new(device)),
            })
            .collect();

        Self {
            entries,
            telemetry: StdMutex::new(HashMap::new()),
            view: RwLock::new(view),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Slot for a device by name.
    pub fn get(&self, name: &str) -> Option<DeviceSlot> {
        self.entries
            .iter()
            .find(|e| e.id.as_str() == name)
            .map(|e| e.slot.clone())
    }

    /// Every enabled device.
    pub fn enabled(&self) -> Vec<(DeviceId, DeviceSlot)> {
        self.entries
            .iter()
            .filter(|e| e.enabled)
            .map(|e| (e.id.clone(), e.slot.clone()))
            .collect()
    }

    /// Enabled devices that were online as of the last view refresh.
    pub fn online(&self) -> Vec<(DeviceId, DeviceSlot)> {
        let view = self.view.read().unwrap_or_else(|e| e.into_inner());
        self.entries
            .iter()
            .zip(view.iter())
            .filter(|(entry, view)| entry.enabled && view.online)
            .map(|(entry, _)| (entry.id.clone(), entry.slot.clone()))
            .collect()
    }

    /// Remember (or forget) the latest reading for a device.
    pub fn record_telemetry(&self, device: &DeviceId, telemetry: Option<Telemetry>) {
        let mut latest = self.telemetry.lock().unwrap_or_else(|e| e.into_inner());
        match telemetry {
            Some(t) => {
                latest.insert(device.clone(), t);
            }
            None => {
                latest.remove(device);
            }
        }
    }

    /// Rebuild the view. Devices still held by a task keep their previous entry.
    pub fn refresh_view(&self) {
        let now = Utc::now();
        let latest = self
            .telemetry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let mut view = self.view.write().unwrap_or_else(|e| e.into_inner());

        for (entry, slot_view) in self.entries.iter().zip(view.iter_mut()) {
            if let Ok(device) = entry.slot.try_lock() {
                let telemetry = if device.online {
                    latest.get(&entry.id).copied()
                } else {
                    None
                };
                *slot_view = DeviceView::from_device(&device, telemetry, now);
            }
        }
    }

    /// Current view, in configuration order.
    pub fn view(&self) -> Vec<DeviceView> {
        self.view.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn device(name: &str, enabled: bool) -> Device {
        Device::new(
            DeviceId::new(name).unwrap(),
            format!("http://{}.local", name),
            enabled,
        )
    }

    fn telemetry() -> Telemetry {
        Telemetry {
            hashrate: 500.0,
            temperature: 55.0,
            power: 12.0,
            voltage: None,
            frequency: None,
        }
    }

    #[tokio::test]
    async fn test_enabled_and_online_selection() {
        let fleet = Fleet::new(vec![
            device("a", true),
            device("b", false),
            device("c", true),
        ]);
        assert_eq!(fleet.enabled().len(), 2);
        assert!(fleet.online().is_empty());

        fleet.get("c").unwrap().lock().await.mark_online();
        fleet.refresh_view();

        let online: Vec<_> = fleet.online().into_iter().map(|(id, _)| id).collect();
        assert_eq!(online, vec![DeviceId::new("c").unwrap()]);
    }

    #[tokio::test]
    async fn test_busy_device_keeps_previous_view() {
        let fleet = Fleet::new(vec![device("a", true)]);
        let slot = fleet.get("a").unwrap();

        let mut guard = slot.lock().await;
        guard.mark_online();
        fleet.refresh_view();
        assert!(!fleet.view()[0].online);

        drop(guard);
        fleet.refresh_view();
        assert!(fleet.view()[0].online);
    }

    #[tokio::test]
    async fn test_telemetry_hidden_when_offline() {
        let fleet = Fleet::new(vec![device("a", true)]);
        let id = DeviceId::new("a").unwrap();
        fleet.record_telemetry(&id, Some(telemetry()));

        fleet.refresh_view();
        assert!(fleet.view()[0].telemetry.is_none());

        fleet.get("a").unwrap().lock().await.mark_online();
        fleet.refresh_view();
        assert_eq!(fleet.view()[0].telemetry, Some(telemetry()));

        fleet.record_telemetry(&id, None);
        fleet.refresh_view();
        assert!(fleet.view()[0].telemetry.is_none());
    }

    #[test]
    fn test_unknown_device() {
        let fleet = Fleet::new(vec![device("a", true)]);
        assert!(fleet.get("missing").is_none());
        assert_eq!(fleet.len(), 1);
    }
}
