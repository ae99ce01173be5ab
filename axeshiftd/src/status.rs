//! Human-facing status table and fleet totals.

use std::fmt::Write;

use serde::Serialize;

use axeshift_domain::{efficiency, Period};

use crate::fleet::DeviceView;

/// Aggregate figures across the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FleetTotals {
    pub online: usize,
    pub total: usize,
    /// GH/s, online devices only
    pub hashrate: f64,
    /// Watts, online devices only
    pub power: f64,
    /// J/TH across the online fleet
    pub efficiency: f64,
}

impl FleetTotals {
    pub fn from_view(view: &[DeviceView]) -> Self {
        let mut totals = Self {
            online: 0,
            total: view.len(),
            hashrate: 0.0,
            power: 0.0,
            efficiency: 0.0,
        };
        for device in view.iter().filter(|d| d.enabled && d.online) {
            totals.online += 1;
            if let Some(t) = device.telemetry {
                totals.hashrate += t.hashrate;
                totals.power += t.power;
            }
        }
        totals.efficiency = efficiency(totals.power, totals.hashrate);
        totals
    }
}

/// Status column value.
pub fn status_label(device: &DeviceView) -> &'static str {
    if !device.enabled {
        "Disabled"
    } else if device.rebooting {
        "Rebooting"
    } else if device.online {
        "Online"
    } else {
        "Offline"
    }
}

/// Render the status table followed by fleet totals.
pub fn render_status_table(view: &[DeviceView], period: Option<Period>) -> String {
    let mut out = String::new();
    let period = period.map(|p| p.as_str()).unwrap_or("unknown");

    let _ = writeln!(out, "Fleet status (period: {})", period);
    let _ = writeln!(
        out,
        "{:<16} {:<10} {:>14} {:>10} {:>9} {:>10}  {}",
        "Name", "Status", "Hashrate", "Temp", "Power", "J/TH", "Settings"
    );
    let _ = writeln!(out, "{}", "-".repeat(92));

    for device in view {
        let settings = device
            .active_settings()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());

        match device.telemetry.filter(|_| device.online && device.enabled) {
            Some(t) => {
                let _ = writeln!(
                    out,
                    "{:<16} {:<10} {:>9.1} GH/s {:>8.1}°C {:>8.2}W {:>10.2}  {}",
                    device.name.as_str(),
                    status_label(device),
                    t.hashrate,
                    t.temperature,
                    t.power,
                    t.efficiency(),
                    settings
                );
            }
            None => {
                let _ = writeln!(
                    out,
                    "{:<16} {:<10} {:>14} {:>10} {:>9} {:>10}  {}",
                    device.name.as_str(),
                    status_label(device),
                    "-",
                    "-",
                    "-",
                    "-",
                    settings
                );
            }
        }
    }

    let totals = FleetTotals::from_view(view);
    let _ = writeln!(out, "{}", "-".repeat(92));
    let _ = write!(
        out,
        "Online: {}/{}  Total hashrate: {:.1} GH/s  Total power: {:.2}W  Efficiency: {:.2} J/TH",
        totals.online, totals.total, totals.hashrate, totals.power, totals.efficiency
    );
    out
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axeshift_domain::{DeviceId, Settings, Telemetry};

    fn view(name: &str, enabled: bool, online: bool, hashrate: f64, power: f64) -> DeviceView {
        DeviceView {
            name: DeviceId::new(name).unwrap(),
            address: format!("http://{}.local", name),
            enabled,
            online,
            rebooting: false,
            error_count: 0,
            last_settings: Some(Settings::from_raw(1150, 450).unwrap()),
            current_period: Some(Period::Day),
            last_update: None,
            telemetry: online.then_some(Telemetry {
                hashrate,
                temperature: 60.0,
                power,
                voltage: None,
                frequency: None,
            }),
        }
    }

    #[test]
    fn test_totals_count_online_devices_only() {
        let fleet = vec![
            view("a", true, true, 500.0, 12.0),
            view("b", true, true, 500.0, 13.0),
            view("c", true, false, 0.0, 0.0),
            view("d", false, false, 0.0, 0.0),
        ];

        let totals = FleetTotals::from_view(&fleet);

        assert_eq!(totals.online, 2);
        assert_eq!(totals.total, 4);
        assert!((totals.hashrate - 1000.0).abs() < 1e-9);
        assert!((totals.power - 25.0).abs() < 1e-9);
        // 25 W / 1 TH/s
        assert!((totals.efficiency - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_hashrate_efficiency_is_zero() {
        let totals = FleetTotals::from_view(&[view("a", true, true, 0.0, 12.0)]);
        assert_eq!(totals.efficiency, 0.0);
    }

    #[test]
    fn test_table_rows_and_labels() {
        let fleet = vec![
            view("bitaxe1", true, true, 512.0, 12.8),
            view("bitaxe2", true, false, 0.0, 0.0),
            view("bitaxe3", false, false, 0.0, 0.0),
        ];

        let table = render_status_table(&fleet, Some(Period::Day));

        assert!(table.contains("period: day"));
        assert!(table.lines().any(|l| l.starts_with("bitaxe1") && l.contains("Online")));
        assert!(table.lines().any(|l| l.starts_with("bitaxe2") && l.contains("Offline")));
        assert!(table.lines().any(|l| l.starts_with("bitaxe3") && l.contains("Disabled")));
        assert!(table.contains("1150mV @ 450MHz"));
        assert!(table.contains("Online: 1/3"));
    }
}
