//! Target settings resolution.
//!
//! Precedence: device override for the period, then the global profile.
//! The result is clamped down to the fleet ceilings; values are never raised.

use axeshift_domain::{DeviceOverrides, Period, ProfileSet, SafetyLimits, Settings};

/// Resolve the clamped target settings for one device in `period`.
pub fn resolve_target(
    overrides: &DeviceOverrides,
    period: Period,
    profiles: &ProfileSet,
    limits: &SafetyLimits,
) -> Settings {
    let settings = overrides
        .for_period(period)
        .unwrap_or(profiles.for_period(period).settings);

    clamp_to_limits(settings, limits)
}

/// One-sided clamp of a settings pair to the ceilings.
pub fn clamp_to_limits(settings: Settings, limits: &SafetyLimits) -> Settings {
    Settings {
        voltage: settings.voltage.min(limits.max_voltage),
        frequency: settings.frequency.min(limits.max_frequency),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axeshift_domain::{Megahertz, Millivolts, Profile, TimeWindow};

    fn settings(v: u32, f: u32) -> Settings {
        Settings::from_raw(v, f).unwrap()
    }

    fn profiles() -> ProfileSet {
        ProfileSet {
            day: Profile {
                settings: settings(1150, 450),
                window: TimeWindow::parse("07:30", "20:00").unwrap(),
            },
            night: Profile {
                settings: settings(1250, 550),
                window: TimeWindow::parse("20:00", "07:30").unwrap(),
            },
        }
    }

    fn limits(max_v: u32, max_f: u32) -> SafetyLimits {
        SafetyLimits::new(
            Millivolts::new(max_v).unwrap(),
            Megahertz::new(max_f).unwrap(),
            70.0,
            15.0,
        )
        .unwrap()
    }

    #[test]
    fn test_global_profile_used_without_override() {
        let target = resolve_target(
            &DeviceOverrides::default(),
            Period::Night,
            &profiles(),
            &limits(1300, 600),
        );
        assert_eq!(target, settings(1250, 550));
    }

    #[test]
    fn test_override_wins_for_its_period_only() {
        let overrides = DeviceOverrides {
            day: Some(settings(1100, 400)),
            night: None,
        };

        let day = resolve_target(&overrides, Period::Day, &profiles(), &limits(1300, 600));
        let night = resolve_target(&overrides, Period::Night, &profiles(), &limits(1300, 600));

        assert_eq!(day, settings(1100, 400));
        assert_eq!(night, settings(1250, 550));
    }

    #[test]
    fn test_clamp_is_one_sided() {
        let target = resolve_target(
            &DeviceOverrides::default(),
            Period::Night,
            &profiles(),
            &limits(1200, 500),
        );
        assert_eq!(target, settings(1200, 500));

        // Below the ceiling: untouched, not raised
        let low = clamp_to_limits(settings(1000, 300), &limits(1200, 500));
        assert_eq!(low, settings(1000, 300));
    }

    #[test]
    fn test_clamp_is_idempotent() {
        let limits = limits(1200, 500);
        for (v, f) in [(1000, 300), (1200, 500), (1400, 700), (1250, 450)] {
            let once = clamp_to_limits(settings(v, f), &limits);
            let twice = clamp_to_limits(once, &limits);
            assert_eq!(once, twice);
            assert!(once.voltage <= limits.max_voltage);
            assert!(once.frequency <= limits.max_frequency);
        }
    }

    #[test]
    fn test_override_is_clamped_too() {
        let overrides = DeviceOverrides {
            day: None,
            night: Some(settings(1400, 650)),
        };
        let target = resolve_target(&overrides, Period::Night, &profiles(), &limits(1300, 600));
        assert_eq!(target, settings(1300, 600));
    }
}
