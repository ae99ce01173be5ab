//! Gradual transition planning.
//!
//! Splits the move from `current` to `target` into `steps` equal real-valued
//! increments. Intermediate steps are floored; the final step is exactly the
//! target.

use axeshift_domain::{Megahertz, Millivolts, Settings};

/// Intermediate settings to apply, in order. Never empty; last element is `target`.
///
/// `steps == 0` is treated as a single direct step.
pub fn plan_transition(current: Settings, target: Settings, steps: u32) -> Vec<Settings> {
    if steps <= 1 {
        return vec![target];
    }

    let mut plan = Vec::with_capacity(steps as usize);
    for i in 1..steps {
        let voltage = interpolate(current.voltage.value(), target.voltage.value(), i, steps);
        let frequency = interpolate(current.frequency.value(), target.frequency.value(), i, steps);
        plan.push(Settings {
            voltage: Millivolts::new(voltage).unwrap_or(target.voltage),
            frequency: Megahertz::new(frequency).unwrap_or(target.frequency),
        });
    }
    plan.push(target);
    plan
}

fn interpolate(from: u32, to: u32, i: u32, steps: u32) -> u32 {
    let step = (f64::from(to) - f64::from(from)) / f64::from(steps);
    let value = (f64::from(from) + step * f64::from(i)).floor();
    value.max(0.0) as u32
}

// =============================================================================
// Tests
// =============================================================================
