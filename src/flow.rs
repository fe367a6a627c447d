//! Axial flow advection inside cylinders (spec.md §4.D.1).

use crate::config::{FlowConfig, FlowFunctionKind, FlowProfile};

/// Instantaneous centerline velocity `v(t)`.
pub fn centerline_velocity(flow: &FlowConfig, t: f64) -> f64 {
    match flow.function_kind {
        FlowFunctionKind::Linear => flow.velocity + flow.acceleration * t,
        FlowFunctionKind::Sinus => flow.velocity + flow.amplitude * (std::f64::consts::TAU * flow.frequency * t).sin(),
    }
}

/// Local velocity at radial distance `r` (0 <= r <= radius).
pub fn local_velocity(flow: &FlowConfig, t: f64, r: f64, radius: f64) -> f64 {
    let v = centerline_velocity(flow, t);
    match flow.profile {
        FlowProfile::Uniform => v,
        FlowProfile::Laminar => {
            if radius <= 0.0 {
                v
            } else {
                2.0 * v * (1.0 - (r / radius).powi(2))
            }
        }
    }
}

/// Axial displacement over `delta_t`, added to the molecule's axial
/// coordinate; radial coordinates are unchanged by flow alone.
pub fn axial_displacement(flow: &FlowConfig, t: f64, r: f64, radius: f64, delta_t: f64) -> f64 {
    local_velocity(flow, t, r, radius) * delta_t
}

/// Taylor dispersion effective diffusion coefficient for a laminar
/// cylinder flow, used by the statistical test in spec.md §8.4.
pub fn taylor_dispersion(d: f64, radius: f64, v: f64) -> f64 {
    d + radius * radius * v * v / (48.0 * d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn laminar_center_is_twice_mean() {
        let flow = FlowConfig { velocity: 1.0, acceleration: 0.0, function_kind: FlowFunctionKind::Linear, frequency: 0.0, amplitude: 0.0, profile: FlowProfile::Laminar };
        assert!((local_velocity(&flow, 0.0, 0.0, 1.0) - 2.0).abs() < 1e-12);
        assert!(local_velocity(&flow, 0.0, 1.0, 1.0).abs() < 1e-12);
    }
}
