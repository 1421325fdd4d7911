//! Electrical reference values and default numerical tolerances.
//!
//! ## Conventions
//!
//! Positions are in circuit-space units (the schematic grid). Resistances are in
//! ohms, capacitances in farads, inductances in henries, temperatures in degrees
//! Celsius and temperature coefficients in parts per million per degree.

use std::f64::consts::PI;

/// Temperature at which nominal resistor values are specified (°C).
pub const REFERENCE_TEMPERATURE_C: f64 = 25.0;
/// Default terminal snapping tolerance in circuit-space units.
pub const DEFAULT_SNAP_TOLERANCE: f64 = 10.0;
/// Wires below this resistance (Ω) are ideal shorts and merge their end nodes.
pub const IDEAL_WIRE_EPSILON: f64 = 1.0e-6;
/// Default pivot / convergence tolerance for the linear solvers.
pub const SOLVER_TOLERANCE: f64 = 1.0e-10;
/// Default iteration cap for Gauss–Seidel and Jacobi.
pub const MAX_ITERATIONS: usize = 1000;
/// Factor applied to the solver tolerance when verifying a finished solution.
pub const VERIFY_TOLERANCE_FACTOR: f64 = 1000.0;
/// Default explicit-Euler time step (s) for capacitor and inductor stepping.
pub const DEFAULT_TIME_STEP: f64 = 1.0e-3;
/// Impedances with magnitude below this value are treated as ideal shorts (Ω).
pub const SHORT_IMPEDANCE: f64 = 1.0e-9;

/// Default forward voltage of a silicon diode (V).
pub const DIODE_FORWARD_VOLTAGE: f64 = 0.7;
/// Default series (bulk) resistance of a diode in its forward region (Ω).
pub const DIODE_SERIES_RESISTANCE: f64 = 0.1;
/// Default reverse-region resistance of a diode (Ω).
pub const DIODE_REVERSE_RESISTANCE: f64 = 1.0e9;

/// Returns the angular frequency corresponding to a linear frequency `hz`.
#[inline]
#[must_use]
pub fn angular_frequency(hz: f64) -> f64 {
    2.0 * PI * hz
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn angular_frequency_of_one_hertz_is_two_pi() {
        assert_relative_eq!(angular_frequency(1.0), 2.0 * PI, max_relative = 1.0e-12);
    }
}
