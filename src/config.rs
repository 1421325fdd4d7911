//! Analysis configuration shared by the topology, stamping, solving and
//! plausibility stages.

use crate::circuits::stamp::AnalysisMethod;
use crate::constants::{
    DEFAULT_SNAP_TOLERANCE, DEFAULT_TIME_STEP, IDEAL_WIRE_EPSILON, MAX_ITERATIONS,
    SOLVER_TOLERANCE,
};
use crate::math::Scalar;

/// Thresholds used by the physical-plausibility stage.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlausibilityLimits {
    /// Largest believable node or component voltage magnitude (V).
    pub max_voltage: Scalar,
    /// Largest believable branch current magnitude (A).
    pub max_current: Scalar,
    /// Largest believable per-component power magnitude (W).
    pub max_power: Scalar,
    /// Wire current density limit (A/mm²).
    pub max_current_density: Scalar,
    /// Allowed relative sag of a voltage source's terminal voltage.
    pub regulation_tolerance: Scalar,
    /// Allowed relative mismatch between delivered and absorbed power.
    pub power_balance_tolerance: Scalar,
}

impl Default for PlausibilityLimits {
    fn default() -> Self {
        Self {
            max_voltage: 1.0e6,
            max_current: 1.0e3,
            max_power: 1.0e6,
            max_current_density: 10.0,
            regulation_tolerance: 0.05,
            power_balance_tolerance: 0.01,
        }
    }
}

/// Configuration for a circuit [`Analyzer`](crate::circuits::analysis::Analyzer).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    /// Terminals closer than this (circuit-space units) share a physical node.
    pub snap_tolerance: Scalar,
    /// Wires below this resistance are ideal connections.
    pub ideal_wire_epsilon: Scalar,
    /// Pivot and convergence tolerance.
    pub tolerance: Scalar,
    /// Iteration cap for iterative solvers.
    pub max_iterations: usize,
    /// Number of results the cache keeps before evicting the least recently used.
    pub cache_capacity: usize,
    /// Excitation frequency in hertz; `0.0` selects DC analysis.
    pub frequency_hz: Scalar,
    /// Explicit-Euler time step (s) for capacitor and inductor stepping.
    pub time_step: Scalar,
    /// Overrides automatic method selection.
    pub forced_method: Option<AnalysisMethod>,
    /// Plausibility thresholds.
    pub limits: PlausibilityLimits,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            snap_tolerance: DEFAULT_SNAP_TOLERANCE,
            ideal_wire_epsilon: IDEAL_WIRE_EPSILON,
            tolerance: SOLVER_TOLERANCE,
            max_iterations: MAX_ITERATIONS,
            cache_capacity: 64,
            frequency_hz: 0.0,
            time_step: DEFAULT_TIME_STEP,
            forced_method: None,
            limits: PlausibilityLimits::default(),
        }
    }
}

impl AnalysisConfig {
    /// Sets the excitation frequency.
    #[must_use]
    pub const fn with_frequency(mut self, hz: Scalar) -> Self {
        self.frequency_hz = hz;
        self
    }

    /// Sets the cache capacity.
    #[must_use]
    pub const fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Forces a specific analysis method.
    #[must_use]
    pub const fn with_method(mut self, method: AnalysisMethod) -> Self {
        self.forced_method = Some(method);
        self
    }

    /// Sets the solver tolerance.
    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: Scalar) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the iterative solver cap.
    #[must_use]
    pub const fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }

    /// Sets the snapping tolerance.
    #[must_use]
    pub const fn with_snap_tolerance(mut self, tolerance: Scalar) -> Self {
        self.snap_tolerance = tolerance;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = AnalysisConfig::default();
        assert_eq!(cfg.snap_tolerance, 10.0);
        assert_eq!(cfg.max_iterations, 1000);
        assert_eq!(cfg.frequency_hz, 0.0);
        assert!(cfg.forced_method.is_none());
    }

    #[test]
    fn builders_override_fields() {
        let cfg = AnalysisConfig::default()
            .with_frequency(50.0)
            .with_method(AnalysisMethod::Mesh)
            .with_cache_capacity(2);
        assert_eq!(cfg.frequency_hz, 50.0);
        assert_eq!(cfg.forced_method, Some(AnalysisMethod::Mesh));
        assert_eq!(cfg.cache_capacity, 2);
    }
}
