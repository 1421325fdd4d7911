//! Convenience re-exports for analysing circuits.

pub use crate::circuits::{
    analysis::{AnalysisResult, Analyzer, ComponentResult, Diagnostics, Stage, StageObserver},
    cache::{CacheStats, Fingerprint, ResultCache},
    circuit::{Circuit, CircuitBuilder, Wire},
    component::{
        Component, ComponentId, ComponentKind, ComponentParams, ElectricalState, LabelSequence,
        Position, SourceWaveform, WireId,
    },
    model::{formula_power, impedance, real_power},
    network::{ConnectionKind, Network},
    solver::{verify_solution, CancelFlag, LinearSolver, SolverMethod, SolverOptions},
    stamp::{build_system, AnalysisMethod, Conditioning, LinearSystem, MnaBuilder},
    topology::{Topology, TopologyKind, TopologyOptions},
};
pub use crate::config::{AnalysisConfig, PlausibilityLimits};
pub use crate::errors::{AnalysisError, SolverError, StructuralError, ValidationWarning, WarningKind};
pub use crate::math::{CScalar, Scalar};
pub use crate::sweep::{linspace, logspace_hz, write_sweep_csv, SweepPoint};
