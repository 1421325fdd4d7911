//! Circuit model, topology extraction, system construction, solvers and the
//! analysis coordinator.

/// Analysis coordinator: pipeline, results and write-back.
pub mod analysis;
/// Bounded result cache keyed by circuit fingerprints.
pub mod cache;
/// Circuit container and builder.
pub mod circuit;
/// Component kinds, parameters and solved state.
pub mod component;
/// Union-find used to merge connection points.
pub mod disjoint;
/// Iterative solvers.
pub mod iterative;
/// Per-kind electrical laws.
pub mod model;
/// Series/parallel impedance aggregation.
pub mod network;
/// Input and result plausibility checks.
pub mod plausibility;
/// Direct solvers, solver selection and verification.
pub mod solver;
/// Nodal, mesh and closed-form system construction.
pub mod stamp;
/// Node merging, branches, meshes and classification.
pub mod topology;

pub use analysis::{AnalysisResult, Analyzer, ComponentResult, Diagnostics, Stage, StageObserver};
pub use circuit::{Circuit, CircuitBuilder, Wire};
pub use component::{Component, ComponentId, ComponentKind, Position, SourceWaveform, WireId};
pub use network::{ConnectionKind, Network};
pub use solver::{LinearSolver, SolverMethod};
pub use stamp::{AnalysisMethod, LinearSystem};
pub use topology::{Topology, TopologyKind};
