//! Shared error and warning types used across submodules.
//!
//! Fatal failures are either [`StructuralError`] (the circuit cannot be turned
//! into a solvable system) or [`SolverError`] (a numerical algorithm gave up).
//! Non-fatal findings are [`ValidationWarning`]s attached to successful results.

use thiserror::Error;

use crate::math::Scalar;

/// The circuit cannot be expressed as a well-posed linear system.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StructuralError {
    /// Nothing to analyze.
    #[error("circuit contains no two-terminal elements")]
    EmptyCircuit,
    /// The node graph splits into more than one connected component.
    #[error("circuit is split into {components} disconnected components")]
    Disconnected {
        /// Number of connected components found.
        components: usize,
    },
    /// Non-ground nodes without any connection.
    #[error("nodes {nodes:?} have no connections")]
    IsolatedNodes {
        /// Offending electrical node ids.
        nodes: Vec<usize>,
    },
    /// No ground reference could be established.
    #[error("circuit has no ground reference")]
    MissingGround,
    /// A closed-form method needs a source the circuit does not have.
    #[error("circuit lacks a voltage/current source for {method} analysis")]
    MissingSource {
        /// Method that required the source.
        method: &'static str,
    },
    /// A two-terminal element does not resolve to two electrical nodes.
    #[error("component {label} has malformed endpoints: {reason}")]
    MalformedBranch {
        /// Label of the offending component.
        label: String,
        /// What is wrong with it.
        reason: String,
    },
    /// Mesh analysis was requested but the walk found no closed loop.
    #[error("no independent meshes found for mesh analysis")]
    NoMeshes,
    /// An ideal short sits directly across an ideal source.
    #[error("source {label} is short-circuited")]
    ShortedSource {
        /// Label of the shorted source.
        label: String,
    },
    /// A plain nodal system cannot carry the given element.
    #[error("{label} requires modified nodal analysis")]
    RequiresModifiedNodal {
        /// Label of the element.
        label: String,
    },
    /// The assembled matrix is singular or numerically close to it.
    #[error("system matrix is singular (|det| = {determinant:.3e})")]
    Singular {
        /// Magnitude of the (relative) determinant.
        determinant: Scalar,
    },
    /// A forced method does not fit the circuit's shape.
    #[error("{method} analysis cannot be applied: {reason}")]
    UnsupportedMethod {
        /// Requested method.
        method: &'static str,
        /// Why it does not fit.
        reason: String,
    },
    /// Several invariants were violated at once.
    #[error("{}", join(.0))]
    Invariants(Vec<StructuralError>),
}

fn join(errors: &[StructuralError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A numerical algorithm failed on an otherwise well-formed system.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    /// A pivot fell below tolerance during elimination.
    #[error("singular system: pivot {pivot:.3e} in row {row} is below tolerance")]
    SingularMatrix {
        /// Row at which elimination stopped.
        row: usize,
        /// Magnitude of the rejected pivot.
        pivot: Scalar,
    },
    /// Cholesky was selected but the matrix is not Hermitian positive-definite.
    #[error("matrix is not positive-definite")]
    NotPositiveDefinite,
    /// Iterative solver failed to converge within maximum iterations.
    #[error("failed to converge after {iterations} iterations (residual: {residual_norm:.2e})")]
    ConvergenceFailure {
        /// Number of iterations completed before failure.
        iterations: usize,
        /// Final residual norm at termination.
        residual_norm: Scalar,
    },
    /// The caller raised the cancellation flag.
    #[error("solve cancelled after {iterations} iterations")]
    Cancelled {
        /// Iterations completed before the flag was observed.
        iterations: usize,
    },
    /// Matrix and right-hand side do not fit together.
    #[error("dimension mismatch: {rows}x{cols} matrix with rhs of length {rhs}")]
    DimensionMismatch {
        /// Matrix rows.
        rows: usize,
        /// Matrix columns.
        cols: usize,
        /// Right-hand side length.
        rhs: usize,
    },
    /// The solution contains NaN or infinite entries.
    #[error("solution contains non-finite values")]
    NonFinite,
}

/// Top-level error type for a single analysis attempt.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    /// Topology or system construction failed.
    #[error(transparent)]
    Structural(#[from] StructuralError),
    /// The chosen solver failed.
    #[error(transparent)]
    Numeric(#[from] SolverError),
    /// The solution did not reproduce the right-hand side.
    #[error("solution verification failed: residual {residual:.3e} exceeds {limit:.3e}")]
    Verification {
        /// Measured residual.
        residual: Scalar,
        /// Allowed residual.
        limit: Scalar,
    },
}

/// Category of a non-fatal finding.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningKind {
    /// Zero/negative or extreme component values or results.
    ImplausibleValue,
    /// A source's terminal voltage sags away from nominal.
    VoltageRegulation,
    /// Wire current exceeds the configured density limit.
    CurrentDensity,
    /// Delivered and absorbed power disagree.
    PowerBalance,
    /// No ground symbol; a reference node was chosen automatically.
    SyntheticGround,
    /// The matrix is close to singular.
    Conditioning,
    /// Mesh enumeration found a different number of loops than expected.
    MeshScope,
    /// Opposing voltage sources share a mesh.
    SourcePolarity,
    /// A diode conducts against its assumed forward model.
    DiodeRegion,
    /// A node voltage could not be reconstructed from branch currents.
    UnresolvedNode,
}

/// Non-fatal diagnostic attached to an analysis result.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    /// Warning category.
    pub kind: WarningKind,
    /// Human-readable description.
    pub message: String,
}

impl ValidationWarning {
    /// Creates a warning.
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_list_joins_messages() {
        let err = StructuralError::Invariants(vec![
            StructuralError::MissingGround,
            StructuralError::Disconnected { components: 2 },
        ]);
        let text = err.to_string();
        assert!(text.contains("no ground"));
        assert!(text.contains("2 disconnected components"));
    }

    #[test]
    fn analysis_error_is_transparent() {
        let err: AnalysisError = SolverError::NotPositiveDefinite.into();
        assert_eq!(err.to_string(), "matrix is not positive-definite");
    }
}
