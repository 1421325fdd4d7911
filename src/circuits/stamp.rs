//! System construction for every analysis method.
//!
//! Nodal systems are stamped element by element through [`MnaBuilder`];
//! mesh systems sum branch impedances per loop; series and parallel circuits
//! reduce to closed forms (a 1×1 loop equation, a diagonal branch system).

use std::fmt;

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::errors::{StructuralError, ValidationWarning, WarningKind};
use crate::math::{admittance, is_finite, max_abs, CMatrix, CScalar, CVector, Scalar, C_ONE, C_ZERO};

use super::network::{ConnectionKind, Network};
use super::topology::{Branch, BranchKind, Mesh, MeshStep, Topology, TopologyKind};

/// Formulation used to turn a topology into a linear system.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisMethod {
    /// Node-voltage unknowns; sources must be Norton-convertible.
    Nodal,
    /// Node voltages plus one current unknown per voltage source or short.
    ModifiedNodal,
    /// Mesh-current unknowns.
    Mesh,
    /// Mesh currents with current-source constraints (supermeshes).
    ModifiedMesh,
    /// Single-loop closed form.
    Series,
    /// Shared-node-pair closed form.
    Parallel,
    /// Ladder networks; built as modified nodal.
    Ladder,
}

impl AnalysisMethod {
    /// Every method.
    pub const ALL: [Self; 7] = [
        Self::Nodal,
        Self::ModifiedNodal,
        Self::Mesh,
        Self::ModifiedMesh,
        Self::Series,
        Self::Parallel,
        Self::Ladder,
    ];

    /// Stable lowercase name used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Nodal => "nodal",
            Self::ModifiedNodal => "nodal_modified",
            Self::Mesh => "mesh",
            Self::ModifiedMesh => "mesh_modified",
            Self::Series => "series",
            Self::Parallel => "parallel",
            Self::Ladder => "ladder",
        }
    }

    /// True for the analytical series/parallel forms.
    #[must_use]
    pub const fn is_closed_form(self) -> bool {
        matches!(self, Self::Series | Self::Parallel)
    }
}

impl fmt::Display for AnalysisMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Node index (0-based). The ground node is represented by `None`.
pub type Node = Option<usize>;

/// Modified nodal analysis builder.
///
/// Starts with `node_count` rows and grows by one row/column per stamped
/// voltage source; the extra unknown is the current flowing from `pos` to
/// `neg` through the source.
#[derive(Debug, Clone)]
pub struct MnaBuilder {
    n: usize,
    m: usize,
    a: CMatrix,
    b: CVector,
}

impl MnaBuilder {
    /// Creates a system with `node_count` non-ground nodes.
    #[must_use]
    pub fn new(node_count: usize) -> Self {
        Self {
            n: node_count,
            m: 0,
            a: DMatrix::zeros(node_count, node_count),
            b: DVector::zeros(node_count),
        }
    }

    fn ensure_capacity(&mut self, new_m: usize) {
        if new_m <= self.m {
            return;
        }
        let old = self.n + self.m;
        self.m = new_m;
        let dim = self.n + self.m;
        let mut a = DMatrix::zeros(dim, dim);
        let mut b = DVector::zeros(dim);
        a.view_mut((0, 0), (old, old)).copy_from(&self.a);
        b.rows_mut(0, old).copy_from(&self.b);
        self.a = a;
        self.b = b;
    }

    /// Stamps admittance `y` between `a` and `b`.
    pub fn stamp_admittance(&mut self, a: Node, b: Node, y: CScalar) {
        match (a, b) {
            (Some(i), Some(j)) => {
                self.a[(i, i)] += y;
                self.a[(j, j)] += y;
                self.a[(i, j)] -= y;
                self.a[(j, i)] -= y;
            }
            (Some(i), None) => self.a[(i, i)] += y,
            (None, Some(j)) => self.a[(j, j)] += y,
            (None, None) => {}
        }
    }

    /// Injects current `i` into `pos` and draws it from `neg`.
    pub fn stamp_current_source(&mut self, pos: Node, neg: Node, i: CScalar) {
        if let Some(p) = pos {
            self.b[p] += i;
        }
        if let Some(n) = neg {
            self.b[n] -= i;
        }
    }

    /// Adds a voltage source `v` with series resistance `r` between `pos` and
    /// `neg`, enforcing `V(pos) − V(neg) − r·I = v`. Returns the row of the
    /// source current unknown.
    pub fn stamp_voltage_source(&mut self, pos: Node, neg: Node, v: CScalar, r: CScalar) -> usize {
        let k = self.m;
        self.ensure_capacity(k + 1);
        let row = self.n + k;

        if let Some(p) = pos {
            self.a[(p, row)] += C_ONE;
            self.a[(row, p)] += C_ONE;
        }
        if let Some(n) = neg {
            self.a[(n, row)] -= C_ONE;
            self.a[(row, n)] -= C_ONE;
        }
        self.a[(row, row)] -= r;
        self.b[row] += v;
        row
    }

    /// Returns `(node_count, source_count)`.
    #[must_use]
    pub const fn dimensions(&self) -> (usize, usize) {
        (self.n, self.m)
    }

    /// Finishes into `(matrix, rhs)`.
    #[must_use]
    pub fn finish(self) -> (CMatrix, CVector) {
        (self.a, self.b)
    }
}

/// Numerical health of an assembled matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conditioning {
    /// Determinant (closed form up to 3×3, LU above).
    pub determinant: CScalar,
    /// `|det|` divided by the product of row norms (Hadamard bound), in `[0, 1]`.
    pub relative_determinant: Scalar,
    /// Smallest over largest LU pivot magnitude.
    pub reciprocal_condition: Scalar,
    /// `A ≈ Aᵀ`.
    pub symmetric: bool,
    /// Real symmetric positive-definite (Cholesky succeeds).
    pub positive_definite: bool,
    /// Every diagonal entry dominates the rest of its row.
    pub diagonally_dominant: bool,
    /// Pivot ratio below tolerance.
    pub near_singular: bool,
}

impl Conditioning {
    /// Measures `matrix` against `tolerance`.
    #[must_use]
    pub fn analyze(matrix: &CMatrix, tolerance: Scalar) -> Self {
        let n = matrix.nrows();
        let eps = tolerance * max_abs(matrix).max(Scalar::MIN_POSITIVE);

        let determinant = determinant(matrix);
        let hadamard: Scalar = matrix.row_iter().map(|row| row.norm()).product();
        let relative_determinant = if hadamard > 0.0 {
            (determinant.norm() / hadamard).min(1.0)
        } else {
            0.0
        };

        let reciprocal_condition = if n == 0 {
            0.0
        } else {
            let lu = matrix.clone().lu();
            let u = lu.u();
            let (lo, hi) = (0..n).fold((Scalar::INFINITY, 0.0_f64), |(lo, hi), k| {
                let d = u[(k, k)].norm();
                (lo.min(d), hi.max(d))
            });
            if hi > 0.0 {
                lo / hi
            } else {
                0.0
            }
        };

        let symmetric = (0..n).all(|i| (i + 1..n).all(|j| (matrix[(i, j)] - matrix[(j, i)]).norm() <= eps));
        let real = matrix.iter().all(|z| z.im.abs() <= eps);
        let positive_definite = n > 0 && symmetric && real && matrix.map(|z| z.re).cholesky().is_some();
        let diagonally_dominant = n > 0
            && (0..n).all(|i| {
                let diag = matrix[(i, i)].norm();
                let off: Scalar = (0..n).filter(|&j| j != i).map(|j| matrix[(i, j)].norm()).sum();
                diag > 0.0 && diag >= off
            });

        Self {
            determinant,
            relative_determinant,
            reciprocal_condition,
            symmetric,
            positive_definite,
            diagonally_dominant,
            near_singular: reciprocal_condition < tolerance,
        }
    }
}

/// Determinant: closed form for n ≤ 3, LU factorization above.
#[must_use]
pub fn determinant(m: &CMatrix) -> CScalar {
    match m.nrows() {
        0 => C_ONE,
        1 => m[(0, 0)],
        2 => m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)],
        3 => {
            m[(0, 0)] * (m[(1, 1)] * m[(2, 2)] - m[(1, 2)] * m[(2, 1)])
                - m[(0, 1)] * (m[(1, 0)] * m[(2, 2)] - m[(1, 2)] * m[(2, 0)])
                + m[(0, 2)] * (m[(1, 0)] * m[(2, 1)] - m[(1, 1)] * m[(2, 0)])
        }
        _ => m.clone().lu().determinant(),
    }
}

/// How rows and unknowns of a [`LinearSystem`] map back onto the topology.
#[derive(Debug, Clone, PartialEq)]
pub enum Layout {
    /// Node-voltage unknowns followed by source-current unknowns.
    Nodal {
        /// Row of each electrical node (`None` for ground).
        node_rows: Vec<Option<usize>>,
        /// `(branch id, row)` of each current unknown.
        extra_rows: Vec<(usize, usize)>,
    },
    /// One unknown per mesh current.
    Mesh {
        /// Meshes in row order.
        meshes: Vec<Mesh>,
    },
    /// One loop current.
    Series {
        /// Loop traversal; branch current is `sign · I`.
        steps: Vec<MeshStep>,
    },
    /// One unknown per load branch: its current from `plus` to `minus`.
    Parallel {
        /// Node at the driving source's terminal 0.
        plus: usize,
        /// Node at the driving source's terminal 1.
        minus: usize,
        /// Driving source branch.
        source: usize,
        /// Load branch per row.
        loads: Vec<usize>,
        /// Voltage from `plus` to `minus`.
        across: CScalar,
    },
}

/// An assembled linear system `A·x = b` with its index maps.
#[derive(Debug, Clone)]
pub struct LinearSystem {
    /// Method used for construction.
    pub method: AnalysisMethod,
    /// System matrix.
    pub matrix: CMatrix,
    /// Right-hand side.
    pub rhs: CVector,
    /// Row/unknown mapping.
    pub layout: Layout,
    /// Conditioning measures.
    pub conditioning: Conditioning,
    /// Input impedance seen by the source (closed forms only).
    pub equivalent_impedance: Option<CScalar>,
    /// Construction warnings.
    pub warnings: Vec<ValidationWarning>,
}

impl LinearSystem {
    /// Number of unknowns.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.matrix.nrows()
    }
}

struct Assembly {
    matrix: CMatrix,
    rhs: CVector,
    layout: Layout,
    equivalent_impedance: Option<CScalar>,
}

fn needs_modified_nodal(topo: &Topology) -> bool {
    topo.branches.iter().any(|b| match b.kind {
        BranchKind::VoltageSource => true,
        BranchKind::Passive | BranchKind::Diode => b.is_short(),
        BranchKind::CurrentSource => false,
    })
}

fn needs_modified_mesh(topo: &Topology) -> bool {
    topo.branches
        .iter()
        .any(|b| b.kind == BranchKind::CurrentSource || b.is_open())
}

fn parallel_fits(topo: &Topology) -> Result<bool, StructuralError> {
    let mut sources = topo
        .branches
        .iter()
        .filter(|b| matches!(b.kind, BranchKind::VoltageSource | BranchKind::CurrentSource));
    let (Some(source), None) = (sources.next(), sources.next()) else {
        return Ok(false);
    };
    let loads = || topo.branches.iter().filter(|b| b.id != source.id);
    if loads().any(|b| b.kind != BranchKind::Passive) {
        return Ok(false);
    }
    if loads().any(Branch::is_short) {
        if source.kind == BranchKind::VoltageSource && source.is_short() {
            return Err(StructuralError::ShortedSource {
                label: source.label.clone(),
            });
        }
        return Ok(false);
    }
    Ok(true)
}

/// Picks an analysis method for `topo`.
///
/// Special shapes take their closed forms. Otherwise the cheaper of nodal
/// (`nodes − 1 + 2·voltage sources`) and mesh (`loops + 2·current sources`)
/// wins, ties going to nodal. Mesh is only chosen when the mesh walk found
/// every independent loop.
pub fn select_method(topo: &Topology, forced: Option<AnalysisMethod>) -> Result<AnalysisMethod, StructuralError> {
    if let Some(method) = forced {
        return Ok(method);
    }
    let vsrc = topo.count(BranchKind::VoltageSource);
    let isrc = topo.count(BranchKind::CurrentSource);

    match topo.kind {
        TopologyKind::Series if vsrc + isrc >= 1 && isrc <= 1 => return Ok(AnalysisMethod::Series),
        TopologyKind::Parallel if parallel_fits(topo)? => return Ok(AnalysisMethod::Parallel),
        TopologyKind::Ladder => return Ok(AnalysisMethod::Ladder),
        _ => {}
    }

    let nodal_cost = topo.nodes.len() - 1 + 2 * vsrc;
    let mesh_cost = topo.loop_count() + 2 * isrc;
    let meshes_complete = !topo.meshes.is_empty() && topo.meshes.len() == topo.loop_count();

    let method = if mesh_cost < nodal_cost && meshes_complete {
        if needs_modified_mesh(topo) {
            AnalysisMethod::ModifiedMesh
        } else {
            AnalysisMethod::Mesh
        }
    } else if needs_modified_nodal(topo) {
        AnalysisMethod::ModifiedNodal
    } else {
        AnalysisMethod::Nodal
    };
    debug!(nodal_cost, mesh_cost, meshes_complete, %method, "method selected");
    Ok(method)
}

/// Builds the linear system for `method` and measures its conditioning.
pub fn build_system(topo: &Topology, method: AnalysisMethod, tolerance: Scalar) -> Result<LinearSystem, StructuralError> {
    let mut warnings = Vec::new();
    let assembly = match method {
        AnalysisMethod::Nodal => build_nodal(topo, false)?,
        AnalysisMethod::ModifiedNodal | AnalysisMethod::Ladder => build_nodal(topo, true)?,
        AnalysisMethod::Mesh | AnalysisMethod::ModifiedMesh => build_mesh(topo, &mut warnings)?,
        AnalysisMethod::Series => build_series(topo)?,
        AnalysisMethod::Parallel => build_parallel(topo)?,
    };

    let conditioning = Conditioning::analyze(&assembly.matrix, tolerance);
    if conditioning.near_singular {
        warnings.push(ValidationWarning::new(
            WarningKind::Conditioning,
            format!(
                "matrix is near-singular (pivot ratio {:.3e})",
                conditioning.reciprocal_condition
            ),
        ));
    }
    debug!(
        %method,
        size = assembly.matrix.nrows(),
        symmetric = conditioning.symmetric,
        positive_definite = conditioning.positive_definite,
        near_singular = conditioning.near_singular,
        "system built"
    );

    Ok(LinearSystem {
        method,
        matrix: assembly.matrix,
        rhs: assembly.rhs,
        layout: assembly.layout,
        conditioning,
        equivalent_impedance: assembly.equivalent_impedance,
        warnings,
    })
}

fn build_nodal(topo: &Topology, modified: bool) -> Result<Assembly, StructuralError> {
    let mut node_rows = vec![None; topo.nodes.len()];
    let mut n = 0;
    for node in &topo.nodes {
        if node.id != topo.ground {
            node_rows[node.id] = Some(n);
            n += 1;
        }
    }

    let mut mna = MnaBuilder::new(n);
    let mut extra_rows = Vec::new();
    let requires_modified = |b: &Branch| StructuralError::RequiresModifiedNodal {
        label: b.label.clone(),
    };

    for br in &topo.branches {
        let (p, q) = (node_rows[br.from], node_rows[br.to]);
        match br.kind {
            BranchKind::Passive => {
                if br.is_open() {
                    continue;
                }
                if br.is_short() {
                    if !modified {
                        return Err(requires_modified(br));
                    }
                    extra_rows.push((br.id, mna.stamp_voltage_source(p, q, C_ZERO, C_ZERO)));
                } else if let Some(y) = admittance(br.impedance) {
                    mna.stamp_admittance(p, q, y);
                }
            }
            BranchKind::Diode => {
                if br.is_short() {
                    if !modified {
                        return Err(requires_modified(br));
                    }
                    extra_rows.push((br.id, mna.stamp_voltage_source(p, q, br.source, C_ZERO)));
                } else if let Some(y) = admittance(br.impedance) {
                    // Forward Norton equivalent: I = y·(V_ak − V_f).
                    mna.stamp_admittance(p, q, y);
                    mna.stamp_current_source(p, q, y * br.source);
                }
            }
            BranchKind::VoltageSource => {
                if modified {
                    extra_rows.push((br.id, mna.stamp_voltage_source(p, q, br.source, br.impedance)));
                } else {
                    let y = admittance(br.impedance)
                        .filter(|_| !br.is_short())
                        .ok_or_else(|| requires_modified(br))?;
                    mna.stamp_admittance(p, q, y);
                    mna.stamp_current_source(p, q, y * br.source);
                }
            }
            BranchKind::CurrentSource => mna.stamp_current_source(p, q, br.source),
        }
    }

    let (matrix, rhs) = mna.finish();
    Ok(Assembly {
        matrix,
        rhs,
        layout: Layout::Nodal { node_rows, extra_rows },
        equivalent_impedance: None,
    })
}

/// Branches carrying a known current: current sources and open elements.
fn is_constrained(b: &Branch) -> bool {
    b.kind == BranchKind::CurrentSource || b.is_open()
}

fn build_mesh(topo: &Topology, warnings: &mut Vec<ValidationWarning>) -> Result<Assembly, StructuralError> {
    let meshes = &topo.meshes;
    if meshes.is_empty() {
        return Err(StructuralError::NoMeshes);
    }
    let k = meshes.len();
    let mut z = CMatrix::zeros(k, k);
    let mut rhs = CVector::zeros(k);

    let mut membership: Vec<Vec<(usize, Scalar)>> = vec![Vec::new(); topo.branches.len()];
    for (i, mesh) in meshes.iter().enumerate() {
        for step in &mesh.steps {
            membership[step.branch].push((i, step.sign()));
        }
    }

    // Shared branches contribute −Z when the meshes run through them in
    // opposite directions, which orientation arranges for source-free meshes.
    for (br, members) in topo.branches.iter().zip(&membership) {
        if is_constrained(br) {
            continue;
        }
        for &(i, si) in members {
            for &(j, sj) in members {
                z[(i, j)] += br.impedance * (si * sj);
            }
        }
    }

    for (i, mesh) in meshes.iter().enumerate() {
        for step in &mesh.steps {
            let br = &topo.branches[step.branch];
            match br.kind {
                BranchKind::VoltageSource => {
                    rhs[i] += br.source;
                    if step.forward {
                        warnings.push(ValidationWarning::new(
                            WarningKind::SourcePolarity,
                            format!(
                                "mesh {i} runs through {} from + to −; its voltage is counted as a rise",
                                br.label
                            ),
                        ));
                    }
                }
                BranchKind::Diode => rhs[i] -= br.source * step.sign(),
                BranchKind::Passive | BranchKind::CurrentSource => {}
            }
        }
    }

    let mut fixed = vec![false; k];
    for (br, members) in topo.branches.iter().zip(&membership) {
        if !is_constrained(br) {
            continue;
        }
        // Branch current from → to; a current source drives current out of `from`.
        let value = if br.kind == BranchKind::CurrentSource {
            -br.source
        } else {
            C_ZERO
        };
        let no_free_row = || StructuralError::MalformedBranch {
            label: br.label.clone(),
            reason: "no free mesh equation left for its current constraint".into(),
        };
        let target = match members.as_slice() {
            [] => continue,
            [(i, _)] => {
                if fixed[*i] {
                    return Err(no_free_row());
                }
                *i
            }
            [(i, si), (j, sj)] => {
                let ((t, st), (o, so)) = if !fixed[*j] {
                    ((*j, *sj), (*i, *si))
                } else if !fixed[*i] {
                    ((*i, *si), (*j, *sj))
                } else {
                    return Err(no_free_row());
                };
                if !fixed[o] {
                    // Supermesh: eliminate the source's unknown voltage.
                    let factor = -(so * st);
                    let row_t = z.row(t).clone_owned();
                    let mut row_o = z.row_mut(o);
                    row_o += row_t * crate::math::real(factor);
                    let rhs_t = rhs[t];
                    rhs[o] += rhs_t * factor;
                }
                t
            }
            _ => {
                return Err(StructuralError::MalformedBranch {
                    label: br.label.clone(),
                    reason: "current constraint shared by more than two meshes".into(),
                })
            }
        };
        z.row_mut(target).fill(C_ZERO);
        for &(m, s) in members {
            z[(target, m)] = crate::math::real(s);
        }
        rhs[target] = value;
        fixed[target] = true;
    }

    Ok(Assembly {
        matrix: z,
        rhs,
        layout: Layout::Mesh {
            meshes: meshes.clone(),
        },
        equivalent_impedance: None,
    })
}

/// Walks the single loop of a series circuit, oriented so the first voltage
/// source is crossed from − to +.
fn series_loop(topo: &Topology) -> Result<Vec<MeshStep>, StructuralError> {
    let not_a_loop = || StructuralError::UnsupportedMethod {
        method: AnalysisMethod::Series.name(),
        reason: format!("{:?} topology is not a single loop", topo.kind),
    };
    if topo.kind != TopologyKind::Series {
        return Err(not_a_loop());
    }

    let first = &topo.branches[0];
    let origin = first.from;
    let mut at = first.to;
    let mut on_path = vec![false; topo.branches.len()];
    on_path[0] = true;
    let mut mesh = Mesh {
        steps: vec![MeshStep {
            branch: 0,
            forward: true,
        }],
    };
    while at != origin {
        let next = topo
            .branches
            .iter()
            .find(|b| !on_path[b.id] && b.touches(at))
            .ok_or_else(not_a_loop)?;
        on_path[next.id] = true;
        mesh.steps.push(MeshStep {
            branch: next.id,
            forward: next.from == at,
        });
        at = next.other(at);
    }
    if mesh.steps.len() != topo.branches.len() {
        return Err(not_a_loop());
    }

    let first_source = mesh
        .steps
        .iter()
        .find(|s| topo.branches[s.branch].kind == BranchKind::VoltageSource);
    if first_source.is_some_and(|s| s.forward) {
        mesh.reverse();
    }
    Ok(mesh.steps)
}

fn build_series(topo: &Topology) -> Result<Assembly, StructuralError> {
    let steps = series_loop(topo)?;
    let branch = |s: &MeshStep| &topo.branches[s.branch];

    let current_sources: Vec<&MeshStep> = steps
        .iter()
        .filter(|s| branch(s).kind == BranchKind::CurrentSource)
        .collect();
    let has_voltage = steps.iter().any(|s| branch(s).kind == BranchKind::VoltageSource);
    if current_sources.is_empty() && !has_voltage {
        return Err(StructuralError::MissingSource {
            method: AnalysisMethod::Series.name(),
        });
    }
    if current_sources.len() > 1 {
        return Err(StructuralError::UnsupportedMethod {
            method: AnalysisMethod::Series.name(),
            reason: "more than one current source in the loop".into(),
        });
    }

    let loads = steps
        .iter()
        .map(branch)
        .filter(|b| matches!(b.kind, BranchKind::Passive | BranchKind::Diode));
    let equivalent = Network::of(ConnectionKind::Series, loads).impedance();

    let (coefficient, value) = if let Some(cs) = current_sources.first() {
        (C_ONE, -branch(cs).source * cs.sign())
    } else if steps.iter().any(|s| branch(s).is_open()) {
        (C_ONE, C_ZERO)
    } else {
        let total: CScalar = steps.iter().map(|s| branch(s).impedance).sum();
        let drive: CScalar = steps
            .iter()
            .filter(|s| matches!(branch(s).kind, BranchKind::VoltageSource | BranchKind::Diode))
            .map(|s| -branch(s).source * s.sign())
            .sum();
        if total.norm() < crate::constants::SHORT_IMPEDANCE {
            let label = steps
                .iter()
                .map(branch)
                .find(|b| b.kind == BranchKind::VoltageSource)
                .map_or_else(String::new, |b| b.label.clone());
            return Err(StructuralError::ShortedSource { label });
        }
        (total, drive)
    };

    Ok(Assembly {
        matrix: CMatrix::from_element(1, 1, coefficient),
        rhs: CVector::from_element(1, value),
        layout: Layout::Series { steps },
        equivalent_impedance: Some(equivalent),
    })
}

fn build_parallel(topo: &Topology) -> Result<Assembly, StructuralError> {
    let method = AnalysisMethod::Parallel.name();
    if topo.kind != TopologyKind::Parallel {
        return Err(StructuralError::UnsupportedMethod {
            method,
            reason: format!("{:?} topology does not share one node pair", topo.kind),
        });
    }
    let sources: Vec<&Branch> = topo
        .branches
        .iter()
        .filter(|b| matches!(b.kind, BranchKind::VoltageSource | BranchKind::CurrentSource))
        .collect();
    let source = match sources.as_slice() {
        [] => return Err(StructuralError::MissingSource { method }),
        [one] => *one,
        _ => {
            return Err(StructuralError::UnsupportedMethod {
                method,
                reason: format!("{} sources share the node pair", sources.len()),
            })
        }
    };
    if !parallel_fits(topo)? {
        return Err(StructuralError::UnsupportedMethod {
            method,
            reason: "loads include diodes or shorts".into(),
        });
    }

    let loads: Vec<&Branch> = topo.branches.iter().filter(|b| b.id != source.id).collect();
    let zp = Network::of(ConnectionKind::Parallel, loads.iter().copied()).impedance();
    let across = match source.kind {
        BranchKind::CurrentSource => {
            if !is_finite(zp) {
                return Err(StructuralError::Singular { determinant: 0.0 });
            }
            source.source * zp
        }
        _ if source.is_short() || !is_finite(zp) => source.source,
        _ => source.source * zp / (zp + source.impedance),
    };

    let n = loads.len();
    let mut matrix = CMatrix::zeros(n, n);
    let mut rhs = CVector::zeros(n);
    for (row, load) in loads.iter().enumerate() {
        if load.is_open() {
            matrix[(row, row)] = C_ONE;
        } else {
            matrix[(row, row)] = load.impedance;
            rhs[row] = across;
        }
    }

    Ok(Assembly {
        matrix,
        rhs,
        layout: Layout::Parallel {
            plus: source.from,
            minus: source.to,
            source: source.id,
            loads: loads.iter().map(|b| b.id).collect(),
            across,
        },
        equivalent_impedance: Some(zp),
    })
}
