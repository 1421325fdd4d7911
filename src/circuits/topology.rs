//! Topology extraction: terminals → physical nodes → electrical nodes → branches.
//!
//! Every structure here is an index-based arena rebuilt per analysis. Node and
//! branch ids are positions in the owning vectors and mean nothing across runs.
//!
//! The pipeline is
//! 1. bucket terminals and wire points by snapped position ([`PhysicalNode`]s),
//! 2. union buckets joined by ideal wires (and all ground symbols),
//! 3. collapse each group into an [`ElectricalNode`],
//! 4. record connections and degrees,
//! 5. emit a [`Branch`] per two-terminal component and per resistive wire,
//! 6. classify the shape ([`TopologyKind`]),
//! 7. enumerate meshes with a greedy walk,
//! 8. validate connectivity and grounding.

use std::collections::{BTreeSet, VecDeque};

use indexmap::IndexMap;
use tracing::debug;

use crate::errors::{StructuralError, ValidationWarning, WarningKind};
use crate::math::{CScalar, Scalar, C_ZERO};

use super::circuit::Circuit;
use super::component::{ComponentId, ComponentKind, Position, WireId};
use super::disjoint::DisjointSet;
use super::model::{impedance, wire_impedance};

/// Knobs for topology extraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopologyOptions {
    /// Snapping grid (circuit-space units).
    pub snap_tolerance: Scalar,
    /// Wires below this resistance are ideal.
    pub ideal_wire_epsilon: Scalar,
    /// Frequency for branch impedances (Hz).
    pub frequency_hz: Scalar,
}

impl From<&crate::config::AnalysisConfig> for TopologyOptions {
    fn from(cfg: &crate::config::AnalysisConfig) -> Self {
        Self {
            snap_tolerance: cfg.snap_tolerance,
            ideal_wire_epsilon: cfg.ideal_wire_epsilon,
            frequency_hz: cfg.frequency_hz,
        }
    }
}

/// Something located at a physical node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    /// Terminal `terminal` of the component at `index` in the circuit.
    Terminal {
        /// Component index.
        index: usize,
        /// Terminal number.
        terminal: usize,
    },
    /// Point `point` (0 = start, last = end) of the wire at `index`.
    WirePoint {
        /// Wire index.
        index: usize,
        /// Point number.
        point: usize,
    },
}

/// A position bucket holding everything that snaps to it.
#[derive(Debug, Clone)]
pub struct PhysicalNode {
    /// Mean position of the attached points.
    pub position: Position,
    /// What is attached here.
    pub attachments: Vec<Attachment>,
    /// True when a ground symbol sits here.
    pub hosts_ground: bool,
}

/// A set of physical nodes at a common potential.
#[derive(Debug, Clone)]
pub struct ElectricalNode {
    /// Index into [`Topology::nodes`].
    pub id: usize,
    /// Centroid of the merged physical nodes.
    pub position: Position,
    /// True for the (single) reference node.
    pub is_ground: bool,
    /// Distinct adjacent node ids.
    pub connections: BTreeSet<usize>,
    /// Number of incident branch ends (parallel elements count separately).
    pub degree: usize,
    /// Solved node voltage.
    pub voltage: CScalar,
}

/// What a branch stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchElement {
    /// A component.
    Component {
        /// Index into [`Circuit::components`].
        index: usize,
        /// Its id.
        id: ComponentId,
    },
    /// A resistive wire.
    Wire {
        /// Index into [`Circuit::wires`].
        index: usize,
        /// Its id.
        id: WireId,
    },
}

/// Electrical role of a branch in system construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchKind {
    /// Impedance element (resistor, capacitor, inductor, resistive wire).
    Passive,
    /// Piecewise-linear diode, forward model. Reverse-biased diodes become
    /// [`Passive`](Self::Passive) through [`Branch::reverse_bias`].
    Diode,
    /// Independent voltage source; `from` is the positive terminal.
    VoltageSource,
    /// Independent current source driving current out of `from`.
    CurrentSource,
}

/// A two-terminal element between two electrical nodes.
#[derive(Debug, Clone)]
pub struct Branch {
    /// Index into [`Topology::branches`].
    pub id: usize,
    /// Origin of the branch.
    pub element: BranchElement,
    /// Role in system construction.
    pub kind: BranchKind,
    /// Component kind, `None` for wires.
    pub component_kind: Option<ComponentKind>,
    /// Display label.
    pub label: String,
    /// Node at terminal 0 / wire start.
    pub from: usize,
    /// Node at terminal 1 / wire end.
    pub to: usize,
    /// Complex impedance (source internal resistance, diode series resistance).
    pub impedance: CScalar,
    /// Source value (V or A phasor) or diode forward voltage.
    pub source: CScalar,
    /// Solved current from `from` to `to` through the element.
    pub current: CScalar,
    /// Solved voltage `V(from) − V(to)`.
    pub voltage: CScalar,
}

impl Branch {
    /// Node at the other end from `node`.
    #[must_use]
    pub const fn other(&self, node: usize) -> usize {
        if self.from == node {
            self.to
        } else {
            self.from
        }
    }

    /// True when the branch touches `node`.
    #[must_use]
    pub const fn touches(&self, node: usize) -> bool {
        self.from == node || self.to == node
    }

    /// True for non-wire branches.
    #[must_use]
    pub const fn is_component(&self) -> bool {
        matches!(self.element, BranchElement::Component { .. })
    }

    /// True when the impedance is effectively zero (ideal short).
    #[must_use]
    pub fn is_short(&self) -> bool {
        crate::math::is_finite(self.impedance)
            && self.impedance.norm() < crate::constants::SHORT_IMPEDANCE
    }

    /// True when the impedance is undefined (open circuit).
    #[must_use]
    pub fn is_open(&self) -> bool {
        !crate::math::is_finite(self.impedance)
    }

    /// Swaps a diode's forward model for its reverse-region resistance.
    pub fn reverse_bias(&mut self, reverse_resistance: Scalar) {
        self.kind = BranchKind::Passive;
        self.impedance = crate::math::real(reverse_resistance);
        self.source = C_ZERO;
    }

    /// True for a diode branch modelled by its reverse resistance.
    #[must_use]
    pub fn is_reverse_biased_diode(&self) -> bool {
        self.component_kind == Some(ComponentKind::Diode) && self.kind == BranchKind::Passive
    }
}

/// One branch traversal inside a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshStep {
    /// Branch id.
    pub branch: usize,
    /// True when the mesh runs `from → to` through the branch.
    pub forward: bool,
}

impl MeshStep {
    /// +1 for forward traversal, −1 otherwise.
    #[must_use]
    pub const fn sign(&self) -> Scalar {
        if self.forward {
            1.0
        } else {
            -1.0
        }
    }
}

/// An ordered cycle of branches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mesh {
    /// Traversal steps in walk order.
    pub steps: Vec<MeshStep>,
}

impl Mesh {
    /// Step for `branch` if the mesh contains it.
    #[must_use]
    pub fn step_for(&self, branch: usize) -> Option<MeshStep> {
        self.steps.iter().copied().find(|s| s.branch == branch)
    }

    /// Reverses the traversal direction.
    pub fn reverse(&mut self) {
        self.steps.reverse();
        for s in &mut self.steps {
            s.forward = !s.forward;
        }
    }
}

/// A stretch of ideal wire joining two distinct position buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireSegment {
    /// Index into [`Circuit::wires`].
    pub wire_index: usize,
    /// Wire id.
    pub wire_id: WireId,
    /// Bucket nearer the wire start.
    pub from_bucket: usize,
    /// Bucket nearer the wire end.
    pub to_bucket: usize,
    /// Junction link of a resistive wire: carries flow between points that
    /// share the start potential but is not reported as the wire's current.
    pub lumped: bool,
}

/// Shape of the circuit graph.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopologyKind {
    /// A single loop: every node has degree 2.
    Series,
    /// Every branch spans the same node pair.
    Parallel,
    /// Node degrees are exactly {2, 3}.
    Ladder,
    /// Five nodes with degrees {3, 3, 3, 3, 2}.
    Bridge,
    /// Anything else.
    General,
}

/// Result of topology extraction.
#[derive(Debug, Clone)]
pub struct Topology {
    /// Number of position buckets before merging.
    pub physical_node_count: usize,
    /// Position buckets in discovery order.
    pub physical: Vec<PhysicalNode>,
    /// Electrical node of each bucket.
    pub bucket_node: Vec<usize>,
    /// Zero-resistance wire segments between distinct buckets.
    pub ideal_segments: Vec<WireSegment>,
    /// Electrical nodes.
    pub nodes: Vec<ElectricalNode>,
    /// Branches.
    pub branches: Vec<Branch>,
    /// Meshes found by the greedy walk.
    pub meshes: Vec<Mesh>,
    /// Shape classification.
    pub kind: TopologyKind,
    /// Reference node id.
    pub ground: usize,
    /// True when no ground symbol existed and one was chosen.
    pub synthetic_ground: bool,
    /// Components whose terminals collapse onto one node (carry nothing).
    pub shorted_components: Vec<usize>,
    /// Non-fatal findings.
    pub warnings: Vec<ValidationWarning>,
}

impl Topology {
    /// Extracts and validates the topology of `circuit`.
    pub fn extract(circuit: &Circuit, options: &TopologyOptions) -> Result<Self, StructuralError> {
        let physical = bucket_points(circuit, options.snap_tolerance);
        let index_of = |key: &(i64, i64)| physical.get_index_of(key).unwrap_or(usize::MAX);
        let snap = effective_snap(options.snap_tolerance);

        let mut sets = DisjointSet::new(physical.len());
        let mut ideal_segments = Vec::new();

        // Ideal wires and every ground symbol collapse.
        for (wire_index, wire) in circuit.wires().iter().enumerate() {
            let pts: Vec<usize> = if wire.resistance < options.ideal_wire_epsilon {
                let pts: Vec<usize> = wire.points().map(|p| index_of(&snap_key(p, snap))).collect();
                ideal_segments.extend(pts.windows(2).filter(|w| w[0] != w[1]).map(|w| WireSegment {
                    wire_index,
                    wire_id: wire.id,
                    from_bucket: w[0],
                    to_bucket: w[1],
                    lumped: false,
                }));
                pts
            } else {
                // Resistance is lumped at the end; junctions share the start potential.
                let mut pts = vec![index_of(&snap_key(&wire.start, snap))];
                pts.extend(wire.junctions.iter().map(|p| index_of(&snap_key(p, snap))));
                ideal_segments.extend(pts.windows(2).filter(|w| w[0] != w[1]).map(|w| WireSegment {
                    wire_index,
                    wire_id: wire.id,
                    from_bucket: w[0],
                    to_bucket: w[1],
                    lumped: true,
                }));
                pts
            };
            for pair in pts.windows(2) {
                sets.union(pair[0], pair[1]);
            }
        }
        let ground_buckets: Vec<usize> = physical
            .values()
            .enumerate()
            .filter(|(_, p)| p.hosts_ground)
            .map(|(i, _)| i)
            .collect();
        for pair in ground_buckets.windows(2) {
            sets.union(pair[0], pair[1]);
        }

        let (group_of, group_count) = sets.groups();
        let mut nodes: Vec<ElectricalNode> = (0..group_count)
            .map(|id| ElectricalNode {
                id,
                position: Position::default(),
                is_ground: false,
                connections: BTreeSet::new(),
                degree: 0,
                voltage: C_ZERO,
            })
            .collect();
        let mut members = vec![0usize; group_count];
        for (bucket, phys) in physical.values().enumerate() {
            let node = &mut nodes[group_of[bucket]];
            node.position.x += phys.position.x;
            node.position.y += phys.position.y;
            node.is_ground |= phys.hosts_ground;
            members[group_of[bucket]] += 1;
        }
        for (node, count) in nodes.iter_mut().zip(&members) {
            let n = (*count).max(1) as Scalar;
            node.position.x /= n;
            node.position.y /= n;
        }
        let node_at = |p: &Position| group_of[index_of(&snap_key(p, snap))];

        let mut branches = Vec::new();
        let mut shorted_components = Vec::new();
        for (index, component) in circuit.components().iter().enumerate() {
            if component.kind == ComponentKind::Ground {
                continue;
            }
            if component.terminals.len() < 2 {
                return Err(StructuralError::MalformedBranch {
                    label: component.label.clone(),
                    reason: format!("expected 2 terminals, found {}", component.terminals.len()),
                });
            }
            let from = node_at(&component.terminals[0]);
            let to = node_at(&component.terminals[1]);
            if from == to {
                if component.kind.is_source() {
                    return Err(StructuralError::ShortedSource {
                        label: component.label.clone(),
                    });
                }
                shorted_components.push(index);
                continue;
            }
            let kind = match component.kind {
                ComponentKind::Resistor | ComponentKind::Capacitor | ComponentKind::Inductor => {
                    BranchKind::Passive
                }
                ComponentKind::Diode => BranchKind::Diode,
                ComponentKind::VoltageSource => BranchKind::VoltageSource,
                ComponentKind::CurrentSource => BranchKind::CurrentSource,
                ComponentKind::Ground => continue,
            };
            let source = match component.kind {
                ComponentKind::Diode => crate::math::real(component.params.forward_voltage),
                ComponentKind::VoltageSource | ComponentKind::CurrentSource => {
                    component.source_phasor()
                }
                _ => C_ZERO,
            };
            let z = match component.kind {
                // Current sources are ideal in every system.
                ComponentKind::CurrentSource => C_ZERO,
                _ => impedance(component, options.frequency_hz),
            };
            branches.push(Branch {
                id: branches.len(),
                element: BranchElement::Component {
                    index,
                    id: component.id,
                },
                kind,
                component_kind: Some(component.kind),
                label: component.label.clone(),
                from,
                to,
                impedance: z,
                source,
                current: C_ZERO,
                voltage: C_ZERO,
            });
        }
        for (index, wire) in circuit.wires().iter().enumerate() {
            if wire.resistance < options.ideal_wire_epsilon {
                continue;
            }
            let (from, to) = (node_at(&wire.start), node_at(&wire.end));
            if from == to {
                continue;
            }
            branches.push(Branch {
                id: branches.len(),
                element: BranchElement::Wire { index, id: wire.id },
                kind: BranchKind::Passive,
                component_kind: None,
                label: format!("W{}", wire.id.0),
                from,
                to,
                impedance: wire_impedance(wire, options.frequency_hz),
                source: C_ZERO,
                current: C_ZERO,
                voltage: C_ZERO,
            });
        }

        if branches.is_empty() {
            return Err(StructuralError::EmptyCircuit);
        }

        for b in &branches {
            nodes[b.from].connections.insert(b.to);
            nodes[b.to].connections.insert(b.from);
            nodes[b.from].degree += 1;
            nodes[b.to].degree += 1;
        }

        let mut warnings = Vec::new();
        let (ground, synthetic_ground) = match nodes.iter().position(|n| n.is_ground) {
            Some(g) => (g, false),
            None => {
                let g = synthetic_ground_node(&branches);
                nodes[g].is_ground = true;
                warnings.push(ValidationWarning::new(
                    WarningKind::SyntheticGround,
                    format!("no ground symbol; node {g} used as reference"),
                ));
                (g, true)
            }
        };

        validate(&nodes)?;

        let kind = classify(&nodes, &branches);
        let mut meshes = find_meshes(nodes.len(), &branches);
        orient_meshes(&mut meshes, &branches);
        let expected = (branches.len() + 1).saturating_sub(nodes.len());
        if meshes.len() != expected {
            warnings.push(ValidationWarning::new(
                WarningKind::MeshScope,
                format!(
                    "mesh walk found {} of {} independent loops",
                    meshes.len(),
                    expected
                ),
            ));
        }

        debug!(
            physical = physical.len(),
            nodes = nodes.len(),
            branches = branches.len(),
            meshes = meshes.len(),
            ?kind,
            "topology extracted"
        );

        Ok(Self {
            physical_node_count: physical.len(),
            physical: physical.values().cloned().collect(),
            bucket_node: group_of,
            ideal_segments,
            nodes,
            branches,
            meshes,
            kind,
            ground,
            synthetic_ground,
            shorted_components,
            warnings,
        })
    }

    /// Number of independent loops, `branches − nodes + 1`.
    #[must_use]
    pub fn loop_count(&self) -> usize {
        (self.branches.len() + 1).saturating_sub(self.nodes.len())
    }

    /// Number of branches of `kind`.
    #[must_use]
    pub fn count(&self, kind: BranchKind) -> usize {
        self.branches.iter().filter(|b| b.kind == kind).count()
    }

    /// Branch ids incident to each node.
    #[must_use]
    pub fn incidence(&self) -> Vec<Vec<usize>> {
        incidence(self.nodes.len(), &self.branches)
    }
}

fn effective_snap(tolerance: Scalar) -> Scalar {
    if tolerance > 0.0 {
        tolerance
    } else {
        1.0e-9
    }
}

fn snap_key(p: &Position, snap: Scalar) -> (i64, i64) {
    ((p.x / snap).round() as i64, (p.y / snap).round() as i64)
}

fn bucket_points(circuit: &Circuit, snap_tolerance: Scalar) -> IndexMap<(i64, i64), PhysicalNode> {
    let snap = effective_snap(snap_tolerance);
    let mut buckets: IndexMap<(i64, i64), PhysicalNode> = IndexMap::new();
    let mut add = |p: &Position, attachment: Attachment, ground: bool| {
        let bucket = buckets.entry(snap_key(p, snap)).or_insert_with(|| PhysicalNode {
            position: Position::default(),
            attachments: Vec::new(),
            hosts_ground: false,
        });
        let n = bucket.attachments.len() as Scalar;
        bucket.position.x = (bucket.position.x * n + p.x) / (n + 1.0);
        bucket.position.y = (bucket.position.y * n + p.y) / (n + 1.0);
        bucket.attachments.push(attachment);
        bucket.hosts_ground |= ground;
    };
    for (index, component) in circuit.components().iter().enumerate() {
        let ground = component.kind == ComponentKind::Ground;
        for (terminal, p) in component.terminals.iter().enumerate() {
            add(p, Attachment::Terminal { index, terminal }, ground);
        }
    }
    for (index, wire) in circuit.wires().iter().enumerate() {
        for (point, p) in wire.points().enumerate() {
            add(p, Attachment::WirePoint { index, point }, false);
        }
    }
    buckets
}

fn synthetic_ground_node(branches: &[Branch]) -> usize {
    branches
        .iter()
        .find(|b| b.kind == BranchKind::VoltageSource)
        .or_else(|| branches.iter().find(|b| b.kind == BranchKind::CurrentSource))
        .map_or(0, |b| b.to)
}

fn validate(nodes: &[ElectricalNode]) -> Result<(), StructuralError> {
    let mut violations = Vec::new();

    let isolated: Vec<usize> = nodes
        .iter()
        .filter(|n| !n.is_ground && n.connections.is_empty())
        .map(|n| n.id)
        .collect();
    if !isolated.is_empty() {
        violations.push(StructuralError::IsolatedNodes { nodes: isolated });
    }

    let grounds = nodes.iter().filter(|n| n.is_ground).count();
    if grounds != 1 {
        violations.push(StructuralError::MissingGround);
    }

    let components = connected_components(nodes);
    if components > 1 {
        violations.push(StructuralError::Disconnected { components });
    }

    match violations.len() {
        0 => Ok(()),
        1 => Err(violations.remove(0)),
        _ => Err(StructuralError::Invariants(violations)),
    }
}

/// Counts connected components by repeated breadth-first search.
fn connected_components(nodes: &[ElectricalNode]) -> usize {
    let mut seen = vec![false; nodes.len()];
    let mut components = 0;
    for start in 0..nodes.len() {
        if seen[start] {
            continue;
        }
        components += 1;
        seen[start] = true;
        let mut queue = VecDeque::from([start]);
        while let Some(n) = queue.pop_front() {
            for &m in &nodes[n].connections {
                if !seen[m] {
                    seen[m] = true;
                    queue.push_back(m);
                }
            }
        }
    }
    components
}

fn classify(nodes: &[ElectricalNode], branches: &[Branch]) -> TopologyKind {
    if nodes.len() >= 2 && branches.len() >= 2 && nodes.iter().all(|n| n.degree == 2) {
        return TopologyKind::Series;
    }

    let pair = |b: &Branch| (b.from.min(b.to), b.from.max(b.to));
    let components: Vec<&Branch> = branches.iter().filter(|b| b.is_component()).collect();
    if components.len() >= 2
        && components.len() == branches.len()
        && components.iter().all(|b| pair(b) == pair(components[0]))
    {
        return TopologyKind::Parallel;
    }

    let mut degrees: Vec<usize> = nodes.iter().map(|n| n.degree).collect();
    degrees.sort_unstable();
    if degrees == [2, 3, 3, 3, 3] {
        return TopologyKind::Bridge;
    }
    let distinct: BTreeSet<usize> = degrees.iter().copied().collect();
    if distinct == BTreeSet::from([2, 3]) {
        return TopologyKind::Ladder;
    }
    TopologyKind::General
}

fn incidence(node_count: usize, branches: &[Branch]) -> Vec<Vec<usize>> {
    let mut incident = vec![Vec::new(); node_count];
    for b in branches {
        incident[b.from].push(b.id);
        incident[b.to].push(b.id);
    }
    incident
}

/// Greedy mesh enumeration.
///
/// From each branch not yet in a recorded mesh, walk to an adjacent branch
/// that is not on the current path, preferring one that closes the loop, then
/// one not used by earlier meshes. A walk that returns to its start node with
/// more than two branches becomes a mesh. This is a heuristic: it is reliable
/// for simple planar circuits but does not guarantee a cycle basis for bridges
/// or non-planar graphs, and two-branch loops are never recorded.
fn find_meshes(node_count: usize, branches: &[Branch]) -> Vec<Mesh> {
    let target = (branches.len() + 1).saturating_sub(node_count);
    let incident = incidence(node_count, branches);
    let mut used = vec![false; branches.len()];
    let mut meshes = Vec::new();

    for start in 0..branches.len() {
        if meshes.len() >= target {
            break;
        }
        if used[start] {
            continue;
        }
        let origin = branches[start].from;
        let mut at = branches[start].to;
        let mut on_path = vec![false; branches.len()];
        let mut visited = vec![false; node_count];
        visited[origin] = true;
        visited[at] = true;
        on_path[start] = true;
        let mut steps = vec![MeshStep {
            branch: start,
            forward: true,
        }];

        let closed = loop {
            if at == origin {
                break true;
            }
            let candidates: Vec<usize> = incident[at]
                .iter()
                .copied()
                .filter(|&b| !on_path[b])
                .filter(|&b| {
                    let next = branches[b].other(at);
                    next == origin || !visited[next]
                })
                .collect();
            let closes = |b: &usize| branches[*b].other(at) == origin;
            let next = candidates
                .iter()
                .copied()
                .find(|b| steps.len() >= 2 && closes(b))
                .or_else(|| candidates.iter().copied().find(|&b| !used[b] && !closes(&b)))
                .or_else(|| candidates.iter().copied().find(|b| !closes(b)))
                .or_else(|| candidates.first().copied());
            let Some(b) = next else {
                break false;
            };
            on_path[b] = true;
            steps.push(MeshStep {
                branch: b,
                forward: branches[b].from == at,
            });
            at = branches[b].other(at);
            visited[at] = true;
        };

        if closed && steps.len() > 2 {
            for s in &steps {
                used[s.branch] = true;
            }
            meshes.push(Mesh { steps });
        }
    }
    meshes
}

/// Orients each mesh so its first voltage source is traversed from − to +
/// (mesh current equals delivered current); source-free meshes run opposite to
/// the first earlier mesh they share a branch with.
fn orient_meshes(meshes: &mut [Mesh], branches: &[Branch]) {
    for i in 0..meshes.len() {
        let source_step = meshes[i]
            .steps
            .iter()
            .find(|s| branches[s.branch].kind == BranchKind::VoltageSource)
            .copied();
        if let Some(step) = source_step {
            if step.forward {
                meshes[i].reverse();
            }
            continue;
        }
        let (done, rest) = meshes.split_at_mut(i);
        let mesh = &mut rest[0];
        let shared = mesh.steps.iter().find_map(|s| {
            done.iter()
                .find_map(|m| m.step_for(s.branch))
                .map(|earlier| (s.forward, earlier.forward))
        });
        if let Some((mine, theirs)) = shared {
            if mine == theirs {
                mesh.reverse();
            }
        }
    }
}
