//! Analysis coordinator.
//!
//! [`Analyzer`] drives one circuit through
//! `validate → topology → select_method → build_matrix → solve →
//! assemble_results → physical_check`. The first failing stage turns the
//! run into an invalid [`AnalysisResult`] carrying its message; warnings
//! gathered up to that point are kept. Solved state is written back onto
//! the circuit only after a fully valid run.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info_span, warn};

use crate::config::AnalysisConfig;
use crate::errors::{AnalysisError, ValidationWarning, WarningKind};
use crate::math::{admittance, CScalar, CVector, Scalar, C_ZERO};
use crate::sweep::SweepPoint;

use super::cache::{CacheStats, Fingerprint, ResultCache};
use super::circuit::Circuit;
use super::component::{ComponentId, ComponentKind, ElectricalState, WireId};
use super::model::{impedance, real_power};
use super::plausibility::{check_inputs, check_results};
use super::solver::{self, CancelFlag, Solution, SolverMethod, SolverOptions, Verification};
use super::stamp::{build_system, select_method, AnalysisMethod, Layout, LinearSystem};
use super::topology::{Attachment, Branch, BranchElement, BranchKind, Topology, TopologyKind, TopologyOptions};

/// Pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Input value checks.
    Validate,
    /// Node merging, branch extraction and classification.
    Topology,
    /// Analysis method choice.
    SelectMethod,
    /// System assembly and conditioning.
    BuildMatrix,
    /// Linear solve and residual verification.
    Solve,
    /// Mapping the solution back to nodes, branches, components and wires.
    AssembleResults,
    /// Plausibility checks on the solved quantities.
    PhysicalCheck,
}

impl Stage {
    /// Stable snake-case name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::Topology => "topology",
            Self::SelectMethod => "select_method",
            Self::BuildMatrix => "build_matrix",
            Self::Solve => "solve",
            Self::AssembleResults => "assemble_results",
            Self::PhysicalCheck => "physical_check",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Receives stage transitions of every analysis an [`Analyzer`] runs.
pub trait StageObserver {
    /// A stage is about to run.
    fn stage_started(&mut self, _stage: Stage) {}
    /// A stage completed successfully.
    fn stage_finished(&mut self, _stage: Stage, _elapsed: Duration) {}
    /// A stage failed; the analysis stops here.
    fn stage_failed(&mut self, _stage: Stage, _error: &AnalysisError) {}
}

/// Solved quantities of one component.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ComponentResult {
    /// Terminal 0 minus terminal 1.
    pub voltage: CScalar,
    /// Passive: terminal 0 → terminal 1. Sources: delivered out of terminal 0.
    pub current: CScalar,
    /// Real power; absorbed for passive elements, delivered for sources.
    pub power: Scalar,
    /// Model impedance at the analysis frequency.
    pub impedance: CScalar,
}

/// How a result was obtained.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Diagnostics {
    /// Analysis method, once selected.
    pub method: Option<AnalysisMethod>,
    /// Linear solver, once run.
    pub solver: Option<SolverMethod>,
    /// Topology classification.
    pub topology: Option<TopologyKind>,
    /// Solver iterations (1 for direct methods).
    pub iterations: usize,
    /// Relative residual of the verified solution.
    pub residual: Scalar,
    /// Residual per iteration for iterative solvers.
    pub residual_history: Vec<Scalar>,
    /// Smallest-to-largest pivot ratio of the system matrix.
    pub reciprocal_condition: Scalar,
    /// Number of unknowns.
    pub system_size: usize,
    /// Position buckets before merging.
    pub physical_nodes: usize,
    /// Electrical nodes.
    pub electrical_nodes: usize,
    /// Branches.
    pub branches: usize,
    /// Meshes found.
    pub meshes: usize,
    /// Wall time of the whole pipeline.
    pub elapsed: Duration,
}

/// Outcome of one analysis.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalysisResult {
    /// True when every stage succeeded.
    pub is_valid: bool,
    /// First error encountered, for invalid results.
    pub error: Option<String>,
    /// Voltage of each electrical node relative to ground.
    pub node_voltages: BTreeMap<usize, CScalar>,
    /// Current of each branch, from its `from` node to its `to` node.
    pub branch_currents: BTreeMap<usize, CScalar>,
    /// Per-component results.
    pub components: BTreeMap<ComponentId, ComponentResult>,
    /// Current of each wire, start to end.
    pub wire_currents: BTreeMap<WireId, CScalar>,
    /// Input impedance seen by the source (series and parallel closed forms).
    pub equivalent_impedance: Option<CScalar>,
    /// Non-fatal findings.
    pub warnings: Vec<ValidationWarning>,
    /// Method, solver and timing information.
    pub diagnostics: Diagnostics,
}

impl AnalysisResult {
    /// An invalid result carrying `error` and the warnings gathered so far.
    #[must_use]
    pub fn invalid(error: impl Into<String>, warnings: Vec<ValidationWarning>) -> Self {
        Self {
            error: Some(error.into()),
            warnings,
            ..Self::default()
        }
    }

    /// Result of component `id`.
    #[must_use]
    pub fn component(&self, id: ComponentId) -> Option<&ComponentResult> {
        self.components.get(&id)
    }

    /// True when a warning of `kind` was raised.
    #[must_use]
    pub fn has_warning(&self, kind: WarningKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }
}

/// Runs analyses and caches their results.
pub struct Analyzer {
    config: AnalysisConfig,
    cache: ResultCache,
    observer: Option<Box<dyn StageObserver>>,
    cancel: Option<CancelFlag>,
}

impl fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyzer")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(AnalysisConfig::default())
    }
}

impl Analyzer {
    /// Creates an analyzer with a cache sized by `config.cache_capacity`.
    #[must_use]
    pub fn new(config: AnalysisConfig) -> Self {
        let cache = ResultCache::new(config.cache_capacity);
        Self {
            config,
            cache,
            observer: None,
            cancel: None,
        }
    }

    /// Installs a stage observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Box<dyn StageObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Installs a flag that cancels solving when raised.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Cache counters.
    #[must_use]
    pub const fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Number of cached results.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Drops every cached result.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Analyzes `circuit`, serving identical requests from the cache, and
    /// writes solved state back when the result is valid.
    pub fn analyze(&mut self, circuit: &mut Circuit) -> AnalysisResult {
        let config = self.config.clone();
        let result = self.analyze_cached(circuit, &config);
        if result.is_valid {
            apply_state(circuit, &result);
        }
        result
    }

    /// Like [`analyze`](Self::analyze) but always recomputes and leaves the
    /// cache untouched.
    pub fn analyze_uncached(&mut self, circuit: &mut Circuit) -> AnalysisResult {
        let config = self.config.clone();
        let result = self.run(circuit, &config);
        if result.is_valid {
            apply_state(circuit, &result);
        }
        result
    }

    /// Analyzes with a specific method instead of automatic selection.
    pub fn analyze_with_method(&mut self, circuit: &mut Circuit, method: AnalysisMethod) -> AnalysisResult {
        let config = self.config.clone().with_method(method);
        let result = self.analyze_cached(circuit, &config);
        if result.is_valid {
            apply_state(circuit, &result);
        }
        result
    }

    /// Analyzes `circuit` once per frequency without touching its state.
    ///
    /// Failed frequencies produce invalid points instead of stopping the sweep.
    pub fn frequency_sweep(&mut self, circuit: &Circuit, frequencies_hz: &[Scalar]) -> Vec<SweepPoint> {
        frequencies_hz
            .iter()
            .map(|&hz| {
                let config = self.config.clone().with_frequency(hz);
                let result = self.analyze_cached(circuit, &config);
                SweepPoint {
                    frequency_hz: hz,
                    input_impedance: input_impedance(circuit, &result),
                    node_voltages: result.node_voltages,
                    is_valid: result.is_valid,
                    error: result.error,
                }
            })
            .collect()
    }

    fn analyze_cached(&mut self, circuit: &Circuit, config: &AnalysisConfig) -> AnalysisResult {
        let key = Fingerprint::of(circuit, config);
        if let Some(hit) = self.cache.get(&key) {
            debug!("analysis served from cache");
            return hit.clone();
        }
        let result = self.run(circuit, config);
        // Failures may depend on more than the fingerprint (cancellation).
        if result.is_valid {
            self.cache.insert(key, result.clone());
        }
        result
    }

    fn run(&mut self, circuit: &Circuit, config: &AnalysisConfig) -> AnalysisResult {
        let span = info_span!(
            "analyze",
            components = circuit.components().len(),
            wires = circuit.wires().len(),
            frequency_hz = config.frequency_hz
        );
        let _enter = span.enter();

        let start = Instant::now();
        let mut warnings = Vec::new();
        let mut result = match self.pipeline(circuit, config, &mut warnings) {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, "analysis failed");
                AnalysisResult::invalid(err.to_string(), Vec::new())
            }
        };
        for w in &warnings {
            warn!(kind = ?w.kind, "{}", w.message);
        }
        result.warnings = warnings;
        result.diagnostics.elapsed = start.elapsed();
        result
    }

    fn stage<T>(
        &mut self,
        stage: Stage,
        f: impl FnOnce() -> Result<T, AnalysisError>,
    ) -> Result<T, AnalysisError> {
        if let Some(o) = self.observer.as_mut() {
            o.stage_started(stage);
        }
        let start = Instant::now();
        let out = f();
        let elapsed = start.elapsed();
        match &out {
            Ok(_) => {
                debug!(%stage, elapsed_us = elapsed.as_micros() as u64, "stage finished");
                if let Some(o) = self.observer.as_mut() {
                    o.stage_finished(stage, elapsed);
                }
            }
            Err(err) => {
                debug!(%stage, error = %err, "stage failed");
                if let Some(o) = self.observer.as_mut() {
                    o.stage_failed(stage, err);
                }
            }
        }
        out
    }

    fn pipeline(
        &mut self,
        circuit: &Circuit,
        config: &AnalysisConfig,
        warnings: &mut Vec<ValidationWarning>,
    ) -> Result<AnalysisResult, AnalysisError> {
        warnings.extend(self.stage(Stage::Validate, || Ok(check_inputs(circuit, &config.limits)?))?);

        let mut topo = self.stage(Stage::Topology, || {
            Ok(Topology::extract(circuit, &TopologyOptions::from(config))?)
        })?;
        warnings.extend(topo.warnings.iter().cloned());

        let method = self.stage(Stage::SelectMethod, || {
            Ok(select_method(&topo, config.forced_method)?)
        })?;
        debug!(%method, kind = ?topo.kind, "analysis method");

        let mut options = SolverOptions::from(config);
        if let Some(flag) = &self.cancel {
            options = options.with_cancel(flag.clone());
        }
        let mut pass = self.solve_pass(circuit, &mut topo, method, config, &options)?;
        let reversed = reverse_bias_diodes(circuit, &mut topo);
        if reversed > 0 {
            debug!(reversed, "re-solving with reverse-biased diodes");
            pass = self.solve_pass(circuit, &mut topo, method, config, &options)?;
        }
        let Pass {
            system,
            solution,
            verification,
            mut result,
        } = pass;
        warnings.append(&mut result.warnings);

        let found = self.stage(Stage::PhysicalCheck, || {
            Ok(check_results(circuit, &topo, &result, &config.limits)?)
        })?;
        warnings.extend(found);

        result.is_valid = true;
        result.equivalent_impedance = system.equivalent_impedance;
        result.diagnostics = Diagnostics {
            method: Some(method),
            solver: Some(solution.stats.method),
            topology: Some(topo.kind),
            iterations: solution.stats.iterations,
            residual: verification.residual,
            residual_history: solution.stats.residual_history,
            reciprocal_condition: system.conditioning.reciprocal_condition,
            system_size: system.dimension(),
            physical_nodes: topo.physical_node_count,
            electrical_nodes: topo.nodes.len(),
            branches: topo.branches.len(),
            meshes: topo.meshes.len(),
            elapsed: Duration::ZERO,
        };
        Ok(result)
    }

    /// Builds, solves and assembles the system for the current branch models.
    fn solve_pass(
        &mut self,
        circuit: &Circuit,
        topo: &mut Topology,
        method: AnalysisMethod,
        config: &AnalysisConfig,
        options: &SolverOptions,
    ) -> Result<Pass, AnalysisError> {
        let system = self.stage(Stage::BuildMatrix, || {
            Ok(build_system(&*topo, method, config.tolerance)?)
        })?;

        let (solution, verification) = self.stage(Stage::Solve, || {
            let solution = solver::solve(&system, options)?;
            let verification =
                solver::verify_solution(&system.matrix, &solution.x, &system.rhs, config.tolerance);
            if !verification.valid {
                return Err(AnalysisError::Verification {
                    residual: verification.residual,
                    limit: verification.limit,
                });
            }
            Ok((solution, verification))
        })?;

        let mut result = self.stage(Stage::AssembleResults, || {
            Ok(assemble(circuit, &mut *topo, &system, &solution.x, config.frequency_hz))
        })?;
        let mut warnings = system.warnings.clone();
        warnings.append(&mut result.warnings);
        result.warnings = warnings;
        Ok(Pass {
            system,
            solution,
            verification,
            result,
        })
    }
}

/// Output of one build/solve/assemble pass.
struct Pass {
    system: LinearSystem,
    solution: Solution,
    verification: Verification,
    result: AnalysisResult,
}

/// Moves every diode the forward model drove backwards onto its reverse
/// resistance. Returns how many were moved.
fn reverse_bias_diodes(circuit: &Circuit, topo: &mut Topology) -> usize {
    let mut reversed = 0;
    for br in &mut topo.branches {
        if br.kind != BranchKind::Diode || br.current.re >= 0.0 {
            continue;
        }
        if let BranchElement::Component { index, .. } = br.element {
            br.reverse_bias(circuit.components()[index].params.reverse_resistance);
            reversed += 1;
        }
    }
    reversed
}

/// Writes component and wire state from a valid result onto `circuit`.
fn apply_state(circuit: &mut Circuit, result: &AnalysisResult) {
    for c in circuit.components_mut() {
        if let Some(r) = result.components.get(&c.id) {
            c.state = ElectricalState {
                voltage: r.voltage,
                current: r.current,
                power: r.power,
            };
        }
    }
    for w in circuit.wires_mut() {
        if let Some(i) = result.wire_currents.get(&w.id) {
            w.current = *i;
        }
    }
}

/// Source-side input impedance: the closed-form equivalent when available,
/// otherwise terminal voltage over delivered current of the first source.
fn input_impedance(circuit: &Circuit, result: &AnalysisResult) -> Option<CScalar> {
    if !result.is_valid {
        return None;
    }
    if let Some(z) = result.equivalent_impedance {
        return Some(z);
    }
    let source = circuit
        .components()
        .iter()
        .find(|c| c.kind == ComponentKind::VoltageSource)
        .or_else(|| {
            circuit
                .components()
                .iter()
                .find(|c| c.kind == ComponentKind::CurrentSource)
        })?;
    let r = result.components.get(&source.id)?;
    (r.current.norm() > Scalar::EPSILON).then(|| r.voltage / r.current)
}

/// Voltage drop `V(from) − V(to)` across a branch carrying `current`.
fn branch_drop(branch: &Branch, current: CScalar) -> CScalar {
    match branch.kind {
        BranchKind::Passive => branch.impedance * current,
        BranchKind::Diode | BranchKind::VoltageSource => branch.source + branch.impedance * current,
        BranchKind::CurrentSource => C_ZERO,
    }
}

/// Current of a nodal-system branch given its terminal voltage difference.
fn nodal_branch_current(branch: &Branch, v_ab: CScalar) -> CScalar {
    let y = || admittance(branch.impedance).unwrap_or(C_ZERO);
    match branch.kind {
        BranchKind::Passive => y() * v_ab,
        BranchKind::Diode | BranchKind::VoltageSource => y() * (v_ab - branch.source),
        BranchKind::CurrentSource => -branch.source,
    }
}

/// Recovers node voltages from branch currents by walking out from ground
/// through every branch whose drop is determined by its current.
fn reconstruct_voltages(topo: &Topology, currents: &[CScalar]) -> (Vec<CScalar>, Vec<usize>) {
    let mut voltages = vec![C_ZERO; topo.nodes.len()];
    let mut known = vec![false; topo.nodes.len()];
    known[topo.ground] = true;
    let incident = topo.incidence();
    let mut queue = VecDeque::from([topo.ground]);
    while let Some(at) = queue.pop_front() {
        for &b in &incident[at] {
            let br = &topo.branches[b];
            if br.kind == BranchKind::CurrentSource || br.is_open() {
                continue;
            }
            let next = br.other(at);
            if known[next] {
                continue;
            }
            let drop = branch_drop(br, currents[b]);
            voltages[next] = if at == br.from {
                voltages[at] - drop
            } else {
                voltages[at] + drop
            };
            known[next] = true;
            queue.push_back(next);
        }
    }
    let unresolved = (0..known.len()).filter(|&n| !known[n]).collect();
    (voltages, unresolved)
}

/// Maps the solution vector onto the topology and the circuit.
fn assemble(
    circuit: &Circuit,
    topo: &mut Topology,
    system: &LinearSystem,
    x: &CVector,
    frequency_hz: Scalar,
) -> AnalysisResult {
    let mut warnings = Vec::new();
    let mut currents = vec![C_ZERO; topo.branches.len()];

    let voltages = match &system.layout {
        Layout::Nodal { node_rows, extra_rows } => {
            let voltages: Vec<CScalar> = node_rows.iter().map(|r| r.map_or(C_ZERO, |r| x[r])).collect();
            for br in &topo.branches {
                if !br.is_open() {
                    currents[br.id] = nodal_branch_current(br, voltages[br.from] - voltages[br.to]);
                }
            }
            for &(b, row) in extra_rows {
                currents[b] = x[row];
            }
            voltages
        }
        Layout::Mesh { meshes } => {
            for (m, mesh) in meshes.iter().enumerate() {
                for step in &mesh.steps {
                    currents[step.branch] += x[m] * step.sign();
                }
            }
            reconstruct(topo, &currents, &mut warnings)
        }
        Layout::Series { steps } => {
            for step in steps {
                currents[step.branch] = x[0] * step.sign();
            }
            reconstruct(topo, &currents, &mut warnings)
        }
        Layout::Parallel {
            plus,
            minus,
            source,
            loads,
            across,
        } => {
            let mut voltages = vec![C_ZERO; topo.nodes.len()];
            if topo.ground == *plus {
                voltages[*minus] = -*across;
            } else {
                voltages[*plus] = *across;
            }
            let mut total = C_ZERO;
            for (row, &b) in loads.iter().enumerate() {
                total += x[row];
                currents[b] = if topo.branches[b].from == *plus { x[row] } else { -x[row] };
            }
            currents[*source] = -total;
            voltages
        }
    };

    for node in &mut topo.nodes {
        node.voltage = voltages[node.id];
    }
    for br in &mut topo.branches {
        br.current = currents[br.id];
        br.voltage = voltages[br.from] - voltages[br.to];
    }

    let mut components = BTreeMap::new();
    let mut wire_currents = ideal_wire_currents(circuit, topo);
    for br in &topo.branches {
        match br.element {
            BranchElement::Component { index, id } => {
                let component = &circuit.components()[index];
                let current = if component.kind.is_source() {
                    -br.current
                } else {
                    br.current
                };
                components.insert(
                    id,
                    ComponentResult {
                        voltage: br.voltage,
                        current,
                        power: real_power(br.voltage, current),
                        impedance: impedance(component, frequency_hz),
                    },
                );
            }
            BranchElement::Wire { id, .. } => {
                wire_currents.insert(id, br.current);
            }
        }
    }
    for &index in &topo.shorted_components {
        let component = &circuit.components()[index];
        components.insert(
            component.id,
            ComponentResult {
                impedance: impedance(component, frequency_hz),
                ..ComponentResult::default()
            },
        );
    }

    AnalysisResult {
        node_voltages: voltages.iter().copied().enumerate().collect(),
        branch_currents: currents.iter().copied().enumerate().collect(),
        components,
        wire_currents,
        warnings,
        ..AnalysisResult::default()
    }
}

fn reconstruct(topo: &Topology, currents: &[CScalar], warnings: &mut Vec<ValidationWarning>) -> Vec<CScalar> {
    let (voltages, unresolved) = reconstruct_voltages(topo, currents);
    if !unresolved.is_empty() {
        warnings.push(ValidationWarning::new(
            WarningKind::UnresolvedNode,
            format!("nodes {unresolved:?} are only reachable through current sources or open elements; reported at 0 V"),
        ));
    }
    voltages
}

/// Currents through zero-resistance wires.
///
/// Every position bucket receives the currents of the element terminals
/// attached to it. Wire segments, resistive-wire junction links and links
/// between ground symbols form a graph over buckets; a spanning tree of each
/// connected part carries the subtree imbalance on its parent edge. Segments
/// closing a loop of ideal wire carry no current. A wire reports its
/// largest-magnitude segment.
fn ideal_wire_currents(circuit: &Circuit, topo: &Topology) -> BTreeMap<WireId, CScalar> {
    let buckets = topo.physical.len();
    let mut component_branch = vec![None; circuit.components().len()];
    let mut wire_branch = vec![None; circuit.wires().len()];
    for br in &topo.branches {
        match br.element {
            BranchElement::Component { index, .. } => component_branch[index] = Some(br.id),
            BranchElement::Wire { index, .. } => wire_branch[index] = Some(br.id),
        }
    }

    let mut injection = vec![C_ZERO; buckets];
    for (bucket, phys) in topo.physical.iter().enumerate() {
        for attachment in &phys.attachments {
            let (branch, first, last) = match *attachment {
                Attachment::Terminal { index, terminal } => {
                    (component_branch[index], terminal == 0, terminal == 1)
                }
                Attachment::WirePoint { index, point } => {
                    let end = circuit.wires()[index].junctions.len() + 1;
                    (wire_branch[index], point == 0, point == end)
                }
            };
            let Some(b) = branch else { continue };
            let i = topo.branches[b].current;
            if first {
                injection[bucket] -= i;
            } else if last {
                injection[bucket] += i;
            }
        }
    }

    let mut edges: Vec<(usize, usize)> = topo
        .ideal_segments
        .iter()
        .map(|s| (s.from_bucket, s.to_bucket))
        .collect();
    let grounds: Vec<usize> = (0..buckets).filter(|&b| topo.physical[b].hosts_ground).collect();
    edges.extend(grounds.windows(2).map(|w| (w[0], w[1])));

    let mut adjacent = vec![Vec::new(); buckets];
    for (e, &(a, b)) in edges.iter().enumerate() {
        adjacent[a].push((b, e));
        adjacent[b].push((a, e));
    }

    let mut parent: Vec<Option<(usize, usize)>> = vec![None; buckets];
    let mut seen = vec![false; buckets];
    let mut order = Vec::with_capacity(buckets);
    for root in 0..buckets {
        if seen[root] {
            continue;
        }
        seen[root] = true;
        let mut queue = VecDeque::from([root]);
        while let Some(at) = queue.pop_front() {
            order.push(at);
            for &(next, e) in &adjacent[at] {
                if !seen[next] {
                    seen[next] = true;
                    parent[next] = Some((at, e));
                    queue.push_back(next);
                }
            }
        }
    }

    let mut subtree = injection;
    let mut flow = vec![C_ZERO; edges.len()];
    for &v in order.iter().rev() {
        let Some((p, e)) = parent[v] else { continue };
        let net = subtree[v];
        subtree[p] += net;
        flow[e] = if edges[e].0 == p { -net } else { net };
    }

    let mut currents = BTreeMap::new();
    for (index, w) in circuit.wires().iter().enumerate() {
        if wire_branch[index].is_none() {
            currents.insert(w.id, C_ZERO);
        }
    }
    for (segment, f) in topo.ideal_segments.iter().zip(&flow) {
        if segment.lumped {
            continue;
        }
        let entry = currents.entry(segment.wire_id).or_insert(C_ZERO);
        if f.norm() > entry.norm() {
            *entry = *f;
        }
    }
    currents
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::{Arc, Mutex};

    use approx::assert_relative_eq;

    use super::*;
    use crate::circuits::circuit::{CircuitBuilder, Wire};
    use crate::circuits::component::Component;
    use crate::circuits::model::formula_power;

    fn divider() -> (Circuit, [ComponentId; 3]) {
        let mut b = CircuitBuilder::new();
        let v = b.voltage_source((0.0, 0.0), (0.0, 100.0), 10.0);
        let r1 = b.resistor((0.0, 0.0), (100.0, 0.0), 1000.0);
        let r2 = b.resistor((100.0, 0.0), (0.0, 100.0), 2000.0);
        b.ground((0.0, 100.0));
        (b.build(), [v, r1, r2])
    }

    /// Single source feeding a T of resistors: a ladder, two meshes.
    fn tee() -> Circuit {
        let mut b = CircuitBuilder::new();
        b.voltage_source((0.0, 0.0), (0.0, 100.0), 10.0);
        b.resistor((0.0, 0.0), (100.0, 0.0), 10.0);
        b.resistor((100.0, 0.0), (100.0, 100.0), 30.0);
        b.resistor((100.0, 0.0), (200.0, 0.0), 20.0);
        b.resistor((200.0, 0.0), (200.0, 100.0), 40.0);
        b.ground((0.0, 100.0));
        b.ground((100.0, 100.0));
        b.ground((200.0, 100.0));
        b.build()
    }

    #[test]
    fn divider_results_are_written_back() {
        let (mut circuit, [v, r1, r2]) = divider();
        let result = Analyzer::default().analyze(&mut circuit);
        assert!(result.is_valid, "{:?}", result.error);
        assert_eq!(result.diagnostics.method, Some(AnalysisMethod::Series));

        let i = 10.0 / 3000.0;
        assert_relative_eq!(result.components[&r1].current.re, i, epsilon = 1e-12);
        assert_relative_eq!(result.components[&r2].voltage.re, 20.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(result.components[&v].current.re, i, epsilon = 1e-12);
        assert_relative_eq!(result.components[&v].power, 10.0 * i, epsilon = 1e-12);

        let state = circuit.component(r2).unwrap().state;
        assert_relative_eq!(state.power, i * i * 2000.0, epsilon = 1e-12);
        assert!(!result.has_warning(WarningKind::PowerBalance));
    }

    #[test]
    fn forced_nodal_matches_series_closed_form() {
        let (mut circuit, ids) = divider();
        let mut analyzer = Analyzer::default();
        let series = analyzer.analyze(&mut circuit);
        let nodal = analyzer.analyze_with_method(&mut circuit, AnalysisMethod::ModifiedNodal);
        assert!(nodal.is_valid, "{:?}", nodal.error);
        for id in ids {
            let (a, b) = (series.components[&id], nodal.components[&id]);
            assert_relative_eq!(a.current.re, b.current.re, epsilon = 1e-9);
            assert_relative_eq!(a.voltage.re, b.voltage.re, epsilon = 1e-9);
        }
    }

    #[test]
    fn mesh_and_nodal_agree_on_a_tee() {
        let mut circuit = tee();
        let mut analyzer = Analyzer::default();
        let nodal = analyzer.analyze_with_method(&mut circuit, AnalysisMethod::ModifiedNodal);
        let mesh = analyzer.analyze_with_method(&mut circuit, AnalysisMethod::Mesh);
        assert!(nodal.is_valid && mesh.is_valid, "{:?} / {:?}", nodal.error, mesh.error);
        for (id, n) in &nodal.components {
            let m = mesh.components[id];
            assert_relative_eq!(n.current.re, m.current.re, epsilon = 1e-9);
            assert_relative_eq!(n.voltage.re, m.voltage.re, epsilon = 1e-9);
        }
        let r1 = circuit.component_by_label("R1").unwrap().id;
        assert_relative_eq!(nodal.components[&r1].current.re, 1.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn second_call_is_served_from_cache() {
        let (mut circuit, _) = divider();
        let mut analyzer = Analyzer::default();
        let first = analyzer.analyze(&mut circuit);
        let second = analyzer.analyze(&mut circuit);
        assert_eq!(first, second);
        assert_eq!(analyzer.cache_stats().hits, 1);

        let fresh = analyzer.analyze_uncached(&mut circuit);
        assert_eq!(fresh.node_voltages, first.node_voltages);
        assert_eq!(fresh.components, first.components);
        assert_eq!(analyzer.cached(), 1);
    }

    #[test]
    fn cancelled_run_is_not_cached() {
        let flag = CancelFlag::default();
        let mut analyzer = Analyzer::default().with_cancel_flag(flag.clone());
        let (mut circuit, _) = divider();

        flag.store(true, Ordering::Relaxed);
        let cancelled = analyzer.analyze(&mut circuit);
        assert!(!cancelled.is_valid);
        assert!(cancelled.error.as_deref().unwrap_or("").contains("cancelled"), "{:?}", cancelled.error);
        assert_eq!(analyzer.cached(), 0);

        flag.store(false, Ordering::Relaxed);
        let result = analyzer.analyze(&mut circuit);
        assert!(result.is_valid, "{:?}", result.error);
        assert_eq!(analyzer.cache_stats().hits, 0);
        assert_eq!(analyzer.cached(), 1);
    }

    #[test]
    fn failed_analysis_leaves_state_untouched() {
        let mut b = CircuitBuilder::new();
        b.voltage_source((0.0, 0.0), (0.0, 100.0), 10.0);
        b.resistor((0.0, 0.0), (0.0, 100.0), 100.0);
        let r = b.resistor((500.0, 500.0), (600.0, 500.0), 100.0);
        b.ground((0.0, 100.0));
        let mut circuit = b.build();
        let result = Analyzer::default().analyze(&mut circuit);
        assert!(!result.is_valid);
        assert!(result.error.as_deref().unwrap_or("").contains("disconnected"));
        assert_eq!(circuit.component(r).unwrap().state, ElectricalState::default());
    }

    #[test]
    fn ideal_wires_carry_loop_current() {
        let mut b = CircuitBuilder::new();
        b.voltage_source((0.0, 0.0), (0.0, 200.0), 10.0);
        let w1 = b.wire(Wire::new((0.0, 0.0), (200.0, 0.0)));
        b.resistor((200.0, 0.0), (200.0, 200.0), 100.0);
        let w2 = b.wire(Wire::new((200.0, 200.0), (0.0, 200.0)));
        b.ground((0.0, 200.0));
        let mut circuit = b.build();
        let result = Analyzer::default().analyze(&mut circuit);
        assert!(result.is_valid, "{:?}", result.error);
        assert_relative_eq!(result.wire_currents[&w1].re, 0.1, epsilon = 1e-12);
        assert_relative_eq!(result.wire_currents[&w2].re, 0.1, epsilon = 1e-12);
        assert_relative_eq!(circuit.wire(w1).unwrap().current.re, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn resistive_wire_is_a_branch() {
        let mut b = CircuitBuilder::new();
        b.voltage_source((0.0, 0.0), (0.0, 200.0), 10.0);
        let w = b.wire(Wire::new((0.0, 0.0), (200.0, 0.0)).with_resistance(50.0));
        b.resistor((200.0, 0.0), (0.0, 200.0), 50.0);
        b.ground((0.0, 200.0));
        let mut circuit = b.build();
        let result = Analyzer::default().analyze(&mut circuit);
        assert!(result.is_valid, "{:?}", result.error);
        assert_relative_eq!(result.wire_currents[&w].re, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn internal_resistance_sag_is_reported() {
        let mut b = CircuitBuilder::new();
        b.add(Component::voltage_source((0.0, 0.0), (0.0, 100.0), 10.0).with_internal_resistance(10.0));
        b.resistor((0.0, 0.0), (100.0, 0.0), 100.0);
        b.wire(Wire::new((100.0, 0.0), (100.0, 100.0)));
        b.wire(Wire::new((100.0, 100.0), (0.0, 100.0)));
        b.ground((0.0, 100.0));
        let mut circuit = b.build();
        let result = Analyzer::default().analyze(&mut circuit);
        assert!(result.is_valid, "{:?}", result.error);
        assert!(result.has_warning(WarningKind::VoltageRegulation));
        let v = circuit.component_by_label("V1").unwrap();
        assert_relative_eq!(v.state.voltage.re, 1000.0 / 110.0, epsilon = 1e-9);
    }

    #[test]
    fn reversed_diode_blocks_through_its_reverse_resistance() {
        let mut b = CircuitBuilder::new();
        b.voltage_source((0.0, 0.0), (0.0, 100.0), 5.0);
        b.resistor((0.0, 0.0), (100.0, 0.0), 1000.0);
        let d = b.diode((100.0, 100.0), (100.0, 0.0));
        b.wire(Wire::new((100.0, 100.0), (0.0, 100.0)));
        b.ground((0.0, 100.0));
        let mut circuit = b.build();
        let result = Analyzer::default().analyze(&mut circuit);
        assert!(result.is_valid, "{:?}", result.error);

        let rrev = crate::constants::DIODE_REVERSE_RESISTANCE;
        let leak = -5.0 / (rrev + 1000.0);
        assert_relative_eq!(result.components[&d].current.re, leak, max_relative = 1e-9);
        assert_relative_eq!(result.components[&d].voltage.re, rrev * leak, max_relative = 1e-9);
        assert!(!result.has_warning(WarningKind::DiodeRegion));
        assert!(!result.has_warning(WarningKind::PowerBalance));

        let c = circuit.component(d).unwrap();
        assert_relative_eq!(c.state.power, formula_power(c, &c.state), max_relative = 1e-9);
    }

    #[test]
    fn reverse_region_is_chosen_under_nodal_too() {
        let mut b = CircuitBuilder::new();
        b.voltage_source((0.0, 0.0), (0.0, 100.0), 5.0);
        b.resistor((0.0, 0.0), (100.0, 0.0), 1000.0);
        let d = b.diode((100.0, 100.0), (100.0, 0.0));
        b.wire(Wire::new((100.0, 100.0), (0.0, 100.0)));
        b.ground((0.0, 100.0));
        let mut circuit = b.build();
        let mut analyzer = Analyzer::default();
        let series = analyzer.analyze(&mut circuit);
        let nodal = analyzer.analyze_with_method(&mut circuit, AnalysisMethod::ModifiedNodal);
        assert!(nodal.is_valid, "{:?}", nodal.error);
        assert_relative_eq!(
            series.components[&d].current.re,
            nodal.components[&d].current.re,
            max_relative = 1e-6
        );
    }

    #[test]
    fn forward_diode_drops_its_threshold() {
        let mut b = CircuitBuilder::new();
        b.voltage_source((0.0, 0.0), (0.0, 100.0), 5.0);
        b.resistor((0.0, 0.0), (100.0, 0.0), 1000.0);
        let d = b.diode((100.0, 0.0), (100.0, 100.0));
        b.wire(Wire::new((100.0, 100.0), (0.0, 100.0)));
        b.ground((0.0, 100.0));
        let mut circuit = b.build();
        let result = Analyzer::default().analyze(&mut circuit);
        assert!(result.is_valid, "{:?}", result.error);
        assert_relative_eq!(result.components[&d].current.re, 4.3 / 1000.1, epsilon = 1e-12);
        assert!(!result.has_warning(WarningKind::DiodeRegion));
    }

    #[test]
    fn sweep_reports_rc_input_impedance() {
        let mut b = CircuitBuilder::new();
        b.voltage_source((0.0, 0.0), (0.0, 100.0), 1.0);
        b.resistor((0.0, 0.0), (100.0, 0.0), 1000.0);
        b.capacitor((100.0, 0.0), (0.0, 100.0), 1.0e-6);
        b.ground((0.0, 100.0));
        let circuit = b.build();
        let points = Analyzer::default().frequency_sweep(&circuit, &[1.0e3, 1.0e4]);
        assert_eq!(points.len(), 2);
        for p in &points {
            assert!(p.is_valid, "{:?}", p.error);
            let z = p.input_impedance.unwrap();
            assert_relative_eq!(z.re, 1000.0, epsilon = 1e-9);
            let xc = -1.0 / (2.0 * std::f64::consts::PI * p.frequency_hz * 1.0e-6);
            assert_relative_eq!(z.im, xc, epsilon = 1e-9);
        }
    }

    #[derive(Default)]
    struct Recorder(Arc<Mutex<Vec<(Stage, bool)>>>);

    impl StageObserver for Recorder {
        fn stage_finished(&mut self, stage: Stage, _elapsed: Duration) {
            self.0.lock().unwrap().push((stage, true));
        }

        fn stage_failed(&mut self, stage: Stage, _error: &AnalysisError) {
            self.0.lock().unwrap().push((stage, false));
        }
    }

    #[test]
    fn observer_sees_every_stage_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut analyzer = Analyzer::default().with_observer(Box::new(Recorder(log.clone())));
        let (mut circuit, _) = divider();
        analyzer.analyze(&mut circuit);
        let stages: Vec<Stage> = log.lock().unwrap().iter().map(|(s, _)| *s).collect();
        assert_eq!(
            stages,
            [
                Stage::Validate,
                Stage::Topology,
                Stage::SelectMethod,
                Stage::BuildMatrix,
                Stage::Solve,
                Stage::AssembleResults,
                Stage::PhysicalCheck,
            ]
        );

        log.lock().unwrap().clear();
        let mut empty = Circuit::new();
        analyzer.analyze(&mut empty);
        assert_eq!(*log.lock().unwrap(), [(Stage::Validate, false)]);
    }
}
