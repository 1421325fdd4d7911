use approx::assert_relative_eq;
use em_circuits::prelude::*;

fn series_12v_1k() -> (Circuit, ComponentId, ComponentId) {
    let mut b = CircuitBuilder::new();
    let v = b.voltage_source((0.0, 0.0), (0.0, 100.0), 12.0);
    let r = b.resistor((0.0, 0.0), (0.0, 100.0), 1_000.0);
    b.ground((0.0, 100.0));
    (b.build(), v, r)
}

/// 10 V across two 100 Ω resistors joined by wires with mid-run junctions.
fn parallel_pair() -> (Circuit, [ComponentId; 3], WireId) {
    let mut b = CircuitBuilder::new();
    let v = b.voltage_source((0.0, 0.0), (0.0, 100.0), 10.0);
    let r1 = b.resistor((100.0, 0.0), (100.0, 100.0), 100.0);
    let r2 = b.resistor((200.0, 0.0), (200.0, 100.0), 100.0);
    let top = b.wire(Wire::new((0.0, 0.0), (200.0, 0.0)).with_junction((100.0, 0.0)));
    b.wire(Wire::new((0.0, 100.0), (200.0, 100.0)).with_junction((100.0, 100.0)));
    b.ground((0.0, 100.0));
    (b.build(), [v, r1, r2], top)
}

/// One source feeding a T network: a ladder with two meshes.
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

fn current_driven() -> Circuit {
    let mut b = CircuitBuilder::new();
    b.current_source((0.0, 0.0), (0.0, 100.0), 0.01);
    b.resistor((0.0, 0.0), (100.0, 0.0), 100.0);
    b.resistor((100.0, 0.0), (0.0, 100.0), 200.0);
    b.ground((0.0, 100.0));
    b.build()
}

fn assert_same_components(a: &AnalysisResult, b: &AnalysisResult) {
    assert_eq!(a.components.len(), b.components.len());
    for (id, x) in &a.components {
        let y = b.components[id];
        assert_relative_eq!(x.current.re, y.current.re, epsilon = 1e-9);
        assert_relative_eq!(x.current.im, y.current.im, epsilon = 1e-9);
        assert_relative_eq!(x.voltage.re, y.voltage.re, epsilon = 1e-9);
        assert_relative_eq!(x.voltage.im, y.voltage.im, epsilon = 1e-9);
    }
}

#[test]
fn series_source_and_resistor() {
    let (mut circuit, v, r) = series_12v_1k();
    let mut analyzer = Analyzer::default();
    let series = analyzer.analyze(&mut circuit);
    assert!(series.is_valid, "{:?}", series.error);
    assert_eq!(series.diagnostics.method, Some(AnalysisMethod::Series));
    assert_relative_eq!(series.components[&r].current.re, 0.012, epsilon = 1e-12);
    assert_relative_eq!(series.components[&r].power, 0.144, epsilon = 1e-12);
    assert_relative_eq!(series.components[&v].power, 0.144, epsilon = 1e-12);
    assert_relative_eq!(series.equivalent_impedance.unwrap().re, 1_000.0, epsilon = 1e-9);

    let nodal = analyzer.analyze_with_method(&mut circuit, AnalysisMethod::ModifiedNodal);
    assert!(nodal.is_valid, "{:?}", nodal.error);
    assert_same_components(&series, &nodal);
}

#[test]
fn parallel_branches_split_current() {
    let (mut circuit, [v, r1, r2], top) = parallel_pair();
    let mut analyzer = Analyzer::default();
    let result = analyzer.analyze(&mut circuit);
    assert!(result.is_valid, "{:?}", result.error);
    assert_eq!(result.diagnostics.method, Some(AnalysisMethod::Parallel));
    assert_relative_eq!(result.components[&r1].current.re, 0.1, epsilon = 1e-12);
    assert_relative_eq!(result.components[&r2].current.re, 0.1, epsilon = 1e-12);
    assert_relative_eq!(result.components[&v].current.re, 0.2, epsilon = 1e-12);
    assert_relative_eq!(result.equivalent_impedance.unwrap().re, 50.0, epsilon = 1e-9);
    assert_relative_eq!(result.wire_currents[&top].re, 0.2, epsilon = 1e-12);

    let nodal = analyzer.analyze_with_method(&mut circuit, AnalysisMethod::ModifiedNodal);
    assert_same_components(&result, &nodal);
}

#[test]
fn mesh_nodal_and_series_agree() {
    let mut analyzer = Analyzer::default();

    let mut t = tee();
    let nodal = analyzer.analyze_with_method(&mut t, AnalysisMethod::ModifiedNodal);
    let mesh = analyzer.analyze_with_method(&mut t, AnalysisMethod::Mesh);
    let ladder = analyzer.analyze(&mut t);
    assert!(nodal.is_valid && mesh.is_valid && ladder.is_valid);
    assert_eq!(ladder.diagnostics.method, Some(AnalysisMethod::Ladder));
    assert_same_components(&nodal, &mesh);
    assert_same_components(&nodal, &ladder);

    let mut driven = current_driven();
    let series = analyzer.analyze(&mut driven);
    let nodal = analyzer.analyze_with_method(&mut driven, AnalysisMethod::Nodal);
    assert!(series.is_valid && nodal.is_valid, "{:?} / {:?}", series.error, nodal.error);
    assert_same_components(&series, &nodal);
}

#[test]
fn ac_divider_agrees_across_methods() {
    let mut b = CircuitBuilder::new();
    b.voltage_source((0.0, 0.0), (0.0, 100.0), 1.0);
    b.resistor((0.0, 0.0), (100.0, 0.0), 100.0);
    let l = b.inductor((100.0, 0.0), (0.0, 100.0), 10.0e-3);
    b.ground((0.0, 100.0));
    let mut circuit = b.build();

    let mut analyzer = Analyzer::new(AnalysisConfig::default().with_frequency(1_000.0));
    let series = analyzer.analyze(&mut circuit);
    let nodal = analyzer.analyze_with_method(&mut circuit, AnalysisMethod::ModifiedNodal);
    assert!(series.is_valid && nodal.is_valid);
    assert_same_components(&series, &nodal);

    let xl = 2.0 * std::f64::consts::PI * 1_000.0 * 10.0e-3;
    let expected = CScalar::new(0.0, xl) / CScalar::new(100.0, xl);
    assert_relative_eq!(series.components[&l].voltage.re, expected.re, epsilon = 1e-12);
    assert_relative_eq!(series.components[&l].voltage.im, expected.im, epsilon = 1e-12);
    assert_relative_eq!(series.components[&l].power, 0.0, epsilon = 1e-12);
}

#[test]
fn solutions_reproduce_the_right_hand_side() {
    let cfg = AnalysisConfig::default();
    for circuit in [tee(), current_driven(), parallel_pair().0] {
        let topo = Topology::extract(&circuit, &TopologyOptions::from(&cfg)).unwrap();
        for method in [AnalysisMethod::ModifiedNodal, AnalysisMethod::ModifiedMesh] {
            let Ok(system) = build_system(&topo, method, cfg.tolerance) else {
                continue;
            };
            let solution = em_circuits::circuits::solver::solve(&system, &SolverOptions::from(&cfg)).unwrap();
            let check = verify_solution(&system.matrix, &solution.x, &system.rhs, cfg.tolerance);
            assert!(check.valid, "{method}: residual {}", check.residual);
            assert!(check.residual < cfg.tolerance);
            assert!(solution.x.iter().all(|z| z.re.is_finite() && z.im.is_finite()));
        }
    }
}

#[test]
fn unreachable_component_is_reported() {
    let (mut circuit, _, _) = series_12v_1k();
    circuit.add_component(Component::resistor((500.0, 500.0), (600.0, 500.0), 10.0));
    let result = Analyzer::default().analyze(&mut circuit);
    assert!(!result.is_valid);
    assert!(
        result.error.as_deref().unwrap_or("").contains("2 disconnected components"),
        "{:?}",
        result.error
    );
}

#[test]
fn singular_system_is_an_error_not_nan() {
    let mut b = CircuitBuilder::new();
    b.voltage_source((0.0, 0.0), (0.0, 100.0), 10.0);
    b.voltage_source((100.0, 0.0), (100.0, 100.0), 5.0);
    b.resistor((200.0, 0.0), (200.0, 100.0), 100.0);
    b.wire(Wire::new((0.0, 0.0), (200.0, 0.0)).with_junction((100.0, 0.0)));
    b.wire(Wire::new((0.0, 100.0), (200.0, 100.0)).with_junction((100.0, 100.0)));
    b.ground((0.0, 100.0));
    let mut circuit = b.build();
    let result = Analyzer::default().analyze(&mut circuit);
    assert!(!result.is_valid);
    assert!(result.error.as_deref().unwrap_or("").contains("singular"), "{:?}", result.error);
    assert!(result.node_voltages.is_empty());
    assert!(circuit
        .components()
        .iter()
        .all(|c| c.state.voltage.re.is_finite() && c.state.current.re.is_finite()));
}

#[test]
fn near_floating_chain_is_singular_at_dc_and_ac() {
    let mut b = CircuitBuilder::new();
    b.current_source((0.0, 0.0), (0.0, 100.0), 1.0);
    b.resistor((0.0, 0.0), (0.0, 100.0), 1.0);
    b.resistor((0.0, 0.0), (100.0, 0.0), 1.0);
    b.resistor((100.0, 0.0), (200.0, 0.0), 1.0e12);
    b.resistor((200.0, 0.0), (300.0, 0.0), 1.0e12);
    b.resistor((300.0, 0.0), (0.0, 100.0), 1.0e12);
    b.ground((0.0, 100.0));
    let mut circuit = b.build();

    for hz in [0.0, 50.0] {
        let mut analyzer = Analyzer::new(AnalysisConfig::default().with_frequency(hz));
        let result = analyzer.analyze(&mut circuit);
        assert!(!result.is_valid, "{hz} Hz solved with {:?}", result.diagnostics.solver);
        assert!(result.error.as_deref().unwrap_or("").contains("singular"), "{:?}", result.error);
    }
}

#[test]
fn repeated_analysis_is_idempotent() {
    let mut circuit = tee();
    let mut analyzer = Analyzer::default();
    let first = analyzer.analyze(&mut circuit);
    let second = analyzer.analyze(&mut circuit);
    assert_eq!(first, second);
    assert_eq!(analyzer.cache_stats().hits, 1);

    let bypass = analyzer.analyze_uncached(&mut circuit);
    assert_eq!(bypass.node_voltages, first.node_voltages);
    assert_eq!(bypass.branch_currents, first.branch_currents);
    assert_eq!(bypass.components, first.components);
}

#[test]
fn editing_a_value_misses_the_cache() {
    let (mut circuit, _, r) = series_12v_1k();
    let mut analyzer = Analyzer::new(AnalysisConfig::default().with_cache_capacity(1));
    let before = analyzer.analyze(&mut circuit);
    circuit.component_mut(r).unwrap().value = 2_000.0;
    let after = analyzer.analyze(&mut circuit);
    assert_relative_eq!(after.components[&r].current.re, 0.006, epsilon = 1e-12);
    assert_ne!(before.components[&r].current, after.components[&r].current);
    assert_eq!(analyzer.cached(), 1);
    assert_eq!(analyzer.cache_stats().evictions, 1);
}

#[test]
fn vi_power_matches_formula_power() {
    let mut b = CircuitBuilder::new();
    b.add(Component::voltage_source((0.0, 0.0), (0.0, 100.0), 9.0).with_internal_resistance(2.0));
    b.resistor((0.0, 0.0), (100.0, 0.0), 330.0);
    b.diode((100.0, 0.0), (200.0, 0.0));
    b.resistor((200.0, 0.0), (0.0, 100.0), 470.0);
    b.ground((0.0, 100.0));

    let mut analyzer = Analyzer::default();
    for mut circuit in [b.build(), tee(), current_driven(), parallel_pair().0] {
        let result = analyzer.analyze(&mut circuit);
        assert!(result.is_valid, "{:?}", result.error);
        assert!(!result.has_warning(WarningKind::PowerBalance));
        for c in circuit.components() {
            if c.kind == ComponentKind::Ground {
                continue;
            }
            assert_relative_eq!(c.state.power, formula_power(c, &c.state), epsilon = 1e-9);
        }
    }
}
