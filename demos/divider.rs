use em_circuits::prelude::*;

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    // 12 V source feeding a 1 kΩ / 2 kΩ divider.
    let mut b = CircuitBuilder::new();
    b.voltage_source((0.0, 0.0), (0.0, 100.0), 12.0);
    let r1 = b.resistor((0.0, 0.0), (100.0, 0.0), 1_000.0);
    let r2 = b.resistor((100.0, 0.0), (0.0, 100.0), 2_000.0);
    b.ground((0.0, 100.0));
    let mut circuit = b.build();

    let mut analyzer = Analyzer::default();
    let result = analyzer.analyze(&mut circuit);
    if !result.is_valid {
        eprintln!("analysis failed: {}", result.error.unwrap_or_default());
        return;
    }

    println!(
        "method: {:?}, solver: {:?}",
        result.diagnostics.method, result.diagnostics.solver
    );
    for id in [r1, r2] {
        let c = circuit.component(id).map(|c| (c.label.clone(), c.state));
        if let Some((label, s)) = c {
            println!(
                "{label}: V = {:.4} V, I = {:.4} mA, P = {:.4} mW",
                s.voltage.re,
                s.current.re * 1e3,
                s.power * 1e3
            );
        }
    }
    for w in &result.warnings {
        println!("warning: {w}");
    }
}
