use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use em_circuits::circuits::analysis::Analyzer;
use em_circuits::circuits::circuit::{Circuit, CircuitBuilder};
use em_circuits::circuits::stamp::AnalysisMethod;
use em_circuits::config::AnalysisConfig;
use em_circuits::sweep::logspace_hz;

/// A resistive ladder with `rungs` sections driven by one source.
fn ladder(rungs: usize) -> Circuit {
    let mut b = CircuitBuilder::new();
    b.voltage_source((0.0, 0.0), (0.0, 100.0), 10.0);
    b.ground((0.0, 100.0));
    for k in 0..rungs {
        let x0 = 100.0 * k as f64;
        let x1 = x0 + 100.0;
        b.resistor((x0, 0.0), (x1, 0.0), 100.0);
        b.resistor((x1, 0.0), (x1, 100.0), 1000.0);
        b.ground((x1, 100.0));
    }
    b.build()
}

fn series_rc() -> Circuit {
    let mut b = CircuitBuilder::new();
    b.voltage_source((0.0, 0.0), (0.0, 100.0), 1.0);
    b.resistor((0.0, 0.0), (100.0, 0.0), 50.0);
    b.inductor((100.0, 0.0), (200.0, 0.0), 1e-6);
    b.capacitor((200.0, 0.0), (0.0, 100.0), 1e-9);
    b.ground((0.0, 100.0));
    b.build()
}

fn bench_ladder(c: &mut Criterion) {
    let mut group = c.benchmark_group("ladder");
    for rungs in [4, 16, 64] {
        for method in [AnalysisMethod::ModifiedNodal, AnalysisMethod::Mesh] {
            group.bench_function(BenchmarkId::new(method.name(), rungs), |b| {
                b.iter_batched(
                    || (ladder(rungs), Analyzer::new(AnalysisConfig::default().with_cache_capacity(0))),
                    |(mut circuit, mut analyzer)| {
                        black_box(analyzer.analyze_with_method(&mut circuit, method));
                    },
                    BatchSize::SmallInput,
                )
            });
        }
    }
    group.finish();
}

fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("sweep");
    let freqs = logspace_hz(1.0e3, 1.0e8, 1_000);
    group.bench_function(BenchmarkId::new("series_rlc", freqs.len()), |b| {
        b.iter_batched(
            || (series_rc(), Analyzer::new(AnalysisConfig::default().with_cache_capacity(0))),
            |(circuit, mut analyzer)| {
                black_box(analyzer.frequency_sweep(&circuit, &freqs));
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

criterion_group!(benches, bench_ladder, bench_sweep);
criterion_main!(benches);
