//! Bounded least-recently-used cache of analysis results keyed by a
//! structural fingerprint of the circuit and configuration.

use indexmap::IndexMap;

use crate::config::AnalysisConfig;
use crate::math::Scalar;

use super::analysis::AnalysisResult;
use super::circuit::Circuit;
use super::component::SourceWaveform;

/// Ordered bit patterns of everything that influences an analysis.
///
/// Components contribute kind, value, id, terminals and parameters; wires
/// contribute id, points and electrical properties; the configuration is
/// appended last. Floats are compared by bit pattern, so `0.0` and `-0.0`
/// differ and identical inputs always produce identical fingerprints.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(Vec<u64>);

impl Fingerprint {
    /// Fingerprints `circuit` analyzed under `config`.
    #[must_use]
    pub fn of(circuit: &Circuit, config: &AnalysisConfig) -> Self {
        let mut v: Vec<Scalar> =
            Vec::with_capacity(16 * (circuit.components().len() + circuit.wires().len()) + 16);

        for c in circuit.components() {
            v.push(c.kind as u64 as Scalar);
            v.push(c.value);
            v.push(Scalar::from(c.id.0));
            v.push(c.terminals.len() as Scalar);
            v.extend(c.terminals.iter().flat_map(|p| [p.x, p.y]));
            let p = &c.params;
            v.extend([
                p.internal_resistance,
                p.temperature_c,
                p.temp_coefficient_ppm,
                p.tap_position.unwrap_or(Scalar::NAN),
                p.forward_voltage,
                p.series_resistance,
                p.reverse_resistance,
                p.compliance,
                p.thermal_resistance,
            ]);
            match p.waveform {
                SourceWaveform::Dc => v.push(0.0),
                SourceWaveform::Sine {
                    frequency_hz,
                    phase_deg,
                } => v.extend([1.0, frequency_hz, phase_deg]),
                SourceWaveform::Square { frequency_hz, duty } => {
                    v.extend([2.0, frequency_hz, duty]);
                }
                SourceWaveform::Triangle { frequency_hz } => v.extend([3.0, frequency_hz]),
            }
        }

        v.push(Scalar::NAN);
        for w in circuit.wires() {
            v.push(Scalar::from(w.id.0));
            v.push(w.junctions.len() as Scalar);
            v.extend(w.points().flat_map(|p| [p.x, p.y]));
            v.extend([w.resistance, w.inductance, w.capacitance, w.cross_section_mm2]);
        }

        v.push(Scalar::NAN);
        let l = &config.limits;
        v.extend([
            config.snap_tolerance,
            config.ideal_wire_epsilon,
            config.tolerance,
            config.max_iterations as Scalar,
            config.frequency_hz,
            config.time_step,
            config.forced_method.map_or(-1.0, |m| m as u64 as Scalar),
            l.max_voltage,
            l.max_current,
            l.max_power,
            l.max_current_density,
            l.regulation_tolerance,
            l.power_balance_tolerance,
        ]);
        Self(v.into_iter().map(Scalar::to_bits).collect())
    }
}

/// Cache hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that found a result.
    pub hits: u64,
    /// Lookups that did not.
    pub misses: u64,
    /// Entries dropped to respect the capacity.
    pub evictions: u64,
}

/// LRU map from [`Fingerprint`] to [`AnalysisResult`].
///
/// Insertion order in the backing `IndexMap` is recency order: the front is
/// the least recently used entry.
#[derive(Debug, Clone)]
pub struct ResultCache {
    capacity: usize,
    entries: IndexMap<Fingerprint, AnalysisResult>,
    stats: CacheStats,
}

impl ResultCache {
    /// Creates a cache holding at most `capacity` results (0 disables caching).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: IndexMap::with_capacity(capacity.min(1024)),
            stats: CacheStats::default(),
        }
    }

    /// Looks up `key`, marking it most recently used.
    pub fn get(&mut self, key: &Fingerprint) -> Option<&AnalysisResult> {
        let Some((key, value)) = self.entries.shift_remove_entry(key) else {
            self.stats.misses += 1;
            return None;
        };
        self.stats.hits += 1;
        let (index, _) = self.entries.insert_full(key, value);
        self.entries.get_index(index).map(|(_, v)| v)
    }

    /// Stores `result`, evicting the least recently used entries beyond capacity.
    pub fn insert(&mut self, key: Fingerprint, result: AnalysisResult) {
        if self.capacity == 0 {
            return;
        }
        self.entries.shift_remove(&key);
        self.entries.insert(key, result);
        while self.entries.len() > self.capacity {
            self.entries.shift_remove_index(0);
            self.stats.evictions += 1;
        }
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cached results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Hit/miss/eviction counters.
    #[must_use]
    pub const fn stats(&self) -> CacheStats {
        self.stats
    }
}
