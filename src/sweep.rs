//! Frequency sweep grids, sweep results and CSV export.

use std::collections::BTreeMap;
use std::io::{self, Write};

use crate::math::{is_finite, CScalar, Scalar};

/// Generates `n` linearly spaced samples in [start, stop].
#[must_use]
pub fn linspace(start: Scalar, stop: Scalar, n: usize) -> Vec<Scalar> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n as Scalar - 1.0);
            (0..n).map(|i| start + step * i as Scalar).collect()
        }
    }
}

/// Generates `n` logarithmically spaced samples between `start` and `stop` (Hz).
/// Returns nothing unless both bounds are positive.
#[must_use]
pub fn logspace_hz(start_hz: Scalar, stop_hz: Scalar, n: usize) -> Vec<Scalar> {
    if !(start_hz > 0.0 && stop_hz > 0.0) {
        return Vec::new();
    }
    match n {
        0 => Vec::new(),
        1 => vec![start_hz],
        _ => {
            let log_start = start_hz.log10();
            let log_stop = stop_hz.log10();
            let step = (log_stop - log_start) / (n as Scalar - 1.0);
            (0..n)
                .map(|i| 10f64.powf(log_start + step * i as Scalar))
                .collect()
        }
    }
}

/// Magnitude in dB (20*log10(|x|)), clamping very small values.
#[must_use]
pub fn mag_db(value: CScalar) -> Scalar {
    const MIN: Scalar = 1e-300;
    20.0 * value.norm().max(MIN).log10()
}

/// Phase in degrees.
#[must_use]
pub fn phase_deg(value: CScalar) -> Scalar {
    value.arg().to_degrees()
}

/// One frequency of a circuit sweep.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct SweepPoint {
    /// Excitation frequency (Hz).
    pub frequency_hz: Scalar,
    /// Solved node voltages keyed by electrical node id.
    pub node_voltages: BTreeMap<usize, CScalar>,
    /// Impedance seen by the driving source, if one could be determined.
    pub input_impedance: Option<CScalar>,
    /// False when the analysis at this frequency failed.
    pub is_valid: bool,
    /// Failure message for invalid points.
    pub error: Option<String>,
}

/// Writes sweep points as CSV: input impedance plus the voltage of `node`.
///
/// Missing values are written as `NaN` so every row has the same columns.
pub fn write_sweep_csv<W: Write>(mut w: W, points: &[SweepPoint], node: usize) -> io::Result<()> {
    writeln!(w, "frequency_hz,ReZ,ImZ,ReV,ImV,mag_db,phase_deg,valid")?;
    for p in points {
        let z = p
            .input_impedance
            .filter(|z| is_finite(*z))
            .unwrap_or(CScalar::new(Scalar::NAN, Scalar::NAN));
        let v = p
            .node_voltages
            .get(&node)
            .copied()
            .unwrap_or(CScalar::new(Scalar::NAN, Scalar::NAN));
        writeln!(
            w,
            "{:.16e},{:.16e},{:.16e},{:.16e},{:.16e},{:.6},{:.6},{}",
            p.frequency_hz,
            z.re,
            z.im,
            v.re,
            v.im,
            mag_db(v),
            phase_deg(v),
            p.is_valid
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn linspace_basic() {
        let v = linspace(0.0, 1.0, 5);
        assert_eq!(v, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn logspace_spans_decades() {
        let v = logspace_hz(10.0, 1000.0, 3);
        assert_relative_eq!(v[1], 100.0, epsilon = 1e-9);
        assert!(logspace_hz(0.0, 10.0, 4).is_empty());
    }

    #[test]
    fn magnitude_and_phase() {
        let j = CScalar::new(0.0, 10.0);
        assert_relative_eq!(mag_db(j), 20.0, epsilon = 1e-12);
        assert_relative_eq!(phase_deg(j), 90.0, epsilon = 1e-12);
    }

    #[test]
    fn csv_has_header_and_one_row_per_point() {
        let point = SweepPoint {
            frequency_hz: 50.0,
            node_voltages: BTreeMap::from([(1, CScalar::new(5.0, 0.0))]),
            input_impedance: Some(CScalar::new(100.0, -3.0)),
            is_valid: true,
            error: None,
        };
        let mut out = Vec::new();
        write_sweep_csv(&mut out, &[point.clone(), point], 1).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("frequency_hz,"));
        assert!(lines[1].ends_with(",true"));
    }
}
