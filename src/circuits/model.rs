//! Per-kind electrical laws: impedance, conjugate quantity for a given
//! excitation, power, and thermal/harmonic derivatives.
//!
//! Everything here is a pure function of a [`Component`] and its excitation.
//! Failures never divide by zero: an impossible quantity is reported as the
//! [`undefined`](crate::math::undefined) sentinel (infinite real part) and
//! callers must check with [`is_finite`](crate::math::is_finite) before use.

use std::f64::consts::PI;

use num_complex::Complex;

use crate::constants::{angular_frequency, DEFAULT_TIME_STEP, REFERENCE_TEMPERATURE_C};
use crate::math::{is_finite, real, undefined, CScalar, Scalar, C_ZERO};

use super::circuit::Wire;
use super::component::{Component, ComponentKind, ElectricalState, SourceWaveform};

/// Frequency and time-step context for evaluating a component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelContext {
    /// Excitation frequency (Hz); zero selects DC behaviour.
    pub frequency_hz: Scalar,
    /// Euler step (s) used by [`Excitation::Step`].
    pub time_step: Scalar,
}

impl ModelContext {
    /// DC context with the default 1 ms time step.
    #[must_use]
    pub const fn dc() -> Self {
        Self {
            frequency_hz: 0.0,
            time_step: DEFAULT_TIME_STEP,
        }
    }

    /// AC context at `frequency_hz`.
    #[must_use]
    pub const fn ac(frequency_hz: Scalar) -> Self {
        Self {
            frequency_hz,
            time_step: DEFAULT_TIME_STEP,
        }
    }

    fn is_dc(&self) -> bool {
        self.frequency_hz.abs() < Scalar::EPSILON
    }
}

impl Default for ModelContext {
    fn default() -> Self {
        Self::dc()
    }
}

/// What drives the component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Excitation {
    /// A known current through the element (delivered current for sources).
    Current(CScalar),
    /// A known voltage across the element.
    Voltage(CScalar),
    /// One explicit Euler step of a reactive element.
    ///
    /// Capacitor: `previous` is V₀ and `drive` is the current; returns
    /// V = V₀ + I·Δt/C. Inductor: `previous` is I₀ and `drive` is the voltage;
    /// returns I = I₀ + V·Δt/L. This is a first-order discretisation, not an
    /// exact solution.
    Step {
        /// State carried from the previous step.
        previous: Scalar,
        /// Conjugate quantity applied during the step.
        drive: Scalar,
    },
}

/// Voltage, current and power that result from an excitation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Response {
    /// Voltage across the element.
    pub voltage: CScalar,
    /// Current through (or delivered by) the element.
    pub current: CScalar,
    /// Real power: absorbed for passive elements, delivered for sources.
    pub power: Scalar,
}

impl Response {
    fn new(voltage: CScalar, current: CScalar) -> Self {
        let power = if is_finite(voltage) && is_finite(current) {
            real_power(voltage, current)
        } else {
            Scalar::NAN
        };
        Self {
            voltage,
            current,
            power,
        }
    }
}

/// Real power `Re(V·conj(I))` of a phasor pair (plain `V·I` at DC).
#[inline]
#[must_use]
pub fn real_power(voltage: CScalar, current: CScalar) -> Scalar {
    (voltage * current.conj()).re
}

/// Resistance after temperature coefficient and tap scaling.
#[must_use]
pub fn effective_resistance(component: &Component) -> Scalar {
    let p = &component.params;
    let delta_t = p.temperature_c - REFERENCE_TEMPERATURE_C;
    let thermal = 1.0 + p.temp_coefficient_ppm * 1.0e-6 * delta_t;
    let tap = p.tap_position.map_or(1.0, |t| t.clamp(0.0, 1.0));
    component.value * thermal * tap
}

/// Complex impedance of `component` at `frequency_hz`.
///
/// Capacitors at DC (and non-positive capacitances) are open circuits and
/// return the undefined sentinel.
#[must_use]
pub fn impedance(component: &Component, frequency_hz: Scalar) -> CScalar {
    let omega = angular_frequency(frequency_hz);
    match component.kind {
        ComponentKind::Resistor => real(effective_resistance(component)),
        ComponentKind::Capacitor => {
            if omega.abs() < Scalar::EPSILON || component.value <= 0.0 {
                undefined()
            } else {
                Complex::new(0.0, -1.0 / (omega * component.value))
            }
        }
        ComponentKind::Inductor => Complex::new(0.0, omega * component.value),
        ComponentKind::VoltageSource | ComponentKind::CurrentSource => {
            real(component.params.internal_resistance)
        }
        ComponentKind::Diode => real(component.params.series_resistance),
        ComponentKind::Ground => C_ZERO,
    }
}

/// Impedance at the `order`-th harmonic of `fundamental_hz`.
#[must_use]
pub fn harmonic_impedance(component: &Component, fundamental_hz: Scalar, order: u32) -> CScalar {
    impedance(component, fundamental_hz * Scalar::from(order))
}

/// Series impedance of a wire.
#[must_use]
pub fn wire_impedance(wire: &Wire, frequency_hz: Scalar) -> CScalar {
    Complex::new(wire.resistance, angular_frequency(frequency_hz) * wire.inductance)
}

/// Explicit Euler update of a capacitor voltage: V = V₀ + I·Δt/C.
#[must_use]
pub fn capacitor_step(v0: Scalar, current: Scalar, dt: Scalar, capacitance: Scalar) -> Scalar {
    if capacitance <= 0.0 {
        return Scalar::INFINITY;
    }
    v0 + current * dt / capacitance
}

/// Explicit Euler update of an inductor current: I = I₀ + V·Δt/L.
#[must_use]
pub fn inductor_step(i0: Scalar, voltage: Scalar, dt: Scalar, inductance: Scalar) -> Scalar {
    if inductance <= 0.0 {
        return Scalar::INFINITY;
    }
    i0 + voltage * dt / inductance
}

/// Returns the conjugate quantity and power for the given excitation.
#[must_use]
pub fn respond(component: &Component, excitation: Excitation, ctx: &ModelContext) -> Response {
    match component.kind {
        ComponentKind::Resistor => {
            let r = effective_resistance(component);
            match excitation {
                Excitation::Current(i) => Response::new(i * r, i),
                Excitation::Voltage(v) if r > 0.0 => Response::new(v, v / r),
                Excitation::Voltage(v) => Response::new(v, undefined()),
                Excitation::Step { drive, .. } => Response::new(real(drive * r), real(drive)),
            }
        }
        ComponentKind::Capacitor => match excitation {
            Excitation::Step { previous, drive } => {
                let v = capacitor_step(previous, drive, ctx.time_step, component.value);
                Response::new(real(v), real(drive))
            }
            // Open at DC: no current for any applied voltage.
            Excitation::Voltage(v) if ctx.is_dc() => Response::new(v, C_ZERO),
            Excitation::Current(i) if ctx.is_dc() => Response::new(undefined(), i),
            Excitation::Voltage(v) => {
                let z = impedance(component, ctx.frequency_hz);
                Response::new(v, v / z)
            }
            Excitation::Current(i) => {
                let z = impedance(component, ctx.frequency_hz);
                Response::new(i * z, i)
            }
        },
        ComponentKind::Inductor => match excitation {
            Excitation::Step { previous, drive } => {
                let i = inductor_step(previous, drive, ctx.time_step, component.value);
                Response::new(real(drive), real(i))
            }
            // Short at DC: no voltage for any current.
            Excitation::Current(i) if ctx.is_dc() => Response::new(C_ZERO, i),
            Excitation::Voltage(v) if ctx.is_dc() => Response::new(v, undefined()),
            Excitation::Voltage(v) => {
                let z = impedance(component, ctx.frequency_hz);
                Response::new(v, v / z)
            }
            Excitation::Current(i) => {
                let z = impedance(component, ctx.frequency_hz);
                Response::new(i * z, i)
            }
        },
        ComponentKind::Diode => diode_response(component, excitation),
        ComponentKind::VoltageSource => {
            let nominal = component.source_phasor();
            let r_int = component.params.internal_resistance;
            match excitation {
                Excitation::Current(i) => {
                    let v = clamp_magnitude(nominal - i * r_int, component.params.compliance);
                    Response::new(v, i)
                }
                Excitation::Voltage(v) if r_int > 0.0 => Response::new(v, (nominal - v) / r_int),
                Excitation::Voltage(v) => Response::new(v, undefined()),
                Excitation::Step { drive, .. } => {
                    let v = clamp_magnitude(nominal - real(drive * r_int), component.params.compliance);
                    Response::new(v, real(drive))
                }
            }
        }
        ComponentKind::CurrentSource => {
            let nominal = component.source_phasor();
            match excitation {
                Excitation::Voltage(v) => Response::new(v, nominal),
                Excitation::Current(_) | Excitation::Step { .. } => {
                    Response::new(undefined(), nominal)
                }
            }
        }
        ComponentKind::Ground => Response::new(C_ZERO, C_ZERO),
    }
}

fn diode_response(component: &Component, excitation: Excitation) -> Response {
    let p = &component.params;
    let (vf, rs, rrev) = (p.forward_voltage, p.series_resistance, p.reverse_resistance);
    let from_current = |i: Scalar| {
        if i >= 0.0 {
            vf + i * rs
        } else {
            i * rrev
        }
    };
    let from_voltage = |v: Scalar| {
        if v >= vf && rs > 0.0 {
            (v - vf) / rs
        } else if v >= vf {
            Scalar::INFINITY
        } else {
            v / rrev
        }
    };
    match excitation {
        Excitation::Current(i) => Response::new(real(from_current(i.re)), i),
        Excitation::Voltage(v) => Response::new(v, real(from_voltage(v.re))),
        Excitation::Step { drive, .. } => Response::new(real(from_current(drive)), real(drive)),
    }
}

fn clamp_magnitude(v: CScalar, limit: Scalar) -> CScalar {
    let mag = v.norm();
    if limit.is_finite() && mag > limit && mag > 0.0 {
        v * (limit / mag)
    } else {
        v
    }
}

/// Power from the type-specific law, for cross-checking against `V·I`.
///
/// Resistors use I²R, diodes I·V_f + I²R_s forward and I²R_rev reverse, voltage
/// sources the delivered power `Re(V_nom·I*) − I²R_int`, current sources
/// `Re(V·I_nom*)`, and ideal reactive elements absorb no real power.
#[must_use]
pub fn formula_power(component: &Component, state: &ElectricalState) -> Scalar {
    let i = state.current;
    match component.kind {
        ComponentKind::Resistor => i.norm_sqr() * effective_resistance(component),
        ComponentKind::Diode => {
            let p = &component.params;
            if i.re < 0.0 {
                i.norm_sqr() * p.reverse_resistance
            } else {
                real_power(real(p.forward_voltage) + i * p.series_resistance, i)
            }
        }
        ComponentKind::VoltageSource => {
            real_power(component.source_phasor(), i)
                - i.norm_sqr() * component.params.internal_resistance
        }
        ComponentKind::CurrentSource => real_power(state.voltage, component.source_phasor()),
        ComponentKind::Capacitor | ComponentKind::Inductor | ComponentKind::Ground => 0.0,
    }
}

/// Steady-state temperature rise (°C) for a dissipated `power`.
#[must_use]
pub fn temperature_rise(component: &Component, power: Scalar) -> Scalar {
    power.abs() * component.params.thermal_resistance
}

/// Ambient temperature plus the rise caused by `power`.
#[must_use]
pub fn operating_temperature(component: &Component, power: Scalar) -> Scalar {
    component.params.temperature_c + temperature_rise(component, power)
}

impl SourceWaveform {
    /// Fundamental frequency, zero for DC.
    #[must_use]
    pub const fn frequency_hz(&self) -> Scalar {
        match *self {
            Self::Dc => 0.0,
            Self::Sine { frequency_hz, .. }
            | Self::Square { frequency_hz, .. }
            | Self::Triangle { frequency_hz } => frequency_hz,
        }
    }

    /// Value at time `t` for a waveform of peak `amplitude`.
    #[must_use]
    pub fn instantaneous(&self, amplitude: Scalar, t: Scalar) -> Scalar {
        match *self {
            Self::Dc => amplitude,
            Self::Sine {
                frequency_hz,
                phase_deg,
            } => amplitude * (2.0 * PI * frequency_hz * t + phase_deg.to_radians()).sin(),
            Self::Square { frequency_hz, duty } => {
                if (frequency_hz * t).rem_euclid(1.0) < duty {
                    amplitude
                } else {
                    -amplitude
                }
            }
            Self::Triangle { frequency_hz } => {
                let phase = (frequency_hz * t).rem_euclid(1.0);
                amplitude * (1.0 - 4.0 * (phase - 0.5).abs())
            }
        }
    }

    /// Peak amplitude of harmonic `n` (n = 0 is the DC component).
    #[must_use]
    pub fn harmonic_amplitude(&self, amplitude: Scalar, n: u32) -> Scalar {
        let nf = Scalar::from(n);
        match *self {
            Self::Dc => {
                if n == 0 {
                    amplitude
                } else {
                    0.0
                }
            }
            Self::Sine { .. } => {
                if n == 1 {
                    amplitude.abs()
                } else {
                    0.0
                }
            }
            Self::Square { duty, .. } => {
                if n == 0 {
                    amplitude * (2.0 * duty - 1.0)
                } else {
                    (4.0 * amplitude / (nf * PI)).abs() * (nf * PI * duty).sin().abs()
                }
            }
            Self::Triangle { .. } => {
                if n % 2 == 1 {
                    (8.0 * amplitude / (PI * PI * nf * nf)).abs()
                } else {
                    0.0
                }
            }
        }
    }

    /// Total harmonic distortion over harmonics `2..=max_order`.
    #[must_use]
    pub fn total_harmonic_distortion(&self, max_order: u32) -> Scalar {
        let fundamental = self.harmonic_amplitude(1.0, 1);
        if fundamental <= 0.0 {
            return 0.0;
        }
        let sum: Scalar = (2..=max_order)
            .map(|n| self.harmonic_amplitude(1.0, n).powi(2))
            .sum();
        sum.sqrt() / fundamental
    }
}
