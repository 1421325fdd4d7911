//! Circuit elements: component kinds, parameters and the solved electrical state.

use num_complex::Complex;

use crate::constants::{
    DIODE_FORWARD_VOLTAGE, DIODE_REVERSE_RESISTANCE, DIODE_SERIES_RESISTANCE,
    REFERENCE_TEMPERATURE_C,
};
use crate::math::{CScalar, Scalar};

/// A point in circuit space (schematic coordinates).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: Scalar,
    /// Vertical coordinate.
    pub y: Scalar,
}

impl Position {
    /// Creates a position.
    #[must_use]
    pub const fn new(x: Scalar, y: Scalar) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    #[must_use]
    pub fn distance(&self, other: &Self) -> Scalar {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl From<(Scalar, Scalar)> for Position {
    fn from((x, y): (Scalar, Scalar)) -> Self {
        Self { x, y }
    }
}

/// Stable identifier of a component within one circuit.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ComponentId(pub u32);

/// Stable identifier of a wire within one circuit.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct WireId(pub u32);

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// Closed set of element types understood by the analysis engine.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ComponentKind {
    /// Linear resistor, optionally variable (tapped) and temperature dependent.
    Resistor,
    /// Independent voltage source, ideal or with internal resistance.
    VoltageSource,
    /// Independent current source.
    CurrentSource,
    /// Ideal capacitor.
    Capacitor,
    /// Ideal inductor.
    Inductor,
    /// Diode with a piecewise-linear model.
    Diode,
    /// Single-terminal ground reference.
    Ground,
}

impl ComponentKind {
    /// All kinds, in label-sequence order.
    pub const ALL: [Self; 7] = [
        Self::Resistor,
        Self::VoltageSource,
        Self::CurrentSource,
        Self::Capacitor,
        Self::Inductor,
        Self::Diode,
        Self::Ground,
    ];

    /// Prefix used for default labels.
    #[must_use]
    pub const fn label_prefix(self) -> &'static str {
        match self {
            Self::Resistor => "R",
            Self::VoltageSource => "V",
            Self::CurrentSource => "I",
            Self::Capacitor => "C",
            Self::Inductor => "L",
            Self::Diode => "D",
            Self::Ground => "GND",
        }
    }

    /// Unit of the component's primary value.
    #[must_use]
    pub const fn unit(self) -> &'static str {
        match self {
            Self::Resistor => "Ω",
            Self::VoltageSource | Self::Diode => "V",
            Self::CurrentSource => "A",
            Self::Capacitor => "F",
            Self::Inductor => "H",
            Self::Ground => "",
        }
    }

    /// Number of terminals the kind expects.
    #[must_use]
    pub const fn terminal_count(self) -> usize {
        match self {
            Self::Ground => 1,
            _ => 2,
        }
    }

    /// True for independent sources.
    #[must_use]
    pub const fn is_source(self) -> bool {
        matches!(self, Self::VoltageSource | Self::CurrentSource)
    }

    const fn index(self) -> usize {
        match self {
            Self::Resistor => 0,
            Self::VoltageSource => 1,
            Self::CurrentSource => 2,
            Self::Capacitor => 3,
            Self::Inductor => 4,
            Self::Diode => 5,
            Self::Ground => 6,
        }
    }
}

/// Shape of an independent source's excitation.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SourceWaveform {
    /// Constant value.
    #[default]
    Dc,
    /// Sinusoid; the component value is the peak amplitude.
    Sine {
        /// Frequency in hertz.
        frequency_hz: Scalar,
        /// Phase in degrees.
        phase_deg: Scalar,
    },
    /// Square wave between `+value` and `-value`.
    Square {
        /// Frequency in hertz.
        frequency_hz: Scalar,
        /// Fraction of the period spent high, in (0, 1).
        duty: Scalar,
    },
    /// Symmetric triangle wave.
    Triangle {
        /// Frequency in hertz.
        frequency_hz: Scalar,
    },
}

/// Type-specific parameters. Fields a kind does not use are ignored.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentParams {
    /// Source internal resistance (Ω); series for voltage sources.
    pub internal_resistance: Scalar,
    /// Operating temperature (°C).
    pub temperature_c: Scalar,
    /// Linear temperature coefficient (ppm/°C).
    pub temp_coefficient_ppm: Scalar,
    /// Wiper position of a variable resistor in `[0, 1]`.
    pub tap_position: Option<Scalar>,
    /// Diode forward voltage (V).
    pub forward_voltage: Scalar,
    /// Diode forward-region series resistance (Ω).
    pub series_resistance: Scalar,
    /// Diode reverse-region resistance (Ω).
    pub reverse_resistance: Scalar,
    /// Voltage source output clamp (V).
    pub compliance: Scalar,
    /// Junction-to-ambient thermal resistance (°C/W).
    pub thermal_resistance: Scalar,
    /// Source waveform.
    pub waveform: SourceWaveform,
}

impl Default for ComponentParams {
    fn default() -> Self {
        Self {
            internal_resistance: 0.0,
            temperature_c: REFERENCE_TEMPERATURE_C,
            temp_coefficient_ppm: 0.0,
            tap_position: None,
            forward_voltage: DIODE_FORWARD_VOLTAGE,
            series_resistance: DIODE_SERIES_RESISTANCE,
            reverse_resistance: DIODE_REVERSE_RESISTANCE,
            compliance: Scalar::INFINITY,
            thermal_resistance: 0.0,
            waveform: SourceWaveform::Dc,
        }
    }
}

/// Solved quantities written back by the coordinator after a valid analysis.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ElectricalState {
    /// Voltage across the element, terminal 0 minus terminal 1.
    pub voltage: CScalar,
    /// Element current. Passive: terminal 0 → terminal 1 through the element.
    /// Sources: current delivered out of terminal 0.
    pub current: CScalar,
    /// Real power: absorbed for passive elements, delivered for sources.
    pub power: Scalar,
}

/// A placed circuit element.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    /// Identifier assigned by the owning circuit.
    pub id: ComponentId,
    /// Element kind.
    pub kind: ComponentKind,
    /// Display label (e.g. `R1`).
    pub label: String,
    /// Terminal positions in circuit-space order.
    pub terminals: Vec<Position>,
    /// Primary value (Ω, V, A, F, H; forward voltage is a parameter for diodes).
    pub value: Scalar,
    /// Type-specific parameters.
    pub params: ComponentParams,
    /// Solved state; only written after a successful analysis.
    pub state: ElectricalState,
}

impl Component {
    /// Creates a component with default parameters.
    #[must_use]
    pub fn new(kind: ComponentKind, value: Scalar, terminals: Vec<Position>) -> Self {
        Self {
            id: ComponentId::default(),
            kind,
            label: String::new(),
            terminals,
            value,
            params: ComponentParams::default(),
            state: ElectricalState::default(),
        }
    }

    /// Two-terminal resistor.
    #[must_use]
    pub fn resistor(a: impl Into<Position>, b: impl Into<Position>, ohms: Scalar) -> Self {
        Self::new(ComponentKind::Resistor, ohms, vec![a.into(), b.into()])
    }

    /// Voltage source; `pos` is terminal 0.
    #[must_use]
    pub fn voltage_source(pos: impl Into<Position>, neg: impl Into<Position>, volts: Scalar) -> Self {
        Self::new(ComponentKind::VoltageSource, volts, vec![pos.into(), neg.into()])
    }

    /// Current source driving `amps` out of `out` (terminal 0).
    #[must_use]
    pub fn current_source(out: impl Into<Position>, back: impl Into<Position>, amps: Scalar) -> Self {
        Self::new(ComponentKind::CurrentSource, amps, vec![out.into(), back.into()])
    }

    /// Capacitor.
    #[must_use]
    pub fn capacitor(a: impl Into<Position>, b: impl Into<Position>, farads: Scalar) -> Self {
        Self::new(ComponentKind::Capacitor, farads, vec![a.into(), b.into()])
    }

    /// Inductor.
    #[must_use]
    pub fn inductor(a: impl Into<Position>, b: impl Into<Position>, henries: Scalar) -> Self {
        Self::new(ComponentKind::Inductor, henries, vec![a.into(), b.into()])
    }

    /// Diode; `anode` is terminal 0.
    #[must_use]
    pub fn diode(anode: impl Into<Position>, cathode: impl Into<Position>) -> Self {
        let mut d = Self::new(
            ComponentKind::Diode,
            DIODE_FORWARD_VOLTAGE,
            vec![anode.into(), cathode.into()],
        );
        d.params.forward_voltage = DIODE_FORWARD_VOLTAGE;
        d
    }

    /// Ground symbol.
    #[must_use]
    pub fn ground(at: impl Into<Position>) -> Self {
        Self::new(ComponentKind::Ground, 0.0, vec![at.into()])
    }

    /// Sets the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets the source internal resistance.
    #[must_use]
    pub const fn with_internal_resistance(mut self, ohms: Scalar) -> Self {
        self.params.internal_resistance = ohms;
        self
    }

    /// Sets temperature and temperature coefficient.
    #[must_use]
    pub const fn with_temperature(mut self, celsius: Scalar, ppm_per_c: Scalar) -> Self {
        self.params.temperature_c = celsius;
        self.params.temp_coefficient_ppm = ppm_per_c;
        self
    }

    /// Makes the resistor variable with the given wiper position.
    #[must_use]
    pub const fn with_tap(mut self, position: Scalar) -> Self {
        self.params.tap_position = Some(position);
        self
    }

    /// Sets the source waveform.
    #[must_use]
    pub const fn with_waveform(mut self, waveform: SourceWaveform) -> Self {
        self.params.waveform = waveform;
        self
    }

    /// Sets the voltage clamp of a voltage source.
    #[must_use]
    pub const fn with_compliance(mut self, volts: Scalar) -> Self {
        self.params.compliance = volts;
        self
    }

    /// Sets the thermal resistance used for temperature-rise estimates.
    #[must_use]
    pub const fn with_thermal_resistance(mut self, c_per_w: Scalar) -> Self {
        self.params.thermal_resistance = c_per_w;
        self
    }

    /// True for elements that become branches (two or more terminals, not ground).
    #[must_use]
    pub fn is_two_terminal(&self) -> bool {
        self.kind != ComponentKind::Ground && self.terminals.len() >= 2
    }

    /// Source excitation as a phasor: the value rotated by the sine phase.
    #[must_use]
    pub fn source_phasor(&self) -> CScalar {
        match self.params.waveform {
            SourceWaveform::Sine { phase_deg, .. } => {
                Complex::from_polar(self.value, phase_deg.to_radians())
            }
            _ => Complex::new(self.value, 0.0),
        }
    }
}

/// Per-kind label generator scoped to one circuit-building session.
#[derive(Debug, Clone, Default)]
pub struct LabelSequence {
    counters: [u32; ComponentKind::ALL.len()],
}

impl LabelSequence {
    /// Starts a fresh sequence.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next label for `kind` (`R1`, `R2`, `V1`, ...).
    pub fn next_label(&mut self, kind: ComponentKind) -> String {
        let counter = &mut self.counters[kind.index()];
        *counter += 1;
        format!("{}{}", kind.label_prefix(), counter)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn label_sequences_are_independent_per_kind() {
        let mut seq = LabelSequence::new();
        assert_eq!(seq.next_label(ComponentKind::Resistor), "R1");
        assert_eq!(seq.next_label(ComponentKind::Resistor), "R2");
        assert_eq!(seq.next_label(ComponentKind::VoltageSource), "V1");

        let mut other = LabelSequence::new();
        assert_eq!(other.next_label(ComponentKind::Resistor), "R1");
    }

    #[test]
    fn sine_source_phasor_carries_phase() {
        let v = Component::voltage_source((0.0, 0.0), (0.0, 100.0), 10.0).with_waveform(
            SourceWaveform::Sine {
                frequency_hz: 50.0,
                phase_deg: 90.0,
            },
        );
        let p = v.source_phasor();
        assert_relative_eq!(p.re, 0.0, epsilon = 1.0e-12);
        assert_relative_eq!(p.im, 10.0, epsilon = 1.0e-12);
    }

    #[test]
    fn ground_is_not_a_branch() {
        assert!(!Component::ground((0.0, 0.0)).is_two_terminal());
        assert!(Component::resistor((0.0, 0.0), (10.0, 0.0), 1.0).is_two_terminal());
    }
}
