//! Physical-plausibility checks run before and after solving.
//!
//! Input checks reject values no system can be built from and warn about
//! suspicious ones. Result checks never fail an analysis except for
//! non-finite quantities; everything else becomes a [`ValidationWarning`].

use crate::config::PlausibilityLimits;
use crate::errors::{SolverError, StructuralError, ValidationWarning, WarningKind};
use crate::math::{is_finite, Scalar};

use super::analysis::AnalysisResult;
use super::circuit::Circuit;
use super::component::ComponentKind;
use super::model::real_power;
use super::topology::{BranchElement, BranchKind, Topology};

/// Validates component and wire values before topology extraction.
///
/// Non-finite values and components with too few terminals are fatal.
/// Non-positive passive values and sources beyond the limits are warnings.
pub fn check_inputs(
    circuit: &Circuit,
    limits: &PlausibilityLimits,
) -> Result<Vec<ValidationWarning>, StructuralError> {
    if circuit.is_empty() {
        return Err(StructuralError::EmptyCircuit);
    }
    let mut warnings = Vec::new();
    let malformed = |label: &str, reason: String| StructuralError::MalformedBranch {
        label: label.to_owned(),
        reason,
    };

    for c in circuit.components() {
        if c.terminals.len() < c.kind.terminal_count() {
            return Err(malformed(
                &c.label,
                format!(
                    "expected {} terminals, found {}",
                    c.kind.terminal_count(),
                    c.terminals.len()
                ),
            ));
        }
        if c.terminals.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(malformed(&c.label, "terminal position is not finite".into()));
        }
        if !c.value.is_finite() {
            return Err(malformed(&c.label, format!("value {} is not finite", c.value)));
        }
        match c.kind {
            ComponentKind::Resistor | ComponentKind::Capacitor | ComponentKind::Inductor
                if c.value <= 0.0 =>
            {
                warnings.push(ValidationWarning::new(
                    WarningKind::ImplausibleValue,
                    format!("{} has non-positive value {} {}", c.label, c.value, c.kind.unit()),
                ));
            }
            ComponentKind::VoltageSource if c.value.abs() > limits.max_voltage => {
                warnings.push(ValidationWarning::new(
                    WarningKind::ImplausibleValue,
                    format!("{} drives {:.3e} V", c.label, c.value),
                ));
            }
            ComponentKind::CurrentSource if c.value.abs() > limits.max_current => {
                warnings.push(ValidationWarning::new(
                    WarningKind::ImplausibleValue,
                    format!("{} drives {:.3e} A", c.label, c.value),
                ));
            }
            _ => {}
        }
        if c.kind.is_source() && c.params.internal_resistance < 0.0 {
            warnings.push(ValidationWarning::new(
                WarningKind::ImplausibleValue,
                format!("{} has negative internal resistance", c.label),
            ));
        }
    }

    for w in circuit.wires() {
        if !(w.resistance.is_finite() && w.inductance.is_finite()) {
            return Err(malformed(
                &format!("W{}", w.id.0),
                "wire impedance is not finite".into(),
            ));
        }
        if w.resistance < 0.0 {
            warnings.push(ValidationWarning::new(
                WarningKind::ImplausibleValue,
                format!("wire W{} has negative resistance", w.id.0),
            ));
        }
    }
    Ok(warnings)
}

/// Checks solved quantities against physical limits.
///
/// `topo` must carry solved branch voltages and currents.
pub fn check_results(
    circuit: &Circuit,
    topo: &Topology,
    result: &AnalysisResult,
    limits: &PlausibilityLimits,
) -> Result<Vec<ValidationWarning>, SolverError> {
    let finite = result.node_voltages.values().all(|v| is_finite(*v))
        && result.branch_currents.values().all(|i| is_finite(*i))
        && result
            .components
            .values()
            .all(|c| is_finite(c.voltage) && is_finite(c.current) && c.power.is_finite());
    if !finite {
        return Err(SolverError::NonFinite);
    }

    let mut warnings = Vec::new();
    let mut implausible = |message: String| {
        warnings.push(ValidationWarning::new(WarningKind::ImplausibleValue, message));
    };

    for (node, v) in &result.node_voltages {
        if v.norm() > limits.max_voltage {
            implausible(format!("node {node} sits at {:.3e} V", v.norm()));
        }
    }
    for c in circuit.components() {
        let Some(r) = result.components.get(&c.id) else {
            continue;
        };
        if r.current.norm() > limits.max_current {
            implausible(format!("{} carries {:.3e} A", c.label, r.current.norm()));
        }
        if r.power.abs() > limits.max_power {
            implausible(format!("{} handles {:.3e} W", c.label, r.power));
        }
    }

    for c in circuit.components() {
        let Some(r) = result.components.get(&c.id) else {
            continue;
        };
        match c.kind {
            ComponentKind::VoltageSource if c.params.internal_resistance > 0.0 => {
                let nominal = c.source_phasor().norm();
                if nominal > 0.0 {
                    let sag = (nominal - r.voltage.norm()) / nominal;
                    if sag > limits.regulation_tolerance {
                        warnings.push(ValidationWarning::new(
                            WarningKind::VoltageRegulation,
                            format!(
                                "{} terminal voltage sags {:.1}% below nominal",
                                c.label,
                                sag * 100.0
                            ),
                        ));
                    }
                }
            }
            _ => {}
        }
    }

    // One region switch is made per analysis; report diodes left inconsistent.
    for br in topo.branches.iter().filter(|b| b.component_kind == Some(ComponentKind::Diode)) {
        let BranchElement::Component { index, id } = br.element else {
            continue;
        };
        let (Some(c), Some(r)) = (circuit.components().get(index), result.components.get(&id)) else {
            continue;
        };
        if br.is_reverse_biased_diode() {
            if r.voltage.re > c.params.forward_voltage {
                warnings.push(ValidationWarning::new(
                    WarningKind::DiodeRegion,
                    format!(
                        "{} is modelled as blocking but sees {:.3} V forward",
                        c.label, r.voltage.re
                    ),
                ));
            }
        } else if r.current.re < 0.0 {
            warnings.push(ValidationWarning::new(
                WarningKind::DiodeRegion,
                format!(
                    "{} conducts {:.3e} A in reverse; the forward model does not hold",
                    c.label, r.current.re
                ),
            ));
        }
    }

    for w in circuit.wires() {
        let Some(i) = result.wire_currents.get(&w.id) else {
            continue;
        };
        if w.cross_section_mm2 > 0.0 {
            let density = i.norm() / w.cross_section_mm2;
            if density > limits.max_current_density {
                warnings.push(ValidationWarning::new(
                    WarningKind::CurrentDensity,
                    format!("wire W{} carries {density:.2} A/mm²", w.id.0),
                ));
            }
        }
    }

    if let Some(w) = power_balance(topo, limits.power_balance_tolerance) {
        warnings.push(w);
    }
    Ok(warnings)
}

/// Compares power delivered by sources with power absorbed everywhere else.
fn power_balance(topo: &Topology, tolerance: Scalar) -> Option<ValidationWarning> {
    let (mut delivered, mut absorbed) = (0.0, 0.0);
    for b in &topo.branches {
        if !(is_finite(b.voltage) && is_finite(b.current)) {
            continue;
        }
        let p = real_power(b.voltage, b.current);
        match b.kind {
            BranchKind::VoltageSource | BranchKind::CurrentSource => delivered -= p,
            BranchKind::Passive | BranchKind::Diode => absorbed += p,
        }
    }
    let scale = delivered.abs().max(absorbed.abs());
    if scale <= Scalar::EPSILON {
        return None;
    }
    let mismatch = (delivered - absorbed).abs() / scale;
    (mismatch > tolerance).then(|| {
        ValidationWarning::new(
            WarningKind::PowerBalance,
            format!(
                "sources deliver {delivered:.6e} W but loads absorb {absorbed:.6e} W ({:.2}% apart)",
                mismatch * 100.0
            ),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuits::circuit::{CircuitBuilder, Wire};
    use crate::circuits::component::Component;

    #[test]
    fn empty_circuit_is_rejected() {
        let err = check_inputs(&Circuit::new(), &PlausibilityLimits::default()).unwrap_err();
        assert_eq!(err, StructuralError::EmptyCircuit);
    }

    #[test]
    fn non_finite_value_is_fatal() {
        let mut b = CircuitBuilder::new();
        b.resistor((0.0, 0.0), (100.0, 0.0), Scalar::NAN);
        let err = check_inputs(&b.build(), &PlausibilityLimits::default()).unwrap_err();
        assert!(matches!(err, StructuralError::MalformedBranch { ref label, .. } if label == "R1"));
    }

    #[test]
    fn missing_terminal_is_fatal() {
        let mut c = Circuit::new();
        c.add_component(Component::new(ComponentKind::Resistor, 10.0, vec![(0.0, 0.0).into()]));
        assert!(check_inputs(&c, &PlausibilityLimits::default()).is_err());
    }

    #[test]
    fn suspicious_values_only_warn() {
        let mut b = CircuitBuilder::new();
        b.resistor((0.0, 0.0), (100.0, 0.0), -5.0);
        b.voltage_source((0.0, 0.0), (100.0, 0.0), 5.0e7);
        b.wire(Wire::new((0.0, 0.0), (0.0, 50.0)).with_resistance(-1.0));
        let warnings = check_inputs(&b.build(), &PlausibilityLimits::default()).unwrap();
        assert_eq!(warnings.len(), 3);
        assert!(warnings.iter().all(|w| w.kind == WarningKind::ImplausibleValue));
    }
}
