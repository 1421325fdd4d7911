//! The circuit container: ordered components and wires.
//!
//! Mutation operations return what they changed (new ids, removed elements)
//! instead of emitting notifications; callers that need to react do so on the
//! returned value.

use crate::math::Scalar;

use super::component::{Component, ComponentId, LabelSequence, Position, WireId};

/// A conductor between two points, optionally routed through junctions.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Wire {
    /// Identifier assigned by the owning circuit.
    pub id: WireId,
    /// First endpoint.
    pub start: Position,
    /// Second endpoint.
    pub end: Position,
    /// Intermediate junction points; each one is also a connection point.
    pub junctions: Vec<Position>,
    /// Series resistance (Ω). Below the ideal epsilon the wire is a short.
    pub resistance: Scalar,
    /// Series inductance (H).
    pub inductance: Scalar,
    /// Shunt capacitance (F); reported only, not stamped.
    pub capacitance: Scalar,
    /// Conductor cross-section (mm²) used for current-density checks.
    pub cross_section_mm2: Scalar,
    /// Solved current from `start` to `end`; written after a valid analysis.
    pub current: num_complex::Complex<Scalar>,
}

impl Wire {
    /// Creates an ideal wire.
    #[must_use]
    pub fn new(start: impl Into<Position>, end: impl Into<Position>) -> Self {
        Self {
            id: WireId::default(),
            start: start.into(),
            end: end.into(),
            junctions: Vec::new(),
            resistance: 0.0,
            inductance: 0.0,
            capacitance: 0.0,
            cross_section_mm2: 1.0,
            current: num_complex::Complex::new(0.0, 0.0),
        }
    }

    /// Sets the wire resistance.
    #[must_use]
    pub const fn with_resistance(mut self, ohms: Scalar) -> Self {
        self.resistance = ohms;
        self
    }

    /// Sets the wire inductance.
    #[must_use]
    pub const fn with_inductance(mut self, henries: Scalar) -> Self {
        self.inductance = henries;
        self
    }

    /// Adds an intermediate junction.
    #[must_use]
    pub fn with_junction(mut self, at: impl Into<Position>) -> Self {
        self.junctions.push(at.into());
        self
    }

    /// Sets the conductor cross-section.
    #[must_use]
    pub const fn with_cross_section(mut self, mm2: Scalar) -> Self {
        self.cross_section_mm2 = mm2;
        self
    }

    /// Every connection point of the wire: start, junctions, end.
    pub fn points(&self) -> impl Iterator<Item = &Position> {
        std::iter::once(&self.start)
            .chain(self.junctions.iter())
            .chain(std::iter::once(&self.end))
    }
}

/// Ordered collection of components and wires.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Circuit {
    components: Vec<Component>,
    wires: Vec<Wire>,
    next_component: u32,
    next_wire: u32,
}

impl Circuit {
    /// Creates an empty circuit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a component, assigning its id (and a fallback label), and returns the id.
    pub fn add_component(&mut self, mut component: Component) -> ComponentId {
        self.next_component += 1;
        let id = ComponentId(self.next_component);
        component.id = id;
        if component.label.is_empty() {
            component.label = format!("{}#{}", component.kind.label_prefix(), id.0);
        }
        self.components.push(component);
        id
    }

    /// Adds a wire and returns its id.
    pub fn add_wire(&mut self, mut wire: Wire) -> WireId {
        self.next_wire += 1;
        let id = WireId(self.next_wire);
        wire.id = id;
        self.wires.push(wire);
        id
    }

    /// Removes a component, returning it.
    pub fn remove_component(&mut self, id: ComponentId) -> Option<Component> {
        let idx = self.components.iter().position(|c| c.id == id)?;
        Some(self.components.remove(idx))
    }

    /// Removes a wire, returning it.
    pub fn remove_wire(&mut self, id: WireId) -> Option<Wire> {
        let idx = self.wires.iter().position(|w| w.id == id)?;
        Some(self.wires.remove(idx))
    }

    /// Components in insertion order.
    #[must_use]
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Wires in insertion order.
    #[must_use]
    pub fn wires(&self) -> &[Wire] {
        &self.wires
    }

    /// Looks up a component.
    #[must_use]
    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.components.iter().find(|c| c.id == id)
    }

    /// Mutable lookup; edits invalidate cached results through the fingerprint.
    pub fn component_mut(&mut self, id: ComponentId) -> Option<&mut Component> {
        self.components.iter_mut().find(|c| c.id == id)
    }

    /// Looks up a component by label.
    #[must_use]
    pub fn component_by_label(&self, label: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.label == label)
    }

    /// Looks up a wire.
    #[must_use]
    pub fn wire(&self, id: WireId) -> Option<&Wire> {
        self.wires.iter().find(|w| w.id == id)
    }

    pub(crate) fn components_mut(&mut self) -> &mut [Component] {
        &mut self.components
    }

    pub(crate) fn wires_mut(&mut self) -> &mut [Wire] {
        &mut self.wires
    }

    /// True when the circuit holds no components and no wires.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty() && self.wires.is_empty()
    }
}

/// Convenience builder labelling components from a session-scoped [`LabelSequence`].
#[derive(Debug, Default)]
pub struct CircuitBuilder {
    circuit: Circuit,
    labels: LabelSequence,
}

impl CircuitBuilder {
    /// Starts a new building session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a component, labelling it if it has no label yet.
    pub fn add(&mut self, mut component: Component) -> ComponentId {
        if component.label.is_empty() {
            component.label = self.labels.next_label(component.kind);
        }
        self.circuit.add_component(component)
    }

    /// Adds a resistor.
    pub fn resistor(&mut self, a: impl Into<Position>, b: impl Into<Position>, ohms: Scalar) -> ComponentId {
        self.add(Component::resistor(a, b, ohms))
    }

    /// Adds a voltage source with `pos` as terminal 0.
    pub fn voltage_source(
        &mut self,
        pos: impl Into<Position>,
        neg: impl Into<Position>,
        volts: Scalar,
    ) -> ComponentId {
        self.add(Component::voltage_source(pos, neg, volts))
    }

    /// Adds a current source pushing current out of `out`.
    pub fn current_source(
        &mut self,
        out: impl Into<Position>,
        back: impl Into<Position>,
        amps: Scalar,
    ) -> ComponentId {
        self.add(Component::current_source(out, back, amps))
    }

    /// Adds a capacitor.
    pub fn capacitor(&mut self, a: impl Into<Position>, b: impl Into<Position>, farads: Scalar) -> ComponentId {
        self.add(Component::capacitor(a, b, farads))
    }

    /// Adds an inductor.
    pub fn inductor(&mut self, a: impl Into<Position>, b: impl Into<Position>, henries: Scalar) -> ComponentId {
        self.add(Component::inductor(a, b, henries))
    }

    /// Adds a diode.
    pub fn diode(&mut self, anode: impl Into<Position>, cathode: impl Into<Position>) -> ComponentId {
        self.add(Component::diode(anode, cathode))
    }

    /// Adds a ground symbol.
    pub fn ground(&mut self, at: impl Into<Position>) -> ComponentId {
        self.add(Component::ground(at))
    }

    /// Adds a wire.
    pub fn wire(&mut self, wire: Wire) -> WireId {
        self.circuit.add_wire(wire)
    }

    /// Finishes the session.
    #[must_use]
    pub fn build(self) -> Circuit {
        self.circuit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_and_labels_are_assigned() {
        let mut b = CircuitBuilder::new();
        let v = b.voltage_source((0.0, 0.0), (0.0, 100.0), 5.0);
        let r1 = b.resistor((0.0, 0.0), (100.0, 0.0), 10.0);
        let r2 = b.resistor((100.0, 0.0), (0.0, 100.0), 10.0);
        let c = b.build();
        assert_eq!(c.component(v).unwrap().label, "V1");
        assert_eq!(c.component(r1).unwrap().label, "R1");
        assert_eq!(c.component(r2).unwrap().label, "R2");
        assert_ne!(r1, r2);
    }

    #[test]
    fn remove_returns_the_element() {
        let mut c = Circuit::new();
        let id = c.add_component(Component::resistor((0.0, 0.0), (1.0, 0.0), 1.0));
        let w = c.add_wire(Wire::new((0.0, 0.0), (5.0, 5.0)));
        assert_eq!(c.remove_component(id).unwrap().id, id);
        assert!(c.remove_component(id).is_none());
        assert_eq!(c.remove_wire(w).unwrap().id, w);
        assert!(c.is_empty());
    }

    #[test]
    fn wire_points_include_junctions() {
        let w = Wire::new((0.0, 0.0), (20.0, 0.0)).with_junction((10.0, 0.0));
        assert_eq!(w.points().count(), 3);
    }
}
