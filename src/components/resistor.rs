use num_complex::Complex64;

use crate::circuit::{Circuit, ComponentId};
use crate::solver::G_MIN;

use super::ComponentLifecycle;

/// A linear resistor between two pins.
#[derive(Debug, Clone)]
pub struct Resistor {
    pub pin_a: i32,
    pub pin_b: i32,
    pub resistance: f64,
    pub label: Option<String>,

    /// `V(a) - V(b)` from the most recent `apply_state`.
    pub voltage: Complex64,
    /// Current flowing from `a` to `b`.
    pub current: Complex64,
    pub power_dissipated: f64,
}

impl Resistor {
    pub fn new(pin_a: i32, pin_b: i32, resistance: f64) -> Self {
        Self {
            pin_a,
            pin_b,
            resistance,
            label: None,
            voltage: Complex64::new(0.0, 0.0),
            current: Complex64::new(0.0, 0.0),
            power_dissipated: 0.0,
        }
    }

    fn admittance(&self) -> Complex64 {
        Complex64::new(1.0, 0.0) / Complex64::new(self.resistance, 0.0)
    }
}

impl ComponentLifecycle for Resistor {
    fn add_to(&mut self, _circuit: &mut Circuit, _id: ComponentId) {}

    fn remove_from(&mut self, circuit: &mut Circuit, id: ComponentId) {
        circuit.remove_node_reference(id, self.pin_a);
        circuit.remove_node_reference(id, self.pin_b);
    }

    fn initialize(&mut self, circuit: &mut Circuit, id: ComponentId) {
        let a = circuit.get_node(id, self.pin_a);
        let b = circuit.get_node(id, self.pin_b);
        let g_min = Complex64::new(G_MIN, 0.0);
        circuit.add_admittance(a.as_ref(), None, g_min);
        circuit.add_admittance(b.as_ref(), None, g_min);
        circuit.add_admittance(a.as_ref(), b.as_ref(), self.admittance());
    }

    fn deinitialize(&mut self, circuit: &mut Circuit, id: ComponentId) {
        let a = circuit.get_node(id, self.pin_a);
        let b = circuit.get_node(id, self.pin_b);
        let g_min = Complex64::new(-G_MIN, 0.0);
        circuit.add_admittance(a.as_ref(), None, g_min);
        circuit.add_admittance(b.as_ref(), None, g_min);
        circuit.add_admittance(a.as_ref(), b.as_ref(), -self.admittance());
    }

    fn update_state(&mut self, _circuit: &mut Circuit, _id: ComponentId) {}

    fn apply_state(&mut self, circuit: &mut Circuit, id: ComponentId) {
        let a = circuit.get_node(id, self.pin_a);
        let b = circuit.get_node(id, self.pin_b);
        let v = circuit.voltage(a.as_ref()) - circuit.voltage(b.as_ref());
        let i = v * self.admittance();
        self.voltage = v;
        self.current = i;
        self.power_dissipated = (v * i.conj()).re;
    }

    fn uses_connection(&self, pin: i32) -> bool {
        pin == self.pin_a || pin == self.pin_b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Component, VoltageSource};
    use approx::assert_relative_eq;

    #[test]
    fn dissipated_power_matches_ohms_law() {
        let mut circuit = Circuit::new(0.5);
        circuit.add_component(Component::VoltageSource(VoltageSource::new(0, -1, 10.0, 0.0)));
        let r = circuit.add_component(Component::Resistor(Resistor::new(0, -1, 5.0)));
        circuit.process_tick();

        if let Some(Component::Resistor(resistor)) = circuit.component(r) {
            assert_relative_eq!(resistor.current.re, 2.0, epsilon = 1e-6);
            assert_relative_eq!(resistor.power_dissipated, 20.0, epsilon = 1e-6);
        } else {
            panic!("expected resistor");
        }
    }
}
