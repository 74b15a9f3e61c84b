use num_complex::Complex64;

use crate::circuit::{Circuit, ComponentId};

use super::ComponentLifecycle;

/// A capacitor: reactance stamp at AC, backward-Euler companion model at DC.
#[derive(Debug, Clone)]
pub struct Capacitor {
    pub pin_a: i32,
    pub pin_b: i32,
    pub capacitance: f64,
    pub label: Option<String>,

    /// `V(a) - V(b)` held from the previous tick, used to build this tick's
    /// backward-Euler equivalent current source.
    v_prev: Complex64,
    is_ac: bool,

    pub voltage: Complex64,
    pub current: Complex64,
    pub charge: f64,
    pub energy: f64,
}

impl Capacitor {
    pub fn new(pin_a: i32, pin_b: i32, capacitance: f64) -> Self {
        Self {
            pin_a,
            pin_b,
            capacitance,
            v_prev: Complex64::new(0.0, 0.0),
            is_ac: false,
            voltage: Complex64::new(0.0, 0.0),
            current: Complex64::new(0.0, 0.0),
            charge: 0.0,
            energy: 0.0,
        }
    }

    fn reactance(&self, frequency: f64) -> f64 {
        -1.0 / (2.0 * std::f64::consts::PI * frequency * self.capacitance)
    }

    fn companion_admittance(&self, dt: f64) -> Complex64 {
        Complex64::new(self.capacitance / dt, 0.0)
    }
}

impl ComponentLifecycle for Capacitor {
    fn add_to(&mut self, _circuit: &mut Circuit, _id: ComponentId) {}

    fn remove_from(&mut self, circuit: &mut Circuit, id: ComponentId) {
        circuit.remove_node_reference(id, self.pin_a);
        circuit.remove_node_reference(id, self.pin_b);
    }

    fn initialize(&mut self, circuit: &mut Circuit, id: ComponentId) {
        self.is_ac = circuit.frequency() != 0.0;
        let a = circuit.get_node(id, self.pin_a);
        let b = circuit.get_node(id, self.pin_b);
        if self.is_ac {
            circuit.add_reactance(a.as_ref(), b.as_ref(), self.reactance(circuit.frequency()));
        } else {
            circuit.add_admittance(a.as_ref(), b.as_ref(), self.companion_admittance(circuit.time_delta()));
        }
    }

    fn deinitialize(&mut self, circuit: &mut Circuit, id: ComponentId) {
        let a = circuit.get_node(id, self.pin_a);
        let b = circuit.get_node(id, self.pin_b);
        if self.is_ac {
            circuit.add_reactance(a.as_ref(), b.as_ref(), -self.reactance(circuit.frequency()));
        } else {
            circuit.add_admittance(a.as_ref(), b.as_ref(), -self.companion_admittance(circuit.time_delta()));
        }
    }

    fn update_state(&mut self, circuit: &mut Circuit, id: ComponentId) {
        if self.is_ac {
            return;
        }
        let a = circuit.get_node(id, self.pin_a);
        let b = circuit.get_node(id, self.pin_b);
        let i_eq = self.companion_admittance(circuit.time_delta()) * self.v_prev;
        circuit.add_current(a.as_ref(), b.as_ref(), i_eq);
    }

    fn apply_state(&mut self, circuit: &mut Circuit, id: ComponentId) {
        let a = circuit.get_node(id, self.pin_a);
        let b = circuit.get_node(id, self.pin_b);
        let v = circuit.voltage(a.as_ref()) - circuit.voltage(b.as_ref());
        self.voltage = v;
        if self.is_ac {
            self.current = v / Complex64::new(0.0, self.reactance(circuit.frequency()));
        } else {
            self.charge = self.capacitance * v.re;
            self.energy = 0.5 * self.charge * self.charge / self.capacitance;
            self.current = self.companion_admittance(circuit.time_delta()) * (v - self.v_prev);
            self.v_prev = v;
        }
    }

    fn uses_connection(&self, pin: i32) -> bool {
        pin == self.pin_a || pin == self.pin_b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Component, VoltageSource};

    #[test]
    fn dc_companion_charges_toward_source_voltage() {
        let mut circuit = Circuit::new(0.01);
        circuit.add_component(Component::VoltageSource(VoltageSource::new(0, -1, 5.0, 0.0)));
        let c = circuit.add_component(Component::Capacitor(Capacitor::new(0, -1, 1e-3)));

        for _ in 0..500 {
            circuit.process_tick();
        }

        if let Some(Component::Capacitor(cap)) = circuit.component(c) {
            assert!((cap.voltage.re - 5.0).abs() < 1e-2);
        } else {
            panic!("expected capacitor");
        }
    }
}
