use num_complex::Complex64;

use crate::circuit::{Circuit, ComponentId, Unknown};

use super::ComponentLifecycle;

/// An inductor: reactance stamp at AC, backward-Euler companion branch at DC.
///
/// The DC branch current is a solver unknown allocated only while the
/// inductor is actually in the DC regime, so switching between AC and DC
/// (frequency changing at runtime) grows or shrinks the solver instead of
/// carrying a dead unknown.
#[derive(Debug, Clone)]
pub struct Inductor {
    pub pin_a: i32,
    pub pin_b: i32,
    pub inductance: f64,
    pub label: Option<String>,

    is_ac: bool,
    branch: Option<Unknown>,
    i_prev: Complex64,

    pub voltage: Complex64,
    pub current: Complex64,
    pub energy: f64,
}

impl Inductor {
    pub fn new(pin_a: i32, pin_b: i32, inductance: f64) -> Self {
        Self {
            pin_a,
            pin_b,
            inductance,
            is_ac: false,
            branch: None,
            i_prev: Complex64::new(0.0, 0.0),
            voltage: Complex64::new(0.0, 0.0),
            current: Complex64::new(0.0, 0.0),
            energy: 0.0,
        }
    }

    fn reactance(&self, frequency: f64) -> f64 {
        2.0 * std::f64::consts::PI * frequency * self.inductance
    }

    fn companion_resistance(&self, dt: f64) -> f64 {
        self.inductance / dt
    }
}

impl ComponentLifecycle for Inductor {
    fn add_to(&mut self, _circuit: &mut Circuit, _id: ComponentId) {}

    fn remove_from(&mut self, circuit: &mut Circuit, id: ComponentId) {
        if let Some(branch) = self.branch.take() {
            circuit.free_internal_unknown(&branch);
        }
        circuit.remove_node_reference(id, self.pin_a);
        circuit.remove_node_reference(id, self.pin_b);
    }

    fn initialize(&mut self, circuit: &mut Circuit, id: ComponentId) {
        let was_ac = self.is_ac;
        self.is_ac = circuit.frequency() != 0.0;
        let a = circuit.get_node(id, self.pin_a);
        let b = circuit.get_node(id, self.pin_b);
        if self.is_ac {
            circuit.add_reactance(a.as_ref(), b.as_ref(), self.reactance(circuit.frequency()));
        } else {
            if was_ac || self.branch.is_none() {
                self.branch = Some(circuit.new_internal_unknown());
            }
            let branch = self.branch.clone().expect("allocated above");
            // stamp_voltage_source(a, b, i) enforces V(b) - V(a) = v, so
            // pin_a (the declared positive terminal) goes second.
            circuit.stamp_voltage_source(b.as_ref(), a.as_ref(), &branch);
        }
    }

    fn deinitialize(&mut self, circuit: &mut Circuit, id: ComponentId) {
        let a = circuit.get_node(id, self.pin_a);
        let b = circuit.get_node(id, self.pin_b);
        if self.is_ac {
            circuit.add_reactance(a.as_ref(), b.as_ref(), -self.reactance(circuit.frequency()));
        } else if let Some(branch) = self.branch.clone() {
            circuit.stamp_voltage_source(a.as_ref(), b.as_ref(), &branch);
            if circuit.frequency() != 0.0 {
                // regime is about to flip to AC: this branch unknown is no
                // longer needed.
                circuit.free_internal_unknown(&branch);
                self.branch = None;
            }
        }
    }

    fn update_state(&mut self, circuit: &mut Circuit, _id: ComponentId) {
        if self.is_ac {
            return;
        }
        let Some(branch) = self.branch.clone() else { return };
        let v_eq = Complex64::new(self.companion_resistance(circuit.time_delta()), 0.0) * self.i_prev;
        circuit.set_voltage(&branch, v_eq);
    }

    fn apply_state(&mut self, circuit: &mut Circuit, id: ComponentId) {
        let a = circuit.get_node(id, self.pin_a);
        let b = circuit.get_node(id, self.pin_b);
        let v = circuit.voltage(a.as_ref()) - circuit.voltage(b.as_ref());
        self.voltage = v;
        if self.is_ac {
            self.current = v / Complex64::new(0.0, self.reactance(circuit.frequency()));
        } else if let Some(branch) = self.branch.clone() {
            self.current = circuit.voltage(Some(&branch));
            self.i_prev = self.current;
        }
        self.energy = 0.5 * self.inductance * self.current.norm_sqr();
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
    fn dc_current_ramps_up_toward_steady_state() {
        let mut circuit = Circuit::new(0.001);
        circuit.add_component(Component::VoltageSource(VoltageSource::new(0, -1, 10.0, 0.0)));
        let l = circuit.add_component(Component::Inductor(Inductor::new(0, -1, 1e-3)));

        for _ in 0..5000 {
            circuit.process_tick();
        }

        if let Some(Component::Inductor(ind)) = circuit.component(l) {
            assert!(ind.current.re > 1.0);
        } else {
            panic!("expected inductor");
        }
    }
}
