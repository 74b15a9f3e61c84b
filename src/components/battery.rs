use num_complex::Complex64;

use crate::circuit::{Circuit, ComponentId, Unknown};

use super::ComponentLifecycle;

/// A battery: an ideal voltage source behind a series resistance, whose
/// terminal voltage sags as its tracked charge depletes and whose charge is
/// integrated from the power it delivers each tick.
#[derive(Debug, Clone)]
pub struct Battery {
    pub pin_a: i32,
    pub pin_b: i32,
    pub nominal_voltage: f64,
    pub internal_resistance: f64,
    pub max_charge: f64,
    pub charge: f64,
    pub label: Option<String>,

    /// Internal node between the ideal source and the series resistance.
    v_x: Option<Unknown>,
    branch: Option<Unknown>,

    pub voltage: Complex64,
    pub current: Complex64,
}

impl Battery {
    pub fn new(pin_a: i32, pin_b: i32, nominal_voltage: f64, internal_resistance: f64, max_charge: f64) -> Self {
        Self {
            pin_a,
            pin_b,
            nominal_voltage,
            internal_resistance,
            max_charge,
            charge: max_charge,
            label: None,
            v_x: None,
            branch: None,
            voltage: Complex64::new(0.0, 0.0),
            current: Complex64::new(0.0, 0.0),
        }
    }

    fn admittance(&self) -> Complex64 {
        Complex64::new(1.0, 0.0) / Complex64::new(self.internal_resistance, 0.0)
    }

    fn terminal_voltage(&self) -> f64 {
        if self.max_charge <= 0.0 {
            return 0.0;
        }
        self.nominal_voltage * (self.charge / self.max_charge).clamp(0.0, 1.0)
    }
}

impl ComponentLifecycle for Battery {
    fn add_to(&mut self, circuit: &mut Circuit, _id: ComponentId) {
        self.v_x = Some(circuit.new_internal_unknown());
        self.branch = Some(circuit.new_internal_unknown());
    }

    fn remove_from(&mut self, circuit: &mut Circuit, id: ComponentId) {
        if let Some(branch) = self.branch.take() {
            circuit.free_internal_unknown(&branch);
        }
        if let Some(v_x) = self.v_x.take() {
            circuit.free_internal_unknown(&v_x);
        }
        circuit.remove_node_reference(id, self.pin_a);
        circuit.remove_node_reference(id, self.pin_b);
    }

    fn initialize(&mut self, circuit: &mut Circuit, id: ComponentId) {
        let a = circuit.get_node(id, self.pin_a);
        let b = circuit.get_node(id, self.pin_b);
        let v_x = self.v_x.clone().expect("added before initialize");
        let branch = self.branch.clone().expect("added before initialize");
        // stamp_voltage_source(a, b, i) enforces V(b) - V(a) = v, so the
        // battery's internal node v_x (the source's positive terminal)
        // goes second.
        circuit.stamp_voltage_source(b.as_ref(), Some(&v_x), &branch);
        circuit.add_admittance(Some(&v_x), a.as_ref(), self.admittance());
    }

    fn deinitialize(&mut self, circuit: &mut Circuit, id: ComponentId) {
        let a = circuit.get_node(id, self.pin_a);
        let b = circuit.get_node(id, self.pin_b);
        let v_x = self.v_x.clone().expect("added before deinitialize");
        let branch = self.branch.clone().expect("added before deinitialize");
        circuit.stamp_voltage_source(Some(&v_x), b.as_ref(), &branch);
        circuit.add_admittance(Some(&v_x), a.as_ref(), -self.admittance());
    }

    fn update_state(&mut self, circuit: &mut Circuit, _id: ComponentId) {
        let branch = self.branch.clone().expect("added before update_state");
        circuit.set_voltage(&branch, Complex64::new(self.terminal_voltage(), 0.0));
    }

    fn apply_state(&mut self, circuit: &mut Circuit, id: ComponentId) {
        let a = circuit.get_node(id, self.pin_a);
        let b = circuit.get_node(id, self.pin_b);
        let v = circuit.voltage(a.as_ref()) - circuit.voltage(b.as_ref());
        let branch = self.branch.clone().expect("added before apply_state");
        let i = circuit.voltage(Some(&branch));
        self.voltage = v;
        self.current = i;

        let power = (v * i.conj()).re;
        self.charge = (self.charge - power * circuit.time_delta()).clamp(0.0, self.max_charge);
    }

    fn uses_connection(&self, pin: i32) -> bool {
        pin == self.pin_a || pin == self.pin_b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Component, Resistor};
    use approx::assert_relative_eq;

    #[test]
    fn delivering_current_depletes_charge() {
        let mut circuit = Circuit::new(1.0);
        let bat = circuit.add_component(Component::Battery(Battery::new(0, -1, 12.0, 1.0, 36000.0)));
        circuit.add_component(Component::Resistor(Resistor::new(0, -1, 12.0)));
        circuit.process_tick();

        if let Some(Component::Battery(b)) = circuit.component(bat) {
            assert!(b.charge < 36000.0);
            assert_relative_eq!(b.current.re, 12.0 / 13.0, epsilon = 1e-3);
        } else {
            panic!("expected battery");
        }
    }
}
