use num_complex::Complex64;

use crate::circuit::{Circuit, ComponentId, Unknown};

use super::ComponentLifecycle;

/// An ideal voltage source, optionally driving the circuit's AC frequency.
#[derive(Debug, Clone)]
pub struct VoltageSource {
    pub pin_a: i32,
    pub pin_b: i32,
    /// Magnitude (volts, or phasor magnitude at `frequency`).
    pub voltage: f64,
    /// Phase in radians, meaningful only when `frequency != 0`.
    pub phase: f64,
    /// Angular-source frequency in Hz; `0.0` means DC.
    pub frequency: f64,
    pub label: Option<String>,

    branch: Option<Unknown>,
    /// Solved branch current (flows from `b` to `a` externally).
    pub current: Complex64,
}

impl VoltageSource {
    pub fn new(pin_a: i32, pin_b: i32, voltage: f64, frequency: f64) -> Self {
        Self {
            pin_a,
            pin_b,
            voltage,
            phase: 0.0,
            frequency,
            label: None,
            branch: None,
            current: Complex64::new(0.0, 0.0),
        }
    }

    pub fn with_phase(mut self, phase: f64) -> Self {
        self.phase = phase;
        self
    }

    pub fn declared_frequency(&self) -> Option<f64> {
        (self.frequency != 0.0).then_some(self.frequency)
    }

    fn phasor(&self) -> Complex64 {
        Complex64::from_polar(self.voltage, self.phase)
    }
}

impl ComponentLifecycle for VoltageSource {
    fn add_to(&mut self, circuit: &mut Circuit, _id: ComponentId) {
        self.branch = Some(circuit.new_internal_unknown());
    }

    fn remove_from(&mut self, circuit: &mut Circuit, id: ComponentId) {
        if let Some(branch) = self.branch.take() {
            circuit.free_internal_unknown(&branch);
        }
        circuit.remove_node_reference(id, self.pin_a);
        circuit.remove_node_reference(id, self.pin_b);
    }

    fn initialize(&mut self, circuit: &mut Circuit, id: ComponentId) {
        let a = circuit.get_node(id, self.pin_a);
        let b = circuit.get_node(id, self.pin_b);
        let branch = self.branch.clone().expect("added before initialize");
        // stamp_voltage_source(a, b, i) enforces V(b) - V(a) = v, so pin_a
        // (the declared positive terminal) goes second.
        circuit.stamp_voltage_source(b.as_ref(), a.as_ref(), &branch);
    }

    fn deinitialize(&mut self, circuit: &mut Circuit, id: ComponentId) {
        // stamp_voltage_source(a, b, i) is its own inverse under swapping a
        // and b: applying it once more with pins exchanged cancels every
        // term the forward stamp added.
        let a = circuit.get_node(id, self.pin_a);
        let b = circuit.get_node(id, self.pin_b);
        let branch = self.branch.clone().expect("added before deinitialize");
        circuit.stamp_voltage_source(a.as_ref(), b.as_ref(), &branch);
    }

    fn update_state(&mut self, circuit: &mut Circuit, _id: ComponentId) {
        let branch = self.branch.clone().expect("added before update_state");
        circuit.set_voltage(&branch, self.phasor());
    }

    fn apply_state(&mut self, circuit: &mut Circuit, _id: ComponentId) {
        let branch = self.branch.clone().expect("added before apply_state");
        self.current = circuit.voltage(Some(&branch));
    }

    fn uses_connection(&self, pin: i32) -> bool {
        pin == self.pin_a || pin == self.pin_b
    }
}

/// A non-ideal current source with internal (parallel) resistance.
#[derive(Debug, Clone)]
pub struct CurrentSource {
    pub pin_a: i32,
    pub pin_b: i32,
    pub current_setting: f64,
    pub internal_resistance: f64,
    pub frequency: f64,
    pub label: Option<String>,

    pub voltage: Complex64,
    pub current_draw: Complex64,
    pub power_draw: f64,
}

impl CurrentSource {
    pub fn new(pin_a: i32, pin_b: i32, current_setting: f64, internal_resistance: f64) -> Self {
        Self {
            pin_a,
            pin_b,
            current_setting,
            internal_resistance,
            frequency: 0.0,
            label: None,
            voltage: Complex64::new(0.0, 0.0),
            current_draw: Complex64::new(0.0, 0.0),
            power_draw: 0.0,
        }
    }

    pub fn declared_frequency(&self) -> Option<f64> {
        (self.frequency != 0.0).then_some(self.frequency)
    }

    fn admittance(&self) -> Option<Complex64> {
        (self.internal_resistance != 0.0)
            .then(|| Complex64::new(1.0, 0.0) / Complex64::new(self.internal_resistance, 0.0))
    }
}

impl ComponentLifecycle for CurrentSource {
    fn add_to(&mut self, _circuit: &mut Circuit, _id: ComponentId) {}

    fn remove_from(&mut self, circuit: &mut Circuit, id: ComponentId) {
        circuit.remove_node_reference(id, self.pin_a);
        circuit.remove_node_reference(id, self.pin_b);
    }

    fn initialize(&mut self, circuit: &mut Circuit, id: ComponentId) {
        if let Some(y) = self.admittance() {
            let a = circuit.get_node(id, self.pin_a);
            let b = circuit.get_node(id, self.pin_b);
            circuit.add_admittance(a.as_ref(), b.as_ref(), y);
        }
    }

    fn deinitialize(&mut self, circuit: &mut Circuit, id: ComponentId) {
        if let Some(y) = self.admittance() {
            let a = circuit.get_node(id, self.pin_a);
            let b = circuit.get_node(id, self.pin_b);
            circuit.add_admittance(a.as_ref(), b.as_ref(), -y);
        }
    }

    fn update_state(&mut self, circuit: &mut Circuit, id: ComponentId) {
        let a = circuit.get_node(id, self.pin_a);
        let b = circuit.get_node(id, self.pin_b);
        circuit.add_current(a.as_ref(), b.as_ref(), Complex64::new(self.current_setting, 0.0));
    }

    fn apply_state(&mut self, circuit: &mut Circuit, id: ComponentId) {
        let a = circuit.get_node(id, self.pin_a);
        let b = circuit.get_node(id, self.pin_b);
        let v = circuit.voltage(b.as_ref()) - circuit.voltage(a.as_ref());
        let i_draw = if self.internal_resistance != 0.0 {
            Complex64::new(self.current_setting, 0.0) - v / Complex64::new(self.internal_resistance, 0.0)
        } else {
            Complex64::new(self.current_setting, 0.0)
        };
        self.voltage = v;
        self.current_draw = i_draw;
        self.power_draw = (v * i_draw.conj()).re;
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

    /// Reference scenario 2 (spec §8): current-source load.
    #[test]
    fn current_source_load() {
        let mut circuit = Circuit::new(0.5);
        circuit.add_component(Component::VoltageSource(VoltageSource::new(0, -1, 24.0, 0.0)));
        let r = circuit.add_component(Component::Resistor(Resistor::new(0, 1, 400.0)));
        circuit.add_component(Component::CurrentSource(CurrentSource::new(1, -1, 0.05, 0.0)));
        circuit.process_tick();

        let n0 = circuit.get_node(r, 0).unwrap();
        let n1 = circuit.get_node(r, 1).unwrap();
        assert_relative_eq!(circuit.voltage(Some(&n0)).re, 24.0, epsilon = 1e-6);
        assert_relative_eq!(circuit.voltage(Some(&n1)).re, 4.0, epsilon = 1e-6);
    }
}
