use num_complex::Complex64;

use crate::circuit::{Circuit, ComponentId};
use crate::solver::G_MIN;

use super::ComponentLifecycle;

/// Ambient temperature (K) a line is assumed to equilibrate toward absent
/// dissipated power.
const AMBIENT_TEMPERATURE: f64 = 293.0;
/// Per-tick thermal step clamp (K); keeps a single large `update_state` call
/// (e.g. after a long pause) from producing an unphysical temperature jump.
const MAX_TEMPERATURE_STEP: f64 = 10.0;
/// Cable-break candidacy threshold (K); see [`break_probability`].
const BREAK_ONSET_TEMPERATURE: f64 = 373.0;
/// Temperature span over which break probability ramps from 0 to 1.
const BREAK_RAMP_SPAN: f64 = 50.0;

/// A resistor with thermal state: it dissipates power like a resistor, but
/// also integrates a temperature that rises with dissipation and falls with
/// passive cooling, for a host-side "cable supervisor" to monitor.
#[derive(Debug, Clone)]
pub struct Line {
    pub pin_a: i32,
    pub pin_b: i32,
    pub resistance: f64,
    pub specific_heat: f64,
    pub dissipation_capacity: f64,
    pub temperature: f64,
    pub label: Option<String>,

    pub voltage: Complex64,
    pub current: Complex64,
    pub power_dissipated: f64,
}

impl Line {
    pub fn new(pin_a: i32, pin_b: i32, resistance: f64, specific_heat: f64, dissipation_capacity: f64) -> Self {
        Self {
            pin_a,
            pin_b,
            resistance,
            specific_heat,
            dissipation_capacity,
            temperature: AMBIENT_TEMPERATURE,
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

impl ComponentLifecycle for Line {
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

        let cooling = (self.dissipation_capacity * (self.temperature - AMBIENT_TEMPERATURE)).max(0.0);
        let d_energy = (self.power_dissipated - cooling) * circuit.time_delta();
        let d_temp = (d_energy / self.specific_heat).clamp(-MAX_TEMPERATURE_STEP, MAX_TEMPERATURE_STEP);
        self.temperature += d_temp;
    }

    fn uses_connection(&self, pin: i32) -> bool {
        pin == self.pin_a || pin == self.pin_b
    }
}

/// Probability that a line breaks this tick, ramping from 0 at
/// [`BREAK_ONSET_TEMPERATURE`] to 1 at `BREAK_ONSET_TEMPERATURE +
/// BREAK_RAMP_SPAN`. A placeholder chosen for gameplay feel rather than a
/// physical model; not part of the solver's contract. Not called from
/// anywhere in this crate — the orchestrator decides when to invoke it.
pub fn break_probability(temperature: f64) -> f64 {
    ((temperature - BREAK_ONSET_TEMPERATURE) / BREAK_RAMP_SPAN).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Component, VoltageSource};
    use approx::assert_relative_eq;

    #[test]
    fn dissipation_raises_temperature_above_ambient() {
        let mut circuit = Circuit::new(1.0);
        circuit.add_component(Component::VoltageSource(VoltageSource::new(0, -1, 100.0, 0.0)));
        let l = circuit.add_component(Component::Line(Line::new(0, -1, 1.0, 50.0, 0.01)));

        for _ in 0..20 {
            circuit.process_tick();
        }

        if let Some(Component::Line(line)) = circuit.component(l) {
            assert!(line.temperature > AMBIENT_TEMPERATURE);
        } else {
            panic!("expected line");
        }
    }

    #[test]
    fn break_probability_ramps_between_onset_and_span() {
        assert_relative_eq!(break_probability(373.0), 0.0);
        assert_relative_eq!(break_probability(423.0), 1.0);
        assert_relative_eq!(break_probability(398.0), 0.5);
        assert_relative_eq!(break_probability(300.0), 0.0);
    }
}
