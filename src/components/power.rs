use num_complex::Complex64;

use crate::circuit::{Circuit, ComponentId};

use super::{ComponentLifecycle, NonLinear};

/// A current source sized so its nominal operating point sits at the peak
/// of its delivered-power curve (maximum power transfer into a matched
/// load).
#[derive(Debug, Clone)]
pub struct PowerSource {
    pub pin_a: i32,
    pub pin_b: i32,
    pub nominal_voltage: f64,
    pub nominal_power: f64,
    pub power_setting: f64,
    pub label: Option<String>,

    pub voltage: Complex64,
    pub current_draw: Complex64,
    pub power_draw: f64,
    pub energy_output: f64,
}

impl PowerSource {
    pub fn new(pin_a: i32, pin_b: i32, nominal_voltage: f64, nominal_power: f64) -> Self {
        Self {
            pin_a,
            pin_b,
            nominal_voltage,
            nominal_power,
            power_setting: nominal_power,
            label: None,
            voltage: Complex64::new(0.0, 0.0),
            current_draw: Complex64::new(0.0, 0.0),
            power_draw: 0.0,
            energy_output: 0.0,
        }
    }

    fn internal_resistance(&self) -> f64 {
        self.nominal_voltage * self.nominal_voltage / (2.0 * self.nominal_power)
    }

    fn admittance(&self) -> Complex64 {
        Complex64::new(1.0, 0.0) / Complex64::new(self.internal_resistance(), 0.0)
    }

    fn source_current(&self) -> f64 {
        2.0 * self.power_setting / self.nominal_voltage
    }
}

impl ComponentLifecycle for PowerSource {
    fn add_to(&mut self, _circuit: &mut Circuit, _id: ComponentId) {}

    fn remove_from(&mut self, circuit: &mut Circuit, id: ComponentId) {
        circuit.remove_node_reference(id, self.pin_a);
        circuit.remove_node_reference(id, self.pin_b);
    }

    fn initialize(&mut self, circuit: &mut Circuit, id: ComponentId) {
        let a = circuit.get_node(id, self.pin_a);
        let b = circuit.get_node(id, self.pin_b);
        circuit.add_admittance(a.as_ref(), b.as_ref(), self.admittance());
    }

    fn deinitialize(&mut self, circuit: &mut Circuit, id: ComponentId) {
        let a = circuit.get_node(id, self.pin_a);
        let b = circuit.get_node(id, self.pin_b);
        circuit.add_admittance(a.as_ref(), b.as_ref(), -self.admittance());
    }

    fn update_state(&mut self, circuit: &mut Circuit, id: ComponentId) {
        let a = circuit.get_node(id, self.pin_a);
        let b = circuit.get_node(id, self.pin_b);
        circuit.add_current(a.as_ref(), b.as_ref(), Complex64::new(self.source_current(), 0.0));
    }

    fn apply_state(&mut self, circuit: &mut Circuit, id: ComponentId) {
        let a = circuit.get_node(id, self.pin_a);
        let b = circuit.get_node(id, self.pin_b);
        let v = circuit.voltage(b.as_ref()) - circuit.voltage(a.as_ref());
        let i_draw = Complex64::new(self.source_current(), 0.0) - v * self.admittance();
        self.voltage = v;
        self.current_draw = i_draw;
        self.power_draw = (v * i_draw.conj()).re;
        self.energy_output = self.power_draw * circuit.time_delta();
    }

    fn uses_connection(&self, pin: i32) -> bool {
        pin == self.pin_a || pin == self.pin_b
    }
}

/// The range a sink's terminal voltage falls into, latched once per tick
/// (at the start of the NR sequence) to avoid mid-tick discontinuities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadRegime {
    OutOfRange,
    Resistive,
    ConstantPower,
}

/// A non-linear load with a piecewise current/voltage characteristic:
/// cut off outside `[V_min, V_max]`, resistive below `V_nom`, constant-power
/// above it.
#[derive(Debug, Clone)]
pub struct PowerSink {
    pub pin_a: i32,
    pub pin_b: i32,
    pub target_power: f64,
    pub v_min: f64,
    pub v_nom: f64,
    pub v_max: f64,
    pub inductance: Option<f64>,
    pub label: Option<String>,

    regime: LoadRegime,

    pub voltage: Complex64,
    pub current_draw: Complex64,
    pub power_delivered: f64,
    pub power_factor: f64,
    pub energy_input: f64,
}

impl PowerSink {
    pub fn new(pin_a: i32, pin_b: i32, target_power: f64, v_min: f64, v_nom: f64, v_max: f64) -> Self {
        Self {
            pin_a,
            pin_b,
            target_power,
            v_min,
            v_nom,
            v_max,
            inductance: None,
            label: None,
            regime: LoadRegime::OutOfRange,
            voltage: Complex64::new(0.0, 0.0),
            current_draw: Complex64::new(0.0, 0.0),
            power_delivered: 0.0,
            power_factor: 0.0,
            energy_input: 0.0,
        }
    }

    pub fn with_inductance(mut self, inductance: f64) -> Self {
        self.inductance = Some(inductance);
        self
    }

    fn resistive_impedance(&self, frequency: f64) -> Complex64 {
        let r = self.v_nom * self.v_nom / self.target_power;
        let x = self.inductance.map_or(0.0, |l| 2.0 * std::f64::consts::PI * frequency * l);
        Complex64::new(r, x)
    }

    fn latch_regime(&mut self, v_mag: f64) {
        self.regime = if v_mag < self.v_min || v_mag > self.v_max {
            LoadRegime::OutOfRange
        } else if v_mag < self.v_nom {
            LoadRegime::Resistive
        } else {
            LoadRegime::ConstantPower
        };
    }

    fn characteristic(&self, v: Complex64, frequency: f64) -> (Complex64, Complex64) {
        match self.regime {
            LoadRegime::OutOfRange => (Complex64::new(0.0, 0.0), Complex64::new(0.0, 0.0)),
            LoadRegime::Resistive => {
                let z = self.resistive_impedance(frequency);
                (v / z, Complex64::new(1.0, 0.0) / z)
            }
            LoadRegime::ConstantPower => {
                if v.norm() < 1e-12 {
                    return (Complex64::new(0.0, 0.0), Complex64::new(0.0, 0.0));
                }
                let i = Complex64::new(self.target_power, 0.0) / v.conj();
                let di_dv = Complex64::new(-self.target_power, 0.0) / (v * v);
                (i, di_dv)
            }
        }
    }
}

impl ComponentLifecycle for PowerSink {
    fn add_to(&mut self, _circuit: &mut Circuit, _id: ComponentId) {}

    fn remove_from(&mut self, circuit: &mut Circuit, id: ComponentId) {
        circuit.remove_node_reference(id, self.pin_a);
        circuit.remove_node_reference(id, self.pin_b);
    }

    fn initialize(&mut self, _circuit: &mut Circuit, _id: ComponentId) {}

    fn deinitialize(&mut self, _circuit: &mut Circuit, _id: ComponentId) {}

    fn update_state(&mut self, circuit: &mut Circuit, id: ComponentId) {
        let a = circuit.get_node(id, self.pin_a);
        let b = circuit.get_node(id, self.pin_b);
        let v = circuit.voltage(a.as_ref()) - circuit.voltage(b.as_ref());
        self.latch_regime(v.norm());
    }

    fn apply_state(&mut self, circuit: &mut Circuit, id: ComponentId) {
        let a = circuit.get_node(id, self.pin_a);
        let b = circuit.get_node(id, self.pin_b);
        let v = circuit.voltage(a.as_ref()) - circuit.voltage(b.as_ref());
        self.latch_regime(v.norm());
        let (i, _) = self.characteristic(v, circuit.frequency());
        let s = v * i.conj();
        self.voltage = v;
        self.current_draw = i;
        self.power_delivered = s.re;
        self.power_factor = if s.norm() > 1e-12 { s.re / s.norm() } else { 0.0 };
        self.energy_input = self.power_delivered * circuit.time_delta();
    }

    fn uses_connection(&self, pin: i32) -> bool {
        pin == self.pin_a || pin == self.pin_b
    }
}

impl NonLinear for PowerSink {
    fn update_differential_state(&mut self, circuit: &mut Circuit, id: ComponentId) {
        let a = circuit.get_node(id, self.pin_a);
        let b = circuit.get_node(id, self.pin_b);
        let v = circuit.voltage(a.as_ref()) - circuit.voltage(b.as_ref());
        let (i, di_dv) = self.characteristic(v, circuit.frequency());
        circuit.add_nonlinear_current(a.as_ref(), b.as_ref(), i, di_dv, -di_dv);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Component, VoltageSource};
    use approx::assert_relative_eq;

    /// Reference scenario 5 (spec §8): power sink characteristic.
    #[test]
    fn sink_regimes_match_spec_scenario() {
        let cases = [(30.0, 0.0), (80.0, None), (150.0, Some(100.0)), (250.0, 0.0)];
        for (v_source, _) in cases {
            let mut circuit = Circuit::new(1.0);
            circuit.add_component(Component::VoltageSource(VoltageSource::new(0, -1, v_source, 0.0)));
            let sink = circuit.add_component(Component::PowerSink(PowerSink::new(0, -1, 100.0, 50.0, 100.0, 200.0)));
            circuit.process_tick();

            if let Some(Component::PowerSink(s)) = circuit.component(sink) {
                if v_source < 50.0 || v_source > 200.0 {
                    assert_relative_eq!(s.power_delivered, 0.0, epsilon = 1e-6);
                } else if v_source < 100.0 {
                    let r = 100.0_f64 * 100.0 / 100.0;
                    let expected = v_source * v_source / r;
                    assert_relative_eq!(s.power_delivered, expected, epsilon = 1e-3);
                } else {
                    assert_relative_eq!(s.power_delivered, 100.0, epsilon = 1e-3);
                }
            } else {
                panic!("expected power sink");
            }
        }
    }
}
