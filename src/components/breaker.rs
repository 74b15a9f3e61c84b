use num_complex::Complex64;

use crate::circuit::{Circuit, ComponentId};

use super::ComponentLifecycle;

/// Through-path resistance while closed; small enough to pass current
/// cleanly without destabilizing the matrix conditioning the way an ideal
/// short would.
const R_CLOSED: f64 = 1e-4;
/// Leakage-to-ground resistance kept at both pins regardless of state, so
/// neither pin can float to an unreferenced node when open.
const R_LEAK: f64 = 1e6;

/// A breaker: an on/off switch between two pins.
#[derive(Debug, Clone)]
pub struct Breaker {
    pub pin_a: i32,
    pub pin_b: i32,
    pub closed: bool,
    pub label: Option<String>,

    stamped_closed: bool,
    pub current: Complex64,
}

impl Breaker {
    pub fn new(pin_a: i32, pin_b: i32, closed: bool) -> Self {
        Self {
            pin_a,
            pin_b,
            closed,
            stamped_closed: false,
            current: Complex64::new(0.0, 0.0),
        }
    }

    /// Toggle open/closed, forcing a restamp on the next tick.
    pub fn set_closed(&mut self, circuit: &mut Circuit, closed: bool) {
        if self.closed != closed {
            self.closed = closed;
            circuit.invalidate();
        }
    }

    fn through_admittance(&self) -> Complex64 {
        Complex64::new(1.0 / R_CLOSED, 0.0)
    }

    fn leak_admittance(&self) -> Complex64 {
        Complex64::new(1.0 / R_LEAK, 0.0)
    }
}

impl ComponentLifecycle for Breaker {
    fn add_to(&mut self, _circuit: &mut Circuit, _id: ComponentId) {}

    fn remove_from(&mut self, circuit: &mut Circuit, id: ComponentId) {
        circuit.remove_node_reference(id, self.pin_a);
        circuit.remove_node_reference(id, self.pin_b);
    }

    fn initialize(&mut self, circuit: &mut Circuit, id: ComponentId) {
        let a = circuit.get_node(id, self.pin_a);
        let b = circuit.get_node(id, self.pin_b);
        circuit.add_admittance(a.as_ref(), None, self.leak_admittance());
        circuit.add_admittance(b.as_ref(), None, self.leak_admittance());
        self.stamped_closed = self.closed;
        if self.stamped_closed {
            circuit.add_admittance(a.as_ref(), b.as_ref(), self.through_admittance());
        }
    }

    fn deinitialize(&mut self, circuit: &mut Circuit, id: ComponentId) {
        let a = circuit.get_node(id, self.pin_a);
        let b = circuit.get_node(id, self.pin_b);
        circuit.add_admittance(a.as_ref(), None, -self.leak_admittance());
        circuit.add_admittance(b.as_ref(), None, -self.leak_admittance());
        if self.stamped_closed {
            circuit.add_admittance(a.as_ref(), b.as_ref(), -self.through_admittance());
        }
    }

    fn update_state(&mut self, _circuit: &mut Circuit, _id: ComponentId) {}

    fn apply_state(&mut self, circuit: &mut Circuit, id: ComponentId) {
        let a = circuit.get_node(id, self.pin_a);
        let b = circuit.get_node(id, self.pin_b);
        let v = circuit.voltage(a.as_ref()) - circuit.voltage(b.as_ref());
        self.current = if self.stamped_closed {
            v * self.through_admittance()
        } else {
            v * self.leak_admittance()
        };
    }

    fn uses_connection(&self, pin: i32) -> bool {
        pin == self.pin_a || pin == self.pin_b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Component, Resistor, VoltageSource};
    use approx::assert_relative_eq;

    #[test]
    fn open_breaker_blocks_current_closed_breaker_passes_it() {
        let mut circuit = Circuit::new(0.5);
        circuit.add_component(Component::VoltageSource(VoltageSource::new(0, -1, 10.0, 0.0)));
        let br = circuit.add_component(Component::Breaker(Breaker::new(0, 1, false)));
        let r = circuit.add_component(Component::Resistor(Resistor::new(1, -1, 100.0)));
        circuit.process_tick();

        if let Some(Component::Resistor(resistor)) = circuit.component(r) {
            assert_relative_eq!(resistor.current.re, 0.0, epsilon = 1e-3);
        } else {
            panic!("expected resistor");
        }

        circuit.modify_component(br, |c, circuit| {
            if let Component::Breaker(b) = c {
                b.set_closed(circuit, true);
            }
        });
        circuit.process_tick();

        if let Some(Component::Resistor(resistor)) = circuit.component(r) {
            assert_relative_eq!(resistor.current.re, 0.1, epsilon = 1e-3);
        } else {
            panic!("expected resistor");
        }
    }
}
