//! The circuit graph: owns components, the pin-to-unknown map, and the
//! per-tick pipeline.
//!
//! Replaces the teacher's AST-built, static `Circuit` (`from_ast`,
//! `node_map`, fixed `num_nodes`/`num_branches`) with a circuit that the host
//! mutates live: components are added and removed at any time, pins are
//! bound to solver [`Unknown`]s lazily and shared via an external
//! [`PinPeer`] query, and the solver itself grows/shrinks to match (spec §9,
//! "cyclic ownership" re-architecture: components are referenced by
//! [`ComponentId`] into an arena, never by back-pointer).

use std::collections::HashMap;

use log::warn;

use crate::circuit::types::{ComponentId, NodeLabels, PinPeer, Unknown, UnknownId};
use crate::components::{Component, ComponentLifecycle};
use crate::error::CircuitError;
use crate::solver::{MnaSolver, Strategy, ABS_TOL, MAX_NR_ITERATIONS, REL_TOL};

/// A circuit: the component arena, the pin-sharing bookkeeping, and the MNA
/// solver it drives.
pub struct Circuit {
    solver: MnaSolver,
    peer: Box<dyn PinPeer>,

    components: Vec<Option<Component>>,
    added: Vec<bool>,
    power_sources: Vec<ComponentId>,
    power_sinks: Vec<ComponentId>,

    pin_map: HashMap<(ComponentId, i32), Unknown>,
    refcounts: HashMap<UnknownId, usize>,
    /// One representative handle per live Unknown, kept so
    /// [`MnaSolver::remove_unknown`] can renumber every outstanding index.
    unknowns: HashMap<UnknownId, Unknown>,

    frequency: f64,
    time_delta: f64,
    initialized: bool,
}

impl Circuit {
    pub fn new(time_delta: f64) -> Self {
        Self::with_peer(time_delta, Box::new(NodeLabels::default()))
    }

    pub fn with_peer(time_delta: f64, peer: Box<dyn PinPeer>) -> Self {
        Self {
            solver: MnaSolver::new(),
            peer,
            components: Vec::new(),
            added: Vec::new(),
            power_sources: Vec::new(),
            power_sinks: Vec::new(),
            pin_map: HashMap::new(),
            refcounts: HashMap::new(),
            unknowns: HashMap::new(),
            frequency: 0.0,
            time_delta,
            initialized: false,
        }
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn time_delta(&self) -> f64 {
        self.time_delta
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(id.0).and_then(|s| s.as_ref())
    }

    pub fn power_sources(&self) -> &[ComponentId] {
        &self.power_sources
    }

    pub fn power_sinks(&self) -> &[ComponentId] {
        &self.power_sinks
    }

    pub fn voltage(&self, u: Option<&Unknown>) -> num_complex::Complex64 {
        self.solver.voltage(u)
    }

    // --- Pin <-> Unknown mapping ---

    /// Resolve `(component, pin)` to its [`Unknown`], allocating one (or
    /// adopting the peer's) on first request. `pin < 0` means ground.
    pub fn get_node(&mut self, component: ComponentId, pin: i32) -> Option<Unknown> {
        if pin < 0 {
            return None;
        }
        if let Some(u) = self.pin_map.get(&(component, pin)) {
            return Some(u.clone());
        }

        let adopted = self
            .peer
            .peer_of(component, pin)
            .and_then(|(peer_c, peer_p)| self.pin_map.get(&(peer_c, peer_p)).cloned());

        let u = adopted.unwrap_or_else(|| self.new_internal_unknown());
        self.bind_pin(component, pin, u.clone());
        u.into()
    }

    fn bind_pin(&mut self, component: ComponentId, pin: i32, u: Unknown) {
        *self.refcounts.entry(u.id()).or_insert(0) += 1;
        self.unknowns.entry(u.id()).or_insert_with(|| u.clone());
        self.pin_map.insert((component, pin), u);
    }

    /// Drop one `(component, pin)` mapping; if no other pin now references
    /// that Unknown, remove it from the solver entirely.
    pub fn remove_node_reference(&mut self, component: ComponentId, pin: i32) {
        if pin < 0 {
            return;
        }
        let Some(u) = self.pin_map.remove(&(component, pin)) else {
            return;
        };
        let count = self.refcounts.get_mut(&u.id()).expect("refcount tracked");
        *count -= 1;
        if *count == 0 {
            self.refcounts.remove(&u.id());
            self.free_internal_unknown(&u);
        }
    }

    /// Allocate an Unknown not registered in the pin map — used for branch
    /// currents and other internal component state (voltage-source branch,
    /// inductor DC branch, transformer windings, battery internal node).
    pub fn new_internal_unknown(&mut self) -> Unknown {
        let u = self.solver.add_unknown();
        self.unknowns.insert(u.id(), u.clone());
        u
    }

    /// Release an internal Unknown allocated via [`Self::new_internal_unknown`].
    pub fn free_internal_unknown(&mut self, u: &Unknown) {
        self.unknowns.remove(&u.id());
        let live: Vec<Unknown> = self.unknowns.values().cloned().collect();
        self.solver.remove_unknown(u, live.into_iter());
    }

    // --- Solver stamp forwarding (so components never touch MnaSolver directly) ---

    pub fn add_admittance(&mut self, a: Option<&Unknown>, b: Option<&Unknown>, y: num_complex::Complex64) {
        self.solver.add_admittance(a, b, y);
    }
    pub fn add_impedance(&mut self, a: Option<&Unknown>, b: Option<&Unknown>, z: num_complex::Complex64) {
        self.solver.add_impedance(a, b, z);
    }
    pub fn add_resistance(&mut self, a: Option<&Unknown>, b: Option<&Unknown>, r: f64) {
        self.solver.add_resistance(a, b, r);
    }
    pub fn add_reactance(&mut self, a: Option<&Unknown>, b: Option<&Unknown>, x: f64) {
        self.solver.add_reactance(a, b, x);
    }
    pub fn stamp_voltage_source(&mut self, a: Option<&Unknown>, b: Option<&Unknown>, i: &Unknown) {
        self.solver.stamp_voltage_source(a, b, i);
    }
    pub fn set_voltage(&mut self, i: &Unknown, v: num_complex::Complex64) {
        self.solver.set_voltage(i, v);
    }
    #[allow(clippy::too_many_arguments)]
    pub fn add_transformer(
        &mut self,
        a: Option<&Unknown>,
        b: Option<&Unknown>,
        c: Option<&Unknown>,
        d: Option<&Unknown>,
        wl1: f64,
        wl2: f64,
        wm: f64,
        i1: &Unknown,
        i2: &Unknown,
    ) {
        self.solver.add_transformer(a, b, c, d, wl1, wl2, wm, i1, i2);
    }
    pub fn add_current(&mut self, a: Option<&Unknown>, b: Option<&Unknown>, i: num_complex::Complex64) {
        self.solver.add_current(a, b, i);
    }
    pub fn add_nonlinear_current(
        &mut self,
        a: Option<&Unknown>,
        b: Option<&Unknown>,
        i: num_complex::Complex64,
        di_da: num_complex::Complex64,
        di_db: num_complex::Complex64,
    ) {
        self.solver.add_nonlinear_current(a, b, i, di_da, di_db);
    }

    // --- Component lifecycle ---

    /// Swap `id`'s component out of the arena, hand it (plus `self`) to `f`,
    /// then swap it back. Lets lifecycle methods take `&mut Circuit` while
    /// the component would otherwise still be borrowed from inside it.
    fn with_component(&mut self, id: ComponentId, f: impl FnOnce(&mut Component, &mut Circuit)) {
        let slot = self.components.get_mut(id.0).expect("valid component id");
        let mut taken = std::mem::replace(slot, Component::Removed);
        f(&mut taken, self);
        self.components[id.0] = taken;
    }

    /// Public entry point for a host to reach into a live component and
    /// mutate it (flip a breaker, adjust a battery's charge, change a
    /// transformer's ratio) with `&mut Circuit` access, so the mutation can
    /// call `invalidate()` or touch solver state as needed.
    pub fn modify_component(&mut self, id: ComponentId, f: impl FnOnce(&mut Component, &mut Circuit)) {
        self.with_component(id, f);
    }

    /// Append `c` to the component list. If the circuit is already running
    /// (`initialized`), binds its pins and stamps it immediately; otherwise
    /// it is picked up by the next tick's initialization pass.
    pub fn add_component(&mut self, c: Component) -> ComponentId {
        let id = ComponentId(self.components.len());
        self.components.push(Some(c));
        self.added.push(false);

        if let Some(Component::PowerSource(_)) = self.components[id.0] {
            self.power_sources.push(id);
        }
        if let Some(Component::PowerSink(_)) = self.components[id.0] {
            self.power_sinks.push(id);
        }

        if self.initialized {
            self.with_component(id, |c, circuit| c.add_to(circuit, id));
            self.added[id.0] = true;
            self.with_component(id, |c, circuit| c.initialize(circuit, id));
        }
        id
    }

    /// Deinitialize and detach `id`, then tombstone its slot.
    pub fn remove_component(&mut self, id: ComponentId) {
        if self.components.get(id.0).map(Option::is_some) != Some(true) {
            return;
        }
        if self.added[id.0] {
            self.with_component(id, |c, circuit| c.deinitialize(circuit, id));
            self.with_component(id, |c, circuit| c.remove_from(circuit, id));
        }
        self.components[id.0] = None;
        self.added[id.0] = false;
        self.power_sources.retain(|&p| p != id);
        self.power_sinks.retain(|&p| p != id);
    }

    /// Clear the `initialized` flag: the next tick re-stamps `A` from
    /// scratch (deinitialize + initialize every live component), picking up
    /// new components and any component whose stamped values must change
    /// (a breaker toggled, a transformer's ratio changed, an inductor
    /// switching between AC and DC regimes — spec §4.2).
    pub fn invalidate(&mut self) {
        self.initialized = false;
    }

    fn live_ids(&self) -> Vec<ComponentId> {
        self.components
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| ComponentId(i)))
            .collect()
    }

    fn ensure_initialized(&mut self) -> bool {
        if self.initialized {
            return true;
        }
        if !self.reconcile_frequency() {
            return false;
        }
        self.solver
            .set_strategy(if self.frequency != 0.0 { Strategy::Qr } else { Strategy::Lu });

        for id in self.live_ids() {
            if self.added[id.0] {
                self.with_component(id, |c, circuit| c.deinitialize(circuit, id));
            }
        }
        for id in self.live_ids() {
            if !self.added[id.0] {
                self.with_component(id, |c, circuit| c.add_to(circuit, id));
                self.added[id.0] = true;
            }
            self.with_component(id, |c, circuit| c.initialize(circuit, id));
        }

        self.initialized = true;
        true
    }

    /// Scan all components for a declared AC frequency. Adopts the single
    /// non-zero frequency if consistent; returns `false` (logging a
    /// [`CircuitError::FrequencyConflict`]) and leaves the prior frequency
    /// untouched if two sources disagree.
    fn reconcile_frequency(&mut self) -> bool {
        let mut found: Option<f64> = None;
        for id in self.live_ids() {
            let Some(f) = self.component(id).and_then(Component::declared_frequency) else {
                continue;
            };
            match found {
                None => found = Some(f),
                Some(existing) if (existing - f).abs() > f64::EPSILON => {
                    warn!(
                        "{}",
                        CircuitError::FrequencyConflict { previous: existing, new: f }
                    );
                    return false;
                }
                _ => {}
            }
        }
        self.frequency = found.unwrap_or(0.0);
        true
    }

    /// The hot path: initialize if needed, clear `z`, update every
    /// component, solve (linear, then Newton-Raphson if any non-linear
    /// component is registered), then let every component read out the
    /// solution via `apply_state`.
    pub fn process_tick(&mut self) {
        if !self.ensure_initialized() {
            return;
        }

        self.solver.clear_z();
        for id in self.live_ids() {
            self.with_component(id, |c, circuit| c.update_state(circuit, id));
        }

        self.solver.solve_linear();
        if self.solver.is_singular() {
            warn!("{}", CircuitError::SingularMatrix);
        }

        let nonlinear_ids: Vec<ComponentId> = self
            .live_ids()
            .into_iter()
            .filter(|&id| self.component(id).is_some_and(Component::is_nonlinear))
            .collect();

        if !nonlinear_ids.is_empty() {
            let mut converged = false;
            let mut last_delta = 0.0;
            for iter in 0..MAX_NR_ITERATIONS {
                self.solver.begin_nr_iteration();
                for &id in &nonlinear_ids {
                    self.with_component(id, |c, circuit| c.update_differential_state(circuit, id));
                }
                if self.solver.solve_nr_iteration(iter) {
                    converged = true;
                    last_delta = self.solver.last_delta();
                    break;
                }
                last_delta = self.solver.last_delta();
            }
            if !converged {
                warn!(
                    "{}",
                    CircuitError::NRNonConvergence {
                        iterations: MAX_NR_ITERATIONS,
                        max_delta: last_delta,
                    }
                );
            }
        }

        for id in self.live_ids() {
            self.with_component(id, |c, circuit| c.apply_state(circuit, id));
        }
    }

    /// Move every component out of `other` into `self`, re-homing each one
    /// (detach from `other`'s solver, reattach to `self`'s) and clearing
    /// `other` entirely. Used when topology discovery finds two previously
    /// separate circuits are now connected.
    pub fn merge(&mut self, other: &mut Circuit) {
        let ids: Vec<ComponentId> = other.live_ids();
        for id in ids {
            if other.added[id.0] {
                other.with_component(id, |c, circuit| c.deinitialize(circuit, id));
                other.with_component(id, |c, circuit| c.remove_from(circuit, id));
            }
            if let Some(c) = other.components[id.0].take() {
                self.add_component(c);
            }
        }
        other.added.clear();
        other.components.clear();
        other.power_sources.clear();
        other.power_sinks.clear();
        other.pin_map.clear();
        other.refcounts.clear();
        other.unknowns.clear();
        other.initialized = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Resistor, VoltageSource};
    use approx::assert_relative_eq;
    use num_complex::Complex64;

    fn approx_c(got: Complex64, re: f64, im: f64, eps: f64) {
        assert_relative_eq!(got.re, re, epsilon = eps);
        assert_relative_eq!(got.im, im, epsilon = eps);
    }

    /// Reference scenario 1 (spec §8): DC divider.
    #[test]
    fn dc_divider() {
        let mut circuit = Circuit::new(0.5);
        let n0 = 0;
        let n1 = 1;

        let src = circuit.add_component(Component::VoltageSource(VoltageSource::new(n0, -1, 24.0, 0.0)));
        let r1 = circuit.add_component(Component::Resistor(Resistor::new(n0, n1, 100.0)));
        let r2 = circuit.add_component(Component::Resistor(Resistor::new(n1, -1, 1000.0)));

        circuit.process_tick();

        let u0 = circuit.get_node(r1, n0).unwrap();
        let u1 = circuit.get_node(r1, n1).unwrap();
        approx_c(circuit.voltage(Some(&u0)), 24.0, 0.0, 1e-6);
        approx_c(circuit.voltage(Some(&u1)), 21.8181818, 0.0, 1e-3);

        let _ = (src, r2);
    }

    /// Reference scenario 3 (spec §8): series RLC at 200 Hz.
    #[test]
    fn rlc_series_at_200hz() {
        use crate::components::{Capacitor, Inductor};

        let mut circuit = Circuit::new(1.0 / 48000.0);
        circuit.add_component(Component::VoltageSource(VoltageSource::new(0, -1, 0.1, 200.0)));
        circuit.add_component(Component::Resistor(Resistor::new(0, 1, 4.0)));
        circuit.add_component(Component::Inductor(Inductor::new(1, 2, 3e-3)));
        circuit.add_component(Component::Capacitor(Capacitor::new(2, -1, 0.8e-3)));
        circuit.process_tick();

        let n1 = circuit.get_node(ComponentId(1), 1).unwrap();
        let n2 = circuit.get_node(ComponentId(2), 2).unwrap();
        approx_c(circuit.voltage(Some(&n1)), 0.03249, -0.0468, 5e-3);
        approx_c(circuit.voltage(Some(&n2)), -0.01164, 0.016787, 5e-3);
    }

    /// Reference scenario 4 (spec §8): an ideal current source forces its
    /// set current through any series resistance.
    #[test]
    fn current_source_sweep() {
        for &i in &[-10.0, -1.0, 0.1, 1.0, 10.0] {
            for &r in &[1.0, 10.0, 100.0] {
                let mut circuit = Circuit::new(0.1);
                let src = circuit.add_component(Component::CurrentSource(
                    crate::components::CurrentSource::new(0, -1, i, 0.0),
                ));
                let res = circuit.add_component(Component::Resistor(Resistor::new(0, -1, r)));
                circuit.process_tick();

                if let Some(Component::Resistor(resistor)) = circuit.component(res) {
                    assert_relative_eq!(resistor.current.re, i, epsilon = 1e-3);
                } else {
                    panic!("expected resistor");
                }
                let _ = src;
            }
        }
    }

    /// Reference scenario 6 (spec §8): a component added after the first
    /// tick joins the live circuit and the second tick's solve honors it.
    #[test]
    fn late_added_component_forms_series_loop() {
        let mut circuit = Circuit::new(0.5);
        circuit.add_component(Component::VoltageSource(VoltageSource::new(0, -1, 10.0, 0.0)));
        let r1 = circuit.add_component(Component::Resistor(Resistor::new(0, 1, 5.0)));
        circuit.process_tick();

        let r2 = circuit.add_component(Component::Resistor(Resistor::new(1, -1, 15.0)));
        circuit.process_tick();

        let (v1, v2) = match (circuit.component(r1), circuit.component(r2)) {
            (Some(Component::Resistor(a)), Some(Component::Resistor(b))) => (a.voltage.re, b.voltage.re),
            _ => panic!("expected resistors"),
        };
        let (i1, i2) = match (circuit.component(r1), circuit.component(r2)) {
            (Some(Component::Resistor(a)), Some(Component::Resistor(b))) => (a.current.re, b.current.re),
            _ => panic!("expected resistors"),
        };
        assert_relative_eq!(i1.abs(), i2.abs(), epsilon = 1e-4);
        assert_relative_eq!(v1 + v2, 10.0, epsilon = 1e-4);
    }
}
