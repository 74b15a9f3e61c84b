//! Component models for circuit simulation.
//!
//! This module provides models for every component kind in spec: resistor,
//! capacitor, inductor, voltage source, current source, transformer,
//! breaker, battery, power source, power sink, and line. Each implements
//! [`ComponentLifecycle`]; the power sink additionally implements
//! [`NonLinear`].
//!
//! Following the closed-sum-type recommendation (avoid deep inheritance for
//! a small, fixed capability set), the component set is one `enum` rather
//! than a `dyn ComponentLifecycle` — there is no vtable, no heap allocation
//! per component, and the `match` dispatch below is the entire cost of
//! polymorphism.

mod battery;
mod breaker;
mod capacitor;
mod inductor;
mod line;
mod power;
mod resistor;
mod sources;
mod transformer;

pub use battery::Battery;
pub use breaker::Breaker;
pub use capacitor::Capacitor;
pub use inductor::Inductor;
pub use line::Line;
pub use power::{PowerSink, PowerSource};
pub use resistor::Resistor;
pub use sources::{CurrentSource, VoltageSource};
pub use transformer::Transformer;

use crate::circuit::{Circuit, ComponentId};

/// The six-method lifecycle every component implements (spec §6).
pub trait ComponentLifecycle {
    /// Bind pins to solver unknowns and allocate any internal (non-shared)
    /// unknowns this component owns for its whole lifetime.
    fn add_to(&mut self, circuit: &mut Circuit, id: ComponentId);
    /// Release internal unknowns and drop this component's pin references.
    fn remove_from(&mut self, circuit: &mut Circuit, id: ComponentId);
    /// Place this component's stamps into `A`.
    fn initialize(&mut self, circuit: &mut Circuit, id: ComponentId);
    /// Retract exactly the stamps `initialize` placed.
    fn deinitialize(&mut self, circuit: &mut Circuit, id: ComponentId);
    /// Stamp this tick's inputs into `z` (or, for the battery, refresh its
    /// terminal voltage source magnitude).
    fn update_state(&mut self, circuit: &mut Circuit, id: ComponentId);
    /// Read the solved `x` and update derived/integrated state.
    fn apply_state(&mut self, circuit: &mut Circuit, id: ComponentId);
    /// Whether this component has a pin at `pin`.
    fn uses_connection(&self, pin: i32) -> bool;
}

/// Opt-in for components whose characteristic is non-linear and must
/// participate in the Newton-Raphson loop.
pub trait NonLinear: ComponentLifecycle {
    fn update_differential_state(&mut self, circuit: &mut Circuit, id: ComponentId);
}

/// A circuit component. `Removed` is an internal tombstone used only while a
/// component is temporarily taken out of the circuit's arena to give its
/// lifecycle methods `&mut Circuit` access (see `Circuit::with_component`);
/// it is never observed by callers.
#[derive(Debug, Clone)]
pub enum Component {
    Resistor(Resistor),
    Capacitor(Capacitor),
    Inductor(Inductor),
    VoltageSource(VoltageSource),
    CurrentSource(CurrentSource),
    Transformer(Transformer),
    Breaker(Breaker),
    Battery(Battery),
    PowerSource(PowerSource),
    PowerSink(PowerSink),
    Line(Line),
    #[doc(hidden)]
    Removed,
}

impl Component {
    /// The non-zero AC frequency this component declares, if it is a
    /// voltage or current source configured for AC. Used by
    /// `Circuit::reconcile_frequency`.
    pub fn declared_frequency(&self) -> Option<f64> {
        match self {
            Component::VoltageSource(v) => v.declared_frequency(),
            Component::CurrentSource(i) => i.declared_frequency(),
            _ => None,
        }
    }

    /// Whether this component must participate in the Newton-Raphson loop.
    pub fn is_nonlinear(&self) -> bool {
        matches!(self, Component::PowerSink(_))
    }
}

macro_rules! dispatch {
    ($self:ident, $method:ident $(, $arg:expr)*) => {
        match $self {
            Component::Resistor(c) => c.$method($($arg),*),
            Component::Capacitor(c) => c.$method($($arg),*),
            Component::Inductor(c) => c.$method($($arg),*),
            Component::VoltageSource(c) => c.$method($($arg),*),
            Component::CurrentSource(c) => c.$method($($arg),*),
            Component::Transformer(c) => c.$method($($arg),*),
            Component::Breaker(c) => c.$method($($arg),*),
            Component::Battery(c) => c.$method($($arg),*),
            Component::PowerSource(c) => c.$method($($arg),*),
            Component::PowerSink(c) => c.$method($($arg),*),
            Component::Line(c) => c.$method($($arg),*),
            Component::Removed => unreachable!("Component::Removed observed outside with_component"),
        }
    };
}

impl ComponentLifecycle for Component {
    fn add_to(&mut self, circuit: &mut Circuit, id: ComponentId) {
        dispatch!(self, add_to, circuit, id)
    }
    fn remove_from(&mut self, circuit: &mut Circuit, id: ComponentId) {
        dispatch!(self, remove_from, circuit, id)
    }
    fn initialize(&mut self, circuit: &mut Circuit, id: ComponentId) {
        dispatch!(self, initialize, circuit, id)
    }
    fn deinitialize(&mut self, circuit: &mut Circuit, id: ComponentId) {
        dispatch!(self, deinitialize, circuit, id)
    }
    fn update_state(&mut self, circuit: &mut Circuit, id: ComponentId) {
        dispatch!(self, update_state, circuit, id)
    }
    fn apply_state(&mut self, circuit: &mut Circuit, id: ComponentId) {
        dispatch!(self, apply_state, circuit, id)
    }
    fn uses_connection(&self, pin: i32) -> bool {
        dispatch!(self, uses_connection, pin)
    }
}

impl NonLinear for Component {
    fn update_differential_state(&mut self, circuit: &mut Circuit, id: ComponentId) {
        if let Component::PowerSink(sink) = self {
            sink.update_differential_state(circuit, id);
        }
    }
}
