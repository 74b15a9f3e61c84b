//! Core handle types for circuit representation.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// A unique, stable identifier for an [`Unknown`]. Unlike the `Unknown`'s
/// matrix `index`, this never changes, so it can be used as a `HashMap` key
/// (for pin→unknown reference counting) even while the matrix is reshuffled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnknownId(pub u64);

struct UnknownInner {
    id: UnknownId,
    /// Current row/column index into the solver's matrices, or `-1` once
    /// the unknown has been removed from the solver.
    index: Cell<i64>,
}

/// An opaque handle identifying one equation/variable pair in the solver.
///
/// Cloning an `Unknown` is cheap (reference-counted) and all clones observe
/// the same `index`: when [`crate::solver::MnaSolver::remove_unknown`]
/// renumbers the matrix, every outstanding handle sees the update. Handle
/// *identity* ([`Unknown::id`]) is stable even though the `index` is not.
#[derive(Clone)]
pub struct Unknown(Rc<UnknownInner>);

impl Unknown {
    pub(crate) fn new(id: UnknownId, index: usize) -> Self {
        Self(Rc::new(UnknownInner {
            id,
            index: Cell::new(index as i64),
        }))
    }

    /// Stable identity of this handle, independent of its current `index`.
    pub fn id(&self) -> UnknownId {
        self.0.id
    }

    /// Current row/column index into the solver's matrices, or `None` if
    /// this unknown has been removed from the solver.
    pub fn index(&self) -> Option<usize> {
        let i = self.0.index.get();
        if i < 0 {
            None
        } else {
            Some(i as usize)
        }
    }

    pub(crate) fn set_index(&self, index: i64) {
        self.0.index.set(index);
    }

    pub(crate) fn decrement_index(&self) {
        let i = self.0.index.get();
        debug_assert!(i > 0, "cannot decrement a ground or removed unknown");
        self.0.index.set(i - 1);
    }
}

impl fmt::Debug for Unknown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown({:?} @ {:?})", self.0.id, self.index())
    }
}

impl PartialEq for Unknown {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}
impl Eq for Unknown {}

/// A unique identifier for a component in a [`crate::circuit::Circuit`]'s
/// arena. Stable across topology edits — components are never reindexed,
/// only tombstoned on removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId(pub usize);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// External collaborator: given a component's pin, resolve the peer
/// `(component, pin)` it is physically joined to, if any.
///
/// This is how the circuit implements pin sharing (spec §3, "Pin
/// sharing") without knowing anything about cable-network topology itself
/// — topology discovery lives entirely outside this crate.
pub trait PinPeer {
    /// Return the peer pin physically joined to `(component, pin)`, if any.
    fn peer_of(&self, component: ComponentId, pin: i32) -> Option<(ComponentId, i32)>;
}

/// A peer resolver under which no pin is ever shared: every `(component,
/// pin)` pair gets its own unknown. Useful for a host whose topology is
/// conveyed entirely through explicit wiring elsewhere, not through pin
/// labels.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSharedPins;

impl PinPeer for NoSharedPins {
    fn peer_of(&self, _component: ComponentId, _pin: i32) -> Option<(ComponentId, i32)> {
        None
    }
}

/// The default peer resolver: two pins (on any components) that carry the
/// same non-negative label are the same electrical node, exactly like a
/// SPICE netlist's node numbers. This is the natural reading of a
/// `pin_a`/`pin_b` pair passed to a component constructor, and what
/// [`crate::circuit::Circuit::new`] uses; a host with a more dynamic
/// topology (pins that get rewired without changing their label) can
/// supply its own [`PinPeer`] via `Circuit::with_peer` instead.
#[derive(Debug, Default)]
pub struct NodeLabels(std::cell::RefCell<std::collections::HashMap<i32, (ComponentId, i32)>>);

impl PinPeer for NodeLabels {
    fn peer_of(&self, component: ComponentId, pin: i32) -> Option<(ComponentId, i32)> {
        let mut registry = self.0.borrow_mut();
        match registry.get(&pin) {
            Some(&peer) => Some(peer),
            None => {
                registry.insert(pin, (component, pin));
                None
            }
        }
    }
}
