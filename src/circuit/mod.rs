//! The circuit: component arena, pin-to-unknown map, and per-tick pipeline.

mod graph;
mod types;

pub use graph::Circuit;
pub use types::{ComponentId, NodeLabels, NoSharedPins, PinPeer, Unknown, UnknownId};
