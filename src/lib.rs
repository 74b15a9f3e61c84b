//! # Circuit Core
//!
//! A discrete-time Modified Nodal Analysis (MNA) simulator for lumped-element
//! DC/AC electrical networks, driven one tick at a time by a host
//! orchestrator rather than by a fixed, parsed topology.
//!
//! ## Architecture
//!
//! - [`circuit`] - the component arena, pin-to-node map, and per-tick pipeline
//! - [`components`] - component models (resistor, capacitor, inductor, voltage
//!   and current sources, transformer, breaker, battery, power source/sink,
//!   thermal line)
//! - [`solver`] - MNA matrix assembly, LU/QR factorization, and
//!   Newton-Raphson iteration
//! - [`error`] - structured diagnostics for numerical degeneracies
//!
//! ## Circuit simulation method
//!
//! Each call to [`circuit::Circuit::process_tick`]:
//!
//! 1. Re-stamps `A` if the topology changed since the last tick.
//! 2. Clears `z` and lets every component stamp its tick's inputs.
//! 3. Solves `Ax = z` (LU for DC, QR for AC).
//! 4. Runs Newton-Raphson to convergence if any component is non-linear.
//! 5. Lets every component read the solution back via `apply_state`.
//!
//! Dynamic elements (capacitor, inductor) are discretized with backward
//! Euler at DC and stamped as fixed reactances at AC.

pub mod circuit;
pub mod components;
pub mod error;
pub mod solver;

pub use circuit::Circuit;
pub use error::{CircuitError, Result};
pub use solver::MnaSolver;
