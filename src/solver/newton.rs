//! Newton-Raphson iteration driver for non-linear components.
//!
//! Generalizes the teacher's `NewtonRaphson` (`pedaler_core::solver::newton`)
//! from a component-aware driver (it matched on `Component::Diode`/`Bjt`
//! directly) to a component-agnostic one: the caller supplies a closure that
//! stamps every non-linear component's contribution for the current
//! iteration, since that responsibility now lives on
//! [`crate::components::NonLinear`] rather than being hardcoded here.

use crate::solver::mna::MnaSolver;
use crate::solver::mna::MAX_NR_ITERATIONS;

/// Drives the bounded Newton-Raphson loop described in spec §4.1.
pub struct NewtonRaphson {
    max_iterations: usize,
}

impl NewtonRaphson {
    pub fn new() -> Self {
        Self {
            max_iterations: MAX_NR_ITERATIONS,
        }
    }

    /// Run the NR loop: each iteration rebuilds `J`/`F` from the linear
    /// baseline (`begin_nr_iteration`), lets `stamp_nonlinear` add every
    /// non-linear component's contribution, then takes a damped Newton step.
    ///
    /// Returns `(iterations_used, converged)`. On non-convergence the last
    /// iterate is kept regardless, per spec §4.1's "Failure model".
    pub fn run(&self, solver: &mut MnaSolver, mut stamp_nonlinear: impl FnMut(&mut MnaSolver)) -> (usize, bool) {
        for iter in 0..self.max_iterations {
            solver.begin_nr_iteration();
            stamp_nonlinear(solver);
            if solver.solve_nr_iteration(iter) {
                return (iter + 1, true);
            }
        }
        (self.max_iterations, false)
    }
}

impl Default for NewtonRaphson {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::Unknown;
    use approx::assert_relative_eq;
    use num_complex::Complex64;

    /// A single node to ground through a non-linear element with
    /// `I = V^2 / R0` (so `dI/dV = 2V/R0`), driven by a fixed current
    /// source. Exercises the NR loop end-to-end without any `Component`.
    #[test]
    fn converges_on_simple_nonlinear_node() {
        let mut solver = MnaSolver::new();
        let n: Unknown = solver.add_unknown();
        solver.add_resistance(Some(&n), None, 1e9); // keep A non-singular

        let r0 = 10.0;
        let i_source = 2.0;

        solver.clear_z();
        solver.add_current(None, Some(&n), Complex64::new(i_source, 0.0));
        solver.solve_linear();

        let nr = NewtonRaphson::new();
        let (_, converged) = nr.run(&mut solver, |s| {
            let v = s.voltage(Some(&n)).re;
            let i = v * v / r0;
            let di_dv = 2.0 * v / r0;
            s.add_nonlinear_current(
                Some(&n),
                None,
                Complex64::new(i, 0.0),
                Complex64::new(di_dv, 0.0),
                Complex64::new(0.0, 0.0),
            );
        });

        assert!(converged);
        let v = solver.voltage(Some(&n)).re;
        // V^2/R0 = I_source -> V = sqrt(I_source * R0)
        assert_relative_eq!(v, (i_source * r0).sqrt(), epsilon = 1e-3);
    }
}
