//! MNA matrix assembly and solving.
//!
//! Generalizes the teacher's `MnaMatrix` (`pedaler_core::solver::mna`) from a
//! fixed-size real matrix built once from a parsed AST to a complex matrix
//! that grows and shrinks as [`crate::circuit::Circuit`] adds and removes
//! unknowns at runtime.

use num_complex::Complex64;

use crate::circuit::{Unknown, UnknownId};
use crate::solver::matrix::{self, LuFactored, QrFactored, Strategy};

/// Relative convergence tolerance for Newton-Raphson (`|dx| < REL_TOL*|x| + ABS_TOL`).
pub const REL_TOL: f64 = 1e-4;
/// Absolute convergence tolerance for Newton-Raphson.
pub const ABS_TOL: f64 = 1e-4;
/// Bound on Newton-Raphson iterations per tick.
pub const MAX_NR_ITERATIONS: usize = 20;
/// Conductance stamped from every resistor pin to ground, to keep floating
/// islands out of `A`.
pub const G_MIN: f64 = 1e-9;

enum Factored {
    Lu(LuFactored),
    Qr(QrFactored),
}

/// Owns `A`, `z`, `x`, `J`, `F` and the cached factorization of `A`, plus the
/// allocation/removal of [`Unknown`] handles. Mirrors the teacher's
/// `MnaMatrix`, generalized to complex entries and dynamic resizing.
pub struct MnaSolver {
    size: usize,
    next_id: u64,
    strategy: Strategy,

    a: Vec<Complex64>,
    z: Vec<Complex64>,
    x: Vec<Complex64>,
    j: Vec<Complex64>,
    f: Vec<Complex64>,

    factored: Option<Factored>,
    dirty: bool,
    last_delta: f64,
}

impl MnaSolver {
    pub fn new() -> Self {
        Self {
            size: 0,
            next_id: 0,
            strategy: Strategy::Lu,
            a: Vec::new(),
            z: Vec::new(),
            x: Vec::new(),
            j: Vec::new(),
            f: Vec::new(),
            factored: None,
            dirty: true,
            last_delta: 0.0,
        }
    }

    /// Choose the factorization strategy for the main linear solve. `Circuit`
    /// switches this to `Qr` once the reconciled frequency is non-zero and
    /// back to `Lu` for DC, per the AC/DC recommendation in spec §9.
    pub fn set_strategy(&mut self, strategy: Strategy) {
        if strategy != self.strategy {
            self.strategy = strategy;
            self.dirty = true;
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Allocate one new [`Unknown`], growing `A`/`z`/`x`. Invalidates the
    /// factorization.
    pub fn add_unknown(&mut self) -> Unknown {
        let new_size = self.size + 1;
        self.grow_to(new_size);
        self.size = new_size;

        let id = UnknownId(self.next_id);
        self.next_id += 1;
        self.dirty = true;
        Unknown::new(id, new_size - 1)
    }

    pub fn add_unknowns(&mut self, n: usize) -> Vec<Unknown> {
        (0..n).map(|_| self.add_unknown()).collect()
    }

    /// Drop `u`'s row/column from `A`, entry from `z`; decrement the index of
    /// every Unknown that sat after it. `u.index()` becomes `None`.
    ///
    /// `live` must enumerate every other `Unknown` handle currently
    /// outstanding against this solver, so their indices can be kept in sync.
    pub fn remove_unknown(&mut self, u: &Unknown, live: impl Iterator<Item = Unknown>) {
        let Some(idx) = u.index() else {
            return;
        };

        let new_size = self.size - 1;
        let mut new_a = vec![Complex64::new(0.0, 0.0); new_size * new_size];
        let mut new_z = vec![Complex64::new(0.0, 0.0); new_size];

        for row in (0..self.size).filter(|&r| r != idx) {
            let dst_row = if row > idx { row - 1 } else { row };
            for col in (0..self.size).filter(|&c| c != idx) {
                let dst_col = if col > idx { col - 1 } else { col };
                new_a[dst_row * new_size + dst_col] = self.a[row * self.size + col];
            }
            new_z[dst_row] = self.z[row];
        }

        self.a = new_a;
        self.z = new_z;
        self.size = new_size;
        self.x = vec![Complex64::new(0.0, 0.0); new_size];
        self.j = vec![Complex64::new(0.0, 0.0); new_size * new_size];
        self.f = vec![Complex64::new(0.0, 0.0); new_size];

        u.set_index(-1);
        for other in live {
            if let Some(other_idx) = other.index() {
                if other_idx > idx {
                    other.decrement_index();
                }
            }
        }

        self.dirty = true;
        self.factored = None;
    }

    fn grow_to(&mut self, size: usize) {
        let old_size = self.size;
        let mut a = vec![Complex64::new(0.0, 0.0); size * size];
        for row in 0..old_size {
            for col in 0..old_size {
                a[row * size + col] = self.a[row * old_size + col];
            }
        }
        self.a = a;
        self.z.resize(size, Complex64::new(0.0, 0.0));
        self.x.resize(size, Complex64::new(0.0, 0.0));
        self.j = vec![Complex64::new(0.0, 0.0); size * size];
        self.f = vec![Complex64::new(0.0, 0.0); size];
    }

    /// Clear `z` at the start of a tick's update phase. `A` is left
    /// untouched — only stamp operations that explicitly mutate `A` may do
    /// so; this is the single most important performance invariant of the
    /// design (factorization reuse depends on it).
    pub fn clear_z(&mut self) {
        self.z.fill(Complex64::new(0.0, 0.0));
    }

    // --- A-stamps (mutate A, invalidate factorization) ---

    fn idx(u: Option<&Unknown>) -> Option<usize> {
        u.and_then(|u| u.index())
    }

    pub fn add_admittance(&mut self, a: Option<&Unknown>, b: Option<&Unknown>, y: Complex64) {
        let (ia, ib) = (Self::idx(a), Self::idx(b));
        let n = self.size;
        if let Some(i) = ia {
            self.a[i * n + i] += y;
        }
        if let Some(j) = ib {
            self.a[j * n + j] += y;
        }
        if let (Some(i), Some(j)) = (ia, ib) {
            self.a[i * n + j] -= y;
            self.a[j * n + i] -= y;
        }
        self.dirty = true;
    }

    pub fn add_impedance(&mut self, a: Option<&Unknown>, b: Option<&Unknown>, z: Complex64) {
        self.add_admittance(a, b, Complex64::new(1.0, 0.0) / z);
    }

    pub fn add_resistance(&mut self, a: Option<&Unknown>, b: Option<&Unknown>, r: f64) {
        self.add_impedance(a, b, Complex64::new(r, 0.0));
    }

    pub fn add_reactance(&mut self, a: Option<&Unknown>, b: Option<&Unknown>, x: f64) {
        self.add_impedance(a, b, Complex64::new(0.0, x));
    }

    /// Stamp a voltage source: `V(b) - V(a) = v`, branch current unknown `i`.
    /// Call [`Self::set_voltage`] afterward (or each tick) to set `v`.
    pub fn stamp_voltage_source(&mut self, a: Option<&Unknown>, b: Option<&Unknown>, i: &Unknown) {
        let n = self.size;
        let ii = i.index().expect("branch unknown must be live");
        if let Some(a) = Self::idx(a) {
            self.a[ii * n + a] -= Complex64::new(1.0, 0.0);
            self.a[a * n + ii] -= Complex64::new(1.0, 0.0);
        }
        if let Some(b) = Self::idx(b) {
            self.a[ii * n + b] += Complex64::new(1.0, 0.0);
            self.a[b * n + ii] += Complex64::new(1.0, 0.0);
        }
        self.dirty = true;
    }

    pub fn set_voltage(&mut self, i: &Unknown, v: Complex64) {
        if let Some(idx) = i.index() {
            self.z[idx] = v;
        }
    }

    /// Stamp a two-winding transformer (AC only; callers must not invoke this
    /// at DC, where the transformer contributes no stamp). See spec §4.1.
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
        let n = self.size;
        let i1 = i1.index().expect("branch unknown must be live");
        let i2 = i2.index().expect("branch unknown must be live");

        if let Some(a) = Self::idx(a) {
            self.a[a * n + i1] += Complex64::new(1.0, 0.0);
            self.a[i1 * n + a] += Complex64::new(1.0, 0.0);
        }
        if let Some(b) = Self::idx(b) {
            self.a[b * n + i1] -= Complex64::new(1.0, 0.0);
            self.a[i1 * n + b] -= Complex64::new(1.0, 0.0);
        }
        if let Some(c) = Self::idx(c) {
            self.a[c * n + i2] += Complex64::new(1.0, 0.0);
            self.a[i2 * n + c] += Complex64::new(1.0, 0.0);
        }
        if let Some(d) = Self::idx(d) {
            self.a[d * n + i2] -= Complex64::new(1.0, 0.0);
            self.a[i2 * n + d] -= Complex64::new(1.0, 0.0);
        }

        self.a[i1 * n + i1] -= Complex64::new(0.0, wl1);
        self.a[i2 * n + i2] -= Complex64::new(0.0, wl2);
        self.a[i1 * n + i2] -= Complex64::new(0.0, wm);
        self.a[i2 * n + i1] -= Complex64::new(0.0, wm);

        self.dirty = true;
    }

    // --- z-stamps (do not invalidate factorization) ---

    /// Current flows from `a` to `b` externally; this accumulates on top of
    /// whatever has already been stamped into `z` this tick.
    pub fn add_current(&mut self, a: Option<&Unknown>, b: Option<&Unknown>, i: Complex64) {
        if let Some(a) = Self::idx(a) {
            self.z[a] -= i;
        }
        if let Some(b) = Self::idx(b) {
            self.z[b] += i;
        }
    }

    // --- Newton-Raphson stamps (mutate J, F) ---

    pub fn add_nonlinear_current(
        &mut self,
        a: Option<&Unknown>,
        b: Option<&Unknown>,
        i: Complex64,
        di_da: Complex64,
        di_db: Complex64,
    ) {
        let n = self.size;
        let (ia, ib) = (Self::idx(a), Self::idx(b));
        if let Some(a) = ia {
            self.f[a] += i;
            self.j[a * n + a] += di_da;
        }
        if let Some(b) = ib {
            self.f[b] -= i;
            self.j[b * n + b] -= di_db;
        }
        if let (Some(a), Some(b)) = (ia, ib) {
            self.j[a * n + b] += di_db;
            self.j[b * n + a] -= di_da;
        }
    }

    // --- Solve ---

    fn factor(&mut self) {
        if !self.dirty && self.factored.is_some() {
            return;
        }
        self.factored = match self.strategy {
            Strategy::Lu => matrix::lu_factor(&self.a, self.size).map(Factored::Lu),
            Strategy::Qr => matrix::qr_factor(&self.a, self.size).map(Factored::Qr),
        };
        self.dirty = false;
    }

    /// Solve `A x = z`. On a singular `A`, `x` is left at zero; the caller
    /// (`Circuit::process_tick`) is expected to log a diagnostic via
    /// [`Self::is_singular`]. This never panics or returns an error — see
    /// spec §4.1, "Solve (linear)".
    pub fn solve_linear(&mut self) {
        self.factor();
        match &self.factored {
            Some(Factored::Lu(lu)) => self.x = lu.solve(&self.z),
            Some(Factored::Qr(qr)) => self.x = qr.solve(&self.z),
            None => self.x.fill(Complex64::new(0.0, 0.0)),
        }
    }

    pub fn is_singular(&self) -> bool {
        self.size > 0 && self.factored.is_none()
    }

    /// `J <- A`; `F <- A*x - z`. Must be called at the top of every NR
    /// iteration (not once before the loop), since both depend on the
    /// current `x`, which the previous iteration just updated.
    pub fn begin_nr_iteration(&mut self) {
        let n = self.size;
        self.j.copy_from_slice(&self.a);
        for row in 0..n {
            let mut sum = Complex64::new(0.0, 0.0);
            for col in 0..n {
                sum += self.a[row * n + col] * self.x[col];
            }
            self.f[row] = sum - self.z[row];
        }
    }

    /// Solve `J dx = -F`, apply the damped update `x <- x + k*dx`. Returns
    /// `true` once `|dx[i]| < REL_TOL*|x[i]| + ABS_TOL` holds for every row.
    pub fn solve_nr_iteration(&mut self, iteration: usize) -> bool {
        let n = self.size;
        let neg_f: Vec<Complex64> = self.f.iter().map(|v| -v).collect();

        let dx = match matrix::lu_factor(&self.j, n) {
            Some(lu) => lu.solve(&neg_f),
            // A singular Jacobian mid-iteration: hold x and declare convergence
            // rather than diverging further.
            None => return true,
        };

        let k = if iteration < 3 { 0.2 } else { 1.0 };
        let mut converged = true;
        let mut max_delta = 0.0_f64;
        for i in 0..n {
            let step = dx[i] * k;
            self.x[i] += step;
            let delta = step.norm();
            max_delta = max_delta.max(delta);
            if delta >= REL_TOL * self.x[i].norm() + ABS_TOL {
                converged = false;
            }
        }
        self.last_delta = max_delta;
        converged
    }

    /// The largest `|dx[i]|` observed in the most recent
    /// [`Self::solve_nr_iteration`] call, for non-convergence diagnostics.
    pub fn last_delta(&self) -> f64 {
        self.last_delta
    }

    pub fn voltage(&self, u: Option<&Unknown>) -> Complex64 {
        match Self::idx(u) {
            Some(i) => self.x[i],
            None => Complex64::new(0.0, 0.0),
        }
    }
}

impl Default for MnaSolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn c(re: f64) -> Complex64 {
        Complex64::new(re, 0.0)
    }

    #[test]
    fn voltage_divider_solves() {
        let mut s = MnaSolver::new();
        let n0 = s.add_unknown();
        let n1 = s.add_unknown();
        let ib = s.add_unknown();

        s.stamp_voltage_source(None, Some(&n0), &ib);
        s.add_resistance(Some(&n0), Some(&n1), 100.0);
        s.add_resistance(Some(&n1), None, 1000.0);

        s.set_voltage(&ib, c(24.0));
        s.solve_linear();

        assert_relative_eq!(s.voltage(Some(&n0)).re, 24.0, epsilon = 1e-9);
        assert_relative_eq!(s.voltage(Some(&n1)).re, 1000.0 / 1100.0 * 24.0, epsilon = 1e-6);
    }

    #[test]
    fn add_then_subtract_admittance_is_noop() {
        let mut s = MnaSolver::new();
        let a = s.add_unknown();
        let b = s.add_unknown();
        let y = Complex64::new(1.5, -0.5);
        s.add_admittance(Some(&a), Some(&b), y);
        s.add_admittance(Some(&a), Some(&b), -y);
        assert!(s.a.iter().all(|v| v.norm() < 1e-12));
    }

    #[test]
    fn remove_unknown_shrinks_and_renumbers() {
        let mut s = MnaSolver::new();
        let a = s.add_unknown();
        let b = s.add_unknown();
        let c_u = s.add_unknown();
        assert_eq!(b.index(), Some(1));
        assert_eq!(c_u.index(), Some(2));

        let live = vec![a.clone(), c_u.clone()];
        s.remove_unknown(&b, live.into_iter());

        assert_eq!(b.index(), None);
        assert_eq!(a.index(), Some(0));
        assert_eq!(c_u.index(), Some(1));
        assert_eq!(s.size(), 2);
    }
}
