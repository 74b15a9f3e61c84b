//! Dense complex matrix factorization and solving.
//!
//! The working matrix is stored as a flat row-major `Vec<Complex64>`, exactly
//! as the teacher's `MnaMatrix.a: Vec<f64>` is, generalized to complex
//! entries. Circuits in this domain stay small (spec budget: N ≤ ~64), so a
//! dense representation with hand-rolled partial-pivoted LU is the right
//! trade-off — see `spec.md` §9 for the sparse-CSR extension point this
//! deliberately leaves unimplemented.

use num_complex::Complex64;

/// Below this pivot magnitude the matrix is treated as singular.
const SINGULAR_EPS: f64 = 1e-15;

/// Which factorization strategy [`crate::solver::MnaSolver`] should use for
/// the main linear solve. LU is cheaper and is the natural choice for
/// DC-only (mostly real) circuits; QR is more numerically stable for AC
/// networks where reactive stamps can produce near-singular blocks (spec §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Lu,
    Qr,
}

/// A cached LU decomposition with partial pivoting, in the teacher's
/// in-place-`Vec` style (`MnaMatrix::factor`/`solve` in `pedaler_core`),
/// generalized to complex arithmetic.
#[derive(Debug, Clone)]
pub struct LuFactored {
    lu: Vec<Complex64>,
    pivots: Vec<usize>,
    n: usize,
}

/// Factor `a` (an `n x n` row-major matrix) via partial-pivoted Doolittle LU.
/// Returns `None` if a pivot column is numerically zero (singular).
pub fn lu_factor(a: &[Complex64], n: usize) -> Option<LuFactored> {
    let mut lu = a.to_vec();
    let mut pivots: Vec<usize> = (0..n).collect();

    for k in 0..n {
        let mut max_val = lu[k * n + k].norm();
        let mut max_row = k;
        for i in (k + 1)..n {
            let val = lu[i * n + k].norm();
            if val > max_val {
                max_val = val;
                max_row = i;
            }
        }

        if max_val < SINGULAR_EPS {
            return None;
        }

        if max_row != k {
            pivots.swap(k, max_row);
            for j in 0..n {
                lu.swap(k * n + j, max_row * n + j);
            }
        }

        let pivot = lu[k * n + k];
        for i in (k + 1)..n {
            let factor = lu[i * n + k] / pivot;
            lu[i * n + k] = factor;
            for j in (k + 1)..n {
                lu[i * n + j] -= factor * lu[k * n + j];
            }
        }
    }

    Some(LuFactored { lu, pivots, n })
}

impl LuFactored {
    /// Solve `A x = b` using this cached factorization.
    pub fn solve(&self, b: &[Complex64]) -> Vec<Complex64> {
        let n = self.n;
        let mut x = vec![Complex64::new(0.0, 0.0); n];

        for i in 0..n {
            x[i] = b[self.pivots[i]];
        }

        for i in 0..n {
            for j in 0..i {
                x[i] -= self.lu[i * n + j] * x[j];
            }
        }

        for i in (0..n).rev() {
            for j in (i + 1)..n {
                x[i] -= self.lu[i * n + j] * x[j];
            }
            x[i] /= self.lu[i * n + i];
        }

        x
    }
}

/// A cached Householder QR decomposition for complex matrices, stored as the
/// sequence of reflectors applied to reach the upper-triangular `r`. Reused
/// for the AC-network factorization strategy (spec §9).
#[derive(Debug, Clone)]
pub struct QrFactored {
    r: Vec<Complex64>,
    reflectors: Vec<(usize, Vec<Complex64>, f64)>,
    n: usize,
}

/// Factor `a` via complex Householder QR. Returns `None` if a column is
/// (numerically) entirely zero below its diagonal, i.e. rank-deficient.
pub fn qr_factor(a: &[Complex64], n: usize) -> Option<QrFactored> {
    let mut r = a.to_vec();
    let mut reflectors = Vec::with_capacity(n);

    for k in 0..n {
        let norm_sq: f64 = (k..n).map(|i| r[i * n + k].norm_sqr()).sum();
        let norm = norm_sq.sqrt();
        if norm < SINGULAR_EPS {
            return None;
        }

        let rkk = r[k * n + k];
        let phase = if rkk.norm() > SINGULAR_EPS {
            rkk / rkk.norm()
        } else {
            Complex64::new(1.0, 0.0)
        };
        let alpha = -phase * norm;

        let mut v: Vec<Complex64> = (k..n).map(|i| r[i * n + k]).collect();
        v[0] -= alpha;

        let v_norm_sq: f64 = v.iter().map(|c| c.norm_sqr()).sum();
        if v_norm_sq < SINGULAR_EPS {
            // Column already upper-triangular at this step; identity reflector.
            reflectors.push((k, v, 1.0));
            continue;
        }

        for j in k..n {
            let mut dot = Complex64::new(0.0, 0.0);
            for i in k..n {
                dot += v[i - k].conj() * r[i * n + j];
            }
            let factor = dot * (2.0 / v_norm_sq);
            for i in k..n {
                r[i * n + j] -= factor * v[i - k];
            }
        }

        reflectors.push((k, v, v_norm_sq));
    }

    Some(QrFactored { r, reflectors, n })
}

impl QrFactored {
    /// Solve `A x = b` using this cached factorization: apply `Q^H` to `b`
    /// via the stored reflectors, then back-substitute against `R`.
    pub fn solve(&self, b: &[Complex64]) -> Vec<Complex64> {
        let n = self.n;
        let mut y = b.to_vec();

        for (k, v, v_norm_sq) in &self.reflectors {
            if *v_norm_sq <= 1.0 && v.iter().all(|c| c.norm() == 0.0) {
                continue;
            }
            let mut dot = Complex64::new(0.0, 0.0);
            for i in *k..n {
                dot += v[i - k].conj() * y[i];
            }
            let factor = dot * (2.0 / v_norm_sq);
            for i in *k..n {
                y[i] -= factor * v[i - k];
            }
        }

        let mut x = vec![Complex64::new(0.0, 0.0); n];
        for i in (0..n).rev() {
            let mut sum = y[i];
            for j in (i + 1)..n {
                sum -= self.r[i * n + j] * x[j];
            }
            x[i] = sum / self.r[i * n + i];
        }
        x
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
    fn lu_solves_simple_real_system() {
        // [2 1; 1 3] x = [5; 10] -> x = [1, 3]
        let a = vec![c(2.0), c(1.0), c(1.0), c(3.0)];
        let b = vec![c(5.0), c(10.0)];
        let lu = lu_factor(&a, 2).expect("not singular");
        let x = lu.solve(&b);
        assert_relative_eq!(x[0].re, 1.0, epsilon = 1e-10);
        assert_relative_eq!(x[1].re, 3.0, epsilon = 1e-10);
    }

    #[test]
    fn lu_detects_singular_matrix() {
        let a = vec![c(1.0), c(2.0), c(2.0), c(4.0)];
        assert!(lu_factor(&a, 2).is_none());
    }

    #[test]
    fn qr_solves_simple_real_system() {
        let a = vec![c(2.0), c(1.0), c(1.0), c(3.0)];
        let b = vec![c(5.0), c(10.0)];
        let qr = qr_factor(&a, 2).expect("not singular");
        let x = qr.solve(&b);
        assert_relative_eq!(x[0].re, 1.0, epsilon = 1e-8);
        assert_relative_eq!(x[1].re, 3.0, epsilon = 1e-8);
    }

    #[test]
    fn qr_solves_complex_system() {
        // diag(2+0j, 0+1j) x = [4; j] -> x = [2, 1]
        let a = vec![
            Complex64::new(2.0, 0.0),
            Complex64::new(0.0, 0.0),
            Complex64::new(0.0, 0.0),
            Complex64::new(0.0, 1.0),
        ];
        let b = vec![Complex64::new(4.0, 0.0), Complex64::new(0.0, 1.0)];
        let qr = qr_factor(&a, 2).expect("not singular");
        let x = qr.solve(&b);
        assert_relative_eq!(x[0].re, 2.0, epsilon = 1e-8);
        assert_relative_eq!(x[1].re, 1.0, epsilon = 1e-8);
        assert_relative_eq!(x[1].im, 0.0, epsilon = 1e-8);
    }
}
