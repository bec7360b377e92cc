use num_traits::Float;

use numbat::Sparsity;

/// Dense LU factors with partial pivoting, stored row-major in one buffer:
/// unit-diagonal `L` strictly below the diagonal, `U` on and above it.
#[derive(Debug, Clone)]
pub struct DenseLu<F> {
    lu: Vec<F>,
    /// `perm[i]` is the original row of factored row `i`.
    perm: Vec<usize>,
    n: usize,
}

impl<F: Float> DenseLu<F> {
    /// Factorize the row-major `n x n` matrix `a`. `None` when a pivot
    /// falls below `1e-12` in magnitude or is not finite.
    #[allow(clippy::needless_range_loop)]
    pub fn factor(mut a: Vec<F>, n: usize) -> Option<Self> {
        debug_assert_eq!(a.len(), n * n);
        let mut perm: Vec<usize> = (0..n).collect();
        let eps = F::from(1e-12).unwrap_or_else(F::epsilon);

        for col in 0..n {
            let mut pivot_row = col;
            let mut pivot_abs = a[col * n + col].abs();
            for row in (col + 1)..n {
                let v = a[row * n + col].abs();
                if v > pivot_abs {
                    pivot_abs = v;
                    pivot_row = row;
                }
            }
            if !pivot_abs.is_finite() || pivot_abs < eps {
                return None;
            }
            if pivot_row != col {
                for j in 0..n {
                    a.swap(col * n + j, pivot_row * n + j);
                }
                perm.swap(col, pivot_row);
            }
            let pivot = a[col * n + col];
            for row in (col + 1)..n {
                let factor = a[row * n + col] / pivot;
                a[row * n + col] = factor;
                for j in (col + 1)..n {
                    let u = a[col * n + j];
                    a[row * n + j] = a[row * n + j] - factor * u;
                }
            }
        }
        Some(DenseLu { lu: a, perm, n })
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    /// Solve `A x = b`.
    #[allow(clippy::needless_range_loop)]
    pub fn solve(&self, b: &[F]) -> Vec<F> {
        let n = self.n;
        debug_assert_eq!(b.len(), n);
        let mut x: Vec<F> = self.perm.iter().map(|&p| b[p]).collect();
        for i in 1..n {
            for j in 0..i {
                x[i] = x[i] - self.lu[i * n + j] * x[j];
            }
        }
        for i in (0..n).rev() {
            for j in (i + 1)..n {
                x[i] = x[i] - self.lu[i * n + j] * x[j];
            }
            x[i] = x[i] / self.lu[i * n + i];
        }
        x
    }
}

/// Solve the row-major system `a x = b`, or `None` when `a` is singular.
pub fn lu_solve<F: Float>(a: Vec<F>, n: usize, b: &[F]) -> Option<Vec<F>> {
    DenseLu::factor(a, n).map(|lu| lu.solve(b))
}

/// Row-major dense copy of the matrix with pattern `sp` and nonzeros `nz`.
pub fn densify(sp: &Sparsity, nz: &[f64]) -> Vec<f64> {
    let ncol = sp.ncol();
    let mut out = vec![0.0; sp.nrow() * ncol];
    for (r, c, k) in sp.iter() {
        out[r * ncol + c] = nz[k];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn solves_with_pivoting() {
        // First pivot is zero.
        let x = lu_solve(vec![0.0, 1.0, 1.0, 0.0], 2, &[3.0, 7.0]).unwrap();
        assert_relative_eq!(x[0], 7.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn factors_reused_for_several_right_hand_sides() {
        // [1 2 3; 4 5 6; 7 8 0] x = b
        let lu = DenseLu::factor(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 0.0], 3).unwrap();
        let x = lu.solve(&[14.0, 32.0, 23.0]);
        for (xi, e) in x.iter().zip([1.0, 2.0, 3.0]) {
            assert_relative_eq!(*xi, e, epsilon = 1e-10);
        }
        let x = lu.solve(&[1.0, 4.0, 7.0]);
        for (xi, e) in x.iter().zip([1.0, 0.0, 0.0]) {
            assert_relative_eq!(*xi, e, epsilon = 1e-10);
        }
    }

    #[test]
    fn singular_matrix_has_no_factors() {
        assert!(DenseLu::factor(vec![1.0, 2.0, 2.0, 4.0], 2).is_none());
    }

    #[test]
    fn densify_places_nonzeros() {
        let sp = Sparsity::triplet(2, 3, &[(0, 2), (1, 0)]).unwrap();
        assert_eq!(densify(&sp, &[5.0, 7.0]), vec![0.0, 0.0, 7.0, 5.0, 0.0, 0.0]);
    }
}
