//! Sparse matrices: a [`Sparsity`] plus one value per structural nonzero.
//!
//! The same container holds numeric ([`DMatrix`]) and symbolic
//! ([`SxMatrix`]) data. Dense kernels here are written once over
//! [`Element`]; with symbolic entries they build expressions instead of
//! numbers, which is how the symbolic QR solver obtains its factorization
//! routine.

use crate::element::Element;
use crate::error::{Error, Result};
use crate::sparsity::Sparsity;
use crate::sx::SxElem;

/// Sparse matrix in compressed-column storage.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix<T> {
    sparsity: Sparsity,
    nz: Vec<T>,
}

/// Numeric matrix.
pub type DMatrix = Matrix<f64>;
/// Symbolic matrix.
pub type SxMatrix = Matrix<SxElem>;

impl<T: Element> Matrix<T> {
    pub fn new(sparsity: Sparsity, nz: Vec<T>) -> Result<Self> {
        if nz.len() != sparsity.nnz() {
            return Err(Error::dimension(
                "matrix",
                format!(
                    "{} values for a pattern with {} nonzeros",
                    nz.len(),
                    sparsity.nnz()
                ),
            ));
        }
        Ok(Matrix { sparsity, nz })
    }

    /// Structurally present entries, all zero.
    pub fn zeros(sparsity: Sparsity) -> Self {
        let nz = vec![T::zero(); sparsity.nnz()];
        Matrix { sparsity, nz }
    }

    /// Dense `nrow x ncol` matrix filled with `value`.
    pub fn filled(nrow: usize, ncol: usize, value: T) -> Self {
        Matrix {
            sparsity: Sparsity::dense(nrow, ncol),
            nz: vec![value; nrow * ncol],
        }
    }

    /// Dense matrix from column-major values.
    pub fn from_dense(nrow: usize, ncol: usize, values: &[T]) -> Result<Self> {
        if values.len() != nrow * ncol {
            return Err(Error::dimension(
                "from_dense",
                format!("{} values for {}x{}", values.len(), nrow, ncol),
            ));
        }
        Ok(Matrix {
            sparsity: Sparsity::dense(nrow, ncol),
            nz: values.to_vec(),
        })
    }

    /// Dense column vector.
    pub fn column(values: &[T]) -> Self {
        Matrix {
            sparsity: Sparsity::column(values.len()),
            nz: values.to_vec(),
        }
    }

    #[inline]
    pub fn sparsity(&self) -> &Sparsity {
        &self.sparsity
    }

    #[inline]
    pub fn nonzeros(&self) -> &[T] {
        &self.nz
    }

    #[inline]
    pub fn nonzeros_mut(&mut self) -> &mut [T] {
        &mut self.nz
    }

    pub fn into_nonzeros(self) -> Vec<T> {
        self.nz
    }

    pub fn nrow(&self) -> usize {
        self.sparsity.nrow()
    }

    pub fn ncol(&self) -> usize {
        self.sparsity.ncol()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.sparsity.shape()
    }

    pub fn nnz(&self) -> usize {
        self.nz.len()
    }

    /// Entry `(r, c)`; structural zeros read as zero.
    pub fn get(&self, r: usize, c: usize) -> T {
        match self.sparsity.get_nz(r, c) {
            Some(k) => self.nz[k].clone(),
            None => T::zero(),
        }
    }

    /// Column-major dense copy.
    pub fn to_dense(&self) -> Vec<T> {
        let nrow = self.nrow();
        let mut out = vec![T::zero(); self.sparsity.numel()];
        for (r, c, k) in self.sparsity.iter() {
            out[r + c * nrow] = self.nz[k].clone();
        }
        out
    }

    pub fn transpose(&self) -> Self {
        let (sp, mapping) = self.sparsity.transpose_with_mapping();
        let nz = mapping.iter().map(|&k| self.nz[k].clone()).collect();
        Matrix { sparsity: sp, nz }
    }

    /// `A(rows, cols)`.
    pub fn select(&self, rows: &[usize], cols: &[usize]) -> Result<Self> {
        let (sp, mapping) = self.sparsity.sub(rows, cols)?;
        let nz = mapping.iter().map(|&k| self.nz[k].clone()).collect();
        Ok(Matrix { sparsity: sp, nz })
    }

    /// Re-pattern onto `target`. Entries outside the current pattern read as zero.
    pub fn project(&self, target: &Sparsity) -> Result<Self> {
        let mapping = self.sparsity.projection_map(target)?;
        let nz = mapping
            .iter()
            .map(|&k| {
                if k == crate::sparsity::ABSENT {
                    T::zero()
                } else {
                    self.nz[k].clone()
                }
            })
            .collect();
        Ok(Matrix {
            sparsity: target.clone(),
            nz,
        })
    }

    /// Matrix product with the structural product pattern.
    pub fn mtimes(&self, other: &Matrix<T>) -> Result<Self> {
        let sp = self.sparsity.mtimes_pattern(&other.sparsity)?;
        let mut nz = vec![T::zero(); sp.nnz()];
        crate::mx::linalg::mtimes_kernel(
            &self.sparsity,
            &self.nz,
            &other.sparsity,
            &other.nz,
            &sp,
            &mut nz,
            &mut vec![T::zero(); sp.nrow()],
        );
        Ok(Matrix { sparsity: sp, nz })
    }

    /// Drop entries that are exactly zero (constant zeros for symbolic data).
    pub fn prune_zeros(&self) -> Self {
        let mut entries = Vec::with_capacity(self.nnz());
        let mut nz = Vec::with_capacity(self.nnz());
        for (r, c, k) in self.sparsity.iter() {
            if !self.nz[k].is_zero_constant() {
                entries.push((r, c));
                nz.push(self.nz[k].clone());
            }
        }
        let sparsity = Sparsity::from_sorted_entries(self.nrow(), self.ncol(), &entries);
        Matrix { sparsity, nz }
    }

    /// Thin QR factorization by modified Gram–Schmidt.
    ///
    /// For an `m x n` matrix with `m >= n`, returns `Q` (`m x n`, orthonormal
    /// columns) and `R` (`n x n`, upper triangular). Both are pruned of
    /// exact zeros. A rank-deficient input yields a zero (or non-finite)
    /// diagonal in `R`; detecting that is left to the caller.
    pub fn qr(&self) -> Result<(Self, Self)> {
        let (m, n) = self.shape();
        if m < n {
            return Err(Error::dimension(
                "qr",
                format!("{} has more columns than rows", self.sparsity.dim_string()),
            ));
        }
        let dense = self.to_dense();
        let mut q: Vec<Vec<T>> = Vec::with_capacity(n);
        let mut r = vec![T::zero(); n * n];
        for j in 0..n {
            let mut v: Vec<T> = dense[j * m..(j + 1) * m].to_vec();
            for (i, qi) in q.iter().enumerate() {
                let rij = dot(qi, &v);
                for (vk, qik) in v.iter_mut().zip(qi) {
                    *vk = vk.clone() - rij.clone() * qik.clone();
                }
                r[i + j * n] = rij;
            }
            let rjj = dot(&v, &v).sqrt();
            for vk in v.iter_mut() {
                *vk = vk.clone() / rjj.clone();
            }
            r[j + j * n] = rjj;
            q.push(v);
        }
        let q_flat: Vec<T> = q.into_iter().flatten().collect();
        let q = Matrix::from_dense(m, n, &q_flat)?.prune_zeros();
        let r = Matrix::from_dense(n, n, &r)?.prune_zeros();
        Ok((q, r))
    }

    /// Solve `R x = b` for upper triangular `R` and dense right-hand sides `b`.
    pub fn solve_upper(&self, b: &Matrix<T>) -> Result<Self> {
        self.check_triangular_solve(b, "solve_upper")?;
        let n = self.nrow();
        let rhs = b.to_dense();
        let mut x = vec![T::zero(); rhs.len()];
        for c in 0..b.ncol() {
            let col = c * n;
            for i in (0..n).rev() {
                let mut acc = rhs[col + i].clone();
                for j in (i + 1)..n {
                    let rij = self.get(i, j);
                    if !rij.is_zero_constant() {
                        acc = acc - rij * x[col + j].clone();
                    }
                }
                x[col + i] = acc / self.get(i, i);
            }
        }
        Matrix::from_dense(n, b.ncol(), &x)
    }

    /// Solve `Rᵀ x = b` for upper triangular `R` and dense right-hand sides `b`.
    pub fn solve_upper_transposed(&self, b: &Matrix<T>) -> Result<Self> {
        self.check_triangular_solve(b, "solve_upper_transposed")?;
        let n = self.nrow();
        let rhs = b.to_dense();
        let mut x = vec![T::zero(); rhs.len()];
        for c in 0..b.ncol() {
            let col = c * n;
            for i in 0..n {
                let mut acc = rhs[col + i].clone();
                for j in 0..i {
                    let rji = self.get(j, i);
                    if !rji.is_zero_constant() {
                        acc = acc - rji * x[col + j].clone();
                    }
                }
                x[col + i] = acc / self.get(i, i);
            }
        }
        Matrix::from_dense(n, b.ncol(), &x)
    }

    fn check_triangular_solve(&self, b: &Matrix<T>, op: &'static str) -> Result<()> {
        if !self.sparsity.is_square() || b.nrow() != self.nrow() {
            return Err(Error::dimension(
                op,
                format!(
                    "{} against right-hand side {}",
                    self.sparsity.dim_string(),
                    b.sparsity.dim_string()
                ),
            ));
        }
        Ok(())
    }
}

impl SxMatrix {
    /// Matrix of fresh symbols named `name_0, name_1, ...` in nonzero order.
    pub fn sym(name: &str, sparsity: Sparsity) -> Self {
        let nz = (0..sparsity.nnz())
            .map(|k| SxElem::sym(format!("{}_{}", name, k)))
            .collect();
        Matrix { sparsity, nz }
    }

    /// Dense matrix of fresh symbols.
    pub fn sym_dense(name: &str, nrow: usize, ncol: usize) -> Self {
        Self::sym(name, Sparsity::dense(nrow, ncol))
    }
}

fn dot<T: Element>(a: &[T], b: &[T]) -> T {
    let mut acc = T::zero();
    for (x, y) in a.iter().zip(b) {
        acc = acc + x.clone() * y.clone();
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn qr_reconstructs_matrix() {
        let a = DMatrix::from_dense(3, 3, &[4.0, 1.0, 2.0, 1.0, 3.0, 0.5, 2.0, 0.5, 5.0]).unwrap();
        let (q, r) = a.qr().unwrap();
        let qr = q.mtimes(&r).unwrap().to_dense();
        for (x, y) in qr.iter().zip(a.to_dense()) {
            assert_relative_eq!(*x, y, epsilon = 1e-12);
        }
        for i in 0..3 {
            for j in 0..i {
                assert_eq!(r.get(i, j), 0.0);
            }
        }
    }

    #[test]
    fn triangular_solves() {
        let r = DMatrix::from_dense(2, 2, &[2.0, 0.0, 1.0, 4.0]).unwrap();
        let b = DMatrix::column(&[5.0, 8.0]);
        let x = r.solve_upper(&b).unwrap();
        assert_relative_eq!(x.get(1, 0), 2.0);
        assert_relative_eq!(x.get(0, 0), 1.5);
        let y = r.solve_upper_transposed(&b).unwrap();
        assert_relative_eq!(y.get(0, 0), 2.5);
        assert_relative_eq!(y.get(1, 0), 1.375);
    }

    #[test]
    fn symbolic_qr_keeps_diagonal_structure() {
        let a = SxMatrix::sym("a", Sparsity::diag(3));
        let (q, r) = a.qr().unwrap();
        assert_eq!(q.nnz(), 3);
        assert_eq!(r.nnz(), 3);
    }

    #[test]
    fn select_permutes() {
        let a = DMatrix::from_dense(2, 2, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let p = a.select(&[1, 0], &[0, 1]).unwrap();
        assert_eq!(p.to_dense(), vec![2.0, 1.0, 4.0, 3.0]);
    }
}
