//! Compressed-column sparsity patterns.
//!
//! A [`Sparsity`] is the immutable nonzero structure of a 2-D object. It is
//! shared by reference counting: cloning a pattern never copies its index
//! arrays, and the block-triangular decomposition is computed at most once
//! per pattern and cached alongside it.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use crate::error::{Error, Result};

mod btf;
mod matching;
mod ops;

pub use self::btf::{invert_permutation, Btf};
pub use self::matching::{maximum_matching, Matching};

/// Sentinel for "no nonzero at this position".
pub const ABSENT: usize = usize::MAX;

struct SparsityData {
    nrow: usize,
    ncol: usize,
    colind: Vec<usize>,
    row: Vec<usize>,
    btf: OnceLock<Btf>,
}

/// Compressed-column sparsity pattern.
///
/// `colind` has `ncol + 1` non-decreasing offsets starting at zero; the row
/// indices of column `c` are `row[colind[c]..colind[c + 1]]`, sorted and
/// unique.
#[derive(Clone)]
pub struct Sparsity(Arc<SparsityData>);

impl Sparsity {
    /// Build a pattern from its compressed-column arrays, validating them.
    pub fn new(nrow: usize, ncol: usize, colind: Vec<usize>, row: Vec<usize>) -> Result<Self> {
        validate(nrow, ncol, &colind, &row)?;
        Ok(Self::from_parts(nrow, ncol, colind, row))
    }

    /// Build a pattern from arrays already known to be valid.
    pub(crate) fn from_parts(nrow: usize, ncol: usize, colind: Vec<usize>, row: Vec<usize>) -> Self {
        debug_assert!(validate(nrow, ncol, &colind, &row).is_ok());
        Sparsity(Arc::new(SparsityData {
            nrow,
            ncol,
            colind,
            row,
            btf: OnceLock::new(),
        }))
    }

    /// Build a pattern from a flat descriptor
    /// `[nrow, ncol, colind[0..=ncol], row[0..nnz]]`.
    pub fn compressed(descriptor: &[usize]) -> Result<Self> {
        if descriptor.len() < 3 {
            return Err(Error::malformed(format!(
                "descriptor of length {} is shorter than the 3-word minimum",
                descriptor.len()
            )));
        }
        let nrow = descriptor[0];
        let ncol = descriptor[1];
        let colind_end = ncol
            .checked_add(3)
            .ok_or_else(|| Error::malformed("column count overflows"))?;
        if descriptor.len() < colind_end {
            return Err(Error::malformed(format!(
                "descriptor of length {} cannot hold {} column offsets",
                descriptor.len(),
                ncol + 1
            )));
        }
        let colind = descriptor[2..colind_end].to_vec();
        let nnz = colind[ncol];
        if descriptor.len() != colind_end + nnz {
            return Err(Error::malformed(format!(
                "descriptor length {} does not match {} offsets and {} row indices",
                descriptor.len(),
                ncol + 1,
                nnz
            )));
        }
        let row = descriptor[colind_end..].to_vec();
        Self::new(nrow, ncol, colind, row)
    }

    /// Flat descriptor accepted by [`compressed`](Self::compressed).
    pub fn to_compressed(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(3 + self.ncol() + self.nnz());
        out.push(self.nrow());
        out.push(self.ncol());
        out.extend_from_slice(self.colind());
        out.extend_from_slice(self.row());
        out
    }

    /// Fully populated `nrow x ncol` pattern.
    pub fn dense(nrow: usize, ncol: usize) -> Self {
        let colind = (0..=ncol).map(|c| c * nrow).collect();
        let row = (0..ncol).flat_map(|_| 0..nrow).collect();
        Self::from_parts(nrow, ncol, colind, row)
    }

    /// Structurally empty `nrow x ncol` pattern.
    pub fn empty(nrow: usize, ncol: usize) -> Self {
        Self::from_parts(nrow, ncol, vec![0; ncol + 1], Vec::new())
    }

    /// Dense `1 x 1` pattern.
    pub fn scalar() -> Self {
        Self::dense(1, 1)
    }

    /// Dense `n x 1` column.
    pub fn column(n: usize) -> Self {
        Self::dense(n, 1)
    }

    /// Square diagonal pattern.
    pub fn diag(n: usize) -> Self {
        Self::from_parts(n, n, (0..=n).collect(), (0..n).collect())
    }

    /// Upper triangular (diagonal included) `n x n` pattern.
    pub fn upper(n: usize) -> Self {
        let mut colind = Vec::with_capacity(n + 1);
        let mut row = Vec::with_capacity(n * (n + 1) / 2);
        colind.push(0);
        for c in 0..n {
            row.extend(0..=c);
            colind.push(row.len());
        }
        Self::from_parts(n, n, colind, row)
    }

    /// Lower triangular (diagonal included) `n x n` pattern.
    pub fn lower(n: usize) -> Self {
        let mut colind = Vec::with_capacity(n + 1);
        let mut row = Vec::with_capacity(n * (n + 1) / 2);
        colind.push(0);
        for c in 0..n {
            row.extend(c..n);
            colind.push(row.len());
        }
        Self::from_parts(n, n, colind, row)
    }

    /// Pattern from `(row, col)` pairs. Duplicates are merged.
    pub fn triplet(nrow: usize, ncol: usize, entries: &[(usize, usize)]) -> Result<Self> {
        for &(r, c) in entries {
            if r >= nrow || c >= ncol {
                return Err(Error::malformed(format!(
                    "entry ({}, {}) outside {}x{}",
                    r, c, nrow, ncol
                )));
            }
        }
        let mut sorted: Vec<(usize, usize)> = entries.iter().map(|&(r, c)| (c, r)).collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut colind = vec![0usize; ncol + 1];
        for &(c, _) in &sorted {
            colind[c + 1] += 1;
        }
        for c in 0..ncol {
            colind[c + 1] += colind[c];
        }
        let row = sorted.into_iter().map(|(_, r)| r).collect();
        Ok(Self::from_parts(nrow, ncol, colind, row))
    }

    /// Pattern from `(row, col)` pairs already in column-major order without
    /// duplicates.
    pub(crate) fn from_sorted_entries(nrow: usize, ncol: usize, entries: &[(usize, usize)]) -> Self {
        let mut colind = vec![0usize; ncol + 1];
        for &(_, c) in entries {
            colind[c + 1] += 1;
        }
        for c in 0..ncol {
            colind[c + 1] += colind[c];
        }
        let row = entries.iter().map(|&(r, _)| r).collect();
        Self::from_parts(nrow, ncol, colind, row)
    }

    // ── Queries ──

    /// Number of rows.
    #[inline]
    pub fn nrow(&self) -> usize {
        self.0.nrow
    }

    /// Number of columns.
    #[inline]
    pub fn ncol(&self) -> usize {
        self.0.ncol
    }

    /// `(nrow, ncol)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.0.nrow, self.0.ncol)
    }

    /// Number of structural nonzeros.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.0.row.len()
    }

    /// `nrow * ncol`.
    #[inline]
    pub fn numel(&self) -> usize {
        self.0.nrow * self.0.ncol
    }

    /// Column offsets (length `ncol + 1`).
    #[inline]
    pub fn colind(&self) -> &[usize] {
        &self.0.colind
    }

    /// Row index of every nonzero.
    #[inline]
    pub fn row(&self) -> &[usize] {
        &self.0.row
    }

    pub fn is_dense(&self) -> bool {
        self.nnz() == self.numel()
    }

    pub fn is_scalar(&self) -> bool {
        self.nrow() == 1 && self.ncol() == 1
    }

    pub fn is_square(&self) -> bool {
        self.nrow() == self.ncol()
    }

    pub fn is_column(&self) -> bool {
        self.ncol() == 1
    }

    /// Whether both patterns are the same object (cheap identity check).
    #[inline]
    pub fn ptr_eq(&self, other: &Sparsity) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Nonzero index of `(r, c)`, if structurally present.
    pub fn get_nz(&self, r: usize, c: usize) -> Option<usize> {
        if r >= self.nrow() || c >= self.ncol() {
            return None;
        }
        let start = self.0.colind[c];
        let end = self.0.colind[c + 1];
        self.0.row[start..end]
            .binary_search(&r)
            .ok()
            .map(|k| start + k)
    }

    pub fn has_nz(&self, r: usize, c: usize) -> bool {
        self.get_nz(r, c).is_some()
    }

    /// Iterate over `(row, col, nz)` in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        (0..self.ncol()).flat_map(move |c| {
            (self.0.colind[c]..self.0.colind[c + 1]).map(move |el| (self.0.row[el], c, el))
        })
    }

    /// Column of every nonzero.
    pub fn col_of_nz(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.nnz());
        for c in 0..self.ncol() {
            for _ in self.0.colind[c]..self.0.colind[c + 1] {
                out.push(c);
            }
        }
        out
    }

    /// For a column pattern, the nonzero index of each row or [`ABSENT`].
    pub(crate) fn dense_lookup(&self) -> Vec<usize> {
        let mut lookup = vec![ABSENT; self.nrow() * self.ncol()];
        for (r, c, el) in self.iter() {
            lookup[r + c * self.nrow()] = el;
        }
        lookup
    }

    /// Block-triangular decomposition, computed on first use and cached.
    pub fn btf(&self) -> &Btf {
        self.0.btf.get_or_init(|| btf::compute_btf(self))
    }

    /// Size of a maximum matching between rows and columns.
    pub fn structural_rank(&self) -> usize {
        maximum_matching(self).size
    }

    pub(crate) fn dim_string(&self) -> String {
        format!("{}x{}", self.nrow(), self.ncol())
    }
}

fn validate(nrow: usize, ncol: usize, colind: &[usize], row: &[usize]) -> Result<()> {
    if colind.len() != ncol + 1 {
        return Err(Error::malformed(format!(
            "expected {} column offsets, got {}",
            ncol + 1,
            colind.len()
        )));
    }
    if colind[0] != 0 {
        return Err(Error::malformed(format!(
            "first column offset must be 0, got {}",
            colind[0]
        )));
    }
    for c in 0..ncol {
        if colind[c + 1] < colind[c] {
            return Err(Error::malformed(format!(
                "column offsets decrease at column {}: {} > {}",
                c,
                colind[c],
                colind[c + 1]
            )));
        }
    }
    if colind[ncol] != row.len() {
        return Err(Error::malformed(format!(
            "last column offset {} does not match {} row indices",
            colind[ncol],
            row.len()
        )));
    }
    for c in 0..ncol {
        let rows = &row[colind[c]..colind[c + 1]];
        for (k, &r) in rows.iter().enumerate() {
            if r >= nrow {
                return Err(Error::malformed(format!(
                    "row index {} in column {} exceeds {} rows",
                    r, c, nrow
                )));
            }
            if k > 0 && rows[k - 1] >= r {
                return Err(Error::malformed(format!(
                    "row indices in column {} are not sorted and unique",
                    c
                )));
            }
        }
    }
    Ok(())
}

impl PartialEq for Sparsity {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
            || (self.0.nrow == other.0.nrow
                && self.0.ncol == other.0.ncol
                && self.0.colind == other.0.colind
                && self.0.row == other.0.row)
    }
}

impl Eq for Sparsity {}

impl Hash for Sparsity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.nrow.hash(state);
        self.0.ncol.hash(state);
        self.0.colind.hash(state);
        self.0.row.hash(state);
    }
}

impl fmt::Debug for Sparsity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sparsity({}x{}, nnz={})", self.nrow(), self.ncol(), self.nnz())
    }
}

impl fmt::Display for Sparsity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dense() {
            write!(f, "{}x{}", self.nrow(), self.ncol())
        } else {
            write!(f, "{}x{},{}nz", self.nrow(), self.ncol(), self.nnz())
        }
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Sparsity {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serde::Serialize::serialize(&self.to_compressed(), serializer)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Sparsity {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let descriptor: Vec<usize> = serde::Deserialize::deserialize(deserializer)?;
        Sparsity::compressed(&descriptor).map_err(serde::de::Error::custom)
    }
}
