//! Pattern algebra. Every result here depends only on structure.

use super::{Sparsity, ABSENT};
use crate::error::{Error, Result};

impl Sparsity {
    /// Transposed pattern plus, for each of its nonzeros, the nonzero of `self`
    /// it came from.
    pub fn transpose_with_mapping(&self) -> (Sparsity, Vec<usize>) {
        let (nrow, ncol) = self.shape();
        let mut colind = vec![0usize; nrow + 1];
        for &r in self.row() {
            colind[r + 1] += 1;
        }
        for r in 0..nrow {
            colind[r + 1] += colind[r];
        }
        let mut next = colind.clone();
        let mut row = vec![0usize; self.nnz()];
        let mut mapping = vec![0usize; self.nnz()];
        for c in 0..ncol {
            for el in self.colind()[c]..self.colind()[c + 1] {
                let r = self.row()[el];
                let k = next[r];
                next[r] += 1;
                row[k] = c;
                mapping[k] = el;
            }
        }
        (Sparsity::from_parts(ncol, nrow, colind, row), mapping)
    }

    pub fn transpose(&self) -> Sparsity {
        self.transpose_with_mapping().0
    }

    fn check_same_shape(&self, other: &Sparsity, op: &'static str) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(Error::dimension(
                op,
                format!("{} vs {}", self.dim_string(), other.dim_string()),
            ));
        }
        Ok(())
    }

    /// Union of two equally shaped patterns, with the output position of every
    /// nonzero of `self` and of `other`.
    pub fn union_with_mapping(&self, other: &Sparsity) -> Result<(Sparsity, Vec<usize>, Vec<usize>)> {
        self.check_same_shape(other, "union")?;
        if self == other {
            let identity: Vec<usize> = (0..self.nnz()).collect();
            return Ok((self.clone(), identity.clone(), identity));
        }
        let ncol = self.ncol();
        let mut colind = Vec::with_capacity(ncol + 1);
        let mut row = Vec::with_capacity(self.nnz() + other.nnz());
        let mut map_a = vec![0usize; self.nnz()];
        let mut map_b = vec![0usize; other.nnz()];
        colind.push(0);
        for c in 0..ncol {
            let (mut ka, ea) = (self.colind()[c], self.colind()[c + 1]);
            let (mut kb, eb) = (other.colind()[c], other.colind()[c + 1]);
            while ka < ea || kb < eb {
                let ra = if ka < ea { self.row()[ka] } else { usize::MAX };
                let rb = if kb < eb { other.row()[kb] } else { usize::MAX };
                let pos = row.len();
                if ra <= rb {
                    map_a[ka] = pos;
                    ka += 1;
                }
                if rb <= ra {
                    map_b[kb] = pos;
                    kb += 1;
                }
                row.push(ra.min(rb));
            }
            colind.push(row.len());
        }
        Ok((
            Sparsity::from_parts(self.nrow(), ncol, colind, row),
            map_a,
            map_b,
        ))
    }

    pub fn union(&self, other: &Sparsity) -> Result<Sparsity> {
        Ok(self.union_with_mapping(other)?.0)
    }

    /// Entries present in both patterns.
    pub fn intersect(&self, other: &Sparsity) -> Result<Sparsity> {
        self.check_same_shape(other, "intersect")?;
        let mut entries = Vec::new();
        for (r, c, _) in self.iter() {
            if other.has_nz(r, c) {
                entries.push((r, c));
            }
        }
        Sparsity::triplet(self.nrow(), self.ncol(), &entries)
    }

    /// Whether every nonzero of `self` is also a nonzero of `other`.
    pub fn is_subset(&self, other: &Sparsity) -> bool {
        self.shape() == other.shape() && self.iter().all(|(r, c, _)| other.has_nz(r, c))
    }

    /// Pattern of the product `self * other`.
    pub fn mtimes_pattern(&self, other: &Sparsity) -> Result<Sparsity> {
        if self.ncol() != other.nrow() {
            return Err(Error::dimension(
                "mtimes",
                format!("{} times {}", self.dim_string(), other.dim_string()),
            ));
        }
        let nrow = self.nrow();
        let mut mark = vec![usize::MAX; nrow];
        let mut colind = Vec::with_capacity(other.ncol() + 1);
        let mut row = Vec::new();
        colind.push(0);
        for c in 0..other.ncol() {
            let start = row.len();
            for el in other.colind()[c]..other.colind()[c + 1] {
                let k = other.row()[el];
                for el2 in self.colind()[k]..self.colind()[k + 1] {
                    let r = self.row()[el2];
                    if mark[r] != c {
                        mark[r] = c;
                        row.push(r);
                    }
                }
            }
            row[start..].sort_unstable();
            colind.push(row.len());
        }
        Ok(Sparsity::from_parts(nrow, other.ncol(), colind, row))
    }

    /// `n` copies of `self` side by side.
    pub fn horzrep(&self, n: usize) -> Sparsity {
        let nnz = self.nnz();
        let mut colind = Vec::with_capacity(n * self.ncol() + 1);
        colind.push(0);
        for k in 0..n {
            colind.extend(self.colind()[1..].iter().map(|&o| o + k * nnz));
        }
        let row = (0..n).flat_map(|_| self.row().iter().copied()).collect();
        Sparsity::from_parts(self.nrow(), n * self.ncol(), colind, row)
    }

    /// Union of the `n` equally wide horizontal blocks of `self`, with the
    /// output position of every nonzero of `self`.
    pub fn horz_block_union(&self, n: usize) -> Result<(Sparsity, Vec<usize>)> {
        if n == 0 || self.ncol() % n != 0 {
            return Err(Error::dimension(
                "horzrepsum",
                format!("{} columns cannot be split into {} blocks", self.ncol(), n),
            ));
        }
        let width = self.ncol() / n;
        let mut entries = Vec::with_capacity(self.nnz());
        for (r, c, _) in self.iter() {
            entries.push((r, c % width));
        }
        let out = Sparsity::triplet(self.nrow(), width, &entries)?;
        let mut mapping = Vec::with_capacity(self.nnz());
        for (r, c, _) in self.iter() {
            let pos = out.get_nz(r, c % width).unwrap_or(ABSENT);
            debug_assert_ne!(pos, ABSENT);
            mapping.push(pos);
        }
        Ok((out, mapping))
    }

    /// Select rows and columns (`A(rows, cols)`), with the source nonzero of
    /// every nonzero of the result. Indices may repeat.
    pub fn sub(&self, rows: &[usize], cols: &[usize]) -> Result<(Sparsity, Vec<usize>)> {
        if let Some(&r) = rows.iter().find(|&&r| r >= self.nrow()) {
            return Err(Error::dimension(
                "sub",
                format!("row {} out of range for {}", r, self.dim_string()),
            ));
        }
        if let Some(&c) = cols.iter().find(|&&c| c >= self.ncol()) {
            return Err(Error::dimension(
                "sub",
                format!("column {} out of range for {}", c, self.dim_string()),
            ));
        }
        let mut targets: Vec<Vec<usize>> = vec![Vec::new(); self.nrow()];
        for (i, &r) in rows.iter().enumerate() {
            targets[r].push(i);
        }
        let mut colind = Vec::with_capacity(cols.len() + 1);
        let mut row = Vec::new();
        let mut mapping = Vec::new();
        let mut column: Vec<(usize, usize)> = Vec::new();
        colind.push(0);
        for &c in cols {
            column.clear();
            for el in self.colind()[c]..self.colind()[c + 1] {
                for &i in &targets[self.row()[el]] {
                    column.push((i, el));
                }
            }
            column.sort_unstable();
            for &(i, el) in &column {
                row.push(i);
                mapping.push(el);
            }
            colind.push(row.len());
        }
        Ok((
            Sparsity::from_parts(rows.len(), cols.len(), colind, row),
            mapping,
        ))
    }

    /// Pattern of `x * yᵀ` for column patterns `x` and `y`.
    pub fn outer(x: &Sparsity, y: &Sparsity) -> Result<Sparsity> {
        if !x.is_column() || !y.is_column() {
            return Err(Error::dimension(
                "outer",
                format!("{} and {} must be columns", x.dim_string(), y.dim_string()),
            ));
        }
        let xrows = x.row();
        let mut colind = Vec::with_capacity(y.nrow() + 1);
        let mut row = Vec::with_capacity(xrows.len() * y.nnz());
        colind.push(0);
        let mut ycol = vec![false; y.nrow()];
        for &j in y.row() {
            ycol[j] = true;
        }
        for present in ycol {
            if present {
                row.extend_from_slice(xrows);
            }
            colind.push(row.len());
        }
        Ok(Sparsity::from_parts(x.nrow(), y.nrow(), colind, row))
    }

    /// For every nonzero of `target`, the nonzero of `self` at the same
    /// position or [`ABSENT`].
    pub fn projection_map(&self, target: &Sparsity) -> Result<Vec<usize>> {
        self.check_same_shape(target, "project")?;
        Ok(target
            .iter()
            .map(|(r, c, _)| self.get_nz(r, c).unwrap_or(ABSENT))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transpose_mapping_points_back() {
        let sp = Sparsity::triplet(2, 3, &[(0, 0), (1, 0), (0, 2), (1, 1)]).unwrap();
        let (t, map) = sp.transpose_with_mapping();
        assert_eq!(t.shape(), (3, 2));
        for (r, c, el) in t.iter() {
            assert_eq!(sp.get_nz(c, r), Some(map[el]));
        }
    }

    #[test]
    fn union_maps_both_operands() {
        let a = Sparsity::triplet(3, 1, &[(0, 0), (2, 0)]).unwrap();
        let b = Sparsity::triplet(3, 1, &[(1, 0), (2, 0)]).unwrap();
        let (u, ma, mb) = a.union_with_mapping(&b).unwrap();
        assert!(u.is_dense());
        assert_eq!(ma, vec![0, 2]);
        assert_eq!(mb, vec![1, 2]);
    }

    #[test]
    fn horzrep_tiles_pattern() {
        let sp = Sparsity::diag(2).horzrep(3);
        assert_eq!(sp.shape(), (2, 6));
        assert_eq!(sp.nnz(), 6);
        assert!(sp.has_nz(1, 5));
        assert!(!sp.has_nz(0, 5));
    }

    #[test]
    fn block_union_is_or_of_tiles() {
        let sp = Sparsity::triplet(2, 4, &[(0, 0), (1, 3)]).unwrap();
        let (u, map) = sp.horz_block_union(2).unwrap();
        assert_eq!(u.shape(), (2, 2));
        assert!(u.has_nz(0, 0));
        assert!(u.has_nz(1, 1));
        assert_eq!(map, vec![0, 1]);
        assert!(sp.horz_block_union(3).is_err());
    }

    #[test]
    fn mtimes_pattern_of_diag_is_identity() {
        let d = Sparsity::diag(3);
        let dense = Sparsity::dense(3, 2);
        assert_eq!(d.mtimes_pattern(&dense).unwrap(), dense);
        assert!(dense.mtimes_pattern(&d).is_err());
    }

    #[test]
    fn sub_permutes_rows_and_columns() {
        let sp = Sparsity::triplet(2, 2, &[(0, 1), (1, 1)]).unwrap();
        let (p, map) = sp.sub(&[1, 0], &[1, 0]).unwrap();
        assert!(p.has_nz(0, 0));
        assert!(p.has_nz(1, 0));
        assert!(!p.has_nz(0, 1));
        assert_eq!(map, vec![1, 0]);
    }

    #[test]
    fn outer_of_sparse_columns() {
        let x = Sparsity::triplet(3, 1, &[(0, 0), (2, 0)]).unwrap();
        let y = Sparsity::triplet(2, 1, &[(1, 0)]).unwrap();
        let o = Sparsity::outer(&x, &y).unwrap();
        assert_eq!(o.shape(), (3, 2));
        assert_eq!(o.nnz(), 2);
        assert!(o.has_nz(0, 1) && o.has_nz(2, 1));
    }
}
