//! Block-triangular (Dulmage–Mendelsohn) decomposition.
//!
//! The pattern is treated as a bipartite graph between rows and columns. A
//! maximum matching splits it into a coarse decomposition: an under-determined
//! part reachable from unmatched columns, an over-determined part reachable
//! from unmatched rows, and a square, perfectly matched part in between. The
//! square part is further split into the strongly connected components of the
//! graph whose nodes are matched (row, column) pairs.
//!
//! Under the returned permutations the matrix `A(rowperm, colperm)` is block
//! upper triangular: every nonzero lies in a block `(bi, bj)` with `bi <= bj`.

use log::debug;

use super::matching::maximum_matching;
use super::{Sparsity, ABSENT};

/// Block-triangular decomposition of a sparsity pattern.
///
/// Row `k` of the permuted matrix is row `rowperm[k]` of the original and
/// column `k` is column `colperm[k]`. Block `b` spans permuted rows
/// `rowblock[b]..rowblock[b + 1]` and columns `colblock[b]..colblock[b + 1]`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Btf {
    pub rowperm: Vec<usize>,
    pub colperm: Vec<usize>,
    pub rowblock: Vec<usize>,
    pub colblock: Vec<usize>,
    /// Coarse row offsets: `[0, R1, R1+R2, R1+R2+R3, nrow]` where R1 belongs to
    /// the under-determined part, R2 to the square part, R3/R4 (matched/unmatched)
    /// to the over-determined part.
    pub coarse_rowblock: [usize; 5],
    /// Coarse column offsets: `[0, C0, C0+C1, C0+C1+C2, ncol]` where C0 are the
    /// unmatched columns, C1 the matched under-determined ones, C2 the square
    /// part and C3 the over-determined part.
    pub coarse_colblock: [usize; 5],
}

impl Btf {
    /// Number of diagonal blocks.
    pub fn nblock(&self) -> usize {
        self.rowblock.len() - 1
    }

    /// New position of every original row.
    pub fn inverse_rowperm(&self) -> Vec<usize> {
        invert_permutation(&self.rowperm)
    }

    /// New position of every original column.
    pub fn inverse_colperm(&self) -> Vec<usize> {
        invert_permutation(&self.colperm)
    }
}

/// Inverse of a permutation: `inv[p[k]] = k`.
pub fn invert_permutation(p: &[usize]) -> Vec<usize> {
    let mut inv = vec![ABSENT; p.len()];
    for (k, &pk) in p.iter().enumerate() {
        debug_assert!(pk < p.len() && inv[pk] == ABSENT, "not a permutation");
        inv[pk] = k;
    }
    inv
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Part {
    Unset,
    Under,
    Square,
    Over,
}

pub(crate) fn compute_btf(sp: &Sparsity) -> Btf {
    let (nrow, ncol) = sp.shape();
    let colind = sp.colind();
    let row = sp.row();
    let (spt, _) = sp.transpose_with_mapping();
    let rowind = spt.colind();
    let col = spt.row();

    let m = maximum_matching(sp);

    let mut row_part = vec![Part::Unset; nrow];
    let mut col_part = vec![Part::Unset; ncol];

    // Under-determined part: alternating paths from unmatched columns.
    let mut queue: Vec<usize> = (0..ncol).filter(|&j| m.col_to_row[j] == ABSENT).collect();
    for &j in &queue {
        col_part[j] = Part::Under;
    }
    let mut head = 0;
    while head < queue.len() {
        let j = queue[head];
        head += 1;
        for &i in &row[colind[j]..colind[j + 1]] {
            if row_part[i] != Part::Unset {
                continue;
            }
            row_part[i] = Part::Under;
            let next = m.row_to_col[i];
            if next != ABSENT && col_part[next] == Part::Unset {
                col_part[next] = Part::Under;
                queue.push(next);
            }
        }
    }

    // Over-determined part: alternating paths from unmatched rows.
    let mut queue: Vec<usize> = (0..nrow)
        .filter(|&i| m.row_to_col[i] == ABSENT && row_part[i] == Part::Unset)
        .collect();
    for &i in &queue {
        row_part[i] = Part::Over;
    }
    let mut head = 0;
    while head < queue.len() {
        let i = queue[head];
        head += 1;
        for &j in &col[rowind[i]..rowind[i + 1]] {
            if col_part[j] != Part::Unset {
                continue;
            }
            col_part[j] = Part::Over;
            let next = m.col_to_row[j];
            if next != ABSENT && row_part[next] == Part::Unset {
                row_part[next] = Part::Over;
                queue.push(next);
            }
        }
    }

    for p in row_part.iter_mut().chain(col_part.iter_mut()) {
        if *p == Part::Unset {
            *p = Part::Square;
        }
    }

    let mut rowperm = Vec::with_capacity(nrow);
    let mut colperm = Vec::with_capacity(ncol);
    let mut rowblock = vec![0];
    let mut colblock = vec![0];

    // Under-determined coarse block: unmatched columns first, then matched ones.
    let c0: Vec<usize> = (0..ncol)
        .filter(|&j| col_part[j] == Part::Under && m.col_to_row[j] == ABSENT)
        .collect();
    let c1: Vec<usize> = (0..ncol)
        .filter(|&j| col_part[j] == Part::Under && m.col_to_row[j] != ABSENT)
        .collect();
    let r1: Vec<usize> = (0..nrow).filter(|&i| row_part[i] == Part::Under).collect();
    colperm.extend_from_slice(&c0);
    colperm.extend_from_slice(&c1);
    rowperm.extend_from_slice(&r1);
    if !r1.is_empty() || !c0.is_empty() || !c1.is_empty() {
        rowblock.push(rowperm.len());
        colblock.push(colperm.len());
    }

    // Square part: strongly connected components of the matched-pair graph.
    let square: Vec<usize> = (0..ncol).filter(|&j| col_part[j] == Part::Square).collect();
    let mut local = vec![ABSENT; ncol];
    for (k, &j) in square.iter().enumerate() {
        local[j] = k;
    }
    let adjacency: Vec<Vec<usize>> = square
        .iter()
        .map(|&j| {
            row[colind[j]..colind[j + 1]]
                .iter()
                .filter(|&&i| row_part[i] == Part::Square)
                .map(|&i| local[m.row_to_col[i]])
                .collect()
        })
        .collect();
    for mut component in strongly_connected_components(&adjacency) {
        component.sort_unstable();
        for k in component {
            let j = square[k];
            colperm.push(j);
            rowperm.push(m.col_to_row[j]);
        }
        rowblock.push(rowperm.len());
        colblock.push(colperm.len());
    }

    // Over-determined coarse block: matched rows first, then unmatched ones.
    let c3: Vec<usize> = (0..ncol).filter(|&j| col_part[j] == Part::Over).collect();
    let r3: Vec<usize> = (0..nrow)
        .filter(|&i| row_part[i] == Part::Over && m.row_to_col[i] != ABSENT)
        .collect();
    let r4: Vec<usize> = (0..nrow)
        .filter(|&i| row_part[i] == Part::Over && m.row_to_col[i] == ABSENT)
        .collect();
    colperm.extend_from_slice(&c3);
    rowperm.extend_from_slice(&r3);
    rowperm.extend_from_slice(&r4);
    if !c3.is_empty() || !r3.is_empty() || !r4.is_empty() {
        rowblock.push(rowperm.len());
        colblock.push(colperm.len());
    }

    debug_assert_eq!(rowperm.len(), nrow);
    debug_assert_eq!(colperm.len(), ncol);

    let coarse_rowblock = [
        0,
        r1.len(),
        r1.len() + square.len(),
        r1.len() + square.len() + r3.len(),
        nrow,
    ];
    let coarse_colblock = [
        0,
        c0.len(),
        c0.len() + c1.len(),
        c0.len() + c1.len() + square.len(),
        ncol,
    ];

    debug!(
        "btf of {}: structural rank {}, {} blocks",
        sp,
        m.size,
        rowblock.len() - 1
    );

    Btf {
        rowperm,
        colperm,
        rowblock,
        colblock,
        coarse_rowblock,
        coarse_colblock,
    }
}

/// Tarjan's algorithm, iterative. Components are returned in the order they
/// complete, so every edge `v -> w` has `w` in the same or an earlier
/// component.
fn strongly_connected_components(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let n = adjacency.len();
    let mut index = vec![ABSENT; n];
    let mut lowlink = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut components = Vec::new();
    let mut counter = 0usize;

    for start in 0..n {
        if index[start] != ABSENT {
            continue;
        }
        // Frames are (node, next successor position).
        let mut frames: Vec<(usize, usize)> = vec![(start, 0)];
        index[start] = counter;
        lowlink[start] = counter;
        counter += 1;
        stack.push(start);
        on_stack[start] = true;

        while let Some(&(v, pos)) = frames.last() {
            if pos < adjacency[v].len() {
                if let Some(top) = frames.last_mut() {
                    top.1 += 1;
                }
                let w = adjacency[v][pos];
                if index[w] == ABSENT {
                    index[w] = counter;
                    lowlink[w] = counter;
                    counter += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    frames.push((w, 0));
                } else if on_stack[w] {
                    lowlink[v] = lowlink[v].min(index[w]);
                }
                continue;
            }

            frames.pop();
            if let Some(&(parent, _)) = frames.last() {
                lowlink[parent] = lowlink[parent].min(lowlink[v]);
            }
            if lowlink[v] == index[v] {
                let mut component = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                components.push(component);
            }
        }
    }
    components
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_block_upper(sp: &Sparsity, btf: &Btf) {
        let inv_r = btf.inverse_rowperm();
        let inv_c = btf.inverse_colperm();
        let block_of = |offsets: &[usize], k: usize| offsets.partition_point(|&o| o <= k) - 1;
        for (r, c, _) in sp.iter() {
            let br = block_of(&btf.rowblock, inv_r[r]);
            let bc = block_of(&btf.colblock, inv_c[c]);
            assert!(br <= bc, "entry ({}, {}) lands below the block diagonal", r, c);
        }
    }

    #[test]
    fn lower_triangular_splits_into_singletons() {
        let sp = Sparsity::lower(4);
        let btf = sp.btf();
        assert_eq!(btf.nblock(), 4);
        assert_block_upper(&sp, btf);
    }

    #[test]
    fn dense_is_one_block() {
        let sp = Sparsity::dense(3, 3);
        let btf = sp.btf();
        assert_eq!(btf.nblock(), 1);
        assert_eq!(btf.rowblock, vec![0, 3]);
    }

    #[test]
    fn cycle_forms_single_block() {
        let sp = Sparsity::triplet(3, 3, &[(0, 0), (1, 1), (2, 2), (0, 1), (1, 2), (2, 0)]).unwrap();
        assert_eq!(sp.btf().nblock(), 1);
    }

    #[test]
    fn rectangular_uses_coarse_blocks() {
        let sp = Sparsity::triplet(2, 3, &[(0, 0), (0, 1), (1, 2)]).unwrap();
        let btf = sp.btf();
        assert_block_upper(&sp, btf);
        assert_eq!(btf.coarse_colblock[4], 3);
        assert_eq!(btf.coarse_rowblock[4], 2);
        assert_eq!(btf.coarse_colblock[1], 1);
    }

    #[test]
    fn inverse_of_permutation() {
        let p = vec![2, 0, 3, 1];
        let inv = invert_permutation(&p);
        for k in 0..4 {
            assert_eq!(inv[p[k]], k);
        }
    }
}
