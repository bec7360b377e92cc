//! Maximum bipartite matching between the rows and columns of a pattern.
//!
//! Hopcroft–Karp: alternate a BFS that layers the columns by their distance
//! from the free columns with DFS passes that augment along vertex-disjoint
//! shortest paths, until no augmenting path remains. `O(nnz * sqrt(n))`.
//!
//! Free columns are processed in increasing index order and edges in storage
//! order, so the matching is reproducible for a given pattern.

use std::collections::VecDeque;

use super::{Sparsity, ABSENT};

const INF: usize = usize::MAX;

/// Result of a maximum matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matching {
    /// Row matched to each column, or [`ABSENT`].
    pub col_to_row: Vec<usize>,
    /// Column matched to each row, or [`ABSENT`].
    pub row_to_col: Vec<usize>,
    /// Number of matched pairs (the structural rank).
    pub size: usize,
}

/// Compute a maximum matching of `sp`'s bipartite row/column graph.
pub fn maximum_matching(sp: &Sparsity) -> Matching {
    let (nrow, ncol) = sp.shape();
    let colind = sp.colind();
    let row = sp.row();

    let mut col_to_row = vec![ABSENT; ncol];
    let mut row_to_col = vec![ABSENT; nrow];
    let mut dist = vec![INF; ncol];
    let mut size = 0usize;

    if nrow == 0 || ncol == 0 {
        return Matching {
            col_to_row,
            row_to_col,
            size,
        };
    }

    while bfs(colind, row, &col_to_row, &row_to_col, &mut dist) {
        for j in 0..ncol {
            if col_to_row[j] == ABSENT
                && augment(j, colind, row, &mut col_to_row, &mut row_to_col, &mut dist)
            {
                size += 1;
            }
        }
    }

    Matching {
        col_to_row,
        row_to_col,
        size,
    }
}

/// Layer the columns by alternating-path distance from the free columns.
/// Returns true if some free row is reachable.
fn bfs(
    colind: &[usize],
    row: &[usize],
    col_to_row: &[usize],
    row_to_col: &[usize],
    dist: &mut [usize],
) -> bool {
    let mut queue = VecDeque::with_capacity(dist.len());
    for (j, d) in dist.iter_mut().enumerate() {
        if col_to_row[j] == ABSENT {
            *d = 0;
            queue.push_back(j);
        } else {
            *d = INF;
        }
    }

    let mut found = false;
    while let Some(j) = queue.pop_front() {
        for &i in &row[colind[j]..colind[j + 1]] {
            let next = row_to_col[i];
            if next == ABSENT {
                found = true;
            } else if dist[next] == INF {
                dist[next] = dist[j] + 1;
                queue.push_back(next);
            }
        }
    }
    found
}

/// Iterative DFS along the BFS layers from free column `root`. On success
/// the matching is flipped along the path.
fn augment(
    root: usize,
    colind: &[usize],
    row: &[usize],
    col_to_row: &mut [usize],
    row_to_col: &mut [usize],
    dist: &mut [usize],
) -> bool {
    // Each frame is (column, next edge position to try).
    let mut stack: Vec<(usize, usize)> = vec![(root, colind[root])];

    while let Some(&(j, pos)) = stack.last() {
        if pos == colind[j + 1] {
            dist[j] = INF;
            stack.pop();
            continue;
        }
        if let Some(top) = stack.last_mut() {
            top.1 += 1;
        }

        let i = row[pos];
        let next = row_to_col[i];
        if next == ABSENT {
            // Every frame's last tried edge is on the augmenting path.
            for &(col, after) in &stack {
                let r = row[after - 1];
                col_to_row[col] = r;
                row_to_col[r] = col;
            }
            return true;
        }
        if dist[next] != INF && dist[next] == dist[j] + 1 {
            stack.push((next, colind[next]));
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagonal_is_perfect() {
        let m = maximum_matching(&Sparsity::diag(4));
        assert_eq!(m.size, 4);
        assert_eq!(m.col_to_row, vec![0, 1, 2, 3]);
    }

    #[test]
    fn needs_augmenting_path() {
        // col 0 -> rows {0, 1}, col 1 -> row {0}
        let sp = Sparsity::triplet(2, 2, &[(0, 0), (1, 0), (0, 1)]).unwrap();
        let m = maximum_matching(&sp);
        assert_eq!(m.size, 2);
        assert_eq!(m.col_to_row[1], 0);
        assert_eq!(m.col_to_row[0], 1);
    }

    #[test]
    fn structurally_singular() {
        let sp = Sparsity::triplet(3, 3, &[(0, 0), (0, 1), (1, 2), (2, 2)]).unwrap();
        assert_eq!(maximum_matching(&sp).size, 2);
        assert_eq!(sp.structural_rank(), 2);
    }

    #[test]
    fn rectangular() {
        let m = maximum_matching(&Sparsity::dense(2, 5));
        assert_eq!(m.size, 2);
        assert_eq!(m.row_to_col.iter().filter(|&&c| c != ABSENT).count(), 2);
    }
}
