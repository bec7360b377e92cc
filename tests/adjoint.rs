//! Forward and reverse derivatives of the structural operators must be
//! adjoint to each other: for every seed pair,
//! `<aseed, J * fseed> == <J^T * aseed, fseed>`.

use approx::assert_relative_eq;
use numbat::{Function, Mx, Sparsity};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const TRIALS: usize = 100;

fn random_pattern(rng: &mut StdRng, nrow: usize, ncol: usize, density: f64) -> Sparsity {
    let mut entries = Vec::new();
    for c in 0..ncol {
        for r in 0..nrow {
            if rng.random_bool(density) {
                entries.push((r, c));
            }
        }
    }
    Sparsity::triplet(nrow, ncol, &entries).unwrap()
}

fn random_values(rng: &mut StdRng, n: usize) -> Vec<f64> {
    (0..n).map(|_| rng.random_range(-1.0..1.0)).collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Check one random adjoint pair of a single-output Function.
fn check_adjoint_pair(f: &Function, rng: &mut StdRng) {
    let fwd = f.forward(1).unwrap();
    let adj = f.reverse(1).unwrap();

    let nominal: Vec<Vec<f64>> = (0..f.n_in()).map(|i| random_values(rng, f.nnz_in(i))).collect();
    let placeholders: Vec<Vec<f64>> = (0..f.n_out()).map(|o| vec![0.0; f.nnz_out(o)]).collect();
    let fseed: Vec<Vec<f64>> = (0..f.n_in()).map(|i| random_values(rng, f.nnz_in(i))).collect();
    let aseed: Vec<Vec<f64>> = (0..f.n_out()).map(|o| random_values(rng, f.nnz_out(o))).collect();

    let mut fwd_args = nominal.clone();
    fwd_args.extend(placeholders.iter().cloned());
    fwd_args.extend(fseed.iter().cloned());
    let fsens = fwd.call(&fwd_args).unwrap();

    let mut adj_args = nominal;
    adj_args.extend(placeholders);
    adj_args.extend(aseed.iter().cloned());
    let asens = adj.call(&adj_args).unwrap();

    let lhs: f64 = aseed.iter().zip(&fsens).map(|(a, s)| dot(a, s)).sum();
    let rhs: f64 = fseed.iter().zip(&asens).map(|(s, a)| dot(s, a)).sum();
    assert_relative_eq!(lhs, rhs, epsilon = 1e-12, max_relative = 1e-10);
}

// ============================================================
// Per-operator adjoint pairs
// ============================================================

#[test]
fn repmat_forward_and_reverse_are_adjoint() {
    let mut rng = StdRng::seed_from_u64(0x7e9);
    for _ in 0..TRIALS {
        let (m, n) = (rng.random_range(1..5), rng.random_range(1..5));
        let reps = rng.random_range(2..5);
        let x = Mx::sym("x", random_pattern(&mut rng, m, n, 0.6));
        let f = Function::mx("f", &[x.clone()], &[x.repmat(reps).unwrap()]).unwrap();
        check_adjoint_pair(&f, &mut rng);
    }
}

#[test]
fn repsum_forward_and_reverse_are_adjoint() {
    let mut rng = StdRng::seed_from_u64(0x5e1);
    for _ in 0..TRIALS {
        let (m, width) = (rng.random_range(1..5), rng.random_range(1..4));
        let blocks = rng.random_range(2..5);
        let x = Mx::sym("x", random_pattern(&mut rng, m, width * blocks, 0.5));
        let f = Function::mx("f", &[x.clone()], &[x.repsum(blocks).unwrap()]).unwrap();
        check_adjoint_pair(&f, &mut rng);
    }
}

#[test]
fn rank1_forward_and_reverse_are_adjoint() {
    let mut rng = StdRng::seed_from_u64(0x41);
    for _ in 0..TRIALS {
        let (m, n) = (rng.random_range(1..5), rng.random_range(1..5));
        let a = Mx::sym("A", random_pattern(&mut rng, m, n, 0.4));
        let alpha = Mx::sym_dense("alpha", 1, 1);
        let x = Mx::sym("x", random_pattern(&mut rng, m, 1, 0.7));
        let y = Mx::sym("y", random_pattern(&mut rng, n, 1, 0.7));
        let r = Mx::rank1(&a, &alpha, &x, &y).unwrap();
        let f = Function::mx("f", &[a, alpha, x, y], &[r]).unwrap();
        check_adjoint_pair(&f, &mut rng);
    }
}

#[test]
fn composed_graph_is_adjoint_in_both_bodies() {
    let mut rng = StdRng::seed_from_u64(0xc0);
    for _ in 0..TRIALS {
        let (m, n) = (rng.random_range(1..4), rng.random_range(1..4));
        let reps = rng.random_range(2..4);
        let a = Mx::sym("A", random_pattern(&mut rng, m, n * reps, 0.5));
        let alpha = Mx::sym_dense("alpha", 1, 1);
        let x = Mx::sym_dense("x", m, 1);
        let y = Mx::sym("y", random_pattern(&mut rng, n, 1, 0.8));
        // repsum(A) + alpha x yᵀ, then tiled back out and added to A.
        let r = Mx::rank1(&a.repsum(reps).unwrap(), &alpha, &x, &y).unwrap();
        let out = r.repmat(reps).unwrap().add(&a).unwrap();
        let f = Function::mx("f", &[a, alpha, x, y], &[out]).unwrap();
        check_adjoint_pair(&f, &mut rng);
        check_adjoint_pair(&f.expand().unwrap(), &mut rng);
    }
}

// ============================================================
// Derivatives against finite differences
// ============================================================

#[test]
fn rank1_forward_matches_central_differences() {
    let mut rng = StdRng::seed_from_u64(99);
    let a = Mx::sym_dense("A", 3, 2);
    let alpha = Mx::sym_dense("alpha", 1, 1);
    let x = Mx::sym_dense("x", 3, 1);
    let y = Mx::sym_dense("y", 2, 1);
    let r = Mx::rank1(&a, &alpha, &x, &y).unwrap();
    let f = Function::mx("f", &[a, alpha, x, y], &[r]).unwrap();
    let fwd = f.forward(1).unwrap();

    for _ in 0..20 {
        let nominal: Vec<Vec<f64>> = (0..4).map(|i| random_values(&mut rng, f.nnz_in(i))).collect();
        let seed: Vec<Vec<f64>> = (0..4).map(|i| random_values(&mut rng, f.nnz_in(i))).collect();
        let mut args = nominal.clone();
        args.push(vec![0.0; 6]);
        args.extend(seed.iter().cloned());
        let tangent = fwd.call(&args).unwrap().remove(0);

        let h = 1e-6;
        let shifted = |sign: f64| -> Vec<f64> {
            let point: Vec<Vec<f64>> = nominal
                .iter()
                .zip(&seed)
                .map(|(v, s)| v.iter().zip(s).map(|(a, b)| a + sign * h * b).collect())
                .collect();
            f.call(&point).unwrap().remove(0)
        };
        let (plus, minus) = (shifted(1.0), shifted(-1.0));
        for k in 0..6 {
            assert_relative_eq!(tangent[k], (plus[k] - minus[k]) / (2.0 * h), epsilon = 1e-7);
        }
    }
}
