use approx::assert_relative_eq;
use numbat::mx::{OpTag, Rank1};
use numbat::{Error, Function, Mx, Sparsity};

fn dense_rank1(a: &[f64], m: usize, n: usize, alpha: f64, x: &[f64], y: &[f64]) -> Vec<f64> {
    let mut out = a.to_vec();
    for c in 0..n {
        for r in 0..m {
            out[r + c * m] += alpha * x[r] * y[c];
        }
    }
    out
}

// ============================================================
// Builder
// ============================================================

#[test]
fn pattern_is_union_with_outer_product() {
    let a = Mx::sym("A", Sparsity::diag(3));
    let alpha = Mx::sym_dense("alpha", 1, 1);
    let x = Mx::sym("x", Sparsity::triplet(3, 1, &[(0, 0)]).unwrap());
    let y = Mx::sym("y", Sparsity::triplet(3, 1, &[(2, 0)]).unwrap());
    let r = Mx::rank1(&a, &alpha, &x, &y).unwrap();
    assert_eq!(r.tag(), OpTag::Rank1);
    assert_eq!(r.nnz(), 4);
    assert!(r.sparsity().has_nz(0, 2));
    // A is projected onto the output pattern.
    assert_eq!(r.dep(0).sparsity(), r.sparsity());
}

#[test]
fn shape_errors() {
    let a = Mx::sym_dense("A", 2, 3);
    let alpha = Mx::sym_dense("alpha", 1, 1);
    let x = Mx::sym_dense("x", 2, 1);
    let y = Mx::sym_dense("y", 3, 1);
    assert!(Mx::rank1(&a, &alpha, &x, &y).is_ok());
    let cases = [
        Mx::rank1(&a, &Mx::sym_dense("a2", 2, 1), &x, &y),
        Mx::rank1(&a, &alpha, &y, &y),
        Mx::rank1(&a, &alpha, &x, &x),
        Mx::rank1(&a, &alpha, &x.transpose(), &y),
    ];
    for result in cases {
        assert!(matches!(result, Err(Error::DimensionMismatch { op: "rank1", .. })));
    }
}

#[test]
fn structurally_empty_factor_returns_a() {
    let a = Mx::sym_dense("A", 2, 2);
    let alpha = Mx::sym_dense("alpha", 1, 1);
    let x = Mx::sym("x", Sparsity::empty(2, 1));
    let y = Mx::sym_dense("y", 2, 1);
    assert!(Mx::rank1(&a, &alpha, &x, &y).unwrap().ptr_eq(&a));
}

// ============================================================
// Evaluation
// ============================================================

#[test]
fn dense_update() {
    let (m, n) = (3, 2);
    let a = Mx::sym_dense("A", m, n);
    let alpha = Mx::sym_dense("alpha", 1, 1);
    let x = Mx::sym_dense("x", m, 1);
    let y = Mx::sym_dense("y", n, 1);
    let r = Mx::rank1(&a, &alpha, &x, &y).unwrap();
    let f = Function::mx("f", &[a, alpha, x, y], &[r]).unwrap();

    let av = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    let xv = vec![1.0, -1.0, 0.5];
    let yv = vec![2.0, 3.0];
    let out = f.call(&[av.clone(), vec![0.5], xv.clone(), yv.clone()]).unwrap();
    let expected = dense_rank1(&av, m, n, 0.5, &xv, &yv);
    for (o, e) in out[0].iter().zip(&expected) {
        assert_relative_eq!(*o, *e, epsilon = 1e-14);
    }
}

#[test]
fn zero_alpha_leaves_a_unchanged() {
    let a = Mx::sym_dense("A", 2, 3);
    let alpha = Mx::sym_dense("alpha", 1, 1);
    let x = Mx::sym_dense("x", 2, 1);
    let y = Mx::sym_dense("y", 3, 1);
    let r = Mx::rank1(&a, &alpha, &x, &y).unwrap();
    let f = Function::mx("f", &[a, alpha, x, y], &[r]).unwrap();
    let av = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    let out = f.call(&[av.clone(), vec![0.0], vec![1.0, 2.0], vec![1.0, 2.0, 3.0]]).unwrap();
    assert_eq!(out[0], av);
}

#[test]
fn zero_a_gives_the_scaled_outer_product() {
    let a = Mx::zeros(2, 3);
    let alpha = Mx::sym_dense("alpha", 1, 1);
    let x = Mx::sym_dense("x", 2, 1);
    let y = Mx::sym_dense("y", 3, 1);
    let r = Mx::rank1(&a, &alpha, &x, &y).unwrap();
    assert_eq!(r.nnz(), 6);
    let f = Function::mx("f", &[alpha, x, y], &[r]).unwrap();
    let out = f.call(&[vec![2.0], vec![1.0, 2.0], vec![1.0, 2.0, 3.0]]).unwrap();
    assert_eq!(out[0], vec![2.0, 4.0, 4.0, 8.0, 6.0, 12.0]);
}

#[test]
fn sparse_update_only_touches_the_outer_product() {
    let a = Mx::sym("A", Sparsity::diag(2));
    let alpha = Mx::sym_dense("alpha", 1, 1);
    let x = Mx::sym("x", Sparsity::triplet(2, 1, &[(1, 0)]).unwrap());
    let y = Mx::sym("y", Sparsity::triplet(2, 1, &[(0, 0)]).unwrap());
    let r = Mx::rank1(&a, &alpha, &x, &y).unwrap();
    // Pattern: (0, 0), (1, 0), (1, 1).
    assert_eq!(r.nnz(), 3);
    let f = Function::mx("f", &[a, alpha, x, y], &[r]).unwrap();
    let out = f.call(&[vec![1.0, 2.0], vec![2.0], vec![3.0], vec![5.0]]).unwrap();
    assert_eq!(out[0], vec![1.0, 30.0, 2.0]);
}

#[test]
fn in_place_update_reuses_the_buffer() {
    let a = Mx::sym_dense("A", 2, 2);
    let alpha = Mx::sym_dense("alpha", 1, 1);
    let x = Mx::sym_dense("x", 2, 1);
    let y = Mx::sym_dense("y", 2, 1);
    let node = Mx::rank1(&a, &alpha, &x, &y).unwrap();

    let mut buf = vec![1.0, 0.0, 0.0, 1.0];
    let mut iw = vec![0usize; 4];
    let mut w = vec![0.0; 4];
    Rank1::eval_in_place(&node, &mut buf, &[-1.0], &[1.0, 2.0], &[3.0, 4.0], &mut iw, &mut w);
    assert_eq!(buf, vec![-2.0, -6.0, -4.0, -7.0]);

    // Applying the same update again accumulates.
    Rank1::eval_in_place(&node, &mut buf, &[1.0], &[1.0, 2.0], &[3.0, 4.0], &mut iw, &mut w);
    assert_eq!(buf, vec![1.0, 0.0, 0.0, 1.0]);
}

#[test]
fn expanded_function_agrees() {
    let a = Mx::sym("A", Sparsity::upper(3));
    let alpha = Mx::sym_dense("alpha", 1, 1);
    let x = Mx::sym_dense("x", 3, 1);
    let y = Mx::sym("y", Sparsity::triplet(3, 1, &[(0, 0), (2, 0)]).unwrap());
    let r = Mx::rank1(&a, &alpha, &x, &y).unwrap();
    let f = Function::mx("f", &[a, alpha, x, y], &[r]).unwrap();
    let sx = f.expand().unwrap();
    let args = vec![
        vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        vec![-0.5],
        vec![1.0, 2.0, 3.0],
        vec![7.0, 11.0],
    ];
    let mx_out = f.call(&args).unwrap();
    let sx_out = sx.call(&args).unwrap();
    for (m, s) in mx_out[0].iter().zip(&sx_out[0]) {
        assert_relative_eq!(*m, *s, epsilon = 1e-14);
    }
}

// ============================================================
// Dependency propagation
// ============================================================

#[test]
fn every_factor_reaches_the_product_entries() {
    let a = Mx::sym("A", Sparsity::diag(2));
    let alpha = Mx::sym_dense("alpha", 1, 1);
    let x = Mx::sym("x", Sparsity::triplet(2, 1, &[(1, 0)]).unwrap());
    let y = Mx::sym("y", Sparsity::triplet(2, 1, &[(0, 0)]).unwrap());
    let r = Mx::rank1(&a, &alpha, &x, &y).unwrap();
    let f = Function::mx("f", &[a, alpha, x, y], &[r]).unwrap();

    // Output nonzero 1 is (1, 0), the only product entry.
    for input in 1..4 {
        let jac = f.jacobian_sparsity(input, 0).unwrap();
        assert_eq!(jac.nnz(), 1, "input {}", input);
        assert_eq!(jac.row(), &[1]);
    }
    let jac = f.jacobian_sparsity(0, 0).unwrap();
    assert_eq!(jac.nnz(), 2);
}
