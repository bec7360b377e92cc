use approx::assert_relative_eq;
use numbat::{DMatrix, Error, Function, Memory, Mx, Sparsity, SxElem, SxMatrix};

/// `y = A x + x`, `s = x · x`.
fn two_outputs() -> Function {
    let a = Mx::sym_dense("A", 2, 2);
    let x = Mx::sym_dense("x", 2, 1);
    let y = a.mtimes(&x).unwrap().add(&x).unwrap();
    let s = x.dot(&x).unwrap();
    Function::mx("pair", &[a, x], &[y, s]).unwrap()
}

// ============================================================
// Signature
// ============================================================

#[test]
fn default_io_names() {
    let f = two_outputs();
    assert_eq!(f.n_in(), 2);
    assert_eq!(f.n_out(), 2);
    assert_eq!(f.name_in(1), "i1");
    assert_eq!(f.name_out(0), "o0");
    assert_eq!(f.index_out("o1"), Some(1));
    assert_eq!(f.index_in("x"), None);
    assert_eq!(f.to_string(), "pair:(i0[2x2],i1[2x1])->(o0[2x1],o1[1x1])");
}

#[test]
fn renamed_io() {
    let f = two_outputs().with_names(&["A", "x"], &["y", "s"]).unwrap();
    assert_eq!(f.index_in("x"), Some(1));
    assert_eq!(f.index_out("s"), Some(1));
    assert_eq!(f.name(), "pair");
    let err = two_outputs().with_names(&["A", "x"], &["y"]).unwrap_err();
    assert!(matches!(
        err,
        Error::ArgumentCount {
            what: "output names",
            expected: 2,
            got: 1,
            ..
        }
    ));
}

#[test]
fn work_sizes_cover_the_body() {
    let f = two_outputs();
    assert!(f.sz_arg() >= f.n_in());
    assert!(f.sz_res() >= f.n_out());
    assert!(f.sz_w() > 0);
    assert_eq!(f.nnz_in(0), 4);
    assert_eq!(f.nnz_out(1), 1);
}

// ============================================================
// Numeric evaluation
// ============================================================

#[test]
fn evaluates_every_output() {
    let f = two_outputs();
    let out = f.call(&[vec![1.0, 2.0, 3.0, 4.0], vec![1.0, -1.0]]).unwrap();
    // A x = [1 - 3, 2 - 4]
    assert_eq!(out[0], vec![-1.0, -3.0]);
    assert_eq!(out[1], vec![2.0]);
}

#[test]
fn wrong_argument_count_is_rejected() {
    let f = two_outputs();
    let err = f.call(&[vec![0.0; 4]]).unwrap_err();
    assert!(matches!(
        err,
        Error::ArgumentCount {
            what: "inputs",
            expected: 2,
            got: 1,
            ..
        }
    ));
    let err = f.call(&[vec![0.0; 3], vec![0.0; 2]]).unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { op: "call", .. }));
}

#[test]
fn numeric_matrices_are_projected() {
    // Input pattern is diagonal; off-diagonal entries of the argument are dropped.
    let d = Mx::sym("d", Sparsity::diag(2));
    let f = Function::mx("f", &[d.clone()], &[d.add(&d).unwrap()]).unwrap();
    let arg = DMatrix::from_dense(2, 2, &[1.0, 5.0, 5.0, 2.0]).unwrap();
    let out = f.call_numeric(&[arg]).unwrap();
    assert_eq!(out[0].sparsity(), &Sparsity::diag(2));
    assert_eq!(out[0].nonzeros(), &[2.0, 4.0]);
    let wrong = DMatrix::from_dense(1, 2, &[1.0, 2.0]).unwrap();
    assert!(f.call_numeric(&[wrong]).is_err());
}

#[test]
fn memory_serves_several_functions() {
    let f = two_outputs();
    let x = Mx::sym_dense("x", 2, 1);
    let g = Function::mx("g", &[x.clone()], &[x.repmat(3).unwrap()]).unwrap();
    let mut mem: Memory<f64> = Memory::new();
    mem.alloc(&f);
    mem.alloc(&g);

    let mut y = [0.0; 2];
    let mut s = [0.0; 1];
    mem.call(
        &f,
        &[Some(&[1.0, 0.0, 0.0, 1.0][..]), Some(&[3.0, 4.0][..])],
        &mut [Some(&mut y[..]), Some(&mut s[..])],
    )
    .unwrap();
    assert_eq!(y, [6.0, 8.0]);
    assert_eq!(s, [25.0]);

    let mut tiled = [0.0; 6];
    mem.call(&g, &[Some(&[1.0, 2.0][..])], &mut [Some(&mut tiled[..])]).unwrap();
    assert_eq!(tiled, [1.0, 2.0, 1.0, 2.0, 1.0, 2.0]);
}

#[test]
fn skipped_outputs_are_left_alone() {
    let f = two_outputs();
    let mut s = [-1.0];
    let mut iw = vec![0; f.sz_iw()];
    let mut w = vec![0.0; f.sz_w()];
    f.call_with(
        &[None, Some(&[2.0, 0.0][..])],
        &mut [None, Some(&mut s[..])],
        &mut iw,
        &mut w,
    )
    .unwrap();
    assert_eq!(s, [4.0]);
}

// ============================================================
// Symbolic evaluation and composition
// ============================================================

#[test]
fn symbolic_call_builds_expressions() {
    let f = two_outputs();
    let a = SxMatrix::sym_dense("a", 2, 2);
    let x = SxMatrix::sym_dense("x", 2, 1);
    let out = f.call_symbolic(&[a.clone(), x.clone()]).unwrap();
    let g = Function::sx("g", &[a, x], &out).unwrap();
    let args = [vec![0.5, -1.0, 2.0, 3.0], vec![0.25, -4.0]];
    let lhs = f.call(&args).unwrap();
    let rhs = g.call(&args).unwrap();
    for (u, v) in lhs.iter().flatten().zip(rhs.iter().flatten()) {
        assert_relative_eq!(*u, *v, epsilon = 1e-14);
    }
}

#[test]
fn graph_call_inlines_the_body() {
    let f = two_outputs();
    let b = Mx::sym_dense("B", 2, 2);
    let z = Mx::sym_dense("z", 2, 1);
    let inner = f.call_mx(&[b.clone(), z.clone()]).unwrap();
    // Feed the first output back in as x.
    let outer = f.call_mx(&[b.clone(), inner[0].clone()]).unwrap();
    let h = Function::mx("h", &[b, z], &[outer[1].clone()]).unwrap();
    // B = 0, so y = z and s = z · z.
    let out = h.call(&[vec![0.0; 4], vec![3.0, 4.0]]).unwrap();
    assert_eq!(out[0], vec![25.0]);
}

#[test]
fn scalar_body_cannot_take_graph_arguments() {
    let x = SxMatrix::sym_dense("x", 1, 1);
    let f = Function::sx("f", &[x.clone()], &[x]).unwrap();
    let err = f.call_mx(&[Mx::sym_dense("y", 1, 1)]).unwrap_err();
    assert!(matches!(err, Error::InvalidState { .. }));
}

#[test]
fn scalar_inputs_must_be_symbols() {
    let x = SxMatrix::sym_dense("x", 2, 1);
    let doubled = SxMatrix::new(
        Sparsity::column(2),
        x.nonzeros().iter().map(|e| e.clone() + e.clone()).collect(),
    )
    .unwrap();
    let err = Function::sx("f", &[doubled], &[x]).unwrap_err();
    assert!(matches!(err, Error::NonSymbolicInput { index: 0, .. }));
}

// ============================================================
// Derivative Functions
// ============================================================

#[test]
fn forward_function_signature() {
    let f = two_outputs().with_names(&["A", "x"], &["y", "s"]).unwrap();
    let fwd = f.forward(2).unwrap();
    assert_eq!(fwd.name(), "fwd2_pair");
    assert_eq!(fwd.n_in(), 2 + 2 + 2 * 2);
    assert_eq!(fwd.n_out(), 2 * 2);
    assert_eq!(fwd.name_in(2), "out_y");
    assert_eq!(fwd.name_in(7), "fwd1_x");
    assert_eq!(fwd.name_out(3), "fwd1_s");
    assert_eq!(fwd.sparsity_out(1), f.sparsity_out(1));
}

#[test]
fn reverse_function_signature() {
    let f = two_outputs().with_names(&["A", "x"], &["y", "s"]).unwrap();
    let adj = f.reverse(1).unwrap();
    assert_eq!(adj.name(), "adj1_pair");
    assert_eq!(adj.n_in(), 2 + 2 + 2);
    assert_eq!(adj.n_out(), 2);
    assert_eq!(adj.name_in(5), "adj0_s");
    assert_eq!(adj.name_out(0), "adj0_A");
    assert_eq!(adj.sparsity_out(0), f.sparsity_in(0));
}

#[test]
fn gradient_of_the_dot_product() {
    let f = two_outputs();
    let adj = f.reverse(1).unwrap();
    let out = adj
        .call(&[
            vec![0.0; 4],
            vec![3.0, -2.0],
            vec![0.0; 2],
            vec![0.0],
            vec![0.0; 2],
            vec![1.0],
        ])
        .unwrap();
    assert_eq!(out[0], vec![0.0; 4]);
    assert_eq!(out[1], vec![6.0, -4.0]);
}

#[test]
fn jacobian_function() {
    let f = two_outputs().with_names(&["A", "x"], &["y", "s"]).unwrap();
    let jac = f.jacobian(1, 0).unwrap();
    assert_eq!(jac.name(), "jac_pair");
    assert_eq!(jac.n_in(), 2);
    assert_eq!(jac.name_out(0), "jac_y_x");
    assert_eq!(jac.sparsity_out(0).shape(), (2, 2));
    // d(Ax + x)/dx = A + I
    let out = jac.call(&[vec![1.0, 2.0, 3.0, 4.0], vec![0.0, 0.0]]).unwrap();
    assert_eq!(out[0], vec![2.0, 2.0, 3.0, 5.0]);
}

#[test]
fn jacobian_drops_constant_zeros() {
    let x = SxMatrix::sym_dense("x", 3, 1);
    let (x0, x2) = (x.get(0, 0), x.get(2, 0));
    let y = SxMatrix::new(Sparsity::column(2), vec![x0.clone() * x0, SxElem::from(4.0) * x2]).unwrap();
    let f = Function::sx("f", &[x], &[y]).unwrap();
    let jac = f.jacobian(0, 0).unwrap();
    let sp = jac.sparsity_out(0);
    assert_eq!(*sp, Sparsity::triplet(2, 3, &[(0, 0), (1, 2)]).unwrap());
    let out = jac.call(&[vec![-1.5, 9.0, 9.0]]).unwrap();
    assert_eq!(out[0], vec![-3.0, 4.0]);
    assert_eq!(jac.jacobian_sparsity(0, 0).unwrap().nnz(), 1);
}

#[test]
fn out_of_range_indices() {
    let f = two_outputs();
    assert!(matches!(f.jacobian(2, 0), Err(Error::ArgumentCount { .. })));
    assert!(matches!(f.jacobian_sparsity(0, 5), Err(Error::ArgumentCount { .. })));
}
