use approx::assert_relative_eq;
use numbat::{Bvec, Element, Function, Mx, Sparsity, SxElem, SxMatrix};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

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

/// `repmat(rank1(repsum(A), alpha, x, y), n) + A`.
fn structural_graph(rng: &mut StdRng) -> Function {
    let (m, w) = (rng.random_range(1..4), rng.random_range(1..4));
    let n = rng.random_range(2..4);
    let a = Mx::sym("A", random_pattern(rng, m, w * n, 0.5));
    let alpha = Mx::sym_dense("alpha", 1, 1);
    let x = Mx::sym("x", random_pattern(rng, m, 1, 0.7));
    let y = Mx::sym("y", random_pattern(rng, w, 1, 0.7));
    let r = Mx::rank1(&a.repsum(n).unwrap(), &alpha, &x, &y).unwrap();
    let out = r.repmat(n).unwrap().add(&a).unwrap();
    Function::mx("g", &[a, alpha, x, y], &[out]).unwrap()
}

// ============================================================
// Graph vs scalar bodies
// ============================================================

#[test]
fn expanded_body_evaluates_identically() {
    let mut rng = StdRng::seed_from_u64(17);
    for _ in 0..50 {
        let f = structural_graph(&mut rng);
        let sx = f.expand().unwrap();
        assert!(!f.is_sx());
        assert!(sx.is_sx());
        assert_eq!(sx.name(), f.name());
        let args: Vec<Vec<f64>> = (0..f.n_in())
            .map(|i| (0..f.nnz_in(i)).map(|_| rng.random_range(-2.0..2.0)).collect())
            .collect();
        let lhs = f.call(&args).unwrap();
        let rhs = sx.call(&args).unwrap();
        assert_eq!(sx.sparsity_out(0), f.sparsity_out(0));
        for (u, v) in lhs[0].iter().zip(&rhs[0]) {
            assert_relative_eq!(*u, *v, epsilon = 1e-13);
        }
    }
}

#[test]
fn expanded_dependencies_are_no_wider() {
    let mut rng = StdRng::seed_from_u64(23);
    for _ in 0..50 {
        let f = structural_graph(&mut rng);
        let sx = f.expand().unwrap();
        for i in 0..f.n_in() {
            let graph = f.jacobian_sparsity(i, 0).unwrap();
            let scalar = sx.jacobian_sparsity(i, 0).unwrap();
            // The scalar body can only drop dependencies, e.g. when a
            // product is folded away.
            assert!(scalar.is_subset(&graph), "input {}: {} not in {}", i, scalar, graph);
        }
    }
}

#[test]
fn dependency_sweeps_match_on_dense_inputs() {
    let a = Mx::sym_dense("A", 2, 4);
    let f = Function::mx("f", &[a.clone()], &[a.repsum(2).unwrap().repmat(2).unwrap()]).unwrap();
    let sx = f.expand().unwrap();
    let seeds: Vec<Bvec> = (0..8).map(|k| 1 << k).collect();
    for g in [&f, &sx] {
        let mut out: Vec<Bvec> = vec![0; 8];
        g.sp_forward(&[Some(&seeds[..])], &mut [Some(&mut out[..])]).unwrap();
        // Output (r, c) collects input (r, c) and (r, c + 2).
        assert_eq!(out[0], 0b0001_0001);
        assert_eq!(out[3], 0b1000_1000);
        assert_eq!(out[4], out[0]);
        assert_eq!(out[7], out[3]);
    }
}

/// Bit `j` of entry `k`: output nonzero `k` depends on nonzero `j` of `input`.
fn forward_pattern(f: &Function, input: usize) -> Vec<Bvec> {
    let seeds: Vec<Vec<Bvec>> = (0..f.n_in())
        .map(|i| {
            (0..f.nnz_in(i))
                .map(|j| if i == input { 1 << j } else { 0 })
                .collect()
        })
        .collect();
    let arg: Vec<Option<&[Bvec]>> = seeds.iter().map(|s| Some(s.as_slice())).collect();
    let mut out: Vec<Bvec> = vec![0; f.nnz_out(0)];
    f.sp_forward(&arg, &mut [Some(&mut out[..])]).unwrap();
    out
}

/// Bit `k` of entry `j`: nonzero `j` of `input` reaches output nonzero `k`.
fn reverse_pattern(f: &Function, input: usize) -> Vec<Bvec> {
    let mut marks: Vec<Vec<Bvec>> = (0..f.n_in()).map(|i| vec![0; f.nnz_in(i)]).collect();
    let mut res: Vec<Bvec> = (0..f.nnz_out(0)).map(|k| 1 << k).collect();
    let mut arg: Vec<Option<&mut [Bvec]>> = marks.iter_mut().map(|m| Some(m.as_mut_slice())).collect();
    f.sp_reverse(&mut arg, &mut [Some(res.as_mut_slice())]).unwrap();
    assert!(res.iter().all(|&r| r == 0));
    marks.swap_remove(input)
}

#[test]
fn reverse_sweep_is_the_transposed_forward_sweep() {
    let mut rng = StdRng::seed_from_u64(31);
    for _ in 0..100 {
        let f = structural_graph(&mut rng);
        let sx = f.expand().unwrap();
        assert!(f.nnz_out(0) <= 64);
        for g in [&f, &sx] {
            for i in 0..g.n_in() {
                let fwd = forward_pattern(g, i);
                let rev = reverse_pattern(g, i);
                for (j, r) in rev.iter().enumerate() {
                    for (k, o) in fwd.iter().enumerate() {
                        assert_eq!((o >> j) & 1, (r >> k) & 1, "input {} nz {} output nz {}", i, j, k);
                    }
                }
            }
        }
    }
}

// ============================================================
// Tape optimization
// ============================================================

#[test]
fn shared_subexpressions_are_recorded_once() {
    let x = SxMatrix::sym_dense("x", 2, 1);
    let (x0, x1) = (x.get(0, 0), x.get(1, 0));
    let p = x0.clone() * x1.clone();
    let q = x1 * x0;
    let out = SxMatrix::new(Sparsity::column(2), vec![p.clone() + q, p.sin()]).unwrap();
    let f = Function::sx("f", &[x], &[out]).unwrap();
    let tape = f.sx_tape().unwrap();
    // x0, x1, x0*x1, add, sin.
    assert_eq!(tape.num_ops(), 5);
    let out = f.call(&[vec![2.0, 3.0]]).unwrap();
    assert_relative_eq!(out[0][0], 12.0);
    assert_relative_eq!(out[0][1], 6.0_f64.sin());
}

#[test]
fn constants_fold_before_recording() {
    let x = SxMatrix::sym_dense("x", 1, 1);
    let e = x.get(0, 0) * SxElem::from(1.0) + SxElem::from(0.0) * SxElem::from(3.0);
    let f = Function::sx("f", &[x], &[SxMatrix::new(Sparsity::scalar(), vec![e]).unwrap()]).unwrap();
    assert_eq!(f.sx_tape().unwrap().num_ops(), 1);
    assert_eq!(f.sx_tape().unwrap().output_indices(), &[0]);
}
