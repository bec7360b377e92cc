use numbat::{CodeGenerator, Function, Mx, Sparsity, SxMatrix};

fn assignments_to(code: &str, prefix: &str) -> usize {
    code.lines().filter(|l| l.trim_start().starts_with(prefix)).count()
}

// ============================================================
// Generator
// ============================================================

#[test]
fn comments_are_not_statements() {
    let mut g = CodeGenerator::new();
    g.comment("setup");
    g.assign("w[0]".to_string(), "arg[0][0]");
    g.line("w[1] = w[0];");
    assert_eq!(g.statement_count(), 2);
    assert_eq!(g.lines().len(), 3);
    let text = g.finish("void f(double* w)");
    assert!(text.contains("/* setup */"));
    assert!(text.trim_end().ends_with('}'));
}

#[test]
fn constant_literals() {
    assert_eq!(CodeGenerator::constant(2.0), "2.0");
    assert_eq!(CodeGenerator::constant(-0.25), "-0.25");
    assert_eq!(CodeGenerator::constant(f64::NEG_INFINITY), "(-1.0/0.0)");
    assert_eq!(CodeGenerator::constant(f64::NAN), "(0.0/0.0)");
}

// ============================================================
// Function bodies
// ============================================================

#[test]
fn scalar_body_is_straight_line() {
    let x = SxMatrix::sym_dense("x", 1, 1);
    let y = SxMatrix::sym_dense("y", 1, 1);
    let e = x.get(0, 0) * y.get(0, 0) + x.get(0, 0);
    let f = Function::sx("fxy", &[x, y], &[SxMatrix::new(Sparsity::scalar(), vec![e]).unwrap()]).unwrap();
    let code = f.generate();
    assert!(code.starts_with("void fxy(const double** arg, double** res, long long* iw, double* w) {"));
    assert!(code.contains("w[0] = arg[0][0];"));
    assert!(code.contains("w[1] = arg[1][0];"));
    assert!(code.contains("w[2] = w[0] * w[1];"));
    assert!(code.contains("w[3] = w[2] + w[0];"));
    assert!(code.contains("res[0][0] = w[3];"));
    assert!(!code.contains("for"));
    assert!(!code.contains("if"));
}

#[test]
fn repmat_copies_every_block() {
    let x = Mx::sym_dense("x", 2, 1);
    let f = Function::mx("tile", &[x.clone()], &[x.repmat(3).unwrap()]).unwrap();
    let code = f.generate();
    assert!(code.contains("void tile("));
    assert_eq!(assignments_to(&code, "res[0]["), 6);
    assert!(code.contains("res[0][5] = "));
    assert!(!code.contains(" + "));
}

#[test]
fn repsum_emits_sums() {
    let x = Mx::sym_dense("x", 2, 4);
    let f = Function::mx("fold", &[x.clone()], &[x.repsum(2).unwrap()]).unwrap();
    let code = f.generate();
    assert_eq!(assignments_to(&code, "res[0]["), 4);
    let sums = code.lines().filter(|l| l.matches(" + ").count() == 1).count();
    assert_eq!(sums, 4);
}

#[test]
fn rank1_emits_products_only_on_the_outer_pattern() {
    let a = Mx::sym("A", Sparsity::diag(2));
    let alpha = Mx::sym_dense("alpha", 1, 1);
    let x = Mx::sym("x", Sparsity::triplet(2, 1, &[(1, 0)]).unwrap());
    let y = Mx::sym("y", Sparsity::triplet(2, 1, &[(0, 0)]).unwrap());
    let r = Mx::rank1(&a, &alpha, &x, &y).unwrap();
    let f = Function::mx("upd", &[a, alpha, x, y], &[r]).unwrap();
    let code = f.generate();
    let products = code.lines().filter(|l| l.matches(" * ").count() == 2).count();
    assert_eq!(products, 1);
    assert_eq!(assignments_to(&code, "res[0]["), 3);
}

#[test]
fn expanded_body_has_no_graph_nodes() {
    let x = Mx::sym_dense("x", 2, 2);
    let f = Function::mx("g", &[x.clone()], &[x.repsum(2).unwrap().repmat(2).unwrap()]).unwrap();
    let expanded = f.expand().unwrap();
    let code = expanded.generate();
    assert!(expanded.is_sx());
    assert_eq!(assignments_to(&code, "res[0]["), 4);
    assert!(code.contains("arg[0][3]"));
}
