#![cfg(feature = "serde")]

use numbat::{Function, OptionValue, Options, Sparsity, SxElem, SxMatrix, SxTape};

fn rosenbrock() -> Function {
    let x = SxMatrix::sym_dense("x", 2, 1);
    let (x0, x1) = (x.get(0, 0), x.get(1, 0));
    let one = SxElem::from(1.0);
    let hundred = SxElem::from(100.0);
    let dx = x0.clone() - one;
    let t = x1 - x0.clone() * x0;
    let f = dx.clone() * dx + hundred * t.clone() * t;
    Function::sx("rosenbrock", &[x], &[SxMatrix::new(Sparsity::scalar(), vec![f]).unwrap()]).unwrap()
}

// ============================================================
// Sparsity
// ============================================================

#[test]
fn sparsity_serializes_as_compressed_descriptor() {
    let sp = Sparsity::triplet(3, 2, &[(0, 0), (2, 0), (1, 1)]).unwrap();
    let json = serde_json::to_string(&sp).unwrap();
    assert_eq!(json, "[3,2,0,2,3,0,2,1]");
    let back: Sparsity = serde_json::from_str(&json).unwrap();
    assert_eq!(back, sp);
}

#[test]
fn malformed_descriptor_is_rejected() {
    // Row index 5 is out of range for 3 rows.
    let result: Result<Sparsity, _> = serde_json::from_str("[3,1,0,1,5]");
    assert!(result.is_err());
}

// ============================================================
// Options
// ============================================================

#[test]
fn nested_options_roundtrip() {
    let inner = Options::new().with("max_iter", 50i64).with("tol", 1e-8);
    let opts = Options::new()
        .with("enable_codegen", true)
        .with("plugin", "symbolicqr")
        .with("nested", inner);
    let json = serde_json::to_string(&opts).unwrap();
    let back: Options = serde_json::from_str(&json).unwrap();
    assert_eq!(back, opts);
    assert_eq!(back.get("plugin"), Some(&OptionValue::Str("symbolicqr".to_string())));
}

// ============================================================
// Tapes
// ============================================================

#[test]
fn tape_roundtrip_evaluates_identically() {
    let f = rosenbrock();
    let tape = f.sx_tape().unwrap();
    let json = serde_json::to_string(tape).unwrap();
    let back: SxTape = serde_json::from_str(&json).unwrap();
    assert_eq!(&back, tape);

    let g = Function::from_tape("restored", back, vec![Sparsity::column(2)], vec![Sparsity::scalar()]).unwrap();
    for x in [[1.0, 1.0], [1.5, 2.5], [-0.3, 0.7]] {
        let expected = f.call(&[x.to_vec()]).unwrap();
        let got = g.call(&[x.to_vec()]).unwrap();
        assert_eq!(expected, got);
    }
}

#[test]
fn restored_tape_differentiates() {
    let f = rosenbrock();
    let json = serde_json::to_string(f.sx_tape().unwrap()).unwrap();
    let back: SxTape = serde_json::from_str(&json).unwrap();
    let g = Function::from_tape("restored", back, vec![Sparsity::column(2)], vec![Sparsity::scalar()]).unwrap();
    let jac = g.jacobian(0, 0).unwrap();
    // At the minimum (1, 1) the gradient vanishes.
    let out = jac.call(&[vec![1.0, 1.0]]).unwrap();
    assert!(out[0].iter().all(|v| v.abs() < 1e-12));
}

#[test]
fn mismatched_patterns_are_rejected() {
    let f = rosenbrock();
    let tape = f.sx_tape().unwrap().clone();
    assert!(Function::from_tape("bad", tape, vec![Sparsity::column(3)], vec![Sparsity::scalar()]).is_err());
}

#[test]
fn corrupted_tape_is_rejected() {
    // Output slot 9 does not exist.
    let json = r#"{"opcodes":["Input","Input"],"arg_indices":[[4294967295,4294967295],[4294967295,4294967295]],"values":[0.0,0.0],"num_inputs":2,"output_indices":[9]}"#;
    let result: Result<SxTape, _> = serde_json::from_str(json);
    assert!(result.is_err());
}
