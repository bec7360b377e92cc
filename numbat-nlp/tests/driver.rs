use approx::assert_relative_eq;
use numbat::{Function, Sparsity, SxElem, SxMatrix};
use numbat_nlp::{NewtonEngine, NlpDriver, NlpError, NlpInput, NlpProblem, NlpStatus, UserAction};

// ============================================================
// Test problems
// ============================================================

fn scalar(e: SxElem) -> SxMatrix {
    SxMatrix::new(Sparsity::scalar(), vec![e]).unwrap()
}

/// f = (1 - x0)² + 100 (x1 - x0²)², g = x0 + x1.
fn rosenbrock() -> NlpProblem {
    let x = SxMatrix::sym("x", Sparsity::column(2));
    let p = SxMatrix::sym("p", Sparsity::column(0));
    let (x0, x1) = (x.get(0, 0), x.get(1, 0));
    let a = SxElem::from(1.0) - x0.clone();
    let b = x1.clone() - x0.clone() * x0.clone();
    let f = scalar(a.clone() * a + SxElem::from(100.0) * b.clone() * b);
    let g = SxMatrix::new(Sparsity::column(1), vec![x0 + x1]).unwrap();
    NlpProblem::from_expressions(&x, &p, &f, &g).unwrap()
}

/// f = (x0 - p0)² + (x1 - p1)², g = x0 + x1.
fn shifted_quadratic() -> NlpProblem {
    let x = SxMatrix::sym("x", Sparsity::column(2));
    let p = SxMatrix::sym("p", Sparsity::column(2));
    let d0 = x.get(0, 0) - p.get(0, 0);
    let d1 = x.get(1, 0) - p.get(1, 0);
    let f = scalar(d0.clone() * d0 + d1.clone() * d1);
    let g = SxMatrix::new(Sparsity::column(1), vec![x.get(0, 0) + x.get(1, 0)]).unwrap();
    NlpProblem::from_expressions(&x, &p, &f, &g).unwrap()
}

/// Start at `x0` with the single constraint loosely bounded.
fn start(x0: Vec<f64>) -> NlpInput {
    NlpInput::new(x0).with_g_bounds(vec![-10.0], vec![10.0])
}

fn solve(problem: NlpProblem, input: NlpInput) -> numbat_nlp::NlpSolution {
    NlpDriver::new(problem, NewtonEngine::default()).solve(&input).unwrap()
}

// ============================================================
// Convergence
// ============================================================

#[test]
fn rosenbrock_from_the_classic_start() {
    let sol = solve(rosenbrock(), start(vec![-1.2, 1.0]));
    assert_eq!(sol.status, NlpStatus::Success);
    assert_relative_eq!(sol.x[0], 1.0, epsilon = 1e-6);
    assert_relative_eq!(sol.x[1], 1.0, epsilon = 1e-6);
    assert!(sol.f < 1e-12);
    assert_relative_eq!(sol.g[0], 2.0, epsilon = 1e-6);
}

#[test]
fn parameters_reach_the_functions() {
    let input = start(vec![0.0, 0.0]).with_p(vec![2.0, -1.0]);
    let sol = solve(shifted_quadratic(), input);
    assert_eq!(sol.status, NlpStatus::Success);
    assert_eq!(sol.iterations, 1);
    assert_relative_eq!(sol.x[0], 2.0, epsilon = 1e-12);
    assert_relative_eq!(sol.x[1], -1.0, epsilon = 1e-12);
}

#[test]
fn every_evaluation_is_one_action() {
    let input = start(vec![0.0, 0.0]).with_p(vec![2.0, -1.0]);
    let sol = solve(shifted_quadratic(), input);
    assert_eq!(sol.actions[&UserAction::EvalGradF], sol.iterations + 1);
    assert_eq!(sol.actions[&UserAction::EvalHessL], sol.iterations + 1);
    assert_eq!(sol.actions[&UserAction::IterationOutput], sol.iterations + 1);
    assert_eq!(sol.actions[&UserAction::EvalG], 1);
    assert_eq!(sol.actions[&UserAction::EvalJacG], 1);
    assert!(sol.actions[&UserAction::EvalF] >= sol.iterations);
}

#[test]
fn variable_bounds_are_respected() {
    let input = start(vec![0.0, 0.0])
        .with_p(vec![2.0, -1.0])
        .with_x_bounds(vec![-10.0, 0.0], vec![1.0, 10.0]);
    let sol = solve(shifted_quadratic(), input);
    assert_eq!(sol.status, NlpStatus::Success);
    assert_relative_eq!(sol.x[0], 1.0, epsilon = 1e-12);
    assert_relative_eq!(sol.x[1], 0.0, epsilon = 1e-12);
    // grad_f = (-2, 2) at the corner.
    assert_relative_eq!(sol.lam_x[0], 2.0, epsilon = 1e-9);
    assert_relative_eq!(sol.lam_x[1], -2.0, epsilon = 1e-9);
}

#[test]
fn violated_constraints_report_infeasible() {
    let feasible = NlpInput::new(vec![0.0, 0.0])
        .with_p(vec![2.0, -1.0])
        .with_g_bounds(vec![0.0], vec![1.0]);
    assert_eq!(solve(shifted_quadratic(), feasible).status, NlpStatus::Success);

    let infeasible = NlpInput::new(vec![0.0, 0.0])
        .with_p(vec![2.0, -1.0])
        .with_g_bounds(vec![3.0], vec![4.0]);
    let sol = solve(shifted_quadratic(), infeasible);
    assert_eq!(sol.status, NlpStatus::Infeasible);
    assert_relative_eq!(sol.g[0], 1.0, epsilon = 1e-12);
    assert_relative_eq!(sol.lam_g[0], 0.0, epsilon = 1e-9);
}

// ============================================================
// Callback
// ============================================================

#[test]
fn callback_can_stop_the_solve() {
    let problem = rosenbrock();
    let x = SxMatrix::sym("x", Sparsity::column(2));
    let f = SxMatrix::sym("f", Sparsity::scalar());
    let g = SxMatrix::sym("g", Sparsity::column(1));
    let stop = scalar(SxElem::from(1.0));
    let callback = Function::sx("callback", &[x, f, g], &[stop]).unwrap();
    let problem = problem.with_callback(callback).unwrap();

    let sol = solve(problem, start(vec![-1.2, 1.0]));
    assert_eq!(sol.status, NlpStatus::UserTerminated);
    assert_eq!(sol.iterations, 0);
    assert_eq!(sol.x, vec![-1.2, 1.0]);
}

#[test]
fn callback_signature_is_checked() {
    let x = SxMatrix::sym("x", Sparsity::column(3));
    let stop = scalar(SxElem::from(0.0));
    let callback = Function::sx("callback", &[x], &[stop]).unwrap();
    let err = rosenbrock().with_callback(callback).unwrap_err();
    assert!(matches!(err, NlpError::Signature { function: "callback", .. }));
}

// ============================================================
// Input validation
// ============================================================

#[test]
fn fixed_variables_are_rejected() {
    let input = NlpInput::new(vec![0.0, 0.0]).with_x_bounds(vec![0.0, -1.0], vec![1.0, -1.0]);
    let err = NlpDriver::new(rosenbrock(), NewtonEngine::default())
        .solve(&input)
        .unwrap_err();
    assert_eq!(err, NlpError::FixedVariable { index: 1, value: -1.0 });
}

#[test]
fn unbounded_constraints_are_rejected() {
    let input = NlpInput::new(vec![0.0, 0.0]).with_g_bounds(vec![f64::NEG_INFINITY], vec![f64::INFINITY]);
    let err = NlpDriver::new(rosenbrock(), NewtonEngine::default())
        .solve(&input)
        .unwrap_err();
    assert_eq!(err, NlpError::FreeConstraint { index: 0 });
}

#[test]
fn wrong_lengths_are_rejected() {
    let mut driver = NlpDriver::new(rosenbrock(), NewtonEngine::default());
    let err = driver.solve(&NlpInput::new(vec![0.0])).unwrap_err();
    assert!(matches!(err, NlpError::Length { what: "x0", expected: 2, got: 1 }));
    let err = driver
        .solve(&start(vec![0.0, 0.0]).with_x_bounds(vec![0.0], vec![]))
        .unwrap_err();
    assert!(matches!(err, NlpError::Length { what: "lbx", .. }));
    let err = driver.solve(&NlpInput::new(vec![0.0, 0.0])).unwrap_err();
    assert!(matches!(err, NlpError::Length { what: "lbg", expected: 1, got: 0 }));
}

#[test]
fn driver_is_reusable() {
    let mut driver = NlpDriver::new(shifted_quadratic(), NewtonEngine::default());
    let a = driver.solve(&start(vec![0.0, 0.0]).with_p(vec![1.0, 1.0])).unwrap();
    let b = driver.solve(&start(vec![5.0, 5.0]).with_p(vec![-1.0, 3.0])).unwrap();
    assert_relative_eq!(a.x[0], 1.0, epsilon = 1e-12);
    assert_relative_eq!(b.x[1], 3.0, epsilon = 1e-12);
}
