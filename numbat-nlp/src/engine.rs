//! The reverse-communication contract between a driver and an engine.
//!
//! The engine never calls a Function. It exposes one pending
//! [`UserAction`] at a time; the driver resolves it against the engine's
//! [`Iterate`] and hands control back with [`RevCommEngine::done`] (for
//! evaluations and iteration output) or [`RevCommEngine::call_solver`].
//! The loop ends when [`RevCommEngine::pending`] returns `None`, at which
//! point [`RevCommEngine::status`] is set.

use numbat::Sparsity;

use crate::action::UserAction;
use crate::status::NlpStatus;

/// Exchange buffers shared by an engine and its driver.
///
/// Evaluation actions read `x` (and `sigma`, `lam_g` for the Hessian) and
/// write the matching output fields. The remaining fields are progress
/// figures the engine maintains.
#[derive(Debug, Clone, Default)]
pub struct Iterate {
    pub x: Vec<f64>,
    pub f: f64,
    pub g: Vec<f64>,
    pub grad_f: Vec<f64>,
    /// Nonzeros of the constraint Jacobian.
    pub jac_g: Vec<f64>,
    /// Nonzeros of the Lagrangian Hessian.
    pub hess_l: Vec<f64>,
    /// Objective factor passed to the Hessian.
    pub sigma: f64,
    pub lam_g: Vec<f64>,
    pub lam_x: Vec<f64>,
    /// Accepted steps so far.
    pub iter: usize,
    /// Largest constraint bound violation.
    pub inf_pr: f64,
    /// Projected gradient norm.
    pub inf_du: f64,
    /// Step length of the last accepted step.
    pub alpha: f64,
}

impl Iterate {
    /// Zeroed buffers sized for the given problem.
    pub fn sized(nx: usize, ng: usize, nnz_jac_g: usize, nnz_hess_l: usize) -> Self {
        Iterate {
            x: vec![0.0; nx],
            f: 0.0,
            g: vec![0.0; ng],
            grad_f: vec![0.0; nx],
            jac_g: vec![0.0; nnz_jac_g],
            hess_l: vec![0.0; nnz_hess_l],
            sigma: 1.0,
            lam_g: vec![0.0; ng],
            lam_x: vec![0.0; nx],
            iter: 0,
            inf_pr: 0.0,
            inf_du: f64::INFINITY,
            alpha: 0.0,
        }
    }
}

/// Everything an engine learns about the problem before the loop starts.
/// Bounds have already been validated by the driver.
#[derive(Debug, Clone, Copy)]
pub struct NlpSetup<'a> {
    pub x0: &'a [f64],
    pub lbx: &'a [f64],
    pub ubx: &'a [f64],
    pub lbg: &'a [f64],
    pub ubg: &'a [f64],
    pub jac_g_sparsity: &'a Sparsity,
    pub hess_l_sparsity: &'a Sparsity,
}

/// An optimization algorithm driven by reverse communication.
pub trait RevCommEngine {
    fn name(&self) -> &str;

    /// Prepare for a new solve. Any previous state is discarded.
    fn init(&mut self, setup: &NlpSetup<'_>);

    /// The action the engine is waiting for, or `None` once it has stopped.
    fn pending(&self) -> Option<UserAction>;

    /// Resolve [`UserAction::CallSolver`].
    fn call_solver(&mut self);

    /// Report that `action` has been resolved.
    fn done(&mut self, action: UserAction);

    /// Stop immediately with `status`.
    fn terminate(&mut self, status: NlpStatus);

    fn status(&self) -> Option<NlpStatus>;

    fn iterate(&self) -> &Iterate;

    fn iterate_mut(&mut self) -> &mut Iterate;
}
