use log::debug;
use numbat::Sparsity;

use crate::action::UserAction;
use crate::convergence::{dot, max_violation, norm, projected_gradient_norm, ArmijoParams, ConvergenceParams};
use crate::engine::{Iterate, NlpSetup, RevCommEngine};
use crate::linalg::{densify, lu_solve};
use crate::status::NlpStatus;

/// Configuration for [`NewtonEngine`].
#[derive(Debug, Clone, Default)]
pub struct NewtonConfig {
    pub convergence: ConvergenceParams,
    pub line_search: ArmijoParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// Objective and gradient at the accepted point.
    Derivatives,
    Hessian,
    Report,
    /// Newton system and first trial point.
    Direction,
    /// Objective at the trial point.
    Trial,
    /// Armijo test of the trial point.
    Accept,
    Constraints,
    Jacobian,
    Finish,
    Done,
}

/// Damped Newton method on the objective with box bounds on `x`.
///
/// Each iteration solves `H d = -grad_f` by dense LU, falling back to
/// steepest descent when the Hessian is singular or `d` is not a descent
/// direction once projected onto the bounds, and backtracks along the
/// projected path until the Armijo condition holds. Constraints `g` are not
/// enforced during the iteration; on termination they are evaluated and a
/// converged point that violates their bounds is reported as
/// [`NlpStatus::Infeasible`]. Multiplier estimates for `g` come from a
/// least-squares fit of the stationarity condition.
#[derive(Debug, Clone)]
pub struct NewtonEngine {
    config: NewtonConfig,
    phase: Phase,
    status: Option<NlpStatus>,
    /// Status to report once the final constraint evaluation is done.
    outcome: NlpStatus,
    it: Iterate,
    lbx: Vec<f64>,
    ubx: Vec<f64>,
    lbg: Vec<f64>,
    ubg: Vec<f64>,
    jac_sp: Sparsity,
    hess_sp: Sparsity,
    x_base: Vec<f64>,
    f_base: f64,
    direction: Vec<f64>,
    alpha: f64,
    slope: f64,
}

impl Default for NewtonEngine {
    fn default() -> Self {
        NewtonEngine::new(NewtonConfig::default())
    }
}

impl NewtonEngine {
    pub fn new(config: NewtonConfig) -> Self {
        NewtonEngine {
            config,
            phase: Phase::Idle,
            status: None,
            outcome: NlpStatus::Success,
            it: Iterate::default(),
            lbx: Vec::new(),
            ubx: Vec::new(),
            lbg: Vec::new(),
            ubg: Vec::new(),
            jac_sp: Sparsity::empty(0, 0),
            hess_sp: Sparsity::empty(0, 0),
            x_base: Vec::new(),
            f_base: 0.0,
            direction: Vec::new(),
            alpha: 0.0,
            slope: 0.0,
        }
    }

    pub fn config(&self) -> &NewtonConfig {
        &self.config
    }

    /// Stop iterating and evaluate the constraints at the accepted point.
    fn wind_down(&mut self, outcome: NlpStatus) {
        debug!("newton: winding down after {} iterations ({})", self.it.iter, outcome);
        self.outcome = outcome;
        self.it.x.clone_from(&self.x_base);
        self.it.f = self.f_base;
        self.phase = Phase::Constraints;
    }

    /// Put `P(x_base + alpha d)` in `it.x`; returns the step length.
    fn place_trial(&mut self) -> f64 {
        let mut step = Vec::with_capacity(self.x_base.len());
        for i in 0..self.x_base.len() {
            let xi = (self.x_base[i] + self.alpha * self.direction[i]).clamp(self.lbx[i], self.ubx[i]);
            step.push(xi - self.x_base[i]);
            self.it.x[i] = xi;
        }
        self.slope = dot(&self.it.grad_f, &step);
        norm(&step)
    }

    fn newton_direction(&self) -> Option<Vec<f64>> {
        let n = self.x_base.len();
        let h = densify(&self.hess_sp, &self.it.hess_l);
        let rhs: Vec<f64> = self.it.grad_f.iter().map(|g| -g).collect();
        lu_solve(h, n, &rhs).filter(|d| d.iter().all(|v| v.is_finite()))
    }

    fn direction_step(&mut self) {
        let conv = &self.config.convergence;
        if self.it.inf_du < conv.grad_tol {
            self.wind_down(NlpStatus::Success);
            return;
        }
        if self.it.iter >= conv.max_iter {
            self.wind_down(NlpStatus::MaxIterations);
            return;
        }
        let step_tol = conv.step_tol;
        self.alpha = self.config.line_search.alpha_init;

        let newton = self.newton_direction();
        if newton.is_none() {
            debug!("newton: singular Hessian at iteration {}, using steepest descent", self.it.iter);
        }
        if let Some(d) = newton {
            self.direction = d;
            let len = self.place_trial();
            if self.slope < 0.0 && len >= step_tol {
                self.phase = Phase::Trial;
                return;
            }
        }
        self.direction = self.it.grad_f.iter().map(|g| -g).collect();
        let len = self.place_trial();
        if self.slope < 0.0 && len >= step_tol {
            self.phase = Phase::Trial;
        } else {
            self.wind_down(NlpStatus::SearchDirectionSmall);
        }
    }

    fn line_search_step(&mut self) {
        let ls = &self.config.line_search;
        let f_trial = self.it.f;
        if f_trial.is_finite() && f_trial <= self.f_base + ls.c * self.slope {
            self.it.iter += 1;
            self.it.alpha = self.alpha;
            self.phase = Phase::Derivatives;
            return;
        }
        self.alpha *= ls.rho;
        if self.alpha < ls.alpha_min {
            self.wind_down(NlpStatus::SearchDirectionSmall);
            return;
        }
        let len = self.place_trial();
        if len < self.config.convergence.step_tol {
            self.wind_down(NlpStatus::SearchDirectionSmall);
        } else {
            self.phase = Phase::Trial;
        }
    }

    /// Least-squares multipliers for `grad_f + Jᵀ lam_g = 0`, and bound
    /// multipliers from the remaining residual on active bounds.
    fn estimate_multipliers(&mut self) {
        let (ng, nx) = (self.lbg.len(), self.lbx.len());
        let mut residual = self.it.grad_f.clone();
        if ng > 0 {
            let j = densify(&self.jac_sp, &self.it.jac_g);
            let mut jjt = vec![0.0; ng * ng];
            let mut rhs = vec![0.0; ng];
            for r in 0..ng {
                let jr = &j[r * nx..(r + 1) * nx];
                rhs[r] = -dot(jr, &self.it.grad_f);
                for s in 0..ng {
                    jjt[r * ng + s] = dot(jr, &j[s * nx..(s + 1) * nx]);
                }
            }
            match lu_solve(jjt, ng, &rhs) {
                Some(lam) => {
                    for r in 0..ng {
                        for c in 0..nx {
                            residual[c] += j[r * nx + c] * lam[r];
                        }
                    }
                    self.it.lam_g = lam;
                }
                None => {
                    debug!("newton: constraint Jacobian rank deficient, multipliers set to zero");
                    self.it.lam_g.iter_mut().for_each(|v| *v = 0.0);
                }
            }
        }
        for i in 0..nx {
            let at_bound = self.it.x[i] <= self.lbx[i] || self.it.x[i] >= self.ubx[i];
            self.it.lam_x[i] = if at_bound { -residual[i] } else { 0.0 };
        }
    }

    fn finish(&mut self) {
        self.it.inf_pr = max_violation(&self.it.g, &self.lbg, &self.ubg);
        self.estimate_multipliers();
        let status = if self.outcome == NlpStatus::Success && self.it.inf_pr > self.config.convergence.constr_tol {
            NlpStatus::Infeasible
        } else {
            self.outcome
        };
        self.terminate(status);
    }
}

impl RevCommEngine for NewtonEngine {
    fn name(&self) -> &str {
        "newton"
    }

    fn init(&mut self, setup: &NlpSetup<'_>) {
        let nx = setup.x0.len();
        let ng = setup.lbg.len();
        self.it = Iterate::sized(nx, ng, setup.jac_g_sparsity.nnz(), setup.hess_l_sparsity.nnz());
        for i in 0..nx {
            self.it.x[i] = setup.x0[i].clamp(setup.lbx[i], setup.ubx[i]);
        }
        self.lbx = setup.lbx.to_vec();
        self.ubx = setup.ubx.to_vec();
        self.lbg = setup.lbg.to_vec();
        self.ubg = setup.ubg.to_vec();
        self.jac_sp = setup.jac_g_sparsity.clone();
        self.hess_sp = setup.hess_l_sparsity.clone();
        self.x_base = self.it.x.clone();
        self.f_base = 0.0;
        self.direction = vec![0.0; nx];
        self.outcome = NlpStatus::Success;
        self.status = None;
        self.phase = Phase::Derivatives;
    }

    fn pending(&self) -> Option<UserAction> {
        match self.phase {
            Phase::Idle | Phase::Done => None,
            Phase::Derivatives => Some(UserAction::EvalGradF),
            Phase::Hessian => Some(UserAction::EvalHessL),
            Phase::Report => Some(UserAction::IterationOutput),
            Phase::Direction | Phase::Accept | Phase::Finish => Some(UserAction::CallSolver),
            Phase::Trial => Some(UserAction::EvalF),
            Phase::Constraints => Some(UserAction::EvalG),
            Phase::Jacobian => Some(UserAction::EvalJacG),
        }
    }

    fn call_solver(&mut self) {
        match self.phase {
            Phase::Direction => self.direction_step(),
            Phase::Accept => self.line_search_step(),
            Phase::Finish => self.finish(),
            _ => debug_assert!(false, "call_solver in phase {:?}", self.phase),
        }
    }

    fn done(&mut self, action: UserAction) {
        match (self.phase, action) {
            (Phase::Derivatives, UserAction::EvalGradF) => {
                if !self.it.f.is_finite() || self.it.grad_f.iter().any(|g| !g.is_finite()) {
                    debug!("newton: non-finite objective or gradient");
                    self.terminate(NlpStatus::InternalError);
                    return;
                }
                self.x_base.clone_from(&self.it.x);
                self.f_base = self.it.f;
                self.it.inf_du = projected_gradient_norm(&self.it.x, &self.it.grad_f, &self.lbx, &self.ubx);
                self.it.sigma = 1.0;
                self.it.lam_g.iter_mut().for_each(|v| *v = 0.0);
                self.phase = Phase::Hessian;
            }
            (Phase::Hessian, UserAction::EvalHessL) => self.phase = Phase::Report,
            (Phase::Report, UserAction::IterationOutput) => self.phase = Phase::Direction,
            (Phase::Trial, UserAction::EvalF) => self.phase = Phase::Accept,
            (Phase::Constraints, UserAction::EvalG) => {
                self.phase = if self.lbg.is_empty() {
                    Phase::Finish
                } else {
                    Phase::Jacobian
                };
            }
            (Phase::Jacobian, UserAction::EvalJacG) => self.phase = Phase::Finish,
            (Phase::Done, _) => {}
            (phase, action) => debug_assert!(false, "{} reported in phase {:?}", action, phase),
        }
    }

    fn terminate(&mut self, status: NlpStatus) {
        debug!("newton: {} after {} iterations", status, self.it.iter);
        self.status = Some(status);
        self.phase = Phase::Done;
    }

    fn status(&self) -> Option<NlpStatus> {
        self.status
    }

    fn iterate(&self) -> &Iterate {
        &self.it
    }

    fn iterate_mut(&mut self) -> &mut Iterate {
        &mut self.it
    }
}
