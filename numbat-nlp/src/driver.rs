use std::collections::BTreeMap;

use log::{debug, trace};
use numbat::Memory;

use crate::action::UserAction;
use crate::engine::{Iterate, NlpSetup, RevCommEngine};
use crate::error::{NlpError, Result};
use crate::problem::NlpProblem;
use crate::status::NlpStatus;

/// Numeric inputs of one solve. Empty `lbx`/`ubx` leave `x` unbounded;
/// `lbg`/`ubg` are required whenever the problem has constraints.
#[derive(Debug, Clone, Default)]
pub struct NlpInput {
    pub x0: Vec<f64>,
    pub p: Vec<f64>,
    pub lbx: Vec<f64>,
    pub ubx: Vec<f64>,
    pub lbg: Vec<f64>,
    pub ubg: Vec<f64>,
}

impl NlpInput {
    pub fn new(x0: Vec<f64>) -> Self {
        NlpInput {
            x0,
            ..Default::default()
        }
    }

    pub fn with_p(mut self, p: Vec<f64>) -> Self {
        self.p = p;
        self
    }

    pub fn with_x_bounds(mut self, lbx: Vec<f64>, ubx: Vec<f64>) -> Self {
        self.lbx = lbx;
        self.ubx = ubx;
        self
    }

    pub fn with_g_bounds(mut self, lbg: Vec<f64>, ubg: Vec<f64>) -> Self {
        self.lbg = lbg;
        self.ubg = ubg;
        self
    }
}

/// Outcome of a solve.
#[derive(Debug, Clone)]
pub struct NlpSolution {
    pub status: NlpStatus,
    pub x: Vec<f64>,
    pub f: f64,
    pub g: Vec<f64>,
    pub lam_x: Vec<f64>,
    pub lam_g: Vec<f64>,
    pub iterations: usize,
    /// How often each action was resolved.
    pub actions: BTreeMap<UserAction, usize>,
}

/// Runs the reverse-communication loop of an engine against a problem.
///
/// The driver owns the [`Memory`] used for every Function call, so one
/// driver serves one solve at a time.
#[derive(Debug)]
pub struct NlpDriver<E> {
    problem: NlpProblem,
    engine: E,
    memory: Memory<f64>,
}

fn bounds_or(v: &[f64], n: usize, fill: f64, what: &'static str) -> Result<Vec<f64>> {
    match v.len() {
        0 => Ok(vec![fill; n]),
        len if len == n => Ok(v.to_vec()),
        got => Err(NlpError::Length { what, expected: n, got }),
    }
}

fn check_len(v: &[f64], n: usize, what: &'static str) -> Result<()> {
    if v.len() != n {
        return Err(NlpError::Length {
            what,
            expected: n,
            got: v.len(),
        });
    }
    Ok(())
}

impl<E: RevCommEngine> NlpDriver<E> {
    pub fn new(problem: NlpProblem, engine: E) -> Self {
        let mut memory = Memory::new();
        for f in problem.functions() {
            memory.alloc(f);
        }
        NlpDriver {
            problem,
            engine,
            memory,
        }
    }

    pub fn problem(&self) -> &NlpProblem {
        &self.problem
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Solve from `input`. Numeric difficulties end in a status; only
    /// invalid inputs and Function failures are errors.
    pub fn solve(&mut self, input: &NlpInput) -> Result<NlpSolution> {
        let (nx, np, ng) = (self.problem.nx(), self.problem.np(), self.problem.ng());
        check_len(&input.x0, nx, "x0")?;
        check_len(&input.p, np, "p")?;
        let lbx = bounds_or(&input.lbx, nx, f64::NEG_INFINITY, "lbx")?;
        let ubx = bounds_or(&input.ubx, nx, f64::INFINITY, "ubx")?;
        for (index, (&lower, &upper)) in lbx.iter().zip(&ubx).enumerate() {
            if lower == upper {
                return Err(NlpError::FixedVariable { index, value: lower });
            }
            if lower > upper {
                return Err(NlpError::EmptyBounds {
                    what: "variable",
                    index,
                    lower,
                    upper,
                });
            }
        }
        check_len(&input.lbg, ng, "lbg")?;
        check_len(&input.ubg, ng, "ubg")?;
        let (lbg, ubg) = (&input.lbg, &input.ubg);
        for (index, (&lower, &upper)) in lbg.iter().zip(ubg).enumerate() {
            if lower == f64::NEG_INFINITY && upper == f64::INFINITY {
                return Err(NlpError::FreeConstraint { index });
            }
            if lower > upper {
                return Err(NlpError::EmptyBounds {
                    what: "constraint",
                    index,
                    lower,
                    upper,
                });
            }
        }

        self.engine.init(&NlpSetup {
            x0: &input.x0,
            lbx: &lbx,
            ubx: &ubx,
            lbg,
            ubg,
            jac_g_sparsity: self.problem.jac_g_sparsity(),
            hess_l_sparsity: self.problem.hess_l_sparsity(),
        });
        debug!("{}: solving nx={} ng={}", self.engine.name(), nx, ng);

        let mut actions = BTreeMap::new();
        while let Some(action) = self.engine.pending() {
            trace!("{}: {}", self.engine.name(), action);
            *actions.entry(action).or_insert(0) += 1;
            match action {
                UserAction::CallSolver => self.engine.call_solver(),
                UserAction::IterationOutput => {
                    if self.iteration_output()? {
                        self.engine.terminate(NlpStatus::UserTerminated);
                    }
                    self.engine.done(action);
                }
                _ => {
                    self.evaluate(action, &input.p)?;
                    self.engine.done(action);
                }
            }
        }

        let status = self.engine.status().unwrap_or(NlpStatus::InternalError);
        let it = self.engine.iterate();
        debug!("{}: {} (f = {}, {} iterations)", self.engine.name(), status, it.f, it.iter);
        Ok(NlpSolution {
            status,
            x: it.x.clone(),
            f: it.f,
            g: it.g.clone(),
            lam_x: it.lam_x.clone(),
            lam_g: it.lam_g.clone(),
            iterations: it.iter,
            actions,
        })
    }

    /// Call the iteration callback; `true` asks to stop.
    fn iteration_output(&mut self) -> Result<bool> {
        let Some(callback) = self.problem.callback() else {
            return Ok(false);
        };
        let it = self.engine.iterate();
        let mut stop = [0.0];
        self.memory.call(
            callback,
            &[Some(it.x.as_slice()), Some(std::slice::from_ref(&it.f)), Some(it.g.as_slice())],
            &mut [Some(&mut stop[..])],
        )?;
        Ok(stop[0] != 0.0)
    }

    /// Resolve an evaluation action with exactly one Function call.
    fn evaluate(&mut self, action: UserAction, p: &[f64]) -> Result<()> {
        let problem = &self.problem;
        let memory = &mut self.memory;
        let Iterate {
            x,
            f,
            g,
            grad_f,
            jac_g,
            hess_l,
            sigma,
            lam_g,
            ..
        } = self.engine.iterate_mut();
        let xp = [Some(x.as_slice()), Some(p)];
        match action {
            UserAction::EvalF => memory.call(problem.f(), &xp, &mut [Some(std::slice::from_mut(f))])?,
            UserAction::EvalG => memory.call(problem.g(), &xp, &mut [Some(g.as_mut_slice())])?,
            UserAction::EvalGradF => memory.call(
                problem.grad_f(),
                &xp,
                &mut [Some(std::slice::from_mut(f)), Some(grad_f.as_mut_slice())],
            )?,
            UserAction::EvalJacG => {
                memory.call(problem.jac_g(), &xp, &mut [Some(g.as_mut_slice()), Some(jac_g.as_mut_slice())])?
            }
            UserAction::EvalHessL => memory.call(
                problem.hess_l(),
                &[
                    Some(x.as_slice()),
                    Some(p),
                    Some(std::slice::from_ref(&*sigma)),
                    Some(lam_g.as_slice()),
                ],
                &mut [Some(hess_l.as_mut_slice())],
            )?,
            UserAction::CallSolver | UserAction::IterationOutput => {}
        }
        Ok(())
    }
}
