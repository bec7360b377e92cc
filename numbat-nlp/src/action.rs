use std::fmt;

/// A request an engine makes of its driver.
///
/// An engine has at most one pending action at a time. The driver resolves
/// it and reports back; evaluation actions are resolved by exactly one call
/// of the matching problem Function at the engine's current iterate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UserAction {
    /// Let the engine advance its own computation.
    CallSolver,
    /// Report progress; the iteration callback may stop the solve here.
    IterationOutput,
    /// Evaluate the objective into `Iterate::f`.
    EvalF,
    /// Evaluate the constraints into `Iterate::g`.
    EvalG,
    /// Evaluate objective and gradient into `Iterate::f`, `Iterate::grad_f`.
    EvalGradF,
    /// Evaluate constraints and their Jacobian nonzeros into `Iterate::g`, `Iterate::jac_g`.
    EvalJacG,
    /// Evaluate the Lagrangian Hessian nonzeros into `Iterate::hess_l`
    /// with objective factor `Iterate::sigma` and multipliers `Iterate::lam_g`.
    EvalHessL,
}

impl UserAction {
    /// Every action, in declaration order.
    pub const ALL: [UserAction; 7] = [
        UserAction::CallSolver,
        UserAction::IterationOutput,
        UserAction::EvalF,
        UserAction::EvalG,
        UserAction::EvalGradF,
        UserAction::EvalJacG,
        UserAction::EvalHessL,
    ];

    /// Name of the problem Function resolving this action, if any.
    pub fn function_name(self) -> Option<&'static str> {
        match self {
            UserAction::CallSolver => None,
            UserAction::IterationOutput => None,
            UserAction::EvalF => Some("nlp_f"),
            UserAction::EvalG => Some("nlp_g"),
            UserAction::EvalGradF => Some("nlp_grad_f"),
            UserAction::EvalJacG => Some("nlp_jac_g"),
            UserAction::EvalHessL => Some("nlp_hess_l"),
        }
    }
}

impl fmt::Display for UserAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserAction::CallSolver => write!(f, "call solver"),
            UserAction::IterationOutput => write!(f, "iteration output"),
            UserAction::EvalF => write!(f, "evaluate f"),
            UserAction::EvalG => write!(f, "evaluate g"),
            UserAction::EvalGradF => write!(f, "evaluate gradient of f"),
            UserAction::EvalJacG => write!(f, "evaluate Jacobian of g"),
            UserAction::EvalHessL => write!(f, "evaluate Hessian of the Lagrangian"),
        }
    }
}
