use num_traits::Float;

/// Termination tolerances.
#[derive(Debug, Clone)]
pub struct ConvergenceParams {
    /// Maximum number of accepted steps (default: 100).
    pub max_iter: usize,
    /// Stop when the projected gradient norm falls below this (default: 1e-8).
    pub grad_tol: f64,
    /// Give up when a trial step is shorter than this (default: 1e-12).
    pub step_tol: f64,
    /// Largest bound violation of `g` accepted as feasible (default: 1e-8).
    pub constr_tol: f64,
}

impl Default for ConvergenceParams {
    fn default() -> Self {
        ConvergenceParams {
            max_iter: 100,
            grad_tol: 1e-8,
            step_tol: 1e-12,
            constr_tol: 1e-8,
        }
    }
}

/// Backtracking parameters: accept `alpha` when
/// `f(x + s(alpha)) <= f(x) + c * grad_f(x)ᵀ s(alpha)`.
#[derive(Debug, Clone)]
pub struct ArmijoParams {
    /// Sufficient decrease parameter (default: 1e-4).
    pub c: f64,
    /// Backtracking factor (default: 0.5).
    pub rho: f64,
    /// First trial step (default: 1.0).
    pub alpha_init: f64,
    /// Smallest step tried before giving up (default: 1e-16).
    pub alpha_min: f64,
}

impl Default for ArmijoParams {
    fn default() -> Self {
        ArmijoParams {
            c: 1e-4,
            rho: 0.5,
            alpha_init: 1.0,
            alpha_min: 1e-16,
        }
    }
}

pub fn norm<F: Float>(v: &[F]) -> F {
    v.iter().fold(F::zero(), |s, &x| s + x * x).sqrt()
}

pub fn dot<F: Float>(a: &[F], b: &[F]) -> F {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).fold(F::zero(), |s, (&x, &y)| s + x * y)
}

/// Largest amount by which `v` leaves `[lower, upper]`, zero when inside.
pub fn max_violation(v: &[f64], lower: &[f64], upper: &[f64]) -> f64 {
    v.iter()
        .zip(lower.iter().zip(upper))
        .map(|(&x, (&lo, &up))| (lo - x).max(x - up).max(0.0))
        .fold(0.0, f64::max)
}

/// Norm of `x - P(x - grad)`, the gradient projected onto the box.
pub fn projected_gradient_norm(x: &[f64], grad: &[f64], lower: &[f64], upper: &[f64]) -> f64 {
    let mut s = 0.0;
    for i in 0..x.len() {
        let d = x[i] - (x[i] - grad[i]).clamp(lower[i], upper[i]);
        s += d * d;
    }
    s.sqrt()
}
