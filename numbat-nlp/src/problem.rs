//! The bundle of compiled Functions an NLP solve consumes.
//!
//! ```text
//! minimize    f(x, p)
//! subject to  lbx <= x <= ubx
//!             lbg <= g(x, p) <= ubg
//! ```

use numbat::{Function, Sparsity, SxMatrix};

use crate::error::{NlpError, Result};

/// Objective, constraints and their derivatives as Functions.
///
/// | Function     | inputs              | outputs        |
/// |--------------|---------------------|----------------|
/// | `nlp_f`      | `x, p`              | `f`            |
/// | `nlp_g`      | `x, p`              | `g`            |
/// | `nlp_grad_f` | `x, p`              | `f, grad_f`    |
/// | `nlp_jac_g`  | `x, p`              | `g, jac_g`     |
/// | `nlp_hess_l` | `x, p, sigma, lam`  | `hess_l`       |
/// | callback     | `x, f, g`           | `stop`         |
///
/// `x`, `p`, `g`, `grad_f` and `lam` are dense columns, `f`, `sigma` and
/// `stop` dense scalars. `jac_g` is `ng x nx` and `hess_l` is `nx x nx`,
/// both with any pattern. A nonzero `stop` ends the solve.
#[derive(Debug, Clone)]
pub struct NlpProblem {
    f: Function,
    g: Function,
    grad_f: Function,
    jac_g: Function,
    hess_l: Function,
    callback: Option<Function>,
    nx: usize,
    np: usize,
    ng: usize,
}

fn signature(function: &'static str, detail: String) -> NlpError {
    NlpError::Signature { function, detail }
}

fn check_arity(role: &'static str, f: &Function, n_in: usize, n_out: usize) -> Result<()> {
    if f.n_in() != n_in || f.n_out() != n_out {
        return Err(signature(
            role,
            format!(
                "expected {} inputs and {} outputs, got {} and {}",
                n_in,
                n_out,
                f.n_in(),
                f.n_out()
            ),
        ));
    }
    Ok(())
}

fn check_pattern(role: &'static str, what: &str, got: &Sparsity, expected: &Sparsity) -> Result<()> {
    if got != expected {
        return Err(signature(role, format!("{} is {}, expected {}", what, got, expected)));
    }
    Ok(())
}

fn check_shape(role: &'static str, what: &str, got: &Sparsity, shape: (usize, usize)) -> Result<()> {
    if got.shape() != shape {
        return Err(signature(
            role,
            format!("{} is {}x{}, expected {}x{}", what, got.nrow(), got.ncol(), shape.0, shape.1),
        ));
    }
    Ok(())
}

fn dense_column(role: &'static str, what: &str, sp: &Sparsity) -> Result<usize> {
    if !sp.is_column() || !sp.is_dense() {
        return Err(signature(role, format!("{} must be a dense column, got {}", what, sp)));
    }
    Ok(sp.nrow())
}

impl NlpProblem {
    /// Bundle existing Functions after checking their signatures against each other.
    pub fn new(f: Function, g: Function, grad_f: Function, jac_g: Function, hess_l: Function) -> Result<Self> {
        check_arity("nlp_f", &f, 2, 1)?;
        let x_sp = f.sparsity_in(0).clone();
        let p_sp = f.sparsity_in(1).clone();
        let nx = dense_column("nlp_f", "x", &x_sp)?;
        let np = dense_column("nlp_f", "p", &p_sp)?;
        let scalar = Sparsity::scalar();
        check_pattern("nlp_f", "f", f.sparsity_out(0), &scalar)?;

        check_arity("nlp_g", &g, 2, 1)?;
        check_pattern("nlp_g", "x", g.sparsity_in(0), &x_sp)?;
        check_pattern("nlp_g", "p", g.sparsity_in(1), &p_sp)?;
        let ng = dense_column("nlp_g", "g", g.sparsity_out(0))?;
        let g_sp = g.sparsity_out(0).clone();

        check_arity("nlp_grad_f", &grad_f, 2, 2)?;
        check_pattern("nlp_grad_f", "x", grad_f.sparsity_in(0), &x_sp)?;
        check_pattern("nlp_grad_f", "p", grad_f.sparsity_in(1), &p_sp)?;
        check_pattern("nlp_grad_f", "f", grad_f.sparsity_out(0), &scalar)?;
        check_pattern("nlp_grad_f", "grad_f", grad_f.sparsity_out(1), &x_sp)?;

        check_arity("nlp_jac_g", &jac_g, 2, 2)?;
        check_pattern("nlp_jac_g", "x", jac_g.sparsity_in(0), &x_sp)?;
        check_pattern("nlp_jac_g", "p", jac_g.sparsity_in(1), &p_sp)?;
        check_pattern("nlp_jac_g", "g", jac_g.sparsity_out(0), &g_sp)?;
        check_shape("nlp_jac_g", "jac_g", jac_g.sparsity_out(1), (ng, nx))?;

        check_arity("nlp_hess_l", &hess_l, 4, 1)?;
        check_pattern("nlp_hess_l", "x", hess_l.sparsity_in(0), &x_sp)?;
        check_pattern("nlp_hess_l", "p", hess_l.sparsity_in(1), &p_sp)?;
        check_pattern("nlp_hess_l", "sigma", hess_l.sparsity_in(2), &scalar)?;
        check_pattern("nlp_hess_l", "lam", hess_l.sparsity_in(3), &g_sp)?;
        check_shape("nlp_hess_l", "hess_l", hess_l.sparsity_out(0), (nx, nx))?;

        Ok(NlpProblem {
            f,
            g,
            grad_f,
            jac_g,
            hess_l,
            callback: None,
            nx,
            np,
            ng,
        })
    }

    /// Generate every problem Function from scalar expressions.
    ///
    /// `x` and `p` must be dense columns of symbols, `f` a scalar and `g` a
    /// column; derivatives are obtained by forward-mode Jacobians of the
    /// recorded expressions.
    pub fn from_expressions(x: &SxMatrix, p: &SxMatrix, f: &SxMatrix, g: &SxMatrix) -> Result<Self> {
        let nx = dense_column("nlp_f", "x", x.sparsity())?;
        dense_column("nlp_f", "p", p.sparsity())?;
        check_shape("nlp_f", "f", f.sparsity(), (1, 1))?;
        if !g.sparsity().is_column() {
            return Err(signature("nlp_g", format!("g must be a column, got {}", g.sparsity())));
        }
        let ng = g.nrow();
        let f = f.project(&Sparsity::scalar())?;
        let g = g.project(&Sparsity::column(ng))?;
        let xp = [x.clone(), p.clone()];

        let f_fn = Function::sx("nlp_f", &xp, std::slice::from_ref(&f))?.with_names(&["x", "p"], &["f"])?;
        let g_fn = Function::sx("nlp_g", &xp, std::slice::from_ref(&g))?.with_names(&["x", "p"], &["g"])?;

        let grad = gradient(&f_fn, &xp, nx)?;
        let grad_f = Function::sx("nlp_grad_f", &xp, &[f.clone(), grad])?.with_names(&["x", "p"], &["f", "grad_f"])?;

        let jac = g_fn.jacobian(0, 0)?.call_symbolic(&xp)?.remove(0);
        let jac_g = Function::sx("nlp_jac_g", &xp, &[g.clone(), jac])?.with_names(&["x", "p"], &["g", "jac_g"])?;

        let sigma = SxMatrix::sym("sigma", Sparsity::scalar());
        let lam = SxMatrix::sym("lam", Sparsity::column(ng));
        let lam_g = lam.transpose().mtimes(&g)?.get(0, 0);
        let lagrangian = SxMatrix::new(Sparsity::scalar(), vec![sigma.get(0, 0) * f.get(0, 0) + lam_g])?;
        let args = [x.clone(), p.clone(), sigma, lam];
        let l_fn = Function::sx("nlp_l", &args, &[lagrangian])?;
        let grad_l = gradient(&l_fn, &args, nx)?;
        let grad_l_fn = Function::sx("nlp_grad_l", &args, &[grad_l])?;
        let hess = grad_l_fn.jacobian(0, 0)?.call_symbolic(&args)?.remove(0);
        let hess_l = Function::sx("nlp_hess_l", &args, &[hess])?
            .with_names(&["x", "p", "sigma", "lam"], &["hess_l"])?;

        NlpProblem::new(f_fn, g_fn, grad_f, jac_g, hess_l)
    }

    /// Attach an iteration callback `(x, f, g) -> stop`.
    pub fn with_callback(mut self, callback: Function) -> Result<Self> {
        check_arity("callback", &callback, 3, 1)?;
        check_pattern("callback", "x", callback.sparsity_in(0), self.f.sparsity_in(0))?;
        check_pattern("callback", "f", callback.sparsity_in(1), &Sparsity::scalar())?;
        check_pattern("callback", "g", callback.sparsity_in(2), self.g.sparsity_out(0))?;
        check_pattern("callback", "stop", callback.sparsity_out(0), &Sparsity::scalar())?;
        self.callback = Some(callback);
        Ok(self)
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn np(&self) -> usize {
        self.np
    }

    pub fn ng(&self) -> usize {
        self.ng
    }

    pub fn f(&self) -> &Function {
        &self.f
    }

    pub fn g(&self) -> &Function {
        &self.g
    }

    pub fn grad_f(&self) -> &Function {
        &self.grad_f
    }

    pub fn jac_g(&self) -> &Function {
        &self.jac_g
    }

    pub fn hess_l(&self) -> &Function {
        &self.hess_l
    }

    pub fn callback(&self) -> Option<&Function> {
        self.callback.as_ref()
    }

    pub fn jac_g_sparsity(&self) -> &Sparsity {
        self.jac_g.sparsity_out(1)
    }

    pub fn hess_l_sparsity(&self) -> &Sparsity {
        self.hess_l.sparsity_out(0)
    }

    /// Every Function the driver may call.
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        [&self.f, &self.g, &self.grad_f, &self.jac_g, &self.hess_l]
            .into_iter()
            .chain(self.callback.as_ref())
    }
}

/// Dense gradient column of the scalar output of `f` with respect to its first input.
fn gradient(f: &Function, args: &[SxMatrix], nx: usize) -> Result<SxMatrix> {
    let jac = f.jacobian(0, 0)?.call_symbolic(args)?.remove(0);
    Ok(jac.transpose().project(&Sparsity::column(nx))?)
}
