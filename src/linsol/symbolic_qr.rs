//! Linear solver that factorizes by a QR decomposition recorded as
//! scalar expressions.
//!
//! At reset the pattern is permuted to block triangular form and three
//! Functions are built once: `QR_fact` maps the nonzeros of `A` to the
//! factors `Q`, `R` of the permuted matrix, and `QR_solv` / `QR_solv_T`
//! map `(Q, R, b)` to the solution of `A x = b` / `Aᵀ x = b`. Factorize and
//! solve only evaluate those Functions.

use log::{debug, trace};

use crate::error::{Error, Result};
use crate::function::Function;
use crate::matrix::{Matrix, SxMatrix};
use crate::memory::Memory;
use crate::options::{OptionKind, OptionSpec, Options};
use crate::plugin::Plugin;
use crate::sparsity::Sparsity;

use super::{LinsolInternal, LinsolMemory};

const PLUGIN_NAME: &str = "symbolicqr";
const PLUGIN_VERSION: u32 = 31;

/// Options recognised by [`SymbolicQr`].
pub const SYMBOLIC_QR_OPTIONS: &[OptionSpec] = &[
    OptionSpec::new(
        "enable_codegen",
        OptionKind::Bool,
        "Generate source for the factorization and solve Functions at reset",
    ),
    OptionSpec::retired("compiler", OptionKind::Str, "Just-in-time compiler for the generated source"),
];

pub(super) fn register() -> Plugin<Box<dyn LinsolInternal>> {
    Plugin {
        creator: SymbolicQr::create,
        name: PLUGIN_NAME.to_string(),
        doc: "QR factorization recorded symbolically at reset, evaluated numerically afterwards".to_string(),
        version: PLUGIN_VERSION,
    }
}

/// The `symbolicqr` solver plugin.
#[derive(Debug, Clone, Default)]
pub struct SymbolicQr {
    enable_codegen: bool,
}

impl SymbolicQr {
    pub fn new(options: &Options) -> Result<SymbolicQr> {
        let mut solver = SymbolicQr::default();
        solver.init(options)?;
        Ok(solver)
    }

    fn create(options: &Options) -> Result<Box<dyn LinsolInternal>> {
        Ok(Box::new(SymbolicQr::new(options)?))
    }
}

struct QrData {
    n: usize,
    fact: Function,
    solv: Function,
    solv_t: Function,
    q: Vec<f64>,
    r: Vec<f64>,
    q_stage: Vec<f64>,
    r_stage: Vec<f64>,
    /// Nonzero index of each diagonal entry of `R`.
    r_diag: Vec<usize>,
    work: Memory<f64>,
    code: Option<String>,
}

fn singular(reason: String) -> Error {
    debug!("{}: {}", PLUGIN_NAME, reason);
    Error::SingularMatrix { reason }
}

impl LinsolInternal for SymbolicQr {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn init(&mut self, options: &Options) -> Result<()> {
        options.validate(PLUGIN_NAME, SYMBOLIC_QR_OPTIONS)?;
        self.enable_codegen = options.bool_or("enable_codegen", false);
        Ok(())
    }

    fn reset(&self, mem: &mut LinsolMemory, sparsity: &Sparsity) -> Result<()> {
        if !sparsity.is_square() {
            return Err(Error::dimension(
                "symbolicqr reset",
                format!("pattern {} is not square", sparsity.dim_string()),
            ));
        }
        let n = sparsity.nrow();
        let rank = sparsity.structural_rank();
        if rank < n {
            return Err(singular(format!("structural rank {} of {}", rank, n)));
        }

        let btf = sparsity.btf();
        let rowperm = btf.rowperm.clone();
        let colperm = btf.colperm.clone();
        let inv_rowperm = btf.inverse_rowperm();
        let inv_colperm = btf.inverse_colperm();
        trace!("{}: {} diagonal blocks", PLUGIN_NAME, btf.nblock());

        // Factorization of the permuted matrix.
        let a = SxMatrix::sym("A", sparsity.clone());
        let (q, r) = a.select(&rowperm, &colperm)?.qr()?;
        let r_diag = (0..n)
            .map(|i| r.sparsity().get_nz(i, i))
            .collect::<Option<Vec<usize>>>()
            .ok_or_else(|| singular("R has a structurally zero diagonal".to_string()))?;
        let fact = Function::sx("QR_fact", &[a], &[q.clone(), r.clone()])?.with_names(&["A"], &["Q", "R"])?;

        let qs = SxMatrix::sym("Q", q.sparsity().clone());
        let rs = SxMatrix::sym("R", r.sparsity().clone());
        let b = SxMatrix::sym_dense("b", n, 1);
        let column = Sparsity::column(n);

        // A[rowperm, colperm] = QR, so x[colperm] = R⁻¹ Qᵀ b[rowperm].
        let y = qs.transpose().mtimes(&b.select(&rowperm, &[0])?)?;
        let x = rs.solve_upper(&y)?.select(&inv_colperm, &[0])?.project(&column)?;
        let solv = Function::sx("QR_solv", &[qs.clone(), rs.clone(), b.clone()], &[x])?
            .with_names(&["Q", "R", "b"], &["x"])?;

        // Aᵀ[colperm, rowperm] = RᵀQᵀ, so x[rowperm] = Q R⁻ᵀ b[colperm].
        let z = rs.solve_upper_transposed(&b.select(&colperm, &[0])?)?;
        let x = qs.mtimes(&z)?.select(&inv_rowperm, &[0])?.project(&column)?;
        let solv_t = Function::sx("QR_solv_T", &[qs, rs, b], &[x])?.with_names(&["Q", "R", "b"], &["x"])?;

        let mut work = Memory::new();
        work.alloc(&fact);
        work.alloc(&solv);
        work.alloc(&solv_t);
        work.alloc_w(n);

        let code = if self.enable_codegen {
            let mut src = fact.generate();
            src.push('\n');
            src.push_str(&solv.generate());
            src.push('\n');
            src.push_str(&solv_t.generate());
            Some(src)
        } else {
            None
        };

        debug!(
            "{}: reset n={} nnz(A)={} nnz(Q)={} nnz(R)={}",
            PLUGIN_NAME,
            n,
            sparsity.nnz(),
            q.nnz(),
            r.nnz()
        );
        mem.data = Some(Box::new(QrData {
            n,
            fact,
            solv,
            solv_t,
            q: vec![0.0; q.nnz()],
            r: vec![0.0; r.nnz()],
            q_stage: vec![0.0; q.nnz()],
            r_stage: vec![0.0; r.nnz()],
            r_diag,
            work,
            code,
        }));
        Ok(())
    }

    fn factorize(&self, mem: &mut LinsolMemory, values: &[f64]) -> Result<()> {
        let data = mem.data_mut::<QrData>()?;
        let QrData {
            fact,
            q,
            r,
            q_stage,
            r_stage,
            r_diag,
            work,
            ..
        } = data;
        work.call(
            fact,
            &[Some(values)],
            &mut [Some(q_stage.as_mut_slice()), Some(r_stage.as_mut_slice())],
        )?;
        if let Some(i) = r_diag.iter().position(|&k| !r_stage[k].is_finite() || r_stage[k] == 0.0) {
            return Err(singular(format!("R[{},{}] = {}", i, i, r_stage[r_diag[i]])));
        }
        if q_stage.iter().any(|v| !v.is_finite()) {
            return Err(singular("non-finite entry in Q".to_string()));
        }
        std::mem::swap(q, q_stage);
        std::mem::swap(r, r_stage);
        Ok(())
    }

    fn solve(&self, mem: &mut LinsolMemory, rhs: &mut [f64], nrhs: usize, transposed: bool) -> Result<()> {
        let data = mem.data_mut::<QrData>()?;
        let QrData {
            n,
            solv,
            solv_t,
            q,
            r,
            work,
            ..
        } = data;
        let n = *n;
        if n == 0 {
            return Ok(());
        }
        debug_assert_eq!(rhs.len(), n * nrhs);
        let f = if transposed { solv_t } else { solv };
        for col in rhs.chunks_exact_mut(n).take(nrhs) {
            let (b, iw, w) = work.split_w(n);
            b.copy_from_slice(col);
            f.call_with(&[Some(q.as_slice()), Some(r.as_slice()), Some(&*b)], &mut [Some(col)], iw, w)?;
        }
        Ok(())
    }

    fn eval_symbolic(&self, mem: &LinsolMemory, a: &SxMatrix, b: &SxMatrix, transposed: bool) -> Result<SxMatrix> {
        let data = mem.data::<QrData>()?;
        let qr = data.fact.call_symbolic(std::slice::from_ref(a))?;
        let f = if transposed { &data.solv_t } else { &data.solv };
        let rows: Vec<usize> = (0..data.n).collect();
        let mut columns = Vec::with_capacity(data.n * b.ncol());
        for c in 0..b.ncol() {
            let bc = b.select(&rows, &[c])?;
            let x = f.call_symbolic(&[qr[0].clone(), qr[1].clone(), bc])?;
            columns.extend(x[0].to_dense());
        }
        Matrix::from_dense(data.n, b.ncol(), &columns)
    }

    fn generated_code<'m>(&self, mem: &'m LinsolMemory) -> Option<&'m str> {
        mem.data::<QrData>().ok().and_then(|d| d.code.as_deref())
    }
}
