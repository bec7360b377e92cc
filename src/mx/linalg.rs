//! Matrix product, transpose and bilinear form.

use crate::bvec::Bvec;
use crate::codegen::{sum_of, CodeGenerator, Register};
use crate::element::Element;
use crate::error::{Error, Result};
use crate::sparsity::{Sparsity, ABSENT};
use crate::sx::SxElem;

use super::node::{MxOp, OpContract, OpTag};
use super::Mx;

/// `x * y` on the structural product pattern.
#[derive(Debug, Clone)]
pub struct Mtimes;

/// Transpose; `mapping[k]` is the source nonzero of output nonzero `k`.
#[derive(Debug, Clone)]
pub struct Transpose {
    pub(crate) mapping: Vec<usize>,
}

/// `xᵀ A y` for columns `x`, `y`; deps are `[A, x, y]`. `terms` lists
/// `(A nz, x nz, y nz)` for every nonzero of `A` whose row and column are
/// present in `x` and `y`.
#[derive(Debug, Clone)]
pub struct Bilin {
    pub(crate) terms: Vec<(usize, usize, usize)>,
}

/// `z += x * y` with `z` on a pattern containing the product pattern.
/// `w` must hold at least `z_sp.nrow()` words.
pub(crate) fn mtimes_kernel<T: Element>(
    x_sp: &Sparsity,
    x: &[T],
    y_sp: &Sparsity,
    y: &[T],
    z_sp: &Sparsity,
    z: &mut [T],
    w: &mut [T],
) {
    let (x_colind, x_row) = (x_sp.colind(), x_sp.row());
    let (y_colind, y_row) = (y_sp.colind(), y_sp.row());
    let (z_colind, z_row) = (z_sp.colind(), z_sp.row());
    for c in 0..z_sp.ncol() {
        for k in z_colind[c]..z_colind[c + 1] {
            w[z_row[k]] = z[k].clone();
        }
        for ky in y_colind[c]..y_colind[c + 1] {
            let j = y_row[ky];
            for kx in x_colind[j]..x_colind[j + 1] {
                let r = x_row[kx];
                w[r] = w[r].clone() + x[kx].clone() * y[ky].clone();
            }
        }
        for k in z_colind[c]..z_colind[c + 1] {
            z[k] = w[z_row[k]].clone();
        }
    }
}

impl Mx {
    pub fn mtimes(&self, other: &Mx) -> Result<Mx> {
        let sp = self.sparsity().mtimes_pattern(other.sparsity())?;
        if sp.nnz() == 0 {
            return Ok(Mx::zeros(sp.nrow(), sp.ncol()));
        }
        Ok(Mx::from_op(
            MxOp::Mtimes(Mtimes),
            vec![self.clone(), other.clone()],
            sp,
        ))
    }

    pub fn transpose(&self) -> Mx {
        if self.is_structural_zero() {
            return Mx::zeros(self.ncol(), self.nrow());
        }
        let (sp, mapping) = self.sparsity().transpose_with_mapping();
        Mx::from_op(
            MxOp::Transpose(Transpose { mapping }),
            vec![self.clone()],
            sp,
        )
    }

    /// `xᵀ A y` as a dense `1 x 1` result.
    pub fn bilin(a: &Mx, x: &Mx, y: &Mx) -> Result<Mx> {
        if !x.sparsity().is_column()
            || !y.sparsity().is_column()
            || a.nrow() != x.nrow()
            || a.ncol() != y.nrow()
        {
            return Err(Error::dimension(
                "bilin",
                format!(
                    "A {}, x {}, y {}",
                    a.sparsity().dim_string(),
                    x.sparsity().dim_string(),
                    y.sparsity().dim_string()
                ),
            ));
        }
        let x_nz = x.sparsity().dense_lookup();
        let y_nz = y.sparsity().dense_lookup();
        let terms: Vec<(usize, usize, usize)> = a
            .sparsity()
            .iter()
            .filter(|&(r, c, _)| x_nz[r] != ABSENT && y_nz[c] != ABSENT)
            .map(|(r, c, k)| (k, x_nz[r], y_nz[c]))
            .collect();
        if terms.is_empty() {
            return Ok(Mx::zeros(1, 1));
        }
        Ok(Mx::from_op(
            MxOp::Bilin(Bilin { terms }),
            vec![a.clone(), x.clone(), y.clone()],
            Sparsity::scalar(),
        ))
    }
}

impl OpContract for Mtimes {
    fn tag(&self) -> OpTag {
        OpTag::Mtimes
    }

    fn sz_w(&self, node: &Mx) -> usize {
        node.nrow()
    }

    fn eval_numeric(&self, node: &Mx, arg: &[&[f64]], res: &mut [f64], _: &mut [usize], w: &mut [f64]) -> Result<()> {
        res.fill(0.0);
        let (x, y) = (node.dep(0), node.dep(1));
        mtimes_kernel(x.sparsity(), arg[0], y.sparsity(), arg[1], node.sparsity(), res, w);
        Ok(())
    }

    fn eval_symbolic(
        &self,
        node: &Mx,
        arg: &[&[SxElem]],
        res: &mut [SxElem],
        _: &mut [usize],
        w: &mut [SxElem],
    ) -> Result<()> {
        res.fill(SxElem::constant(0.0));
        let (x, y) = (node.dep(0), node.dep(1));
        mtimes_kernel(x.sparsity(), arg[0], y.sparsity(), arg[1], node.sparsity(), res, w);
        Ok(())
    }

    fn eval_graph(&self, _node: &Mx, deps: &[Mx]) -> Result<Mx> {
        deps[0].mtimes(&deps[1])
    }

    fn sp_forward(&self, node: &Mx, arg: &[&[Bvec]], res: &mut [Bvec], _: &mut [usize], w: &mut [Bvec]) {
        let (x_sp, y_sp, z_sp) = (node.dep(0).sparsity(), node.dep(1).sparsity(), node.sparsity());
        for c in 0..z_sp.ncol() {
            for k in z_sp.colind()[c]..z_sp.colind()[c + 1] {
                w[z_sp.row()[k]] = 0;
            }
            for ky in y_sp.colind()[c]..y_sp.colind()[c + 1] {
                let j = y_sp.row()[ky];
                for kx in x_sp.colind()[j]..x_sp.colind()[j + 1] {
                    w[x_sp.row()[kx]] |= arg[0][kx] | arg[1][ky];
                }
            }
            for k in z_sp.colind()[c]..z_sp.colind()[c + 1] {
                res[k] = w[z_sp.row()[k]];
            }
        }
    }

    fn sp_reverse(&self, node: &Mx, arg: &mut [&mut [Bvec]], res: &mut [Bvec], _: &mut [usize], w: &mut [Bvec]) {
        let (x_sp, y_sp, z_sp) = (node.dep(0).sparsity(), node.dep(1).sparsity(), node.sparsity());
        for c in 0..z_sp.ncol() {
            for k in z_sp.colind()[c]..z_sp.colind()[c + 1] {
                w[z_sp.row()[k]] = res[k];
                res[k] = 0;
            }
            for ky in y_sp.colind()[c]..y_sp.colind()[c + 1] {
                let j = y_sp.row()[ky];
                for kx in x_sp.colind()[j]..x_sp.colind()[j + 1] {
                    let s = w[x_sp.row()[kx]];
                    arg[0][kx] |= s;
                    arg[1][ky] |= s;
                }
            }
        }
    }

    fn ad_forward(&self, node: &Mx, fseed: &[Vec<Mx>]) -> Result<Vec<Mx>> {
        let (x, y) = (node.dep(0), node.dep(1));
        fseed
            .iter()
            .map(|s| s[0].mtimes(y)?.add(&x.mtimes(&s[1])?))
            .collect()
    }

    fn ad_reverse(&self, node: &Mx, aseed: &[Mx]) -> Result<Vec<Vec<Mx>>> {
        let (x, y) = (node.dep(0), node.dep(1));
        aseed
            .iter()
            .map(|s| {
                Ok(vec![
                    s.mtimes(&y.transpose())?,
                    x.transpose().mtimes(s)?,
                ])
            })
            .collect()
    }

    fn emit_code(&self, node: &Mx, g: &mut CodeGenerator, arg: &[Register], res: &Register) {
        let (x_sp, y_sp, z_sp) = (node.dep(0).sparsity(), node.dep(1).sparsity(), node.sparsity());
        let mut terms: Vec<Vec<String>> = vec![Vec::new(); z_sp.nnz()];
        for c in 0..z_sp.ncol() {
            for ky in y_sp.colind()[c]..y_sp.colind()[c + 1] {
                let j = y_sp.row()[ky];
                for kx in x_sp.colind()[j]..x_sp.colind()[j + 1] {
                    if let Some(kz) = z_sp.get_nz(x_sp.row()[kx], c) {
                        terms[kz].push(format!("{} * {}", arg[0].at(kx), arg[1].at(ky)));
                    }
                }
            }
        }
        for (kz, t) in terms.iter().enumerate() {
            g.assign(res.at(kz), sum_of(t));
        }
    }

    fn display(&self, _node: &Mx, args: &[String]) -> String {
        format!("mtimes({}, {})", args[0], args[1])
    }
}

impl OpContract for Transpose {
    fn tag(&self) -> OpTag {
        OpTag::Transpose
    }

    fn eval_numeric(&self, _: &Mx, arg: &[&[f64]], res: &mut [f64], _: &mut [usize], _: &mut [f64]) -> Result<()> {
        for (r, &k) in res.iter_mut().zip(&self.mapping) {
            *r = arg[0][k];
        }
        Ok(())
    }

    fn eval_symbolic(
        &self,
        _: &Mx,
        arg: &[&[SxElem]],
        res: &mut [SxElem],
        _: &mut [usize],
        _: &mut [SxElem],
    ) -> Result<()> {
        for (r, &k) in res.iter_mut().zip(&self.mapping) {
            *r = arg[0][k].clone();
        }
        Ok(())
    }

    fn eval_graph(&self, _node: &Mx, deps: &[Mx]) -> Result<Mx> {
        Ok(deps[0].transpose())
    }

    fn sp_forward(&self, _: &Mx, arg: &[&[Bvec]], res: &mut [Bvec], _: &mut [usize], _: &mut [Bvec]) {
        for (r, &k) in res.iter_mut().zip(&self.mapping) {
            *r = arg[0][k];
        }
    }

    fn sp_reverse(&self, _: &Mx, arg: &mut [&mut [Bvec]], res: &mut [Bvec], _: &mut [usize], _: &mut [Bvec]) {
        for (r, &k) in res.iter_mut().zip(&self.mapping) {
            arg[0][k] |= *r;
            *r = 0;
        }
    }

    fn ad_forward(&self, _node: &Mx, fseed: &[Vec<Mx>]) -> Result<Vec<Mx>> {
        Ok(fseed.iter().map(|s| s[0].transpose()).collect())
    }

    fn ad_reverse(&self, _node: &Mx, aseed: &[Mx]) -> Result<Vec<Vec<Mx>>> {
        Ok(aseed.iter().map(|s| vec![s.transpose()]).collect())
    }

    fn emit_code(&self, _node: &Mx, g: &mut CodeGenerator, arg: &[Register], res: &Register) {
        for (k, &src) in self.mapping.iter().enumerate() {
            g.assign(res.at(k), arg[0].at(src));
        }
    }

    fn display(&self, _node: &Mx, args: &[String]) -> String {
        format!("{}'", args[0])
    }
}

impl Bilin {
    fn eval_gen<T: Element>(&self, arg: &[&[T]], res: &mut [T]) {
        let mut acc = T::zero();
        for &(ka, kx, ky) in &self.terms {
            acc = acc + arg[1][kx].clone() * arg[0][ka].clone() * arg[2][ky].clone();
        }
        res[0] = acc;
    }
}

impl OpContract for Bilin {
    fn tag(&self) -> OpTag {
        OpTag::Bilin
    }

    fn eval_numeric(&self, _: &Mx, arg: &[&[f64]], res: &mut [f64], _: &mut [usize], _: &mut [f64]) -> Result<()> {
        self.eval_gen(arg, res);
        Ok(())
    }

    fn eval_symbolic(
        &self,
        _: &Mx,
        arg: &[&[SxElem]],
        res: &mut [SxElem],
        _: &mut [usize],
        _: &mut [SxElem],
    ) -> Result<()> {
        self.eval_gen(arg, res);
        Ok(())
    }

    fn eval_graph(&self, _node: &Mx, deps: &[Mx]) -> Result<Mx> {
        Mx::bilin(&deps[0], &deps[1], &deps[2])
    }

    fn sp_forward(&self, _: &Mx, arg: &[&[Bvec]], res: &mut [Bvec], _: &mut [usize], _: &mut [Bvec]) {
        res[0] = self
            .terms
            .iter()
            .fold(0, |acc, &(ka, kx, ky)| acc | arg[0][ka] | arg[1][kx] | arg[2][ky]);
    }

    fn sp_reverse(&self, _: &Mx, arg: &mut [&mut [Bvec]], res: &mut [Bvec], _: &mut [usize], _: &mut [Bvec]) {
        let s = res[0];
        for &(ka, kx, ky) in &self.terms {
            arg[0][ka] |= s;
            arg[1][kx] |= s;
            arg[2][ky] |= s;
        }
        res[0] = 0;
    }

    fn ad_forward(&self, node: &Mx, fseed: &[Vec<Mx>]) -> Result<Vec<Mx>> {
        let (a, x, y) = (node.dep(0), node.dep(1), node.dep(2));
        fseed
            .iter()
            .map(|s| {
                Mx::bilin(&s[0], x, y)?
                    .add(&Mx::bilin(a, &s[1], y)?)?
                    .add(&Mx::bilin(a, x, &s[2])?)
            })
            .collect()
    }

    fn ad_reverse(&self, node: &Mx, aseed: &[Mx]) -> Result<Vec<Vec<Mx>>> {
        let (a, x, y) = (node.dep(0), node.dep(1), node.dep(2));
        aseed
            .iter()
            .map(|s| {
                Ok(vec![
                    x.mtimes(&y.transpose())?.scale(s)?,
                    a.mtimes(y)?.scale(s)?,
                    a.transpose().mtimes(x)?.scale(s)?,
                ])
            })
            .collect()
    }

    fn emit_code(&self, _node: &Mx, g: &mut CodeGenerator, arg: &[Register], res: &Register) {
        let terms: Vec<String> = self
            .terms
            .iter()
            .map(|&(ka, kx, ky)| format!("{} * {} * {}", arg[1].at(kx), arg[0].at(ka), arg[2].at(ky)))
            .collect();
        g.assign(res.at(0), sum_of(&terms));
    }

    fn display(&self, _node: &Mx, args: &[String]) -> String {
        format!("bilin({}, {}, {})", args[0], args[1], args[2])
    }
}
