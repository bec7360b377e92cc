//! Rank-1 update `A + alpha * x * yᵀ`.
//!
//! The node's pattern is `A`'s pattern, and the builder projects `A` onto
//! `A ∪ outer(x, y)` first, so every product term has a slot. The first
//! dependency is the only one that may share its buffer with the output.

use num_traits::Zero;

use crate::bvec::Bvec;
use crate::codegen::{CodeGenerator, Register};
use crate::element::Element;
use crate::error::{Error, Result};
use crate::sparsity::{Sparsity, ABSENT};
use crate::sx::SxElem;

use super::node::{MxOp, OpContract, OpTag};
use super::Mx;

/// Deps are `[A, alpha, x, y]`.
#[derive(Debug, Clone)]
pub struct Rank1;

impl Mx {
    /// `a + alpha * x * yᵀ` for a scalar `alpha` and columns `x`, `y`.
    pub fn rank1(a: &Mx, alpha: &Mx, x: &Mx, y: &Mx) -> Result<Mx> {
        if alpha.shape() != (1, 1)
            || !x.sparsity().is_column()
            || !y.sparsity().is_column()
            || a.nrow() != x.nrow()
            || a.ncol() != y.nrow()
        {
            return Err(Error::dimension(
                "rank1",
                format!(
                    "A {}, alpha {}, x {}, y {}",
                    a.sparsity().dim_string(),
                    alpha.sparsity().dim_string(),
                    x.sparsity().dim_string(),
                    y.sparsity().dim_string()
                ),
            ));
        }
        if alpha.nnz() == 0 || x.nnz() == 0 || y.nnz() == 0 {
            return Ok(a.clone());
        }
        let sp = a
            .sparsity()
            .union(&Sparsity::outer(x.sparsity(), y.sparsity())?)?;
        let a = a.project(&sp)?;
        Ok(Mx::from_op(
            MxOp::Rank1(Rank1),
            vec![a, alpha.clone(), x.clone(), y.clone()],
            sp,
        ))
    }
}

impl Rank1 {
    /// Scatter `x` and `y`: `iw` gets the nonzero position of every row of
    /// `x` followed by every row of `y` (or [`ABSENT`]), `w` their values.
    fn scatter<T: Clone + Zero>(node: &Mx, x: &[T], y: &[T], iw: &mut [usize], w: &mut [T]) {
        let m = node.nrow();
        let n = node.ncol();
        iw[..m + n].fill(ABSENT);
        w[..m + n].fill(T::zero());
        for (r, _, k) in node.dep(2).sparsity().iter() {
            iw[r] = k;
            w[r] = x[k].clone();
        }
        for (c, _, k) in node.dep(3).sparsity().iter() {
            iw[m + c] = k;
            w[m + c] = y[k].clone();
        }
    }

    /// Apply the update to `res`, which already holds `A`'s nonzeros.
    ///
    /// This is the aliasing entry point: the caller may pass `A`'s own buffer.
    pub fn eval_in_place<T: Element>(
        node: &Mx,
        res: &mut [T],
        alpha: &[T],
        x: &[T],
        y: &[T],
        iw: &mut [usize],
        w: &mut [T],
    ) {
        let m = node.nrow();
        Rank1::scatter(node, x, y, iw, w);
        let alpha = &alpha[0];
        for (r, c, k) in node.sparsity().iter() {
            if iw[r] != ABSENT && iw[m + c] != ABSENT {
                res[k] = res[k].clone() + alpha.clone() * w[r].clone() * w[m + c].clone();
            }
        }
    }

    fn eval_gen<T: Element>(node: &Mx, arg: &[&[T]], res: &mut [T], iw: &mut [usize], w: &mut [T]) {
        res.clone_from_slice(arg[0]);
        Rank1::eval_in_place(node, res, arg[1], arg[2], arg[3], iw, w);
    }
}

impl OpContract for Rank1 {
    fn tag(&self) -> OpTag {
        OpTag::Rank1
    }

    fn sz_iw(&self, node: &Mx) -> usize {
        node.nrow() + node.ncol()
    }

    fn sz_w(&self, node: &Mx) -> usize {
        node.nrow() + node.ncol()
    }

    fn n_inplace(&self) -> usize {
        1
    }

    fn eval_numeric(&self, node: &Mx, arg: &[&[f64]], res: &mut [f64], iw: &mut [usize], w: &mut [f64]) -> Result<()> {
        Rank1::eval_gen(node, arg, res, iw, w);
        Ok(())
    }

    fn eval_symbolic(
        &self,
        node: &Mx,
        arg: &[&[SxElem]],
        res: &mut [SxElem],
        iw: &mut [usize],
        w: &mut [SxElem],
    ) -> Result<()> {
        Rank1::eval_gen(node, arg, res, iw, w);
        Ok(())
    }

    fn eval_graph(&self, _node: &Mx, deps: &[Mx]) -> Result<Mx> {
        Mx::rank1(&deps[0], &deps[1], &deps[2], &deps[3])
    }

    fn sp_forward(&self, node: &Mx, arg: &[&[Bvec]], res: &mut [Bvec], iw: &mut [usize], w: &mut [Bvec]) {
        let m = node.nrow();
        Rank1::scatter(node, arg[2], arg[3], iw, w);
        let alpha = arg[1][0];
        for (r, c, k) in node.sparsity().iter() {
            res[k] = arg[0][k];
            if iw[r] != ABSENT && iw[m + c] != ABSENT {
                res[k] |= alpha | w[r] | w[m + c];
            }
        }
    }

    fn sp_reverse(&self, node: &Mx, arg: &mut [&mut [Bvec]], res: &mut [Bvec], iw: &mut [usize], _: &mut [Bvec]) {
        let m = node.nrow();
        let n = node.ncol();
        iw[..m + n].fill(ABSENT);
        for (r, _, k) in node.dep(2).sparsity().iter() {
            iw[r] = k;
        }
        for (c, _, k) in node.dep(3).sparsity().iter() {
            iw[m + c] = k;
        }
        for (r, c, k) in node.sparsity().iter() {
            let s = res[k];
            arg[0][k] |= s;
            if iw[r] != ABSENT && iw[m + c] != ABSENT {
                arg[1][0] |= s;
                arg[2][iw[r]] |= s;
                arg[3][iw[m + c]] |= s;
            }
            res[k] = 0;
        }
    }

    fn ad_forward(&self, node: &Mx, fseed: &[Vec<Mx>]) -> Result<Vec<Mx>> {
        let (alpha, x, y) = (node.dep(1), node.dep(2), node.dep(3));
        fseed
            .iter()
            .map(|s| {
                let v = s[0].project(node.sparsity())?;
                let v = Mx::rank1(&v, &s[1], x, y)?;
                let v = Mx::rank1(&v, alpha, &s[2], y)?;
                Mx::rank1(&v, alpha, x, &s[3])
            })
            .collect()
    }

    fn ad_reverse(&self, node: &Mx, aseed: &[Mx]) -> Result<Vec<Vec<Mx>>> {
        let (alpha, x, y) = (node.dep(1), node.dep(2), node.dep(3));
        aseed
            .iter()
            .map(|s| {
                Ok(vec![
                    s.clone(),
                    Mx::bilin(s, x, y)?,
                    s.mtimes(y)?.scale(alpha)?,
                    s.transpose().mtimes(x)?.scale(alpha)?,
                ])
            })
            .collect()
    }

    fn emit_code(&self, node: &Mx, g: &mut CodeGenerator, arg: &[Register], res: &Register) {
        let x_nz = node.dep(2).sparsity().dense_lookup();
        let y_nz = node.dep(3).sparsity().dense_lookup();
        for (r, c, k) in node.sparsity().iter() {
            if x_nz[r] != ABSENT && y_nz[c] != ABSENT {
                g.assign(
                    res.at(k),
                    format!(
                        "{} + {} * {} * {}",
                        arg[0].at(k),
                        arg[1].at(0),
                        arg[2].at(x_nz[r]),
                        arg[3].at(y_nz[c])
                    ),
                );
            } else {
                g.assign(res.at(k), arg[0].at(k));
            }
        }
    }

    fn display(&self, _node: &Mx, args: &[String]) -> String {
        format!("rank1({}, {}, {}, {})", args[0], args[1], args[2], args[3])
    }
}
