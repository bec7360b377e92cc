//! Horizontal tiling and its adjoint, the tile-wise reduction.
//!
//! `repmat(x, n)` places `n` copies of `x` side by side; its nonzeros are
//! `x`'s nonzeros repeated `n` times. `repsum(x, n)` splits `x` into `n`
//! equally wide column blocks and reduces them into one block on the union
//! of the block patterns. The two are each other's transposes as linear maps,
//! so each one's reverse rule is the other operator.

use crate::bvec::Bvec;
use crate::codegen::{sum_of, CodeGenerator, Register};
use crate::element::Element;
use crate::error::{Error, Result};
use crate::matrix::Matrix;
use crate::sx::SxElem;

use super::node::{MxOp, OpContract, OpTag};
use super::Mx;

/// `n`-fold horizontal tiling.
#[derive(Debug, Clone)]
pub struct HorzRepmat {
    pub(crate) n: usize,
}

/// Sum of `n` horizontal blocks. `mapping[k]` is the output nonzero that
/// input nonzero `k` is reduced into.
#[derive(Debug, Clone)]
pub struct HorzRepsum {
    pub(crate) n: usize,
    pub(crate) mapping: Vec<usize>,
}

impl HorzRepmat {
    pub fn n(&self) -> usize {
        self.n
    }
}

impl HorzRepsum {
    pub fn n(&self) -> usize {
        self.n
    }
}

impl Mx {
    /// `[x, x, ..., x]` with `n` copies.
    pub fn repmat(&self, n: usize) -> Result<Mx> {
        if n == 0 {
            return Err(Error::dimension("horzrepmat", "replication count must be positive"));
        }
        if n == 1 {
            return Ok(self.clone());
        }
        if self.is_structural_zero() {
            return Ok(Mx::zeros(self.nrow(), n * self.ncol()));
        }
        Ok(Mx::from_op(
            MxOp::HorzRepmat(HorzRepmat { n }),
            vec![self.clone()],
            self.sparsity().horzrep(n),
        ))
    }

    /// Sum of the `n` equally wide horizontal blocks of `self`.
    pub fn repsum(&self, n: usize) -> Result<Mx> {
        let (sp, mapping) = self.sparsity().horz_block_union(n)?;
        if n == 1 {
            return Ok(self.clone());
        }
        if self.is_structural_zero() {
            return Ok(Mx::zeros(sp.nrow(), sp.ncol()));
        }
        Ok(Mx::from_op(
            MxOp::HorzRepsum(HorzRepsum { n, mapping }),
            vec![self.clone()],
            sp,
        ))
    }
}

/// Reduce the `n` horizontal blocks of `x` with an arbitrary associative and
/// commutative `reduction`.
///
/// The result lives on the union of the block patterns. An entry that is
/// structurally absent from some blocks is reduced with one zero per missing
/// block, so `max` over blocks sees those zeros while `+` is unaffected.
pub fn repsum_with<T, F>(x: &Matrix<T>, n: usize, reduction: F) -> Result<Matrix<T>>
where
    T: Element,
    F: Fn(T, T) -> T,
{
    let (sp, mapping) = x.sparsity().horz_block_union(n)?;
    let mut res = vec![T::zero(); sp.nnz()];
    let mut count = vec![0usize; sp.nnz()];
    reduce_blocks(&mapping, n, x.nonzeros(), &mut res, &mut count, &reduction);
    Matrix::new(sp, res)
}

/// Reduction kernel shared by [`repsum_with`] and the node. `count` must
/// hold `res.len()` words.
fn reduce_blocks<T: Element>(
    mapping: &[usize],
    n: usize,
    x: &[T],
    res: &mut [T],
    count: &mut [usize],
    reduction: &dyn Fn(T, T) -> T,
) {
    count.fill(0);
    for (k, &o) in mapping.iter().enumerate() {
        res[o] = if count[o] == 0 {
            x[k].clone()
        } else {
            reduction(res[o].clone(), x[k].clone())
        };
        count[o] += 1;
    }
    for (r, &c) in res.iter_mut().zip(count.iter()) {
        if c == 0 {
            *r = T::zero();
        }
        for _ in c..n {
            *r = reduction(r.clone(), T::zero());
        }
    }
}

impl HorzRepmat {
    fn eval_gen<T: Clone>(&self, arg: &[&[T]], res: &mut [T]) {
        let nnz = arg[0].len();
        for tile in res.chunks_mut(nnz.max(1)).take(self.n) {
            tile.clone_from_slice(&arg[0][..tile.len()]);
        }
    }
}

impl OpContract for HorzRepmat {
    fn tag(&self) -> OpTag {
        OpTag::HorzRepmat
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
        deps[0].repmat(self.n)
    }

    fn sp_forward(&self, _: &Mx, arg: &[&[Bvec]], res: &mut [Bvec], _: &mut [usize], _: &mut [Bvec]) {
        self.eval_gen(arg, res);
    }

    fn sp_reverse(&self, _: &Mx, arg: &mut [&mut [Bvec]], res: &mut [Bvec], _: &mut [usize], _: &mut [Bvec]) {
        let nnz = arg[0].len();
        if nnz == 0 {
            return;
        }
        for tile in res.chunks_mut(nnz) {
            for (a, r) in arg[0].iter_mut().zip(tile.iter_mut()) {
                *a |= *r;
                *r = 0;
            }
        }
    }

    fn ad_forward(&self, _node: &Mx, fseed: &[Vec<Mx>]) -> Result<Vec<Mx>> {
        fseed.iter().map(|s| s[0].repmat(self.n)).collect()
    }

    fn ad_reverse(&self, _node: &Mx, aseed: &[Mx]) -> Result<Vec<Vec<Mx>>> {
        aseed.iter().map(|s| Ok(vec![s.repsum(self.n)?])).collect()
    }

    fn emit_code(&self, node: &Mx, g: &mut CodeGenerator, arg: &[Register], res: &Register) {
        let nnz = node.dep(0).nnz();
        for t in 0..self.n {
            for k in 0..nnz {
                g.assign(res.at(t * nnz + k), arg[0].at(k));
            }
        }
    }

    fn display(&self, _node: &Mx, args: &[String]) -> String {
        format!("repmat({}, {})", args[0], self.n)
    }
}

impl OpContract for HorzRepsum {
    fn tag(&self) -> OpTag {
        OpTag::HorzRepsum
    }

    fn sz_iw(&self, node: &Mx) -> usize {
        node.nnz()
    }

    fn eval_numeric(&self, _: &Mx, arg: &[&[f64]], res: &mut [f64], iw: &mut [usize], _: &mut [f64]) -> Result<()> {
        reduce_blocks(&self.mapping, self.n, arg[0], res, &mut iw[..res.len()], &|a: f64, b: f64| a + b);
        Ok(())
    }

    fn eval_symbolic(
        &self,
        _: &Mx,
        arg: &[&[SxElem]],
        res: &mut [SxElem],
        iw: &mut [usize],
        _: &mut [SxElem],
    ) -> Result<()> {
        reduce_blocks(&self.mapping, self.n, arg[0], res, &mut iw[..res.len()], &|a: SxElem, b: SxElem| a + b);
        Ok(())
    }

    fn eval_graph(&self, _node: &Mx, deps: &[Mx]) -> Result<Mx> {
        deps[0].repsum(self.n)
    }

    fn sp_forward(&self, _: &Mx, arg: &[&[Bvec]], res: &mut [Bvec], _: &mut [usize], _: &mut [Bvec]) {
        res.fill(0);
        for (k, &o) in self.mapping.iter().enumerate() {
            res[o] |= arg[0][k];
        }
    }

    fn sp_reverse(&self, _: &Mx, arg: &mut [&mut [Bvec]], res: &mut [Bvec], _: &mut [usize], _: &mut [Bvec]) {
        for (k, &o) in self.mapping.iter().enumerate() {
            arg[0][k] |= res[o];
        }
        res.fill(0);
    }

    fn ad_forward(&self, _node: &Mx, fseed: &[Vec<Mx>]) -> Result<Vec<Mx>> {
        fseed.iter().map(|s| s[0].repsum(self.n)).collect()
    }

    fn ad_reverse(&self, _node: &Mx, aseed: &[Mx]) -> Result<Vec<Vec<Mx>>> {
        aseed.iter().map(|s| Ok(vec![s.repmat(self.n)?])).collect()
    }

    fn emit_code(&self, node: &Mx, g: &mut CodeGenerator, arg: &[Register], res: &Register) {
        let mut terms: Vec<Vec<String>> = vec![Vec::new(); node.nnz()];
        for (k, &o) in self.mapping.iter().enumerate() {
            terms[o].push(arg[0].at(k));
        }
        for (o, t) in terms.iter().enumerate() {
            g.assign(res.at(o), sum_of(t));
        }
    }

    fn display(&self, _node: &Mx, args: &[String]) -> String {
        format!("repsum({}, {})", args[0], self.n)
    }
}
