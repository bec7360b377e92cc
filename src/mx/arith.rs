//! Elementwise sums, scaling by a scalar and the Frobenius inner product.

use crate::bvec::Bvec;
use crate::codegen::{sum_of, CodeGenerator, Register};
use crate::element::Element;
use crate::error::{Error, Result};
use crate::sparsity::{Sparsity, ABSENT};
use crate::sx::SxElem;

use super::node::{MxOp, OpContract, OpTag};
use super::Mx;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithKind {
    Add,
    Sub,
}

/// `a ± b` on the union pattern. The maps give the output position of every
/// nonzero of each operand.
#[derive(Debug, Clone)]
pub struct Arith {
    pub(crate) kind: ArithKind,
    pub(crate) lhs_map: Vec<usize>,
    pub(crate) rhs_map: Vec<usize>,
}

/// `alpha * x` for a scalar `alpha`; deps are `[alpha, x]`.
#[derive(Debug, Clone)]
pub struct Scale;

/// `⟨a, b⟩ = Σ a_ij b_ij`; `pairs` lists `(a nz, b nz)` for every shared entry.
#[derive(Debug, Clone)]
pub struct Dot {
    pub(crate) pairs: Vec<(usize, usize)>,
}

impl Mx {
    pub fn add(&self, other: &Mx) -> Result<Mx> {
        Mx::arith(ArithKind::Add, self, other)
    }

    pub fn sub(&self, other: &Mx) -> Result<Mx> {
        Mx::arith(ArithKind::Sub, self, other)
    }

    fn arith(kind: ArithKind, a: &Mx, b: &Mx) -> Result<Mx> {
        if a.shape() != b.shape() {
            return Err(Error::dimension(
                if kind == ArithKind::Add { "add" } else { "sub" },
                format!("{} vs {}", a.sparsity().dim_string(), b.sparsity().dim_string()),
            ));
        }
        if b.is_structural_zero() {
            return Ok(a.clone());
        }
        if a.is_structural_zero() {
            return match kind {
                ArithKind::Add => Ok(b.clone()),
                ArithKind::Sub => Ok(b.neg()),
            };
        }
        let (sp, lhs_map, rhs_map) = a.sparsity().union_with_mapping(b.sparsity())?;
        Ok(Mx::from_op(
            MxOp::Arith(Arith {
                kind,
                lhs_map,
                rhs_map,
            }),
            vec![a.clone(), b.clone()],
            sp,
        ))
    }

    pub fn neg(&self) -> Mx {
        if self.is_structural_zero() {
            return self.clone();
        }
        Mx::from_op(
            MxOp::Scale(Scale),
            vec![Mx::scalar(-1.0), self.clone()],
            self.sparsity().clone(),
        )
    }

    /// `alpha * self` for a `1 x 1` `alpha`.
    pub fn scale(&self, alpha: &Mx) -> Result<Mx> {
        if alpha.shape() != (1, 1) {
            return Err(Error::dimension(
                "scale",
                format!("factor must be 1x1, got {}", alpha.sparsity().dim_string()),
            ));
        }
        if alpha.nnz() == 0 || self.is_structural_zero() {
            return Ok(Mx::zeros(self.nrow(), self.ncol()));
        }
        Ok(Mx::from_op(
            MxOp::Scale(Scale),
            vec![alpha.clone(), self.clone()],
            self.sparsity().clone(),
        ))
    }

    /// Frobenius inner product, a dense `1 x 1` result.
    pub fn dot(&self, other: &Mx) -> Result<Mx> {
        if self.shape() != other.shape() {
            return Err(Error::dimension(
                "dot",
                format!(
                    "{} vs {}",
                    self.sparsity().dim_string(),
                    other.sparsity().dim_string()
                ),
            ));
        }
        let map = other.sparsity().projection_map(self.sparsity())?;
        let pairs: Vec<(usize, usize)> = map
            .iter()
            .enumerate()
            .filter(|(_, &kb)| kb != ABSENT)
            .map(|(ka, &kb)| (ka, kb))
            .collect();
        if pairs.is_empty() {
            return Ok(Mx::zeros(1, 1));
        }
        Ok(Mx::from_op(
            MxOp::Dot(Dot { pairs }),
            vec![self.clone(), other.clone()],
            Sparsity::scalar(),
        ))
    }
}

impl Arith {
    fn eval_gen<T: Element>(&self, arg: &[&[T]], res: &mut [T]) {
        res.fill(T::zero());
        for (k, &o) in self.lhs_map.iter().enumerate() {
            res[o] = res[o].clone() + arg[0][k].clone();
        }
        for (k, &o) in self.rhs_map.iter().enumerate() {
            res[o] = match self.kind {
                ArithKind::Add => res[o].clone() + arg[1][k].clone(),
                ArithKind::Sub => res[o].clone() - arg[1][k].clone(),
            };
        }
    }
}

impl OpContract for Arith {
    fn tag(&self) -> OpTag {
        match self.kind {
            ArithKind::Add => OpTag::Add,
            ArithKind::Sub => OpTag::Sub,
        }
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
        Mx::arith(self.kind, &deps[0], &deps[1])
    }

    fn sp_forward(&self, _: &Mx, arg: &[&[Bvec]], res: &mut [Bvec], _: &mut [usize], _: &mut [Bvec]) {
        res.fill(0);
        for (k, &o) in self.lhs_map.iter().enumerate() {
            res[o] |= arg[0][k];
        }
        for (k, &o) in self.rhs_map.iter().enumerate() {
            res[o] |= arg[1][k];
        }
    }

    fn sp_reverse(&self, _: &Mx, arg: &mut [&mut [Bvec]], res: &mut [Bvec], _: &mut [usize], _: &mut [Bvec]) {
        for (k, &o) in self.lhs_map.iter().enumerate() {
            arg[0][k] |= res[o];
        }
        for (k, &o) in self.rhs_map.iter().enumerate() {
            arg[1][k] |= res[o];
        }
        res.fill(0);
    }

    fn ad_forward(&self, _node: &Mx, fseed: &[Vec<Mx>]) -> Result<Vec<Mx>> {
        fseed
            .iter()
            .map(|s| Mx::arith(self.kind, &s[0], &s[1]))
            .collect()
    }

    fn ad_reverse(&self, _node: &Mx, aseed: &[Mx]) -> Result<Vec<Vec<Mx>>> {
        Ok(aseed
            .iter()
            .map(|s| match self.kind {
                ArithKind::Add => vec![s.clone(), s.clone()],
                ArithKind::Sub => vec![s.clone(), s.neg()],
            })
            .collect())
    }

    fn emit_code(&self, node: &Mx, g: &mut CodeGenerator, arg: &[Register], res: &Register) {
        let mut lhs = vec![ABSENT; node.nnz()];
        let mut rhs = vec![ABSENT; node.nnz()];
        for (k, &o) in self.lhs_map.iter().enumerate() {
            lhs[o] = k;
        }
        for (k, &o) in self.rhs_map.iter().enumerate() {
            rhs[o] = k;
        }
        let op = match self.kind {
            ArithKind::Add => "+",
            ArithKind::Sub => "-",
        };
        for o in 0..node.nnz() {
            let expr = match (lhs[o], rhs[o]) {
                (ABSENT, ABSENT) => "0".to_string(),
                (a, ABSENT) => arg[0].at(a),
                (ABSENT, b) => match self.kind {
                    ArithKind::Add => arg[1].at(b),
                    ArithKind::Sub => format!("-{}", arg[1].at(b)),
                },
                (a, b) => format!("{} {} {}", arg[0].at(a), op, arg[1].at(b)),
            };
            g.assign(res.at(o), expr);
        }
    }

    fn display(&self, _node: &Mx, args: &[String]) -> String {
        match self.kind {
            ArithKind::Add => format!("({}+{})", args[0], args[1]),
            ArithKind::Sub => format!("({}-{})", args[0], args[1]),
        }
    }
}

impl Scale {
    fn eval_gen<T: Element>(arg: &[&[T]], res: &mut [T]) {
        let alpha = &arg[0][0];
        for (r, x) in res.iter_mut().zip(arg[1].iter()) {
            *r = alpha.clone() * x.clone();
        }
    }
}

impl OpContract for Scale {
    fn tag(&self) -> OpTag {
        OpTag::Scale
    }

    fn eval_numeric(&self, _: &Mx, arg: &[&[f64]], res: &mut [f64], _: &mut [usize], _: &mut [f64]) -> Result<()> {
        Scale::eval_gen(arg, res);
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
        Scale::eval_gen(arg, res);
        Ok(())
    }

    fn eval_graph(&self, _node: &Mx, deps: &[Mx]) -> Result<Mx> {
        deps[1].scale(&deps[0])
    }

    fn sp_forward(&self, _: &Mx, arg: &[&[Bvec]], res: &mut [Bvec], _: &mut [usize], _: &mut [Bvec]) {
        let alpha = arg[0][0];
        for (r, &x) in res.iter_mut().zip(arg[1].iter()) {
            *r = alpha | x;
        }
    }

    fn sp_reverse(&self, _: &Mx, arg: &mut [&mut [Bvec]], res: &mut [Bvec], _: &mut [usize], _: &mut [Bvec]) {
        let mut all = 0;
        for (a, r) in arg[1].iter_mut().zip(res.iter_mut()) {
            *a |= *r;
            all |= *r;
            *r = 0;
        }
        arg[0][0] |= all;
    }

    fn ad_forward(&self, node: &Mx, fseed: &[Vec<Mx>]) -> Result<Vec<Mx>> {
        let alpha = node.dep(0);
        let x = node.dep(1);
        fseed
            .iter()
            .map(|s| x.scale(&s[0])?.add(&s[1].scale(alpha)?))
            .collect()
    }

    fn ad_reverse(&self, node: &Mx, aseed: &[Mx]) -> Result<Vec<Vec<Mx>>> {
        let alpha = node.dep(0);
        let x = node.dep(1);
        aseed
            .iter()
            .map(|s| Ok(vec![s.dot(x)?, s.scale(alpha)?]))
            .collect()
    }

    fn emit_code(&self, node: &Mx, g: &mut CodeGenerator, arg: &[Register], res: &Register) {
        for k in 0..node.nnz() {
            g.assign(res.at(k), format!("{} * {}", arg[0].at(0), arg[1].at(k)));
        }
    }

    fn display(&self, _node: &Mx, args: &[String]) -> String {
        format!("({}*{})", args[0], args[1])
    }
}

impl Dot {
    fn eval_gen<T: Element>(&self, arg: &[&[T]], res: &mut [T]) {
        let mut acc = T::zero();
        for &(ka, kb) in &self.pairs {
            acc = acc + arg[0][ka].clone() * arg[1][kb].clone();
        }
        res[0] = acc;
    }
}

impl OpContract for Dot {
    fn tag(&self) -> OpTag {
        OpTag::Dot
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
        deps[0].dot(&deps[1])
    }

    fn sp_forward(&self, _: &Mx, arg: &[&[Bvec]], res: &mut [Bvec], _: &mut [usize], _: &mut [Bvec]) {
        res[0] = self
            .pairs
            .iter()
            .fold(0, |acc, &(ka, kb)| acc | arg[0][ka] | arg[1][kb]);
    }

    fn sp_reverse(&self, _: &Mx, arg: &mut [&mut [Bvec]], res: &mut [Bvec], _: &mut [usize], _: &mut [Bvec]) {
        let s = res[0];
        for &(ka, kb) in &self.pairs {
            arg[0][ka] |= s;
            arg[1][kb] |= s;
        }
        res[0] = 0;
    }

    fn ad_forward(&self, node: &Mx, fseed: &[Vec<Mx>]) -> Result<Vec<Mx>> {
        let (a, b) = (node.dep(0), node.dep(1));
        fseed
            .iter()
            .map(|s| s[0].dot(b)?.add(&a.dot(&s[1])?))
            .collect()
    }

    fn ad_reverse(&self, node: &Mx, aseed: &[Mx]) -> Result<Vec<Vec<Mx>>> {
        let (a, b) = (node.dep(0), node.dep(1));
        aseed
            .iter()
            .map(|s| Ok(vec![b.scale(s)?, a.scale(s)?]))
            .collect()
    }

    fn emit_code(&self, _node: &Mx, g: &mut CodeGenerator, arg: &[Register], res: &Register) {
        let terms: Vec<String> = self
            .pairs
            .iter()
            .map(|&(ka, kb)| format!("{} * {}", arg[0].at(ka), arg[1].at(kb)))
            .collect();
        g.assign(res.at(0), sum_of(&terms));
    }

    fn display(&self, _node: &Mx, args: &[String]) -> String {
        format!("dot({}, {})", args[0], args[1])
    }
}
