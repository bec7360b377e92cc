use crate::bvec::Bvec;
use crate::codegen::{CodeGenerator, Register};
use crate::element::Element;
use crate::error::Result;
use crate::sparsity::{Sparsity, ABSENT};
use crate::sx::SxElem;

use super::node::{MxOp, OpContract, OpTag};
use super::Mx;

/// Re-pattern onto a target sparsity. `mapping[k]` is the source nonzero of
/// target nonzero `k`, or [`ABSENT`] for entries that read as zero.
#[derive(Debug, Clone)]
pub struct Project {
    pub(crate) mapping: Vec<usize>,
}

impl Mx {
    /// Same matrix on `target`. Entries dropped by `target` are lost;
    /// entries added by it are structural zeros made explicit.
    pub fn project(&self, target: &Sparsity) -> Result<Mx> {
        let mapping = self.sparsity().projection_map(target)?;
        if self.sparsity() == target {
            return Ok(self.clone());
        }
        Ok(Mx::from_op(
            MxOp::Project(Project { mapping }),
            vec![self.clone()],
            target.clone(),
        ))
    }
}

impl Project {
    fn eval_gen<T: Element>(&self, arg: &[&[T]], res: &mut [T]) {
        for (r, &k) in res.iter_mut().zip(&self.mapping) {
            *r = if k == ABSENT { T::zero() } else { arg[0][k].clone() };
        }
    }
}

impl OpContract for Project {
    fn tag(&self) -> OpTag {
        OpTag::Project
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

    fn eval_graph(&self, node: &Mx, deps: &[Mx]) -> Result<Mx> {
        deps[0].project(node.sparsity())
    }

    fn sp_forward(&self, _: &Mx, arg: &[&[Bvec]], res: &mut [Bvec], _: &mut [usize], _: &mut [Bvec]) {
        for (r, &k) in res.iter_mut().zip(&self.mapping) {
            *r = if k == ABSENT { 0 } else { arg[0][k] };
        }
    }

    fn sp_reverse(&self, _: &Mx, arg: &mut [&mut [Bvec]], res: &mut [Bvec], _: &mut [usize], _: &mut [Bvec]) {
        for (r, &k) in res.iter_mut().zip(&self.mapping) {
            if k != ABSENT {
                arg[0][k] |= *r;
            }
            *r = 0;
        }
    }

    fn ad_forward(&self, node: &Mx, fseed: &[Vec<Mx>]) -> Result<Vec<Mx>> {
        fseed.iter().map(|s| s[0].project(node.sparsity())).collect()
    }

    fn ad_reverse(&self, node: &Mx, aseed: &[Mx]) -> Result<Vec<Vec<Mx>>> {
        let src = node.dep(0).sparsity();
        aseed
            .iter()
            .map(|s| Ok(vec![s.project(node.sparsity())?.project(src)?]))
            .collect()
    }

    fn emit_code(&self, _node: &Mx, g: &mut CodeGenerator, arg: &[Register], res: &Register) {
        for (k, &src) in self.mapping.iter().enumerate() {
            if src == ABSENT {
                g.assign(res.at(k), "0");
            } else {
                g.assign(res.at(k), arg[0].at(src));
            }
        }
    }

    fn display(&self, node: &Mx, args: &[String]) -> String {
        format!("project({}, {})", args[0], node.sparsity())
    }
}
