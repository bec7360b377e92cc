use crate::bvec::Bvec;
use crate::codegen::{CodeGenerator, Register};
use crate::error::{Error, Result};
use crate::matrix::DMatrix;
use crate::sparsity::Sparsity;
use crate::sx::SxElem;

use super::node::{MxOp, OpContract, OpTag};
use super::Mx;

/// Free symbol. Gets its value from a Function input.
#[derive(Debug, Clone)]
pub struct Symbolic {
    pub(crate) name: String,
}

/// Numeric constant stored by nonzeros.
#[derive(Debug, Clone)]
pub struct Constant {
    pub(crate) values: Vec<f64>,
}

impl Constant {
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

impl Mx {
    /// Fresh symbolic matrix with the given pattern.
    pub fn sym(name: impl Into<String>, sparsity: Sparsity) -> Mx {
        Mx::from_op(
            MxOp::Symbolic(Symbolic { name: name.into() }),
            Vec::new(),
            sparsity,
        )
    }

    pub fn sym_dense(name: impl Into<String>, nrow: usize, ncol: usize) -> Mx {
        Mx::sym(name, Sparsity::dense(nrow, ncol))
    }

    pub fn constant(value: &DMatrix) -> Mx {
        Mx::from_op(
            MxOp::Constant(Constant {
                values: value.nonzeros().to_vec(),
            }),
            Vec::new(),
            value.sparsity().clone(),
        )
    }

    pub fn scalar(value: f64) -> Mx {
        Mx::from_op(
            MxOp::Constant(Constant {
                values: vec![value],
            }),
            Vec::new(),
            Sparsity::scalar(),
        )
    }

    /// Structurally empty `nrow x ncol` constant.
    pub fn zeros(nrow: usize, ncol: usize) -> Mx {
        Mx::from_op(
            MxOp::Constant(Constant { values: Vec::new() }),
            Vec::new(),
            Sparsity::empty(nrow, ncol),
        )
    }
}

fn unevaluable(node: &Mx) -> Error {
    Error::InvalidState {
        detail: format!(
            "symbol '{}' reached evaluation without a value",
            node.name().unwrap_or("?")
        ),
    }
}

impl OpContract for Symbolic {
    fn tag(&self) -> OpTag {
        OpTag::Symbolic
    }

    fn eval_numeric(&self, node: &Mx, _: &[&[f64]], _: &mut [f64], _: &mut [usize], _: &mut [f64]) -> Result<()> {
        Err(unevaluable(node))
    }

    fn eval_symbolic(
        &self,
        node: &Mx,
        _: &[&[SxElem]],
        _: &mut [SxElem],
        _: &mut [usize],
        _: &mut [SxElem],
    ) -> Result<()> {
        Err(unevaluable(node))
    }

    fn eval_graph(&self, node: &Mx, _deps: &[Mx]) -> Result<Mx> {
        Ok(node.clone())
    }

    // Symbols are seeded by the caller of a sweep; the node itself contributes nothing.
    fn sp_forward(&self, _: &Mx, _: &[&[Bvec]], _: &mut [Bvec], _: &mut [usize], _: &mut [Bvec]) {}

    fn sp_reverse(&self, _: &Mx, _: &mut [&mut [Bvec]], _: &mut [Bvec], _: &mut [usize], _: &mut [Bvec]) {}

    fn ad_forward(&self, node: &Mx, fseed: &[Vec<Mx>]) -> Result<Vec<Mx>> {
        Ok(fseed.iter().map(|_| Mx::zeros(node.nrow(), node.ncol())).collect())
    }

    fn ad_reverse(&self, _node: &Mx, aseed: &[Mx]) -> Result<Vec<Vec<Mx>>> {
        Ok(aseed.iter().map(|_| Vec::new()).collect())
    }

    fn emit_code(&self, _node: &Mx, g: &mut CodeGenerator, _arg: &[Register], _res: &Register) {
        g.comment(format!("input {}", self.name));
    }

    fn display(&self, _node: &Mx, _args: &[String]) -> String {
        self.name.clone()
    }
}

impl OpContract for Constant {
    fn tag(&self) -> OpTag {
        OpTag::Constant
    }

    fn eval_numeric(&self, _: &Mx, _: &[&[f64]], res: &mut [f64], _: &mut [usize], _: &mut [f64]) -> Result<()> {
        res.copy_from_slice(&self.values);
        Ok(())
    }

    fn eval_symbolic(
        &self,
        _: &Mx,
        _: &[&[SxElem]],
        res: &mut [SxElem],
        _: &mut [usize],
        _: &mut [SxElem],
    ) -> Result<()> {
        for (r, &v) in res.iter_mut().zip(&self.values) {
            *r = SxElem::constant(v);
        }
        Ok(())
    }

    fn eval_graph(&self, node: &Mx, _deps: &[Mx]) -> Result<Mx> {
        Ok(node.clone())
    }

    fn sp_forward(&self, _: &Mx, _: &[&[Bvec]], res: &mut [Bvec], _: &mut [usize], _: &mut [Bvec]) {
        res.fill(0);
    }

    fn sp_reverse(&self, _: &Mx, _: &mut [&mut [Bvec]], res: &mut [Bvec], _: &mut [usize], _: &mut [Bvec]) {
        res.fill(0);
    }

    fn ad_forward(&self, node: &Mx, fseed: &[Vec<Mx>]) -> Result<Vec<Mx>> {
        Ok(fseed.iter().map(|_| Mx::zeros(node.nrow(), node.ncol())).collect())
    }

    fn ad_reverse(&self, _node: &Mx, aseed: &[Mx]) -> Result<Vec<Vec<Mx>>> {
        Ok(aseed.iter().map(|_| Vec::new()).collect())
    }

    fn emit_code(&self, _node: &Mx, g: &mut CodeGenerator, _arg: &[Register], res: &Register) {
        for (k, &v) in self.values.iter().enumerate() {
            g.assign(res.at(k), CodeGenerator::constant(v));
        }
    }

    fn display(&self, node: &Mx, _args: &[String]) -> String {
        match (node.sparsity().is_scalar(), self.values.as_slice()) {
            (true, [v]) => format!("{}", v),
            _ => format!("const({})", node.sparsity()),
        }
    }
}
