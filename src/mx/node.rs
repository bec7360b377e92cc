//! The node contract.
//!
//! Every operator carries a payload implementing [`OpContract`]; the closed
//! [`MxOp`] enumeration maps each variant to that implementation through
//! [`MxOp::contract`]. All contract methods receive the node itself so that
//! operators can read their dependencies' patterns and their own.
//!
//! Buffer conventions shared by every evaluation method:
//! - `arg[k]` holds the nonzeros of dependency `k`, `res` the nonzeros of the
//!   output; both follow the respective [`Sparsity`](crate::Sparsity).
//! - `iw` and `w` are scratch of at least [`OpContract::sz_iw`] and
//!   [`OpContract::sz_w`] words, with no meaning between calls.
//! - `sp_reverse` ORs the output marks into the dependency buffers and then
//!   clears `res`.

use crate::bvec::Bvec;
use crate::codegen::{CodeGenerator, Register};
use crate::error::Result;
use crate::sx::SxElem;

use super::arith::{Arith, Dot, Scale};
use super::leaf::{Constant, Symbolic};
use super::linalg::{Bilin, Mtimes, Transpose};
use super::project::Project;
use super::rank1::Rank1;
use super::repmat::{HorzRepmat, HorzRepsum};
use super::Mx;

/// Stable small-integer operator identity.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OpTag {
    Symbolic = 0,
    Constant = 1,
    Add = 2,
    Sub = 3,
    Scale = 4,
    Mtimes = 5,
    Transpose = 6,
    Bilin = 7,
    Project = 8,
    HorzRepmat = 9,
    HorzRepsum = 10,
    Rank1 = 11,
    Dot = 12,
}

impl OpTag {
    pub fn from_u8(value: u8) -> Option<OpTag> {
        Some(match value {
            0 => OpTag::Symbolic,
            1 => OpTag::Constant,
            2 => OpTag::Add,
            3 => OpTag::Sub,
            4 => OpTag::Scale,
            5 => OpTag::Mtimes,
            6 => OpTag::Transpose,
            7 => OpTag::Bilin,
            8 => OpTag::Project,
            9 => OpTag::HorzRepmat,
            10 => OpTag::HorzRepsum,
            11 => OpTag::Rank1,
            12 => OpTag::Dot,
            _ => return None,
        })
    }
}

/// Operations every graph operator provides.
/// Largest number of dependencies any node kind takes.
pub(crate) const MAX_ARITY: usize = 4;

pub trait OpContract: Send + Sync {
    fn tag(&self) -> OpTag;

    /// Integer scratch words needed by one evaluation.
    fn sz_iw(&self, _node: &Mx) -> usize {
        0
    }

    /// Floating (or bit-vector) scratch words needed by one evaluation.
    fn sz_w(&self, _node: &Mx) -> usize {
        0
    }

    /// Number of leading dependencies whose buffer may double as the output.
    fn n_inplace(&self) -> usize {
        0
    }

    fn eval_numeric(
        &self,
        node: &Mx,
        arg: &[&[f64]],
        res: &mut [f64],
        iw: &mut [usize],
        w: &mut [f64],
    ) -> Result<()>;

    fn eval_symbolic(
        &self,
        node: &Mx,
        arg: &[&[SxElem]],
        res: &mut [SxElem],
        iw: &mut [usize],
        w: &mut [SxElem],
    ) -> Result<()>;

    /// Rebuild this operator on new dependencies.
    fn eval_graph(&self, node: &Mx, deps: &[Mx]) -> Result<Mx>;

    fn sp_forward(&self, node: &Mx, arg: &[&[Bvec]], res: &mut [Bvec], iw: &mut [usize], w: &mut [Bvec]);

    fn sp_reverse(&self, node: &Mx, arg: &mut [&mut [Bvec]], res: &mut [Bvec], iw: &mut [usize], w: &mut [Bvec]);

    /// Tangents of the output, one per direction. `fseed[d][k]` is the seed
    /// of dependency `k` in direction `d`.
    fn ad_forward(&self, node: &Mx, fseed: &[Vec<Mx>]) -> Result<Vec<Mx>>;

    /// Sensitivity contributions, `asens[d][k]` for dependency `k` in
    /// direction `d`. The caller accumulates them.
    fn ad_reverse(&self, node: &Mx, aseed: &[Mx]) -> Result<Vec<Vec<Mx>>>;

    fn emit_code(&self, node: &Mx, g: &mut CodeGenerator, arg: &[Register], res: &Register);

    fn display(&self, node: &Mx, args: &[String]) -> String;
}

/// Closed set of operators.
pub enum MxOp {
    Symbolic(Symbolic),
    Constant(Constant),
    Arith(Arith),
    Scale(Scale),
    Dot(Dot),
    Mtimes(Mtimes),
    Transpose(Transpose),
    Bilin(Bilin),
    Project(Project),
    HorzRepmat(HorzRepmat),
    HorzRepsum(HorzRepsum),
    Rank1(Rank1),
}

impl MxOp {
    /// Dispatch table: the contract implementation of this variant.
    pub fn contract(&self) -> &dyn OpContract {
        match self {
            MxOp::Symbolic(op) => op,
            MxOp::Constant(op) => op,
            MxOp::Arith(op) => op,
            MxOp::Scale(op) => op,
            MxOp::Dot(op) => op,
            MxOp::Mtimes(op) => op,
            MxOp::Transpose(op) => op,
            MxOp::Bilin(op) => op,
            MxOp::Project(op) => op,
            MxOp::HorzRepmat(op) => op,
            MxOp::HorzRepsum(op) => op,
            MxOp::Rank1(op) => op,
        }
    }

    pub fn tag(&self) -> OpTag {
        self.contract().tag()
    }
}

/// Scalar types a node can be evaluated over.
pub(crate) trait NodeEval: crate::element::Element {
    fn eval_node(node: &Mx, arg: &[&[Self]], res: &mut [Self], iw: &mut [usize], w: &mut [Self]) -> Result<()>;
}

impl NodeEval for f64 {
    #[inline]
    fn eval_node(node: &Mx, arg: &[&[f64]], res: &mut [f64], iw: &mut [usize], w: &mut [f64]) -> Result<()> {
        node.op().contract().eval_numeric(node, arg, res, iw, w)
    }
}

impl NodeEval for SxElem {
    #[inline]
    fn eval_node(
        node: &Mx,
        arg: &[&[SxElem]],
        res: &mut [SxElem],
        iw: &mut [usize],
        w: &mut [SxElem],
    ) -> Result<()> {
        node.op().contract().eval_symbolic(node, arg, res, iw, w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_roundtrip_through_u8() {
        for v in 0..=12u8 {
            let tag = OpTag::from_u8(v).unwrap();
            assert_eq!(tag as u8, v);
        }
        assert!(OpTag::from_u8(13).is_none());
    }
}
