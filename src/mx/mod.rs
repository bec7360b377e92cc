//! Matrix expression graphs.
//!
//! An [`Mx`] is a shared handle to an immutable node: an operator payload
//! ([`MxOp`]), the dependency handles and the output sparsity. Builders
//! validate shapes eagerly and return [`Error::DimensionMismatch`] on
//! conflict; nodes are never mutated after construction.
//!
//! [`Error::DimensionMismatch`]: crate::Error::DimensionMismatch

mod ad;
mod arith;
mod leaf;
pub(crate) mod linalg;
pub mod node;
mod project;
mod rank1;
mod repmat;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::sparsity::Sparsity;

pub use ad::{forward, reverse};
pub use arith::{Arith, ArithKind, Dot, Scale};
pub use leaf::{Constant, Symbolic};
pub use linalg::{Bilin, Mtimes, Transpose};
pub use node::{MxOp, OpContract, OpTag};
pub use project::Project;
pub use rank1::Rank1;
pub use repmat::{repsum_with, HorzRepmat, HorzRepsum};

/// The payload behind an [`Mx`] handle.
pub struct MxNode {
    op: MxOp,
    deps: Vec<Mx>,
    sparsity: Sparsity,
}

/// Shared handle to a graph node. Cloning is cheap; identity is by pointer.
#[derive(Clone)]
pub struct Mx(Arc<MxNode>);

impl Mx {
    pub(crate) fn from_op(op: MxOp, deps: Vec<Mx>, sparsity: Sparsity) -> Mx {
        Mx(Arc::new(MxNode { op, deps, sparsity }))
    }

    pub fn op(&self) -> &MxOp {
        &self.0.op
    }

    pub fn tag(&self) -> OpTag {
        self.0.op.tag()
    }

    pub fn deps(&self) -> &[Mx] {
        &self.0.deps
    }

    pub fn n_dep(&self) -> usize {
        self.0.deps.len()
    }

    /// Dependency `k`. Panics when out of range, like slice indexing.
    pub fn dep(&self, k: usize) -> &Mx {
        &self.0.deps[k]
    }

    pub fn sparsity(&self) -> &Sparsity {
        &self.0.sparsity
    }

    pub fn nrow(&self) -> usize {
        self.0.sparsity.nrow()
    }

    pub fn ncol(&self) -> usize {
        self.0.sparsity.ncol()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.0.sparsity.shape()
    }

    pub fn nnz(&self) -> usize {
        self.0.sparsity.nnz()
    }

    pub fn numel(&self) -> usize {
        self.0.sparsity.numel()
    }

    pub(crate) fn key(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn ptr_eq(&self, other: &Mx) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self.0.op, MxOp::Symbolic(_))
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.0.op, MxOp::Constant(_))
    }

    /// A constant without any structural nonzero.
    pub fn is_structural_zero(&self) -> bool {
        self.is_constant() && self.nnz() == 0
    }

    /// Name of a symbolic node.
    pub fn name(&self) -> Option<&str> {
        match &self.0.op {
            MxOp::Symbolic(s) => Some(&s.name),
            _ => None,
        }
    }

    /// Rebuild this node on `deps` (same operator).
    pub fn with_deps(&self, deps: &[Mx]) -> crate::Result<Mx> {
        self.op().contract().eval_graph(self, deps)
    }

    /// Symbolic leaves reachable from `self`, in first-visit order.
    pub fn symbols(&self) -> Vec<Mx> {
        topo_sort(std::slice::from_ref(self))
            .into_iter()
            .filter(Mx::is_symbolic)
            .collect()
    }
}

/// Every node reachable from `roots`, dependencies before dependents.
pub(crate) fn topo_sort(roots: &[Mx]) -> Vec<Mx> {
    let mut order = Vec::new();
    let mut visited: HashSet<usize> = HashSet::new();
    // (node, next dependency to visit)
    let mut stack: Vec<(Mx, usize)> = Vec::new();
    for root in roots {
        if !visited.insert(root.key()) {
            continue;
        }
        stack.push((root.clone(), 0));
        while let Some((node, next)) = stack.pop() {
            if next < node.n_dep() {
                let dep = node.dep(next).clone();
                stack.push((node, next + 1));
                if visited.insert(dep.key()) {
                    stack.push((dep, 0));
                }
            } else {
                order.push(node);
            }
        }
    }
    order
}

/// Position of every node in `order`, keyed by node identity.
pub(crate) fn position_map(order: &[Mx]) -> HashMap<usize, usize> {
    order.iter().enumerate().map(|(i, n)| (n.key(), i)).collect()
}

impl fmt::Display for Mx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let order = topo_sort(std::slice::from_ref(self));
        let mut text: HashMap<usize, String> = HashMap::with_capacity(order.len());
        for node in &order {
            let args: Vec<String> = node
                .deps()
                .iter()
                .map(|d| text.get(&d.key()).cloned().unwrap_or_default())
                .collect();
            text.insert(node.key(), node.op().contract().display(node, &args));
        }
        f.write_str(text.get(&self.key()).map(String::as_str).unwrap_or(""))
    }
}

impl fmt::Debug for Mx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mx({:?}, {}, {})", self.tag(), self.sparsity().dim_string(), self)
    }
}
