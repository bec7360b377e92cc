//! Scalar symbolic expressions.
//!
//! An [`SxElem`] is an immutable, reference-counted expression tree over the
//! opcodes of [`crate::opcode`]. Shared subexpressions are shared by pointer;
//! two elements are the same expression only if they are the same node (or
//! equal constants). Construction applies the same local simplifications the
//! SX tape applies when recording, so trivially zero results stay
//! recognisable as constant zeros and sparsity survives symbolic evaluation.

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use num_traits::{One, Zero};

use crate::opcode::{eval_forward, OpCode};

static NEXT_SYMBOL: AtomicU64 = AtomicU64::new(0);

pub(crate) enum SxNode {
    Const(f64),
    Symbol { name: String, id: u64 },
    Unary { op: OpCode, arg: SxElem },
    Binary { op: OpCode, lhs: SxElem, rhs: SxElem },
}

/// Scalar symbolic expression.
#[derive(Clone)]
pub struct SxElem(Arc<SxNode>);

impl SxElem {
    /// Fresh symbol. Every call creates a distinct variable, even for equal names.
    pub fn sym(name: impl Into<String>) -> Self {
        let id = NEXT_SYMBOL.fetch_add(1, Ordering::Relaxed);
        SxElem(Arc::new(SxNode::Symbol {
            name: name.into(),
            id,
        }))
    }

    pub fn constant(value: f64) -> Self {
        SxElem(Arc::new(SxNode::Const(value)))
    }

    pub(crate) fn node(&self) -> &SxNode {
        &self.0
    }

    /// Address of the shared node, usable as a map key while the element is alive.
    #[inline]
    pub(crate) fn key(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    #[inline]
    pub fn ptr_eq(&self, other: &SxElem) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn op(&self) -> OpCode {
        match &*self.0 {
            SxNode::Const(_) => OpCode::Const,
            SxNode::Symbol { .. } => OpCode::Input,
            SxNode::Unary { op, .. } | SxNode::Binary { op, .. } => *op,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(&*self.0, SxNode::Const(_))
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(&*self.0, SxNode::Symbol { .. })
    }

    pub fn constant_value(&self) -> Option<f64> {
        match &*self.0 {
            SxNode::Const(v) => Some(*v),
            _ => None,
        }
    }

    /// Symbol name, for symbolic leaves.
    pub fn name(&self) -> Option<&str> {
        match &*self.0 {
            SxNode::Symbol { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Operands of an operation node (empty for leaves).
    pub fn operands(&self) -> Vec<SxElem> {
        match &*self.0 {
            SxNode::Const(_) | SxNode::Symbol { .. } => Vec::new(),
            SxNode::Unary { arg, .. } => vec![arg.clone()],
            SxNode::Binary { lhs, rhs, .. } => vec![lhs.clone(), rhs.clone()],
        }
    }

    /// Apply a unary op, folding constants and collapsing double negation.
    pub fn unary(op: OpCode, arg: SxElem) -> Self {
        debug_assert!(!op.is_binary() && !matches!(op, OpCode::Input | OpCode::Const));
        if let Some(v) = arg.constant_value() {
            return SxElem::constant(eval_forward(op, v, 0.0));
        }
        if op == OpCode::Neg {
            if let SxNode::Unary {
                op: OpCode::Neg,
                arg: inner,
            } = &*arg.0
            {
                return inner.clone();
            }
        }
        SxElem(Arc::new(SxNode::Unary { op, arg }))
    }

    /// Apply a binary op with constant folding and identity/absorption rules.
    pub fn binary(op: OpCode, lhs: SxElem, rhs: SxElem) -> Self {
        debug_assert!(op.is_binary());
        let a = lhs.constant_value();
        let b = rhs.constant_value();
        if let (Some(a), Some(b)) = (a, b) {
            return SxElem::constant(eval_forward(op, a, b));
        }
        match op {
            OpCode::Add => {
                if b == Some(0.0) {
                    return lhs;
                }
                if a == Some(0.0) {
                    return rhs;
                }
            }
            OpCode::Sub => {
                if b == Some(0.0) {
                    return lhs;
                }
                if a == Some(0.0) {
                    return SxElem::unary(OpCode::Neg, rhs);
                }
                if lhs.ptr_eq(&rhs) {
                    return SxElem::constant(0.0);
                }
            }
            OpCode::Mul => {
                if a == Some(0.0) || b == Some(0.0) {
                    return SxElem::constant(0.0);
                }
                if b == Some(1.0) {
                    return lhs;
                }
                if a == Some(1.0) {
                    return rhs;
                }
                if b == Some(-1.0) {
                    return SxElem::unary(OpCode::Neg, lhs);
                }
                if a == Some(-1.0) {
                    return SxElem::unary(OpCode::Neg, rhs);
                }
            }
            OpCode::Div => {
                if a == Some(0.0) {
                    return SxElem::constant(0.0);
                }
                if b == Some(1.0) {
                    return lhs;
                }
            }
            _ => {}
        }
        SxElem(Arc::new(SxNode::Binary { op, lhs, rhs }))
    }

    /// Evaluate numerically, reading symbol values through `lookup`.
    ///
    /// Intended for small expressions and tests; compiled evaluation goes
    /// through [`crate::Function`].
    pub fn evaluate(&self, lookup: &dyn Fn(&SxElem) -> Option<f64>) -> Option<f64> {
        match &*self.0 {
            SxNode::Const(v) => Some(*v),
            SxNode::Symbol { .. } => lookup(self),
            SxNode::Unary { op, arg } => Some(eval_forward(*op, arg.evaluate(lookup)?, 0.0)),
            SxNode::Binary { op, lhs, rhs } => Some(eval_forward(
                *op,
                lhs.evaluate(lookup)?,
                rhs.evaluate(lookup)?,
            )),
        }
    }
}

impl PartialEq for SxElem {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        match (self.constant_value(), other.constant_value()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl From<f64> for SxElem {
    fn from(value: f64) -> Self {
        SxElem::constant(value)
    }
}

impl Add for SxElem {
    type Output = SxElem;
    fn add(self, rhs: SxElem) -> SxElem {
        SxElem::binary(OpCode::Add, self, rhs)
    }
}

impl Sub for SxElem {
    type Output = SxElem;
    fn sub(self, rhs: SxElem) -> SxElem {
        SxElem::binary(OpCode::Sub, self, rhs)
    }
}

impl Mul for SxElem {
    type Output = SxElem;
    fn mul(self, rhs: SxElem) -> SxElem {
        SxElem::binary(OpCode::Mul, self, rhs)
    }
}

impl Div for SxElem {
    type Output = SxElem;
    fn div(self, rhs: SxElem) -> SxElem {
        SxElem::binary(OpCode::Div, self, rhs)
    }
}

impl Neg for SxElem {
    type Output = SxElem;
    fn neg(self) -> SxElem {
        SxElem::unary(OpCode::Neg, self)
    }
}

impl Zero for SxElem {
    fn zero() -> Self {
        SxElem::constant(0.0)
    }

    fn is_zero(&self) -> bool {
        self.constant_value() == Some(0.0)
    }
}

impl One for SxElem {
    fn one() -> Self {
        SxElem::constant(1.0)
    }
}

impl fmt::Display for SxElem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            SxNode::Const(v) => write!(f, "{}", v),
            SxNode::Symbol { name, .. } => write!(f, "{}", name),
            SxNode::Unary { op: OpCode::Neg, arg } => write!(f, "(-{})", arg),
            SxNode::Unary { op: OpCode::Recip, arg } => write!(f, "(1/{})", arg),
            SxNode::Unary { op, arg } => write!(f, "{}({})", op.symbol(), arg),
            SxNode::Binary { op, lhs, rhs } => write!(f, "({}{}{})", lhs, op.symbol(), rhs),
        }
    }
}

impl fmt::Debug for SxElem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            SxNode::Symbol { name, id } => write!(f, "SxElem({}#{})", name, id),
            _ => write!(f, "SxElem({})", self),
        }
    }
}
