use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Neg, Sub};

use num_traits::{One, Zero};

use crate::sx::SxElem;

/// Scalar types that node kernels can be evaluated over.
///
/// Implemented by `f64` for numeric evaluation and by [`SxElem`] for symbolic
/// evaluation, so that every kernel is written once and instantiated twice.
pub trait Element:
    Clone
    + Debug
    + Send
    + Sync
    + Zero
    + One
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + 'static
{
    fn from_f64(value: f64) -> Self;

    /// True only when the value is known to be exactly zero.
    ///
    /// For symbolic elements this is a structural test: an expression that
    /// merely evaluates to zero is not recognised.
    fn is_zero_constant(&self) -> bool;

    fn sqrt(&self) -> Self;
    fn exp(&self) -> Self;
    fn ln(&self) -> Self;
    fn sin(&self) -> Self;
    fn cos(&self) -> Self;

    #[inline]
    fn recip(&self) -> Self {
        Self::one() / self.clone()
    }

    #[inline]
    fn sq(&self) -> Self {
        self.clone() * self.clone()
    }
}

impl Element for f64 {
    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }

    #[inline]
    fn is_zero_constant(&self) -> bool {
        *self == 0.0
    }

    #[inline]
    fn sqrt(&self) -> Self {
        f64::sqrt(*self)
    }

    #[inline]
    fn exp(&self) -> Self {
        f64::exp(*self)
    }

    #[inline]
    fn ln(&self) -> Self {
        f64::ln(*self)
    }

    #[inline]
    fn sin(&self) -> Self {
        f64::sin(*self)
    }

    #[inline]
    fn cos(&self) -> Self {
        f64::cos(*self)
    }

    #[inline]
    fn recip(&self) -> Self {
        f64::recip(*self)
    }
}

impl Element for SxElem {
    fn from_f64(value: f64) -> Self {
        SxElem::constant(value)
    }

    fn is_zero_constant(&self) -> bool {
        self.constant_value() == Some(0.0)
    }

    fn sqrt(&self) -> Self {
        SxElem::unary(crate::opcode::OpCode::Sqrt, self.clone())
    }

    fn exp(&self) -> Self {
        SxElem::unary(crate::opcode::OpCode::Exp, self.clone())
    }

    fn ln(&self) -> Self {
        SxElem::unary(crate::opcode::OpCode::Ln, self.clone())
    }

    fn sin(&self) -> Self {
        SxElem::unary(crate::opcode::OpCode::Sin, self.clone())
    }

    fn cos(&self) -> Self {
        SxElem::unary(crate::opcode::OpCode::Cos, self.clone())
    }

    fn recip(&self) -> Self {
        SxElem::unary(crate::opcode::OpCode::Recip, self.clone())
    }

    fn sq(&self) -> Self {
        SxElem::unary(crate::opcode::OpCode::Sq, self.clone())
    }
}
