//! Scalar opcodes shared by symbolic expressions and the SX tape.
//!
//! Each opcode represents an elementary operation. The [`eval_forward`] and
//! [`reverse_partials`] functions evaluate / differentiate a single opcode
//! over any [`Element`], so the same table drives numeric evaluation,
//! symbolic re-expression and derivative construction.

use crate::element::Element;

/// Sentinel used in `arg_indices[1]` for unary ops (the second argument slot is unused).
pub const UNUSED: u32 = u32::MAX;

/// Elementary operation codes.
///
/// Binary ops use both argument slots; unary ops use slot 0 only.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OpCode {
    // ── Structural ──
    /// Input variable (leaf node).
    Input,
    /// Scalar constant.
    Const,

    // ── Binary arithmetic ──
    Add,
    Sub,
    Mul,
    Div,

    // ── Unary ──
    Neg,
    Recip,
    Sq,
    Sqrt,
    Exp,
    Ln,
    Sin,
    Cos,
}

impl OpCode {
    /// Whether the op reads two operands.
    #[inline]
    pub fn is_binary(self) -> bool {
        matches!(self, OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div)
    }

    #[inline]
    pub fn is_commutative(self) -> bool {
        matches!(self, OpCode::Add | OpCode::Mul)
    }

    /// Infix symbol for binary ops, function name for unary ops.
    pub fn symbol(self) -> &'static str {
        match self {
            OpCode::Input => "input",
            OpCode::Const => "const",
            OpCode::Add => "+",
            OpCode::Sub => "-",
            OpCode::Mul => "*",
            OpCode::Div => "/",
            OpCode::Neg => "-",
            OpCode::Recip => "1/",
            OpCode::Sq => "sq",
            OpCode::Sqrt => "sqrt",
            OpCode::Exp => "exp",
            OpCode::Ln => "log",
            OpCode::Sin => "sin",
            OpCode::Cos => "cos",
        }
    }
}

/// Evaluate a single opcode in the forward direction.
///
/// For unary ops, `a` is the operand value and `b` is ignored.
#[inline]
pub fn eval_forward<T: Element>(op: OpCode, a: T, b: T) -> T {
    match op {
        OpCode::Input | OpCode::Const => {
            unreachable!("Input/Const should not be re-evaluated via eval_forward")
        }

        OpCode::Add => a + b,
        OpCode::Sub => a - b,
        OpCode::Mul => a * b,
        OpCode::Div => a / b,

        OpCode::Neg => -a,
        OpCode::Recip => a.recip(),
        OpCode::Sq => a.sq(),
        OpCode::Sqrt => a.sqrt(),
        OpCode::Exp => a.exp(),
        OpCode::Ln => a.ln(),
        OpCode::Sin => a.sin(),
        OpCode::Cos => a.cos(),
    }
}

/// Compute partial derivatives for a single opcode.
///
/// Returns `(∂result/∂arg0, ∂result/∂arg1)`.
/// For unary ops the second partial is zero.
///
/// `a`, `b` are the operand values and `r` is the result value.
#[inline]
pub fn reverse_partials<T: Element>(op: OpCode, a: T, b: T, r: T) -> (T, T) {
    let zero = T::zero();
    let one = T::one();
    match op {
        OpCode::Input | OpCode::Const => (zero.clone(), zero),

        OpCode::Add => (one.clone(), one),
        OpCode::Sub => (one.clone(), -one),
        OpCode::Mul => (b, a),
        OpCode::Div => {
            let inv = one / b;
            (inv.clone(), -(a * inv.clone() * inv))
        }

        OpCode::Neg => (-one, zero),
        OpCode::Recip => {
            // d/da (1/a) = -1/a²
            (-(r.clone() * r), zero)
        }
        OpCode::Sq => (T::from_f64(2.0) * a, zero),
        OpCode::Sqrt => (one / (T::from_f64(2.0) * r), zero),
        OpCode::Exp => (r, zero),
        OpCode::Ln => (one / a, zero),
        OpCode::Sin => (a.cos(), zero),
        OpCode::Cos => (-a.sin(), zero),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn partials_match_finite_differences() {
        let h = 1e-6;
        let ops = [
            OpCode::Add,
            OpCode::Sub,
            OpCode::Mul,
            OpCode::Div,
            OpCode::Neg,
            OpCode::Recip,
            OpCode::Sq,
            OpCode::Sqrt,
            OpCode::Exp,
            OpCode::Ln,
            OpCode::Sin,
            OpCode::Cos,
        ];
        let (a, b) = (0.7_f64, 1.3_f64);
        for op in ops {
            let r = eval_forward(op, a, b);
            let (da, db) = reverse_partials(op, a, b, r);
            let fd_a = (eval_forward(op, a + h, b) - eval_forward(op, a - h, b)) / (2.0 * h);
            assert_relative_eq!(da, fd_a, epsilon = 1e-6);
            if op.is_binary() {
                let fd_b = (eval_forward(op, a, b + h) - eval_forward(op, a, b - h)) / (2.0 * h);
                assert_relative_eq!(db, fd_b, epsilon = 1e-6);
            } else {
                assert_eq!(db, 0.0);
            }
        }
    }
}
