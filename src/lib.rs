//! Symbolic expression graphs with sparsity propagation, algorithmic
//! differentiation and compiled evaluation.
//!
//! Matrix-valued graphs ([`Mx`]) and scalar expressions ([`SxElem`]) are
//! compiled into [`Function`]s that evaluate numerically, symbolically or
//! on dependency bit-vectors, and that produce their own forward, reverse
//! and Jacobian Functions. Linear solvers are plugins created from a
//! [`PluginRegistry`].

pub mod bvec;
pub mod codegen;
pub mod element;
pub mod error;
pub mod function;
pub mod linsol;
pub mod matrix;
pub mod memory;
pub mod mx;
pub mod opcode;
pub mod options;
pub mod plugin;
pub mod sparsity;
pub mod sx;

pub use bvec::Bvec;
pub use codegen::CodeGenerator;
pub use element::Element;
pub use error::{Error, Result};
pub use function::{Function, SxTape};
pub use linsol::{Linsol, LinsolInternal, LinsolMemory, LinsolRegistry, LinsolState, SymbolicQr};
pub use matrix::{DMatrix, Matrix, SxMatrix};
pub use memory::Memory;
pub use mx::Mx;
pub use opcode::OpCode;
pub use options::{OptionKind, OptionSpec, OptionValue, Options};
pub use plugin::{Plugin, PluginRegistry};
pub use sparsity::{invert_permutation, Btf, Sparsity};
pub use sx::SxElem;
