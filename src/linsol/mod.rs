//! Sparse linear solvers behind a plugin interface.
//!
//! A solver plugin implements [`LinsolInternal`]; its per-instance state
//! lives in a [`LinsolMemory`] that the plugin fills during
//! [`reset`](LinsolInternal::reset). The [`Linsol`] front end owns one
//! plugin instance and one memory and enforces the call order:
//!
//! ```text
//! Uninitialized --factorize--> Factorized --solve--> Solved --solve--> Solved
//!       ^                           |                   |
//!       +-------- reset (pattern changed) --------------+
//! ```
//!
//! A reset with the pattern already in place keeps the memory untouched.

mod symbolic_qr;

use std::any::Any;
use std::fmt;

use log::{debug, trace};

use crate::error::{Error, Result};
use crate::matrix::SxMatrix;
use crate::options::Options;
use crate::plugin::PluginRegistry;
use crate::sparsity::Sparsity;

pub use symbolic_qr::{SymbolicQr, SYMBOLIC_QR_OPTIONS};

/// Where a solver instance is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinsolState {
    /// No valid factors (no pattern yet, or the pattern just changed).
    Uninitialized,
    /// Factors stored, no solve performed since.
    Factorized,
    /// At least one solve performed with the stored factors.
    Solved,
}

/// Exclusive per-instance memory of a solver.
pub struct LinsolMemory {
    pub(crate) sparsity: Option<Sparsity>,
    pub(crate) state: LinsolState,
    /// Plugin-specific payload, set by `reset`.
    pub(crate) data: Option<Box<dyn Any + Send>>,
}

impl Default for LinsolMemory {
    fn default() -> Self {
        LinsolMemory {
            sparsity: None,
            state: LinsolState::Uninitialized,
            data: None,
        }
    }
}

impl LinsolMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sparsity(&self) -> Option<&Sparsity> {
        self.sparsity.as_ref()
    }

    pub fn state(&self) -> LinsolState {
        self.state
    }

    pub(crate) fn data<T: 'static>(&self) -> Result<&T> {
        self.data
            .as_ref()
            .and_then(|d| d.downcast_ref::<T>())
            .ok_or_else(|| Error::InvalidState {
                detail: "solver memory has not been reset".to_string(),
            })
    }

    pub(crate) fn data_mut<T: 'static>(&mut self) -> Result<&mut T> {
        self.data
            .as_mut()
            .and_then(|d| d.downcast_mut::<T>())
            .ok_or_else(|| Error::InvalidState {
                detail: "solver memory has not been reset".to_string(),
            })
    }
}

impl fmt::Debug for LinsolMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinsolMemory")
            .field("sparsity", &self.sparsity)
            .field("state", &self.state)
            .finish()
    }
}

/// Interface every linear-solver plugin implements.
pub trait LinsolInternal: Send + Sync {
    fn name(&self) -> &str;

    /// Apply options. Unknown keys must fail with [`Error::UnknownOption`].
    fn init(&mut self, options: &Options) -> Result<()>;

    /// Rebuild `mem` for a new coefficient pattern.
    fn reset(&self, mem: &mut LinsolMemory, sparsity: &Sparsity) -> Result<()>;

    /// Factorize the matrix with nonzeros `values` on the current pattern.
    /// On failure the previously stored factors stay valid.
    fn factorize(&self, mem: &mut LinsolMemory, values: &[f64]) -> Result<()>;

    /// Overwrite the `nrhs` right-hand sides stored contiguously in `rhs`
    /// with the solutions of `A x = b` (or `Aᵀ x = b`).
    fn solve(&self, mem: &mut LinsolMemory, rhs: &mut [f64], nrhs: usize, transposed: bool) -> Result<()>;

    /// Solve a symbolic system on the current pattern.
    fn eval_symbolic(&self, _mem: &LinsolMemory, _a: &SxMatrix, _b: &SxMatrix, _transposed: bool) -> Result<SxMatrix> {
        Err(Error::InvalidState {
            detail: format!("'{}' cannot solve symbolic systems", self.name()),
        })
    }

    /// Source emitted at reset time, when the plugin supports it and it was requested.
    fn generated_code<'m>(&self, _mem: &'m LinsolMemory) -> Option<&'m str> {
        None
    }
}

/// Registry of linear-solver plugins.
pub type LinsolRegistry = PluginRegistry<Box<dyn LinsolInternal>>;

impl PluginRegistry<Box<dyn LinsolInternal>> {
    /// Registry holding every solver shipped with this crate.
    pub fn with_builtins() -> Self {
        let mut registry = PluginRegistry::new();
        registry.load(symbolic_qr::register);
        registry
    }
}

/// Front end over one solver instance and its memory.
pub struct Linsol {
    name: String,
    plugin: Box<dyn LinsolInternal>,
    mem: LinsolMemory,
}

impl Linsol {
    /// Create the solver `plugin` from `registry` with `options`.
    pub fn new(registry: &LinsolRegistry, plugin: &str, options: &Options) -> Result<Linsol> {
        let instance = registry.create(plugin, options)?;
        Ok(Linsol {
            name: plugin.to_string(),
            plugin: instance,
            mem: LinsolMemory::new(),
        })
    }

    pub fn plugin_name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> LinsolState {
        self.mem.state
    }

    pub fn sparsity(&self) -> Option<&Sparsity> {
        self.mem.sparsity.as_ref()
    }

    /// Set the coefficient pattern. A pattern equal to the current one is a no-op.
    pub fn reset(&mut self, sparsity: &Sparsity) -> Result<()> {
        if self.mem.sparsity.as_ref() == Some(sparsity) {
            trace!("{}: reset with unchanged pattern {}", self.name, sparsity);
            return Ok(());
        }
        debug!("{}: reset to pattern {}", self.name, sparsity);
        self.mem.sparsity = None;
        self.mem.data = None;
        self.mem.state = LinsolState::Uninitialized;
        self.plugin.reset(&mut self.mem, sparsity)?;
        self.mem.sparsity = Some(sparsity.clone());
        Ok(())
    }

    /// [`reset`](Self::reset) from a compressed descriptor
    /// `[nrow, ncol, colind.., row..]`.
    pub fn reset_compressed(&mut self, descriptor: &[usize]) -> Result<()> {
        let sp = Sparsity::compressed(descriptor)?;
        self.reset(&sp)
    }

    fn pattern(&self, op: &str) -> Result<&Sparsity> {
        self.mem.sparsity.as_ref().ok_or_else(|| Error::InvalidState {
            detail: format!("{}: {} before reset", self.name, op),
        })
    }

    pub fn factorize(&mut self, values: &[f64]) -> Result<()> {
        let nnz = self.pattern("factorize")?.nnz();
        if values.len() != nnz {
            return Err(Error::dimension(
                "factorize",
                format!("{} values for a pattern with {} nonzeros", values.len(), nnz),
            ));
        }
        self.plugin.factorize(&mut self.mem, values)?;
        self.mem.state = LinsolState::Factorized;
        debug!("{}: factorized", self.name);
        Ok(())
    }

    pub fn solve(&mut self, rhs: &mut [f64], nrhs: usize, transposed: bool) -> Result<()> {
        let nrow = self.pattern("solve")?.nrow();
        if self.mem.state == LinsolState::Uninitialized {
            return Err(Error::InvalidState {
                detail: format!("{}: solve before factorize", self.name),
            });
        }
        if rhs.len() != nrow * nrhs {
            return Err(Error::dimension(
                "solve",
                format!("{} values for {} right-hand sides of length {}", rhs.len(), nrhs, nrow),
            ));
        }
        self.plugin.solve(&mut self.mem, rhs, nrhs, transposed)?;
        self.mem.state = LinsolState::Solved;
        Ok(())
    }

    /// Solve `A x = b` (or `Aᵀ x = b`) with symbolic entries on the current pattern.
    pub fn solve_symbolic(&self, a: &SxMatrix, b: &SxMatrix, transposed: bool) -> Result<SxMatrix> {
        let sp = self.pattern("solve_symbolic")?;
        if a.shape() != sp.shape() || b.nrow() != sp.nrow() {
            return Err(Error::dimension(
                "solve_symbolic",
                format!(
                    "A {} and b {} against pattern {}",
                    a.sparsity().dim_string(),
                    b.sparsity().dim_string(),
                    sp.dim_string()
                ),
            ));
        }
        self.plugin.eval_symbolic(&self.mem, a, b, transposed)
    }

    pub fn generated_code(&self) -> Option<&str> {
        self.plugin.generated_code(&self.mem)
    }
}

impl fmt::Debug for Linsol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Linsol")
            .field("plugin", &self.name)
            .field("memory", &self.mem)
            .finish()
    }
}
