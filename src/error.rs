//! Error types for numbat.

use thiserror::Error;

/// Result type alias using numbat's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building, compiling or evaluating expression graphs.
///
/// Structural problems (patterns, shapes, options) are reported when the
/// offending object is built. Numeric problems are reported by the call that
/// encounters them and never invalidate previously stored results.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A compressed-column descriptor is inconsistent.
    #[error("malformed sparsity pattern: {reason}")]
    MalformedPattern {
        /// What is wrong with the descriptor.
        reason: String,
    },

    /// Operand shapes are incompatible with an operator's structural rule.
    #[error("dimension mismatch in {op}: {detail}")]
    DimensionMismatch {
        /// The operation that rejected its operands.
        op: &'static str,
        /// Shapes involved.
        detail: String,
    },

    /// A factorization cannot proceed.
    #[error("singular matrix: {reason}")]
    SingularMatrix {
        /// Structural or numeric cause.
        reason: String,
    },

    /// An option key is not recognised by its consumer.
    #[error("unknown option '{name}' for {owner}")]
    UnknownOption {
        /// Consumer that validated the options.
        owner: String,
        /// Offending key.
        name: String,
    },

    /// An option key is recognised but its value or the key itself is not supported.
    #[error("unsupported option '{name}': {reason}")]
    UnsupportedOption {
        /// Offending key.
        name: String,
        /// Why it is rejected.
        reason: String,
    },

    /// Registry lookup miss.
    #[error("no plugin named '{name}' is registered")]
    PluginNotFound {
        /// Requested plugin name.
        name: String,
    },

    /// Forward and reverse derivative shapes disagree.
    #[error("adjoint inconsistency in {op}: {detail}")]
    AdjointInconsistency {
        /// Node operator that produced the inconsistent sensitivity.
        op: &'static str,
        /// Shapes involved.
        detail: String,
    },

    /// Wrong number of arguments or results passed to a Function or node.
    #[error("wrong number of {what} for '{function}': expected {expected}, got {got}")]
    ArgumentCount {
        /// Function or operator name.
        function: String,
        /// `"inputs"`, `"outputs"`, `"seeds"`, ...
        what: &'static str,
        /// Declared arity.
        expected: usize,
        /// Supplied arity.
        got: usize,
    },

    /// A Function input is not a purely symbolic expression.
    #[error("input {index} of '{function}' is not purely symbolic")]
    NonSymbolicInput {
        /// Function name.
        function: String,
        /// Input position.
        index: usize,
    },

    /// A Function body depends on symbols that are not among its inputs.
    #[error("'{function}' depends on free variables: {names:?}")]
    FreeVariables {
        /// Function name.
        function: String,
        /// Names of the free symbols.
        names: Vec<String>,
    },

    /// Caller-supplied scratch is smaller than the Function requires.
    #[error("{buffer} workspace too small for '{function}': need {required}, got {got}")]
    WorkspaceTooSmall {
        /// Function name.
        function: String,
        /// `"iw"` or `"w"`.
        buffer: &'static str,
        /// Required length.
        required: usize,
        /// Supplied length.
        got: usize,
    },

    /// An operation was requested in a state that does not allow it.
    #[error("invalid state: {detail}")]
    InvalidState {
        /// What was attempted and why it is not allowed.
        detail: String,
    },
}

impl Error {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Error::MalformedPattern {
            reason: reason.into(),
        }
    }

    pub(crate) fn dimension(op: &'static str, detail: impl Into<String>) -> Self {
        Error::DimensionMismatch {
            op,
            detail: detail.into(),
        }
    }
}
