use thiserror::Error;

/// Result type alias using [`NlpError`].
pub type Result<T> = std::result::Result<T, NlpError>;

/// Errors raised while setting up or driving an NLP solve.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NlpError {
    /// A Function of the problem bundle was built or called incorrectly.
    #[error(transparent)]
    Core(#[from] numbat::Error),

    /// A problem Function has the wrong signature.
    #[error("'{function}' has the wrong signature: {detail}")]
    Signature {
        /// Role of the Function in the problem (`nlp_f`, `nlp_jac_g`, ...).
        function: &'static str,
        /// What does not match.
        detail: String,
    },

    /// An input vector has the wrong length.
    #[error("{what} has length {got}, expected {expected}")]
    Length {
        /// `"x0"`, `"lbx"`, ...
        what: &'static str,
        /// Problem dimension.
        expected: usize,
        /// Supplied length.
        got: usize,
    },

    /// Lower and upper bound of a decision variable coincide.
    #[error("lbx == ubx == {value} at variable {index}; make it a parameter instead")]
    FixedVariable {
        /// Variable index.
        index: usize,
        /// The common bound.
        value: f64,
    },

    /// Lower bound exceeds upper bound.
    #[error("empty bound interval [{lower}, {upper}] for {what} {index}")]
    EmptyBounds {
        /// `"variable"` or `"constraint"`.
        what: &'static str,
        /// Index into `x` or `g`.
        index: usize,
        /// Lower bound.
        lower: f64,
        /// Upper bound.
        upper: f64,
    },

    /// Both bounds of a constraint are infinite.
    #[error("constraint {index} has infinite lower and upper bounds; remove it from g")]
    FreeConstraint {
        /// Constraint index.
        index: usize,
    },
}
