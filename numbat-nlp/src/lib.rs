//! Reverse-communication NLP driver over numbat Functions.
//!
//! An [`NlpProblem`] bundles the compiled objective, constraints and
//! derivatives; an engine implementing [`RevCommEngine`] decides what to
//! evaluate next; [`NlpDriver`] resolves each pending [`UserAction`] with one
//! Function call until the engine reports an [`NlpStatus`].

pub mod action;
pub mod convergence;
pub mod driver;
pub mod engine;
pub mod error;
pub mod linalg;
pub mod newton;
pub mod problem;
pub mod status;

pub use action::UserAction;
pub use convergence::{ArmijoParams, ConvergenceParams};
pub use driver::{NlpDriver, NlpInput, NlpSolution};
pub use engine::{Iterate, NlpSetup, RevCommEngine};
pub use error::{NlpError, Result};
pub use newton::{NewtonConfig, NewtonEngine};
pub use problem::NlpProblem;
pub use status::NlpStatus;
