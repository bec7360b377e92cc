use std::fmt;

/// Why an engine stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NlpStatus {
    /// Converged to a point satisfying the constraint bounds.
    Success,
    /// Reached the iteration limit.
    MaxIterations,
    /// Converged, but the constraints violate their bounds.
    Infeasible,
    /// The iteration callback asked to stop.
    UserTerminated,
    /// A numerical failure (singular system, non-finite values).
    InternalError,
    /// No acceptable step could be found along the search direction.
    SearchDirectionSmall,
}

impl NlpStatus {
    pub fn is_success(self) -> bool {
        self == NlpStatus::Success
    }
}

impl fmt::Display for NlpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NlpStatus::Success => write!(f, "optimal solution found"),
            NlpStatus::MaxIterations => write!(f, "maximum iterations reached"),
            NlpStatus::Infeasible => write!(f, "problem infeasible"),
            NlpStatus::UserTerminated => write!(f, "terminated by user"),
            NlpStatus::InternalError => write!(f, "internal error"),
            NlpStatus::SearchDirectionSmall => write!(f, "search direction too small"),
        }
    }
}
