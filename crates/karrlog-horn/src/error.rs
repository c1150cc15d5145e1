//! Error types for the invariant engine

use thiserror::Error;

/// Invariant engine errors
#[derive(Debug, Error)]
pub enum HornError {
    #[error("negated atom for predicate {0}")]
    NegatedAtom(String),

    #[error("non-integer argument sort for predicate {0}")]
    NonIntegerArgument(String),

    #[error("arity mismatch for predicate {name}: expected {expected}, got {actual}")]
    ArityMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("saturation incomplete after {0} iterations")]
    SaturationIncomplete(usize),

    #[error("cancelled")]
    Cancelled,
}

/// Result type for invariant engine operations
pub type HornResult<T> = Result<T, HornError>;
