//! karrlog - linear invariant discovery for Horn clauses
//!
//! This is the main library crate that re-exports all components.

#![warn(clippy::all)]

pub use karrlog_hilbert as hilbert;
pub use karrlog_horn as horn;
pub use karrlog_rel as rel;

pub use karrlog_horn::{
    BodyAtom, Expr, HornError, HornResult, Op, Predicate, PredicateId, Rule, RuleBody, RuleHead,
    RuleSet, Sort, Var,
};
pub use karrlog_rel::{
    InvariantModelConverter, KarrConfig, KarrInvariants, KarrPlugin, KarrRelation, Model,
    PredicateInterpretation, RelSignature,
};
