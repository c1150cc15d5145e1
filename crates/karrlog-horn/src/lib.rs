//! Horn clause representation for the karrlog invariant engine
//!
//! This crate holds the symbolic layer: sorts, variables and expressions,
//! predicate declarations, and Horn rule sets. The abstract domain and the
//! fixed-point machinery live in `karrlog-rel`.

mod error;
mod expr;
mod predicate;
mod rule;

pub use error::{HornError, HornResult};
pub use expr::{Expr, Op, Sort, Var};
pub use predicate::{Predicate, PredicateId};
pub use rule::{BodyAtom, Rule, RuleBody, RuleHead, RuleSet};
