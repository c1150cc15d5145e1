//! Karr-relation abstract domain and invariant driver
//!
//! Discovers linear arithmetic invariants of recursively defined
//! predicates by bottom-up evaluation of Horn rules in an abstract domain
//! of linear constraints, after Karr's method. The domain keeps each
//! relation in two lazily synchronised forms, a constraint matrix and a
//! generator basis, converted into each other through an integer
//! Hilbert-basis saturator.

mod datalog;
mod driver;
mod dualize;
mod linear;
mod matrix;
mod model;
mod plugin;
mod relation;
mod transform;

pub use datalog::Evaluator;
pub use driver::{KarrConfig, KarrInvariants};
pub use dualize::Dualizer;
pub use linear::{canonical_vars, column_map, constraint_rows, matrix_formula, matrix_formula_over};
pub use matrix::{display_ineq, Matrix, Row};
pub use model::{InvariantModelConverter, Model, PredicateInterpretation};
pub use plugin::{JoinFn, KarrPlugin, MutatorFn, TransformFn, UnionFn, KARR_RELATION};
pub use relation::{KarrRelation, RelSignature};
pub use transform::{backwards, LoopCounter};
