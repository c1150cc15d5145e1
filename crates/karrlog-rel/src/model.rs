//! Predicate models and invariant grafting
//!
//! After the outer solver produces a model, the recorded invariants are
//! conjoined into each predicate's interpretation. A predicate with no
//! interpretation at all gets `false`, its relation having been judged
//! infeasible; partial interpretations are left untouched.

use crate::linear;
use karrlog_horn::{Expr, Predicate, PredicateId, Var};
use rustc_hash::FxHashMap;

/// Interpretation of a predicate (what `p(x)` means)
#[derive(Debug, Clone)]
pub struct PredicateInterpretation {
    /// Variables that the interpretation is over
    pub vars: Vec<Var>,
    /// Formula defining the predicate
    pub formula: Expr,
    /// A partial interpretation has no default branch to strengthen.
    pub partial: bool,
}

impl PredicateInterpretation {
    pub fn new(vars: Vec<Var>, formula: Expr) -> Self {
        Self {
            vars,
            formula,
            partial: false,
        }
    }

    pub fn partial(vars: Vec<Var>, formula: Expr) -> Self {
        Self {
            vars,
            formula,
            partial: true,
        }
    }
}

/// Model assigning interpretations to predicates
#[derive(Debug, Clone, Default)]
pub struct Model {
    interpretations: FxHashMap<PredicateId, PredicateInterpretation>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, pred: PredicateId, interp: PredicateInterpretation) {
        self.interpretations.insert(pred, interp);
    }

    pub fn get(&self, pred: &PredicateId) -> Option<&PredicateInterpretation> {
        self.interpretations.get(pred)
    }

    pub fn get_mut(&mut self, pred: &PredicateId) -> Option<&mut PredicateInterpretation> {
        self.interpretations.get_mut(pred)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PredicateId, &PredicateInterpretation)> {
        self.interpretations.iter()
    }

    pub fn len(&self) -> usize {
        self.interpretations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interpretations.is_empty()
    }
}

/// Conjoins recorded invariants into a model after solving.
#[derive(Debug, Clone, Default)]
pub struct InvariantModelConverter {
    entries: Vec<(Predicate, Expr)>,
}

impl InvariantModelConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an invariant for a predicate; trivial invariants are not
    /// worth carrying.
    pub fn add(&mut self, pred: Predicate, invariant: Expr) {
        if !invariant.is_true() {
            self.entries.push((pred, invariant));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&Predicate, &Expr)> {
        self.entries.iter().map(|(p, e)| (p, e))
    }

    /// Graft the invariants onto the model.
    pub fn apply(&self, model: &mut Model) {
        for (pred, invariant) in &self.entries {
            match model.get_mut(&pred.id) {
                Some(interp) => {
                    if interp.partial {
                        continue;
                    }
                    let canon = linear::canonical_vars(pred.arity());
                    let subst: Vec<(Var, Expr)> = canon
                        .into_iter()
                        .zip(&interp.vars)
                        .map(|(c, v)| (c, Expr::var(v.clone())))
                        .collect();
                    let aligned = invariant.substitute(&subst);
                    interp.formula = Expr::and(interp.formula.clone(), aligned);
                }
                None => {
                    // no interpretation: the relation was pruned as
                    // infeasible
                    model.set(
                        pred.id,
                        PredicateInterpretation::new(
                            linear::canonical_vars(pred.arity()),
                            Expr::Bool(false),
                        ),
                    );
                }
            }
        }
    }

    /// Re-key the recorded predicates for another rule-set copy.
    /// Predicates without a translation entry keep their identity.
    pub fn translate(&self, translator: &FxHashMap<PredicateId, Predicate>) -> Self {
        let mut out = Self::new();
        for (pred, invariant) in &self.entries {
            let pred = translator.get(&pred.id).cloned().unwrap_or_else(|| pred.clone());
            out.add(pred, invariant.clone());
        }
        out
    }
}
