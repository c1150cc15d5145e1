//! Horn rule definitions
//!
//! A rule has the form `head :- atoms, constraint` where the atoms are
//! (possibly negated) applications of uninterpreted predicates and the
//! constraint is an interpreted theory formula. A rule with no body atoms
//! and a ground head is a fact; a rule whose head is `false` is a query.

use crate::{Expr, HornError, HornResult, Predicate, PredicateId, Sort, Var};
use rustc_hash::FxHashMap;
use std::fmt;

/// An uninterpreted atom in a rule body
#[derive(Debug, Clone)]
pub struct BodyAtom {
    pub pred: PredicateId,
    pub args: Vec<Expr>,
    /// Negated atoms are unsupported input for the invariant engine, but
    /// they must be representable so the driver can refuse them.
    pub negated: bool,
}

impl BodyAtom {
    pub fn new(pred: PredicateId, args: Vec<Expr>) -> Self {
        Self {
            pred,
            args,
            negated: false,
        }
    }

    pub fn negated(pred: PredicateId, args: Vec<Expr>) -> Self {
        Self {
            pred,
            args,
            negated: true,
        }
    }
}

/// Body of a Horn rule: a conjunction of uninterpreted atoms and an
/// optional interpreted constraint.
#[derive(Debug, Clone, Default)]
pub struct RuleBody {
    pub atoms: Vec<BodyAtom>,
    pub constraint: Option<Expr>,
}

impl RuleBody {
    pub fn new(atoms: Vec<BodyAtom>, constraint: Option<Expr>) -> Self {
        Self { atoms, constraint }
    }

    /// Create a body with only a constraint (no predicate applications)
    pub fn constraint(c: Expr) -> Self {
        Self {
            atoms: Vec::new(),
            constraint: Some(c),
        }
    }

    /// Create an empty body (represents "true")
    pub fn empty() -> Self {
        Self::default()
    }

    /// Check if this is a fact body (no uninterpreted atoms)
    pub fn is_fact(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Get all variables in the body
    pub fn vars(&self) -> Vec<Var> {
        let mut result = Vec::new();
        for atom in &self.atoms {
            for arg in &atom.args {
                for v in arg.vars() {
                    if !result.contains(&v) {
                        result.push(v);
                    }
                }
            }
        }
        if let Some(c) = &self.constraint {
            for v in c.vars() {
                if !result.contains(&v) {
                    result.push(v);
                }
            }
        }
        result
    }
}

/// Head of a Horn rule
#[derive(Debug, Clone)]
pub enum RuleHead {
    /// Predicate application
    Predicate(PredicateId, Vec<Expr>),
    /// False (queries / safety properties)
    False,
}

impl RuleHead {
    /// Check if this is a query (head is false)
    pub fn is_query(&self) -> bool {
        matches!(self, RuleHead::False)
    }

    /// Get the predicate ID if this is a predicate head
    pub fn predicate_id(&self) -> Option<PredicateId> {
        match self {
            RuleHead::Predicate(id, _) => Some(*id),
            RuleHead::False => None,
        }
    }
}

/// A Horn rule: `forall vars. body => head`
#[derive(Debug, Clone)]
pub struct Rule {
    pub body: RuleBody,
    pub head: RuleHead,
}

impl Rule {
    pub fn new(body: RuleBody, head: RuleHead) -> Self {
        Self { body, head }
    }

    /// Create a fact: constraint => P(args)
    pub fn fact(constraint: Option<Expr>, pred: PredicateId, args: Vec<Expr>) -> Self {
        Self {
            body: RuleBody {
                atoms: Vec::new(),
                constraint,
            },
            head: RuleHead::Predicate(pred, args),
        }
    }

    /// Create a query: body => false
    pub fn query(body: RuleBody) -> Self {
        Self {
            body,
            head: RuleHead::False,
        }
    }

    pub fn is_query(&self) -> bool {
        self.head.is_query()
    }

    pub fn is_fact(&self) -> bool {
        self.body.is_fact() && !self.is_query()
    }

    pub fn has_negation(&self) -> bool {
        self.body.atoms.iter().any(|a| a.negated)
    }

    /// Get all variables in the rule
    pub fn vars(&self) -> Vec<Var> {
        let mut result = self.body.vars();
        if let RuleHead::Predicate(_, args) = &self.head {
            for arg in args {
                for v in arg.vars() {
                    if !result.contains(&v) {
                        result.push(v);
                    }
                }
            }
        }
        result
    }
}

/// A set of Horn rules together with the predicates they range over.
///
/// Predicate identities are stable across derived rule sets: transforms
/// that rewrite rules re-declare existing predicates under their original
/// ids and allocate fresh ids for new ones.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    predicates: Vec<Predicate>,
    by_id: FxHashMap<PredicateId, usize>,
    rules: Vec<Rule>,
    next_id: u32,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a fresh predicate and return its id.
    pub fn declare_predicate(&mut self, name: impl Into<String>, arg_sorts: Vec<Sort>) -> PredicateId {
        let id = PredicateId::new(self.next_id);
        self.next_id += 1;
        self.add_predicate(Predicate::new(id, name, arg_sorts));
        id
    }

    /// Register a predicate under its existing id (used by rule transforms).
    pub fn add_predicate(&mut self, pred: Predicate) {
        if self.by_id.contains_key(&pred.id) {
            return;
        }
        self.next_id = self.next_id.max(pred.id.0 + 1);
        self.by_id.insert(pred.id, self.predicates.len());
        self.predicates.push(pred);
    }

    pub fn predicate(&self, id: PredicateId) -> Option<&Predicate> {
        self.by_id.get(&id).map(|&i| &self.predicates[i])
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn facts(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| r.is_fact())
    }

    pub fn queries(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| r.is_query())
    }

    pub fn has_negation(&self) -> bool {
        self.rules.iter().any(Rule::has_negation)
    }

    /// Copy declarations from another rule set that are missing here.
    pub fn inherit_predicates(&mut self, other: &RuleSet) {
        for p in &other.predicates {
            self.add_predicate(p.clone());
        }
    }

    /// Check every rule against the declared predicate arities.
    pub fn validate(&self) -> HornResult<()> {
        let check = |pred: PredicateId, nargs: usize| -> HornResult<()> {
            let decl = self
                .predicate(pred)
                .ok_or_else(|| HornError::ArityMismatch {
                    name: pred.to_string(),
                    expected: 0,
                    actual: nargs,
                })?;
            if decl.arity() != nargs {
                return Err(HornError::ArityMismatch {
                    name: decl.name.clone(),
                    expected: decl.arity(),
                    actual: nargs,
                });
            }
            Ok(())
        };
        for rule in &self.rules {
            for atom in &rule.body.atoms {
                check(atom.pred, atom.args.len())?;
            }
            if let RuleHead::Predicate(p, args) = &rule.head {
                check(*p, args.len())?;
            }
        }
        Ok(())
    }

    /// Normalize body atoms so that every argument is a variable or an
    /// integer literal: compound arguments are replaced by a fresh
    /// variable constrained equal to the original expression.
    ///
    /// The relational compiler relies on this normal form.
    pub fn normalized(&self) -> RuleSet {
        let mut out = self.clone();
        out.rules.clear();
        let mut fresh = 0u32;
        for rule in &self.rules {
            out.rules.push(normalize_rule(rule, &mut fresh));
        }
        out
    }
}

fn normalize_rule(rule: &Rule, fresh: &mut u32) -> Rule {
    let mut extra = Vec::new();
    let taken = rule.vars();
    let mut atoms = Vec::with_capacity(rule.body.atoms.len());
    for atom in &rule.body.atoms {
        let mut args = Vec::with_capacity(atom.args.len());
        for arg in &atom.args {
            match arg {
                Expr::Var(_) | Expr::Int(_) => args.push(arg.clone()),
                other => {
                    let v = fresh_var(fresh, &taken);
                    extra.push(Expr::eq(Expr::var(v.clone()), other.clone()));
                    args.push(Expr::var(v));
                }
            }
        }
        atoms.push(BodyAtom {
            pred: atom.pred,
            args,
            negated: atom.negated,
        });
    }
    if extra.is_empty() {
        return rule.clone();
    }
    let mut conjs = match &rule.body.constraint {
        Some(c) => vec![c.clone()],
        None => Vec::new(),
    };
    conjs.append(&mut extra);
    Rule {
        body: RuleBody {
            atoms,
            constraint: Some(Expr::and_many(conjs)),
        },
        head: rule.head.clone(),
    }
}

fn fresh_var(fresh: &mut u32, taken: &[Var]) -> Var {
    loop {
        let v = Var::int(format!("_a{}", *fresh));
        *fresh += 1;
        if !taken.contains(&v) {
            return v;
        }
    }
}

impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rule in &self.rules {
            writeln!(f, "{}", DisplayRule { rs: self, rule })?;
        }
        Ok(())
    }
}

struct DisplayRule<'a> {
    rs: &'a RuleSet,
    rule: &'a Rule,
}

impl fmt::Display for DisplayRule<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = |p: PredicateId| {
            self.rs
                .predicate(p)
                .map(|d| d.name.clone())
                .unwrap_or_else(|| p.to_string())
        };
        match &self.rule.head {
            RuleHead::Predicate(p, args) => {
                write!(f, "{}(", name(*p))?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")?;
            }
            RuleHead::False => write!(f, "false")?,
        }
        let mut parts = Vec::new();
        for atom in &self.rule.body.atoms {
            let args: Vec<_> = atom.args.iter().map(|a| a.to_string()).collect();
            let neg = if atom.negated { "not " } else { "" };
            parts.push(format!("{}{}({})", neg, name(atom.pred), args.join(", ")));
        }
        if let Some(c) = &self.rule.body.constraint {
            parts.push(c.to_string());
        }
        if !parts.is_empty() {
            write!(f, " :- {}", parts.join(", "))?;
        }
        write!(f, ".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_rules() -> (RuleSet, PredicateId) {
        // p(0).  p(x+1) :- p(x).
        let mut rs = RuleSet::new();
        let p = rs.declare_predicate("p", vec![Sort::Int]);
        rs.add_rule(Rule::fact(None, p, vec![Expr::int(0)]));
        let x = Var::int("x");
        rs.add_rule(Rule::new(
            RuleBody::new(vec![BodyAtom::new(p, vec![Expr::var(x.clone())])], None),
            RuleHead::Predicate(p, vec![Expr::add(Expr::var(x), Expr::int(1))]),
        ));
        (rs, p)
    }

    #[test]
    fn test_fact_and_rule_classification() {
        let (rs, _) = counter_rules();
        assert_eq!(rs.facts().count(), 1);
        assert_eq!(rs.queries().count(), 0);
        assert!(!rs.has_negation());
        rs.validate().unwrap();
    }

    #[test]
    fn test_normalize_compound_atom_args() {
        // q(x) :- p(x+1): the body atom argument becomes a fresh variable
        let mut rs = RuleSet::new();
        let p = rs.declare_predicate("p", vec![Sort::Int]);
        let q = rs.declare_predicate("q", vec![Sort::Int]);
        let x = Var::int("x");
        rs.add_rule(Rule::new(
            RuleBody::new(
                vec![BodyAtom::new(
                    p,
                    vec![Expr::add(Expr::var(x.clone()), Expr::int(1))],
                )],
                None,
            ),
            RuleHead::Predicate(q, vec![Expr::var(x)]),
        ));
        let norm = rs.normalized();
        let rule = &norm.rules()[0];
        assert!(matches!(rule.body.atoms[0].args[0], Expr::Var(_)));
        assert!(rule.body.constraint.is_some());
    }

    #[test]
    fn test_predicate_ids_stable_across_inherit() {
        let (mut rs, p) = counter_rules();
        let mut other = RuleSet::new();
        let q = other.declare_predicate("q", vec![Sort::Int, Sort::Int]);
        // distinct rule sets may reuse raw ids; inherit keeps existing entries
        rs.inherit_predicates(&other);
        assert_eq!(rs.predicate(p).unwrap().name, "p");
        assert_eq!(q.index(), 0);
    }

    #[test]
    fn test_display_round_trips_names() {
        let (rs, _) = counter_rules();
        let text = rs.to_string();
        assert!(text.contains("p(0)."));
        assert!(text.contains("p((+ x 1)) :- p(x)."));
    }
}
