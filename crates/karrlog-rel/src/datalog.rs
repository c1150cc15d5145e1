//! Bottom-up Datalog evaluation in the karr domain
//!
//! A naive chaotic-iteration engine: every rule is compiled to a chain of
//! plugin operators (clone body relations, filter constant and repeated
//! arguments, join on shared variables, filter the interpreted constraint,
//! bind the head arguments, project, union into the head relation) and the
//! rule set is re-evaluated until no union reports a delta.
//!
//! Recursion in the abstract domain can in principle keep refreshing
//! generators, so an iteration cap turns runaway saturation into an
//! explicit "incomplete" outcome rather than a spin.

use crate::linear;
use crate::plugin::KarrPlugin;
use crate::relation::{KarrRelation, RelSignature};
use karrlog_horn::{Expr, HornError, HornResult, PredicateId, Rule, RuleHead, RuleSet, Var};
use rustc_hash::FxHashMap;
use std::sync::atomic::Ordering;

pub struct Evaluator {
    plugin: KarrPlugin,
    rels: FxHashMap<PredicateId, KarrRelation>,
    max_iterations: usize,
    verbose: bool,
}

impl Evaluator {
    pub fn new(plugin: KarrPlugin, max_iterations: usize, verbose: bool) -> Self {
        Self {
            plugin,
            rels: FxHashMap::default(),
            max_iterations,
            verbose,
        }
    }

    pub fn relation(&self, pred: PredicateId) -> Option<&KarrRelation> {
        self.rels.get(&pred)
    }

    pub fn relations_mut(
        &mut self,
    ) -> impl Iterator<Item = (PredicateId, &mut KarrRelation)> + '_ {
        self.rels.iter_mut().map(|(p, r)| (*p, r))
    }

    /// Saturate the rule set. Relations for every rule-head predicate are
    /// registered up front so that underivable predicates end up with an
    /// explicit empty relation.
    pub fn run(&mut self, rules: &RuleSet) -> HornResult<()> {
        for rule in rules.rules() {
            for atom in &rule.body.atoms {
                if atom.negated {
                    let name = rules
                        .predicate(atom.pred)
                        .map(|p| p.name.clone())
                        .unwrap_or_else(|| atom.pred.to_string());
                    return Err(HornError::NegatedAtom(name));
                }
            }
        }
        rules.validate()?;
        let rules = rules.normalized();

        for rule in rules.rules() {
            if let RuleHead::Predicate(p, args) = &rule.head {
                if !self.rels.contains_key(p) {
                    let rel = self.plugin.mk_empty(RelSignature::ints(args.len()));
                    self.rels.insert(*p, rel);
                }
            }
        }

        let debug = self.verbose || std::env::var("KARRLOG_DEBUG").is_ok();
        let cancel = self.plugin.cancel_flag();
        let mut round = 0;
        loop {
            if round >= self.max_iterations {
                return Err(HornError::SaturationIncomplete(round));
            }
            let mut changed = false;
            for rule in rules.rules() {
                if cancel.load(Ordering::Relaxed) {
                    return Err(HornError::Cancelled);
                }
                changed |= self.eval_rule(&rules, rule);
            }
            if debug {
                eprintln!("[karrlog] round {round} changed={changed}");
                for (p, r) in &self.rels {
                    eprintln!("[karrlog] {p}:\n{r}");
                }
            }
            round += 1;
            if !changed {
                return Ok(());
            }
        }
    }

    /// Evaluate one rule against the current relations; true when the head
    /// relation grew.
    fn eval_rule(&mut self, rules: &RuleSet, rule: &Rule) -> bool {
        let RuleHead::Predicate(head_pred, head_args) = &rule.head else {
            return false;
        };

        // ground facts go through add_fact directly
        if rule.body.atoms.is_empty()
            && rule.body.constraint.is_none()
            && head_args.iter().all(|a| matches!(a, Expr::Int(_)))
        {
            let mut fact = self.plugin.mk_empty(RelSignature::ints(head_args.len()));
            fact.add_fact(head_args);
            return self.union_into(*head_pred, fact);
        }

        let rule_vars = rule.vars();
        let mut fresh = 0u32;

        let mut cur: Option<KarrRelation> = None;
        let mut vars: Vec<Var> = Vec::new();

        for atom in &rule.body.atoms {
            let Some(src) = self.rels.get(&atom.pred) else {
                return false;
            };
            if src.is_empty() {
                // empty absorbs the whole body
                return false;
            }
            let mut rel = src.clone();

            let mut avars = Vec::with_capacity(atom.args.len());
            for (i, arg) in atom.args.iter().enumerate() {
                match arg {
                    Expr::Var(v) => avars.push(v.clone()),
                    value => {
                        // normalization leaves only integer literals here
                        let filter = self.plugin.mk_filter_equal_fn(value, i);
                        filter(&mut rel);
                        avars.push(fresh_var("_c", &mut fresh, &rule_vars, &vars, &avars));
                    }
                }
            }

            // a variable repeated within the atom equates its columns
            let mut seen: FxHashMap<String, Vec<usize>> = FxHashMap::default();
            for (i, v) in avars.iter().enumerate() {
                seen.entry(v.name.clone()).or_default().push(i);
            }
            for cols in seen.values() {
                if cols.len() > 1 {
                    if let Some(filter) = self.plugin.mk_filter_identical_fn(cols.clone()) {
                        filter(&mut rel);
                    }
                }
            }

            match cur.take() {
                None => {
                    cur = Some(rel);
                    vars = avars;
                }
                Some(mut acc) => {
                    let mut pairs = Vec::new();
                    for (j, v) in avars.iter().enumerate() {
                        if let Some(i) = vars.iter().position(|w| w == v) {
                            pairs.push((i, j));
                        }
                    }
                    let Some(join) =
                        self.plugin
                            .mk_join_fn(acc.signature(), rel.signature(), pairs)
                    else {
                        return false;
                    };
                    let joined = join(&mut acc, &mut rel);
                    vars.extend(avars);
                    cur = Some(joined);
                }
            }
        }

        // variables used only by the constraint or the head get
        // unconstrained columns of their own
        let mut extra: Vec<Var> = Vec::new();
        let mut note = |v: Var, vars: &[Var], extra: &mut Vec<Var>| {
            if !vars.contains(&v) && !extra.contains(&v) {
                extra.push(v);
            }
        };
        if let Some(c) = &rule.body.constraint {
            for v in c.vars() {
                note(v, &vars, &mut extra);
            }
        }
        for arg in head_args {
            for v in arg.vars() {
                note(v, &vars, &mut extra);
            }
        }

        let mut cur = match cur {
            Some(c) if extra.is_empty() => c,
            Some(mut c) => {
                let mut ext = self.plugin.mk_full(None, RelSignature::ints(extra.len()));
                let Some(join) = self.plugin.mk_join_fn(c.signature(), ext.signature(), vec![])
                else {
                    return false;
                };
                let joined = join(&mut c, &mut ext);
                vars.append(&mut extra);
                joined
            }
            None => {
                vars = extra;
                self.plugin.mk_full(None, RelSignature::ints(vars.len()))
            }
        };

        if let Some(c) = &rule.body.constraint {
            let cols = linear::column_map(&vars);
            let filter = self.plugin.mk_filter_interpreted_fn(c.clone(), cols);
            filter(&mut cur);
        }

        // bind head argument expressions to fresh trailing columns, then
        // project the body columns away
        let n = vars.len();
        let decl = rules.predicate(*head_pred).cloned();
        let mut head_full = self
            .plugin
            .mk_full(decl, RelSignature::ints(head_args.len()));
        let Some(join) = self
            .plugin
            .mk_join_fn(cur.signature(), head_full.signature(), vec![])
        else {
            return false;
        };
        let mut target = join(&mut cur, &mut head_full);

        let mut all_vars = vars;
        let mut eqs = Vec::with_capacity(head_args.len());
        for arg in head_args {
            let hv = fresh_var("_h", &mut fresh, &rule_vars, &all_vars, &[]);
            eqs.push(Expr::eq(Expr::var(hv.clone()), arg.clone()));
            all_vars.push(hv);
        }
        let cols = linear::column_map(&all_vars);
        let filter = self
            .plugin
            .mk_filter_interpreted_fn(Expr::and_many(eqs), cols);
        filter(&mut target);

        let removed: Vec<usize> = (0..n).collect();
        let Some(project) = self.plugin.mk_project_fn(target.signature(), removed) else {
            return false;
        };
        let projected = project(&mut target);
        self.union_into(*head_pred, projected)
    }

    fn union_into(&mut self, pred: PredicateId, mut computed: KarrRelation) -> bool {
        let union = self.plugin.mk_union_fn();
        let mut delta = self.plugin.mk_empty(computed.signature().clone());
        let Some(head) = self.rels.get_mut(&pred) else {
            return false;
        };
        union(head, &mut computed, Some(&mut delta));
        !delta.is_empty()
    }
}

/// A variable name not occurring in the rule or in any column assigned so
/// far.
fn fresh_var(prefix: &str, counter: &mut u32, rule_vars: &[Var], a: &[Var], b: &[Var]) -> Var {
    loop {
        let name = format!("{prefix}{counter}");
        *counter += 1;
        let clash = |v: &Var| v.name == name;
        if !rule_vars.iter().any(clash) && !a.iter().any(clash) && !b.iter().any(clash) {
            return Var::int(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use karrlog_horn::{BodyAtom, RuleBody, Sort};
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn evaluator() -> Evaluator {
        let plugin = KarrPlugin::new(Arc::new(AtomicBool::new(false)));
        Evaluator::new(plugin, 64, false)
    }

    fn formula_of(ev: &mut Evaluator, p: PredicateId) -> Expr {
        let plugin = KarrPlugin::new(Arc::new(AtomicBool::new(false)));
        let dz = plugin.dualizer();
        let mut rel = ev.relation(p).unwrap().clone();
        rel.to_formula(&dz)
    }

    #[test]
    fn test_single_fact() {
        let mut rs = RuleSet::new();
        let p = rs.declare_predicate("p", vec![Sort::Int, Sort::Int]);
        rs.add_rule(Rule::fact(None, p, vec![Expr::int(3), Expr::int(5)]));
        let mut ev = evaluator();
        ev.run(&rs).unwrap();
        let rel = ev.relation(p).unwrap();
        assert!(!rel.is_empty());
    }

    #[test]
    fn test_counter_reaches_fixpoint() {
        // p(0).  p(x+1) :- p(x).
        let mut rs = RuleSet::new();
        let p = rs.declare_predicate("p", vec![Sort::Int]);
        rs.add_rule(Rule::fact(None, p, vec![Expr::int(0)]));
        let x = Var::int("x");
        rs.add_rule(Rule::new(
            RuleBody::new(vec![BodyAtom::new(p, vec![Expr::var(x.clone())])], None),
            RuleHead::Predicate(p, vec![Expr::add(Expr::var(x), Expr::int(1))]),
        ));
        let mut ev = evaluator();
        ev.run(&rs).unwrap();
        let inv = formula_of(&mut ev, p);
        // x >= 0 and nothing stronger: the formula must hold at 0 and 7
        // and fail at -1
        let text = inv.to_string();
        assert!(text.contains(">="), "expected an inequality, got {text}");
    }

    #[test]
    fn test_infeasible_constraint_leaves_head_empty() {
        // p(x) :- x = 0, x = 1.
        let mut rs = RuleSet::new();
        let p = rs.declare_predicate("p", vec![Sort::Int]);
        let x = Var::int("x");
        rs.add_rule(Rule::new(
            RuleBody::constraint(Expr::and(
                Expr::eq(Expr::var(x.clone()), Expr::int(0)),
                Expr::eq(Expr::var(x.clone()), Expr::int(1)),
            )),
            RuleHead::Predicate(p, vec![Expr::var(x)]),
        ));
        let mut ev = evaluator();
        ev.run(&rs).unwrap();
        assert!(ev.relation(p).unwrap().is_empty());
    }

    #[test]
    fn test_negated_atom_is_refused() {
        let mut rs = RuleSet::new();
        let p = rs.declare_predicate("p", vec![Sort::Int]);
        let q = rs.declare_predicate("q", vec![Sort::Int]);
        let x = Var::int("x");
        rs.add_rule(Rule::new(
            RuleBody::new(
                vec![BodyAtom::negated(q, vec![Expr::var(x.clone())])],
                None,
            ),
            RuleHead::Predicate(p, vec![Expr::var(x)]),
        ));
        let mut ev = evaluator();
        assert!(matches!(ev.run(&rs), Err(HornError::NegatedAtom(_))));
    }

    #[test]
    fn test_cancellation_stops_run() {
        let flag = Arc::new(AtomicBool::new(true));
        let plugin = KarrPlugin::new(flag);
        let mut ev = Evaluator::new(plugin, 64, false);
        let mut rs = RuleSet::new();
        let p = rs.declare_predicate("p", vec![Sort::Int]);
        rs.add_rule(Rule::fact(None, p, vec![Expr::int(0)]));
        assert!(matches!(ev.run(&rs), Err(HornError::Cancelled)));
    }

    #[test]
    fn test_join_of_two_facts() {
        // p(3). q(5). r(x, y) :- p(x), q(y).
        let mut rs = RuleSet::new();
        let p = rs.declare_predicate("p", vec![Sort::Int]);
        let q = rs.declare_predicate("q", vec![Sort::Int]);
        let r = rs.declare_predicate("r", vec![Sort::Int, Sort::Int]);
        rs.add_rule(Rule::fact(None, p, vec![Expr::int(3)]));
        rs.add_rule(Rule::fact(None, q, vec![Expr::int(5)]));
        let x = Var::int("x");
        let y = Var::int("y");
        rs.add_rule(Rule::new(
            RuleBody::new(
                vec![
                    BodyAtom::new(p, vec![Expr::var(x.clone())]),
                    BodyAtom::new(q, vec![Expr::var(y.clone())]),
                ],
                None,
            ),
            RuleHead::Predicate(r, vec![Expr::var(x), Expr::var(y)]),
        ));
        let mut ev = evaluator();
        ev.run(&rs).unwrap();
        let plugin = KarrPlugin::new(Arc::new(AtomicBool::new(false)));
        let dz = plugin.dualizer();
        let mut rel = ev.relation(r).unwrap().clone();
        let basis = rel.basis(&dz);
        assert_eq!(basis.len(), 1, "r should be the single point (3, 5)");
    }

    #[test]
    fn test_shared_variable_joins_columns() {
        // p(3). q(3). s(x) :- p(x), q(x): consistent, s non-empty.
        // With q(4) instead, s must stay empty.
        for (qval, expect_empty) in [(3, false), (4, true)] {
            let mut rs = RuleSet::new();
            let p = rs.declare_predicate("p", vec![Sort::Int]);
            let q = rs.declare_predicate("q", vec![Sort::Int]);
            let s = rs.declare_predicate("s", vec![Sort::Int]);
            rs.add_rule(Rule::fact(None, p, vec![Expr::int(3)]));
            rs.add_rule(Rule::fact(None, q, vec![Expr::int(qval)]));
            let x = Var::int("x");
            rs.add_rule(Rule::new(
                RuleBody::new(
                    vec![
                        BodyAtom::new(p, vec![Expr::var(x.clone())]),
                        BodyAtom::new(q, vec![Expr::var(x.clone())]),
                    ],
                    None,
                ),
                RuleHead::Predicate(s, vec![Expr::var(x)]),
            ));
            let mut ev = evaluator();
            ev.run(&rs).unwrap();
            assert_eq!(ev.relation(s).unwrap().is_empty(), expect_empty);
        }
    }

    #[test]
    fn test_iteration_cap_reports_incomplete() {
        let mut rs = RuleSet::new();
        let p = rs.declare_predicate("p", vec![Sort::Int]);
        rs.add_rule(Rule::fact(None, p, vec![Expr::int(0)]));
        let x = Var::int("x");
        rs.add_rule(Rule::new(
            RuleBody::new(vec![BodyAtom::new(p, vec![Expr::var(x.clone())])], None),
            RuleHead::Predicate(p, vec![Expr::add(Expr::var(x), Expr::int(1))]),
        ));
        let plugin = KarrPlugin::new(Arc::new(AtomicBool::new(false)));
        let mut ev = Evaluator::new(plugin, 1, false);
        assert!(matches!(
            ev.run(&rs),
            Err(HornError::SaturationIncomplete(_))
        ));
    }
}
