//! Invariant extraction driver
//!
//! Runs the bottom-up evaluator over the loop-counter-instrumented rule
//! set, then again over the reversed rules, collects one linear invariant
//! per predicate, and hands back the rule set with the invariants injected
//! into rule bodies. A model converter for grafting the invariants onto
//! solver models is produced on the side.

use crate::datalog::Evaluator;
use crate::linear;
use crate::model::InvariantModelConverter;
use crate::plugin::KarrPlugin;
use crate::relation::{KarrRelation, RelSignature};
use crate::transform::{backwards, LoopCounter};
use karrlog_horn::{Expr, HornError, PredicateId, Rule, RuleBody, RuleSet, Var};
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Driver configuration
#[derive(Debug, Clone)]
pub struct KarrConfig {
    /// When off, the driver returns its input unchanged.
    pub enabled: bool,
    /// Round-by-round progress on stderr
    pub verbose: bool,
    /// Cap on chaotic-iteration rounds per saturation pass
    pub max_iterations: usize,
}

impl Default for KarrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            verbose: false,
            max_iterations: 100,
        }
    }
}

/// The Karr invariant engine.
pub struct KarrInvariants {
    config: KarrConfig,
    cancel: Arc<AtomicBool>,
    invariants: FxHashMap<PredicateId, Expr>,
    converter: Option<InvariantModelConverter>,
}

impl KarrInvariants {
    pub fn new(config: KarrConfig) -> Self {
        Self {
            config,
            cancel: Arc::new(AtomicBool::new(false)),
            invariants: FxHashMap::default(),
            converter: None,
        }
    }

    /// Flag observed by the evaluator and the saturator; settable from
    /// another thread.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// The discovered invariant of an original predicate, over the
    /// canonical argument variables.
    pub fn invariant(&self, pred: PredicateId) -> Option<&Expr> {
        self.invariants.get(&pred)
    }

    pub fn take_model_converter(&mut self) -> Option<InvariantModelConverter> {
        self.converter.take()
    }

    /// Transform the rule set. `None` exactly on cancellation; unsupported
    /// input comes back unchanged.
    pub fn apply(&mut self, source: &RuleSet) -> Option<RuleSet> {
        if !self.config.enabled {
            return Some(source.clone());
        }
        if source.has_negation() {
            return Some(source.clone());
        }
        if source.predicates().iter().any(|p| !p.is_all_int()) {
            return Some(source.clone());
        }
        if source.validate().is_err() {
            return Some(source.clone());
        }

        let (src_loop, lc) = LoopCounter::instrument(source);
        if self.config.verbose {
            eprintln!("[karrlog] instrumented rules:\n{src_loop}");
        }

        let mut aug_inv: FxHashMap<PredicateId, Expr> = FxHashMap::default();
        if !self.get_invariants(&src_loop, false, &mut aug_inv) {
            return None;
        }
        let rev = backwards(&src_loop);
        if !self.get_invariants(&rev, true, &mut aug_inv) {
            return None;
        }
        if self.cancelled() {
            return None;
        }

        // drop each augmented invariant onto its original predicate by
        // projecting out the (non-negative) counter column
        let mut orig_inv: FxHashMap<PredicateId, Expr> = FxHashMap::default();
        for (aug_id, inv) in &aug_inv {
            let Some(orig) = lc.original(*aug_id) else {
                continue;
            };
            let projected = self.project_counter(inv, orig.arity());
            if projected.is_true() {
                continue;
            }
            orig_inv
                .entry(orig.id)
                .and_modify(|e| *e = Expr::and(e.clone(), projected.clone()))
                .or_insert(projected);
        }

        let src_annot = update_rules(&src_loop, &aug_inv);
        let mut result = lc.revert(&src_annot);
        result.inherit_predicates(source);
        if self.config.verbose {
            eprintln!("[karrlog] annotated rules:\n{result}");
        }

        let mut mc = InvariantModelConverter::new();
        for (id, inv) in &orig_inv {
            if let Some(p) = source.predicate(*id) {
                mc.add(p.clone(), inv.clone());
            }
        }
        self.converter = (!mc.is_empty()).then_some(mc);
        self.invariants = orig_inv;
        Some(result)
    }

    /// One saturation pass; conjoins findings into `inv`. Returns false on
    /// cancellation. `skip_empty` suppresses `false` findings: in the
    /// backward pass an empty relation only means nothing was derivable
    /// backwards, not that the predicate is infeasible.
    fn get_invariants(
        &self,
        rules: &RuleSet,
        skip_empty: bool,
        inv: &mut FxHashMap<PredicateId, Expr>,
    ) -> bool {
        let plugin = KarrPlugin::new(self.cancel.clone());
        let dz = plugin.dualizer();
        let mut ev = Evaluator::new(plugin, self.config.max_iterations, self.config.verbose);
        match ev.run(rules) {
            Ok(()) => {}
            Err(HornError::Cancelled) => return false,
            // an incomplete pass has under-approximated relations, which
            // must not be read as invariants
            Err(_) => return true,
        }
        for (pid, rel) in ev.relations_mut() {
            if skip_empty && rel.is_empty() {
                continue;
            }
            let fml = rel.to_formula(&dz);
            if fml.is_true() {
                continue;
            }
            inv.entry(pid)
                .and_modify(|e| *e = Expr::and(e.clone(), fml.clone()))
                .or_insert(fml);
        }
        true
    }

    /// `inv` with the counter column existentially projected away (the
    /// counter is known to be non-negative), computed in the karr domain
    /// itself; the result is over the first `arity` columns.
    fn project_counter(&self, inv: &Expr, arity: usize) -> Expr {
        if inv.is_false() {
            return Expr::Bool(false);
        }
        let plugin = KarrPlugin::new(self.cancel.clone());
        let dz = plugin.dualizer();
        let width = arity + 1;
        let cvars = linear::canonical_vars(width);
        let cols = linear::column_map(&cvars);
        let mut rel = plugin.mk_full(None, RelSignature::ints(width));
        let counter_nonneg = Expr::ge(Expr::var(cvars[arity].clone()), Expr::int(0));
        rel.filter_interpreted(&Expr::and(inv.clone(), counter_nonneg), &cols, &dz);
        let mut projected = KarrRelation::project(&mut rel, &[arity], &dz);
        projected.to_formula(&dz)
    }
}

/// Append each body atom's invariant, instantiated at the atom's
/// arguments, to the rule body.
fn update_rules(src: &RuleSet, inv: &FxHashMap<PredicateId, Expr>) -> RuleSet {
    let mut dst = RuleSet::new();
    dst.inherit_predicates(src);
    for rule in src.rules() {
        let mut conjs = match &rule.body.constraint {
            Some(c) => vec![c.clone()],
            None => Vec::new(),
        };
        let mut added = false;
        for atom in &rule.body.atoms {
            let Some(fml) = inv.get(&atom.pred) else {
                continue;
            };
            let canon = linear::canonical_vars(atom.args.len());
            let subst: Vec<(Var, Expr)> = canon
                .into_iter()
                .zip(&atom.args)
                .map(|(c, a)| (c, a.clone()))
                .collect();
            conjs.push(fml.substitute(&subst));
            added = true;
        }
        let body = if added {
            RuleBody::new(rule.body.atoms.clone(), Some(Expr::and_many(conjs)))
        } else {
            rule.body.clone()
        };
        dst.add_rule(Rule::new(body, rule.head.clone()));
    }
    dst
}

#[cfg(test)]
mod tests {
    use super::*;
    use karrlog_horn::{BodyAtom, RuleHead, Sort};

    fn counter_rules() -> (RuleSet, PredicateId) {
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
    fn test_disabled_driver_is_identity() {
        let (rs, p) = counter_rules();
        let mut driver = KarrInvariants::new(KarrConfig {
            enabled: false,
            ..KarrConfig::default()
        });
        let out = driver.apply(&rs).unwrap();
        assert_eq!(out.rules().len(), rs.rules().len());
        assert!(driver.invariant(p).is_none());
    }

    #[test]
    fn test_negated_input_is_returned_unchanged() {
        let mut rs = RuleSet::new();
        let p = rs.declare_predicate("p", vec![Sort::Int]);
        let q = rs.declare_predicate("q", vec![Sort::Int]);
        let x = Var::int("x");
        rs.add_rule(Rule::new(
            RuleBody::new(vec![BodyAtom::negated(q, vec![Expr::var(x.clone())])], None),
            RuleHead::Predicate(p, vec![Expr::var(x)]),
        ));
        let mut driver = KarrInvariants::new(KarrConfig::default());
        let out = driver.apply(&rs).unwrap();
        assert!(out.rules()[0].has_negation());
        assert!(driver.invariant(p).is_none());
    }

    #[test]
    fn test_non_integer_predicate_is_refused() {
        let mut rs = RuleSet::new();
        let p = rs.declare_predicate("p", vec![Sort::Bool]);
        rs.add_rule(Rule::fact(None, p, vec![Expr::Bool(true)]));
        let mut driver = KarrInvariants::new(KarrConfig::default());
        assert!(driver.apply(&rs).is_some());
        assert!(driver.invariant(p).is_none());
    }

    #[test]
    fn test_cancelled_driver_returns_none() {
        let (rs, _) = counter_rules();
        let mut driver = KarrInvariants::new(KarrConfig::default());
        driver.cancel();
        assert!(driver.apply(&rs).is_none());
    }

    #[test]
    fn test_counter_gets_invariant_and_annotation() {
        let (rs, p) = counter_rules();
        let mut driver = KarrInvariants::new(KarrConfig::default());
        let out = driver.apply(&rs).unwrap();
        let inv = driver.invariant(p).expect("an invariant for p");
        assert!(!inv.is_true());
        assert!(!inv.is_false());
        // the recursive rule's body gained the instantiated invariant
        let recursive = out
            .rules()
            .iter()
            .find(|r| !r.body.atoms.is_empty())
            .unwrap();
        assert!(recursive.body.constraint.is_some());
        // a model converter was registered for p
        let mc = driver.take_model_converter().unwrap();
        assert_eq!(mc.entries().count(), 1);
    }

    #[test]
    fn test_rule_count_is_preserved() {
        let (rs, _) = counter_rules();
        let mut driver = KarrInvariants::new(KarrConfig::default());
        let out = driver.apply(&rs).unwrap();
        assert_eq!(out.rules().len(), rs.rules().len());
    }
}
