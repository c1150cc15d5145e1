//! Rule-set transforms around invariant extraction
//!
//! The loop-counter transform gives every predicate an extra integer
//! argument counting derivation size: facts start it at zero, and a rule
//! head's counter is the sum of its body counters plus one. The counter is
//! non-negative by construction, which the driver exploits when projecting
//! invariants of the augmented predicates back onto the originals.
//!
//! The backwards transform reverses information flow: each rule is turned
//! into one rule per uninterpreted body atom deriving that atom from the
//! head and the remaining body. Facts reverse into queries and queries
//! into facts, so a rule set without queries learns nothing from the
//! backward pass.

use karrlog_horn::{BodyAtom, Expr, Predicate, PredicateId, Rule, RuleBody, RuleHead, RuleSet, Sort, Var};
use rustc_hash::FxHashMap;

/// Mapping between original predicates and their counter-augmented twins.
pub struct LoopCounter {
    originals: FxHashMap<PredicateId, Predicate>,
    augmented: FxHashMap<PredicateId, PredicateId>,
}

impl LoopCounter {
    /// Instrument every predicate with a trailing counter argument.
    pub fn instrument(src: &RuleSet) -> (RuleSet, LoopCounter) {
        let mut dst = RuleSet::new();
        // allocate augmented ids above every id of the source
        for p in src.predicates() {
            dst.add_predicate(p.clone());
        }
        let mut augmented = FxHashMap::default();
        let mut originals = FxHashMap::default();
        for p in src.predicates() {
            let mut sorts = p.arg_sorts.clone();
            sorts.push(Sort::Int);
            let aug = dst.declare_predicate(format!("{}!cnt", p.name), sorts);
            augmented.insert(p.id, aug);
            originals.insert(aug, p.clone());
        }

        for rule in src.rules() {
            let taken = rule.vars();
            let mut counter_vars = Vec::with_capacity(rule.body.atoms.len());
            let mut fresh = 0u32;
            let mut atoms = Vec::with_capacity(rule.body.atoms.len());
            for atom in &rule.body.atoms {
                let cv = fresh_counter(&mut fresh, &taken);
                let mut args = atom.args.clone();
                args.push(Expr::var(cv.clone()));
                counter_vars.push(cv);
                atoms.push(BodyAtom {
                    pred: augmented[&atom.pred],
                    args,
                    negated: atom.negated,
                });
            }
            let head = match &rule.head {
                RuleHead::False => RuleHead::False,
                RuleHead::Predicate(p, args) => {
                    let mut args = args.clone();
                    args.push(head_counter(&counter_vars));
                    RuleHead::Predicate(augmented[p], args)
                }
            };
            dst.add_rule(Rule::new(
                RuleBody::new(atoms, rule.body.constraint.clone()),
                head,
            ));
        }

        (
            dst,
            LoopCounter {
                originals,
                augmented,
            },
        )
    }

    /// The original predicate an augmented id stands for.
    pub fn original(&self, aug: PredicateId) -> Option<&Predicate> {
        self.originals.get(&aug)
    }

    pub fn augmented(&self, orig: PredicateId) -> Option<PredicateId> {
        self.augmented.get(&orig).copied()
    }

    /// Drop the counter argument from every atom and map predicates back.
    /// Interpreted conjuncts are kept as they are; counter variables they
    /// mention become plain existential body variables.
    pub fn revert(&self, src: &RuleSet) -> RuleSet {
        let mut dst = RuleSet::new();
        for p in self.originals.values() {
            dst.add_predicate(p.clone());
        }
        for rule in src.rules() {
            let atoms = rule
                .body
                .atoms
                .iter()
                .map(|atom| {
                    let mut args = atom.args.clone();
                    let pred = match self.originals.get(&atom.pred) {
                        Some(orig) => {
                            args.pop();
                            orig.id
                        }
                        None => atom.pred,
                    };
                    BodyAtom {
                        pred,
                        args,
                        negated: atom.negated,
                    }
                })
                .collect();
            let head = match &rule.head {
                RuleHead::False => RuleHead::False,
                RuleHead::Predicate(p, args) => match self.originals.get(p) {
                    Some(orig) => {
                        let mut args = args.clone();
                        args.pop();
                        RuleHead::Predicate(orig.id, args)
                    }
                    None => RuleHead::Predicate(*p, args.clone()),
                },
            };
            dst.add_rule(Rule::new(
                RuleBody::new(atoms, rule.body.constraint.clone()),
                head,
            ));
        }
        dst
    }
}

fn head_counter(counter_vars: &[Var]) -> Expr {
    if counter_vars.is_empty() {
        return Expr::int(0);
    }
    let sum = Expr::add_many(counter_vars.iter().cloned().map(Expr::var).collect());
    Expr::add(sum, Expr::int(1))
}

fn fresh_counter(fresh: &mut u32, taken: &[Var]) -> Var {
    loop {
        let v = Var::int(format!("_cnt{}", *fresh));
        *fresh += 1;
        if !taken.contains(&v) {
            return v;
        }
    }
}

/// Reverse the information flow of a rule set.
pub fn backwards(src: &RuleSet) -> RuleSet {
    let mut dst = RuleSet::new();
    dst.inherit_predicates(src);
    for rule in src.rules() {
        let head_atom = match &rule.head {
            RuleHead::Predicate(p, args) => Some(BodyAtom::new(*p, args.clone())),
            RuleHead::False => None,
        };
        if rule.body.atoms.is_empty() {
            // a fact reverses into a query
            if let Some(atom) = head_atom {
                dst.add_rule(Rule::new(
                    RuleBody::new(vec![atom], rule.body.constraint.clone()),
                    RuleHead::False,
                ));
            }
            continue;
        }
        for (i, atom) in rule.body.atoms.iter().enumerate() {
            let mut body_atoms = Vec::with_capacity(rule.body.atoms.len());
            if let Some(h) = &head_atom {
                body_atoms.push(h.clone());
            }
            for (j, other) in rule.body.atoms.iter().enumerate() {
                if j != i {
                    body_atoms.push(other.clone());
                }
            }
            dst.add_rule(Rule::new(
                RuleBody::new(body_atoms, rule.body.constraint.clone()),
                RuleHead::Predicate(atom.pred, atom.args.clone()),
            ));
        }
    }
    dst
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn test_instrument_adds_counter_argument() {
        let (rs, p) = counter_rules();
        let (aug, lc) = LoopCounter::instrument(&rs);
        let aug_p = lc.augmented(p).unwrap();
        let decl = aug.predicate(aug_p).unwrap();
        assert_eq!(decl.arity(), 2);
        assert!(decl.name.ends_with("!cnt"));
        // the fact's counter is pinned to zero
        let fact = aug.rules().iter().find(|r| r.is_fact()).unwrap();
        let RuleHead::Predicate(_, args) = &fact.head else {
            panic!()
        };
        assert_eq!(args[1], Expr::int(0));
        // the recursive rule increments
        let rec = aug.rules().iter().find(|r| !r.is_fact()).unwrap();
        let RuleHead::Predicate(_, args) = &rec.head else {
            panic!()
        };
        assert!(matches!(args[1], Expr::Op(_, _)));
    }

    #[test]
    fn test_revert_round_trips_shape() {
        let (rs, p) = counter_rules();
        let (aug, lc) = LoopCounter::instrument(&rs);
        let back = lc.revert(&aug);
        assert_eq!(back.rules().len(), rs.rules().len());
        let decl = back.predicate(p).unwrap();
        assert_eq!(decl.arity(), 1);
        for (orig, rev) in rs.rules().iter().zip(back.rules()) {
            if let (RuleHead::Predicate(a, xs), RuleHead::Predicate(b, ys)) =
                (&orig.head, &rev.head)
            {
                assert_eq!(a, b);
                assert_eq!(xs.len(), ys.len());
            }
        }
    }

    #[test]
    fn test_backwards_swaps_facts_and_queries() {
        let (rs, _) = counter_rules();
        let rev = backwards(&rs);
        // fact became a query, recursive rule stays a rule
        assert_eq!(rev.queries().count(), 1);
        assert_eq!(rev.facts().count(), 0);
        assert_eq!(rev.rules().len(), 2);
    }

    #[test]
    fn test_backwards_multi_atom_body() {
        // r(x, y) :- p(x), q(y) reverses into two rules with the head in
        // the body
        let mut rs = RuleSet::new();
        let p = rs.declare_predicate("p", vec![Sort::Int]);
        let q = rs.declare_predicate("q", vec![Sort::Int]);
        let r = rs.declare_predicate("r", vec![Sort::Int, Sort::Int]);
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
        let rev = backwards(&rs);
        assert_eq!(rev.rules().len(), 2);
        for rule in rev.rules() {
            assert_eq!(rule.body.atoms.len(), 2);
            assert_eq!(rule.body.atoms[0].pred, r);
        }
    }
}
