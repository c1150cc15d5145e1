//! Relation plugin: factories for relations and for operator closures
//!
//! The evaluator never touches relation internals; it asks the plugin for
//! empty/full relations and for one closure per relational operation,
//! then applies the closures during chaotic iteration. A factory returns
//! `None` when the requested signature is outside the domain's kind
//! (non-integer columns), which tells the evaluator to fall back.

use crate::dualize::Dualizer;
use crate::relation::{KarrRelation, RelSignature};
use karrlog_horn::{Expr, Predicate};
use rustc_hash::FxHashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Name under which the plugin registers with an evaluator.
pub const KARR_RELATION: &str = "karr_relation";

pub type JoinFn = Box<dyn Fn(&mut KarrRelation, &mut KarrRelation) -> KarrRelation>;
pub type TransformFn = Box<dyn Fn(&mut KarrRelation) -> KarrRelation>;
pub type MutatorFn = Box<dyn Fn(&mut KarrRelation)>;
pub type UnionFn = Box<dyn Fn(&mut KarrRelation, &mut KarrRelation, Option<&mut KarrRelation>)>;

/// Factory for karr relations and their operators.
pub struct KarrPlugin {
    cancel: Arc<AtomicBool>,
}

impl KarrPlugin {
    pub fn new(cancel: Arc<AtomicBool>) -> Self {
        Self { cancel }
    }

    pub fn name(&self) -> &'static str {
        KARR_RELATION
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn dualizer(&self) -> Dualizer {
        Dualizer::new(self.cancel.clone())
    }

    /// The empty relation of the given signature.
    pub fn mk_empty(&self, sig: RelSignature) -> KarrRelation {
        KarrRelation::new(None, sig, true)
    }

    /// The unconstrained relation of the given signature, optionally
    /// labelled with the predicate it stands for.
    pub fn mk_full(&self, decl: Option<Predicate>, sig: RelSignature) -> KarrRelation {
        KarrRelation::new(decl, sig, false)
    }

    pub fn mk_join_fn(
        &self,
        sig1: &RelSignature,
        sig2: &RelSignature,
        pairs: Vec<(usize, usize)>,
    ) -> Option<JoinFn> {
        if !sig1.is_all_int() || !sig2.is_all_int() {
            return None;
        }
        let dz = self.dualizer();
        Some(Box::new(move |r1, r2| {
            KarrRelation::join(r1, r2, &pairs, &dz)
        }))
    }

    /// `removed` must be in ascending column order.
    pub fn mk_project_fn(&self, sig: &RelSignature, removed: Vec<usize>) -> Option<TransformFn> {
        if !sig.is_all_int() {
            return None;
        }
        debug_assert!(removed.windows(2).all(|w| w[0] < w[1]));
        let dz = self.dualizer();
        Some(Box::new(move |r| KarrRelation::project(r, &removed, &dz)))
    }

    pub fn mk_rename_fn(&self, sig: &RelSignature, cycle: Vec<usize>) -> Option<TransformFn> {
        if !sig.is_all_int() {
            return None;
        }
        Some(Box::new(move |r| KarrRelation::rename(r, &cycle)))
    }

    pub fn mk_union_fn(&self) -> UnionFn {
        let dz = self.dualizer();
        Box::new(move |tgt, src, delta| tgt.union_with(src, delta, &dz))
    }

    pub fn mk_filter_identical_fn(&self, cols: Vec<usize>) -> Option<MutatorFn> {
        if cols.len() < 2 {
            return None;
        }
        let dz = self.dualizer();
        Some(Box::new(move |r| r.filter_identical(&cols, &dz)))
    }

    /// Validated at construction: a non-literal value makes the returned
    /// operator a no-op, which is sound.
    pub fn mk_filter_equal_fn(&self, value: &Expr, col: usize) -> MutatorFn {
        let value = value.clone();
        let dz = self.dualizer();
        Box::new(move |r| r.filter_equal(col, &value, &dz))
    }

    pub fn mk_filter_interpreted_fn(
        &self,
        cond: Expr,
        cols: FxHashMap<String, usize>,
    ) -> MutatorFn {
        let dz = self.dualizer();
        Box::new(move |r| r.filter_interpreted(&cond, &cols, &dz))
    }
}
