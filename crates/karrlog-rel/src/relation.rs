//! The karr-relation abstract value
//!
//! A relation over an integer tuple signature is kept in two mutually
//! derivable forms: a constraint matrix (rows `A*x + b = 0` or `>= 0`) and
//! a generator basis (anchor points plus direction vectors). At least one
//! form is valid at any time for a non-empty relation; mutating one form
//! invalidates the other, and the missing form is rebuilt on demand
//! through the [`Dualizer`]. Infeasibility discovered while rebuilding the
//! basis flips the relation to empty.

use crate::dualize::Dualizer;
use crate::linear;
use crate::matrix::{Matrix, Row};
use karrlog_horn::{Expr, Predicate, Sort};
use num_rational::BigRational;
use num_traits::{One, Zero};
use rustc_hash::FxHashMap;
use std::fmt;

/// Tuple signature of a relation: one sort per column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelSignature(Vec<Sort>);

impl RelSignature {
    pub fn new(sorts: Vec<Sort>) -> Self {
        Self(sorts)
    }

    /// All-integer signature of the given arity.
    pub fn ints(n: usize) -> Self {
        Self(vec![Sort::Int; n])
    }

    pub fn width(&self) -> usize {
        self.0.len()
    }

    pub fn sorts(&self) -> &[Sort] {
        &self.0
    }

    pub fn is_all_int(&self) -> bool {
        self.0.iter().all(|s| *s == Sort::Int)
    }

    /// Signature of a join: the two column blocks side by side.
    pub fn joined(&self, other: &RelSignature) -> Self {
        let mut sorts = self.0.clone();
        sorts.extend_from_slice(&other.0);
        Self(sorts)
    }

    /// Signature with the given (ascending) columns removed.
    pub fn projected(&self, removed: &[usize]) -> Self {
        let mut sorts = Vec::with_capacity(self.0.len().saturating_sub(removed.len()));
        let mut k = 0;
        for (j, s) in self.0.iter().enumerate() {
            if k < removed.len() && j == removed[k] {
                k += 1;
            } else {
                sorts.push(*s);
            }
        }
        Self(sorts)
    }
}

/// Abstract value attached to a predicate during saturation.
#[derive(Debug, Clone)]
pub struct KarrRelation {
    sig: RelSignature,
    decl: Option<Predicate>,
    empty: bool,
    ineqs: Matrix,
    ineqs_valid: bool,
    basis: Matrix,
    basis_valid: bool,
}

impl KarrRelation {
    pub(crate) fn new(decl: Option<Predicate>, sig: RelSignature, is_empty: bool) -> Self {
        let width = sig.width();
        Self {
            sig,
            decl,
            empty: is_empty,
            ineqs: Matrix::new(width),
            ineqs_valid: !is_empty,
            basis: Matrix::new(width),
            basis_valid: false,
        }
    }

    pub fn signature(&self) -> &RelSignature {
        &self.sig
    }

    pub fn width(&self) -> usize {
        self.sig.width()
    }

    pub fn decl(&self) -> Option<&Predicate> {
        self.decl.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Pin each integer-literal component of the fact to its column.
    /// Only called on a freshly created empty relation.
    pub fn add_fact(&mut self, fact: &[Expr]) {
        debug_assert!(self.empty);
        debug_assert!(!self.basis_valid);
        self.empty = false;
        self.ineqs_valid = true;
        for (i, component) in fact.iter().enumerate() {
            if let Expr::Int(n) = component {
                self.ineqs.push(Row::pin(self.width(), i, *n));
            }
        }
    }

    /// Join of two relations with equality constraints between the given
    /// column pairs `(left column, right column)`.
    pub fn join(
        r1: &mut KarrRelation,
        r2: &mut KarrRelation,
        pairs: &[(usize, usize)],
        dz: &Dualizer,
    ) -> KarrRelation {
        let sig = r1.sig.joined(&r2.sig);
        let decl = r2.decl.clone().or_else(|| r1.decl.clone());
        if r1.empty || r2.empty {
            return KarrRelation::new(decl, sig, true);
        }
        let n1 = r1.width();
        let n = sig.width();
        let mut out = KarrRelation::new(decl, sig, false);
        for row in r1.ineqs(dz).rows() {
            let mut a = row.a.clone();
            a.resize(n, BigRational::zero());
            out.ineqs.push(Row::new(a, row.b.clone(), row.is_eq));
        }
        for row in r2.ineqs(dz).rows() {
            let mut a = vec![BigRational::zero(); n];
            a[n1..].clone_from_slice(&row.a);
            out.ineqs.push(Row::new(a, row.b.clone(), row.is_eq));
        }
        for &(c1, c2) in pairs {
            let mut row = Row::zero(n, true);
            row.a[c1] = BigRational::one();
            row.a[n1 + c2] = -BigRational::one();
            out.ineqs.push(row);
        }
        out
    }

    /// Drop the given (ascending) columns. Works on the basis: removing
    /// components of a generator set generates the projection.
    pub fn project(r: &mut KarrRelation, removed: &[usize], dz: &Dualizer) -> KarrRelation {
        let sig = r.sig.projected(removed);
        if !r.empty {
            r.ensure_basis(dz);
        }
        if r.empty {
            return KarrRelation::new(r.decl.clone(), sig, true);
        }
        let mut out = KarrRelation::new(r.decl.clone(), sig, false);
        out.ineqs_valid = false;
        out.basis_valid = true;
        for row in r.basis.rows() {
            let mut a = Vec::with_capacity(row.a.len().saturating_sub(removed.len()));
            let mut k = 0;
            for (j, c) in row.a.iter().enumerate() {
                if k < removed.len() && j == removed[k] {
                    k += 1;
                } else {
                    a.push(c.clone());
                }
            }
            debug_assert!(row.is_eq);
            out.basis.push(Row::new(a, row.b.clone(), true));
        }
        out
    }

    /// Apply a cyclic column permutation to whichever forms are valid.
    pub fn rename(r: &KarrRelation, cycle: &[usize]) -> KarrRelation {
        let mut out = r.clone();
        if out.empty || cycle.len() < 2 {
            return out;
        }
        cycle_sorts(out.sig.0.as_mut_slice(), cycle);
        if out.ineqs_valid {
            cycle_matrix(&mut out.ineqs, cycle);
        }
        if out.basis_valid {
            cycle_matrix(&mut out.basis, cycle);
        }
        out
    }

    /// Union approximated by the union of generator sets. When anything
    /// was added and `delta` is given, `delta` becomes a copy of the
    /// result, signalling a change to the fixed-point loop.
    pub fn union_with(
        &mut self,
        src: &mut KarrRelation,
        delta: Option<&mut KarrRelation>,
        dz: &Dualizer,
    ) {
        if !src.empty {
            src.ensure_basis(dz);
        }
        if src.empty {
            if let Some(d) = delta {
                d.empty = true;
            }
            return;
        }
        if !self.empty {
            self.ensure_basis(dz);
        }
        if self.empty {
            self.basis = src.basis.clone();
            self.basis_valid = true;
            self.ineqs_valid = false;
            self.empty = false;
            if let Some(d) = delta {
                d.copy_from(self);
            }
            return;
        }
        let before = self.basis.len();
        for row in src.basis.rows() {
            if !self.basis.contains(row) {
                self.basis.push(row.clone());
            }
        }
        self.ineqs_valid = false;
        if self.basis.len() != before {
            if let Some(d) = delta {
                d.copy_from(self);
            }
        }
    }

    /// Constrain the listed columns to be pairwise equal.
    pub fn filter_identical(&mut self, cols: &[usize], dz: &Dualizer) {
        if self.empty || cols.len() < 2 {
            return;
        }
        self.ensure_ineqs(dz);
        for &c in &cols[1..] {
            let mut row = Row::zero(self.width(), true);
            row.a[cols[0]] = BigRational::one();
            row.a[c] = -BigRational::one();
            self.ineqs.push(row);
        }
        self.basis_valid = false;
    }

    /// Pin a column to an integer literal; any other value is a sound
    /// no-op.
    pub fn filter_equal(&mut self, col: usize, value: &Expr, dz: &Dualizer) {
        if self.empty {
            return;
        }
        if let Expr::Int(n) = value {
            self.ensure_ineqs(dz);
            self.ineqs.push(Row::pin(self.width(), col, *n));
            self.basis_valid = false;
        }
    }

    /// Add every linear conjunct of `cond` as a constraint row; columns
    /// are resolved through the variable map.
    pub fn filter_interpreted(
        &mut self,
        cond: &Expr,
        cols: &FxHashMap<String, usize>,
        dz: &Dualizer,
    ) {
        if self.empty {
            return;
        }
        self.ensure_ineqs(dz);
        let rows = linear::constraint_rows(cond, cols, self.width());
        if rows.is_empty() {
            return;
        }
        for row in rows {
            self.ineqs.push(row);
        }
        self.basis_valid = false;
    }

    /// Constraint form, rebuilt from the basis if needed.
    pub fn ineqs(&mut self, dz: &Dualizer) -> &Matrix {
        self.ensure_ineqs(dz);
        &self.ineqs
    }

    /// Basis form, rebuilt from the constraints if needed. Check
    /// [`Self::is_empty`] afterwards: the rebuild may discover
    /// infeasibility.
    pub fn basis(&mut self, dz: &Dualizer) -> &Matrix {
        self.ensure_basis(dz);
        &self.basis
    }

    /// The relation as a symbolic conjunction over the canonical argument
    /// variables; `false` for the empty relation.
    pub fn to_formula(&mut self, dz: &Dualizer) -> Expr {
        if self.empty {
            return Expr::Bool(false);
        }
        linear::matrix_formula(self.ineqs(dz))
    }

    fn ensure_ineqs(&mut self, dz: &Dualizer) {
        if !self.ineqs_valid {
            debug_assert!(self.basis_valid);
            self.ineqs = dz.basis_to_constraints(&self.basis);
            self.ineqs_valid = true;
        }
    }

    fn ensure_basis(&mut self, dz: &Dualizer) {
        if !self.basis_valid {
            debug_assert!(self.ineqs_valid);
            match dz.constraints_to_basis(&self.ineqs) {
                Some(m) => {
                    self.basis = m;
                    self.basis_valid = true;
                }
                None => {
                    self.empty = true;
                    self.basis = Matrix::new(self.width());
                }
            }
        }
    }

    fn copy_from(&mut self, other: &KarrRelation) {
        self.ineqs = other.ineqs.clone();
        self.basis = other.basis.clone();
        self.ineqs_valid = other.ineqs_valid;
        self.basis_valid = other.basis_valid;
        self.empty = other.empty;
    }
}

fn cycle_matrix(m: &mut Matrix, cycle: &[usize]) {
    for row in m.rows_mut() {
        let tmp = row.a[cycle[0]].clone();
        for i in 0..cycle.len() - 1 {
            row.a[cycle[i]] = row.a[cycle[i + 1]].clone();
        }
        row.a[cycle[cycle.len() - 1]] = tmp;
    }
}

fn cycle_sorts(sorts: &mut [Sort], cycle: &[usize]) {
    let tmp = sorts[cycle[0]];
    for i in 0..cycle.len() - 1 {
        sorts[cycle[i]] = sorts[cycle[i + 1]];
    }
    sorts[cycle[cycle.len() - 1]] = tmp;
}

impl fmt::Display for KarrRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(decl) = &self.decl {
            writeln!(f, "{}", decl.name)?;
        }
        if self.empty {
            writeln!(f, "empty")?;
        } else {
            if self.ineqs_valid {
                writeln!(f, "ineqs:")?;
                write!(f, "{}", self.ineqs)?;
            }
            if self.basis_valid {
                writeln!(f, "basis:")?;
                write!(f, "{}", self.basis)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
impl KarrRelation {
    pub(crate) fn ineqs_for_tests(&self) -> &Matrix {
        &self.ineqs
    }

    pub(crate) fn ineqs_mut_for_tests(&mut self) -> &mut Matrix {
        &mut self.ineqs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn dz() -> Dualizer {
        Dualizer::new(Arc::new(AtomicBool::new(false)))
    }

    fn rat(n: i64) -> BigRational {
        BigRational::from_integer(n.into())
    }

    fn full(n: usize) -> KarrRelation {
        KarrRelation::new(None, RelSignature::ints(n), false)
    }

    fn empty(n: usize) -> KarrRelation {
        KarrRelation::new(None, RelSignature::ints(n), true)
    }

    #[test]
    fn test_add_fact_pins_columns() {
        let d = dz();
        let mut r = empty(2);
        r.add_fact(&[Expr::int(3), Expr::int(5)]);
        assert!(!r.is_empty());
        let m = r.ineqs(&d).clone();
        assert!(m.contains(&Row::pin(2, 0, 3)));
        assert!(m.contains(&Row::pin(2, 1, 5)));
        // the basis is the single anchored point
        let b = r.basis(&d);
        assert_eq!(b.len(), 1);
        assert_eq!(b.rows()[0].a, vec![rat(3), rat(5)]);
    }

    #[test]
    fn test_add_fact_skips_non_literals() {
        let d = dz();
        let mut r = empty(2);
        r.add_fact(&[Expr::int(1), Expr::var(karrlog_horn::Var::int("x"))]);
        assert_eq!(r.ineqs(&d).len(), 1);
    }

    #[test]
    fn test_empty_absorbs_join() {
        let d = dz();
        let mut e = empty(1);
        let mut f = full(2);
        let j = KarrRelation::join(&mut e, &mut f, &[], &d);
        assert!(j.is_empty());
        assert_eq!(j.width(), 3);
    }

    #[test]
    fn test_join_pads_and_links_columns() {
        let d = dz();
        let mut a = empty(1);
        a.add_fact(&[Expr::int(3)]);
        let mut b = full(1);
        let mut j = KarrRelation::join(&mut a, &mut b, &[(0, 0)], &d);
        // x0 = 3 and x0 = x1 force x1 = 3
        let basis = j.basis(&d).clone();
        assert!(!j.is_empty());
        assert_eq!(basis.len(), 1);
        assert_eq!(basis.rows()[0].a, vec![rat(3), rat(3)]);
    }

    #[test]
    fn test_project_all_columns_is_trivially_true() {
        let d = dz();
        let mut r = empty(2);
        r.add_fact(&[Expr::int(1), Expr::int(2)]);
        let mut p = KarrRelation::project(&mut r, &[0, 1], &d);
        assert_eq!(p.width(), 0);
        assert!(p.to_formula(&d).is_true());
    }

    #[test]
    fn test_project_keeps_remaining_columns() {
        let d = dz();
        let mut r = empty(3);
        r.add_fact(&[Expr::int(1), Expr::int(2), Expr::int(3)]);
        let mut p = KarrRelation::project(&mut r, &[1], &d);
        assert_eq!(p.width(), 2);
        let basis = p.basis(&d);
        assert_eq!(basis.rows()[0].a, vec![rat(1), rat(3)]);
    }

    #[test]
    fn test_project_infeasible_becomes_empty() {
        let d = dz();
        let mut r = full(2);
        let cols = linear::column_map(&linear::canonical_vars(2));
        let contradiction = Expr::and(
            Expr::eq(Expr::var(karrlog_horn::Var::int("v0")), Expr::int(0)),
            Expr::eq(Expr::var(karrlog_horn::Var::int("v0")), Expr::int(1)),
        );
        r.filter_interpreted(&contradiction, &cols, &d);
        let p = KarrRelation::project(&mut r, &[1], &d);
        assert!(p.is_empty());
    }

    #[test]
    fn test_rename_cycle() {
        // x0 - x1 = 0 renamed by the cycle (0 1 2) becomes x2 - x0 = 0
        let d = dz();
        let mut r = full(3);
        let cols = linear::column_map(&linear::canonical_vars(3));
        r.filter_interpreted(
            &Expr::eq(
                Expr::var(karrlog_horn::Var::int("v0")),
                Expr::var(karrlog_horn::Var::int("v1")),
            ),
            &cols,
            &d,
        );
        let renamed = KarrRelation::rename(&r, &[0, 1, 2]);
        let expected = Row::new(vec![rat(-1), rat(0), rat(1)], rat(0), true);
        let mut renamed = renamed;
        assert!(renamed.ineqs(&d).contains(&expected));
    }

    #[test]
    fn test_project_composes() {
        // dropping column 1 and then column 1 of the result equals
        // dropping columns 1 and 2 at once
        let d = dz();
        let mut r = empty(4);
        r.add_fact(&[Expr::int(1), Expr::int(2), Expr::int(3), Expr::int(4)]);
        let mut once = {
            let mut a = KarrRelation::project(&mut r.clone(), &[1], &d);
            KarrRelation::project(&mut a, &[1], &d)
        };
        let mut both = KarrRelation::project(&mut r, &[1, 2], &d);
        assert_eq!(once.basis(&d), both.basis(&d));
    }

    #[test]
    fn test_filter_true_is_unit() {
        let d = dz();
        let mut r = full(2);
        let cols = linear::column_map(&linear::canonical_vars(2));
        r.filter_interpreted(&Expr::Bool(true), &cols, &d);
        assert!(r.ineqs(&d).is_empty());
        assert!(r.to_formula(&d).is_true());
    }

    #[test]
    fn test_union_self_is_identity() {
        let d = dz();
        let mut r = empty(1);
        r.add_fact(&[Expr::int(4)]);
        let mut src = r.clone();
        let mut delta = empty(1);
        r.union_with(&mut src, Some(&mut delta), &d);
        assert!(delta.is_empty(), "union with itself must not grow");
    }

    #[test]
    fn test_union_adopts_into_empty() {
        let d = dz();
        let mut r = empty(1);
        let mut src = empty(1);
        src.add_fact(&[Expr::int(2)]);
        let mut delta = empty(1);
        r.union_with(&mut src, Some(&mut delta), &d);
        assert!(!r.is_empty());
        assert!(!delta.is_empty());
    }

    #[test]
    fn test_union_accumulates_generators() {
        let d = dz();
        let mut r = empty(1);
        r.add_fact(&[Expr::int(0)]);
        let mut src = empty(1);
        src.add_fact(&[Expr::int(1)]);
        let mut delta = empty(1);
        r.union_with(&mut src, Some(&mut delta), &d);
        assert!(!delta.is_empty());
        assert_eq!(r.basis(&d).len(), 2);
    }

    #[test]
    fn test_union_of_empty_src_marks_delta_empty() {
        let d = dz();
        let mut r = empty(1);
        r.add_fact(&[Expr::int(0)]);
        let mut before = r.clone();
        let mut src = empty(1);
        let mut delta = empty(1);
        delta.add_fact(&[Expr::int(9)]);
        r.union_with(&mut src, Some(&mut delta), &d);
        assert!(delta.is_empty());
        let expected = before.basis(&d).clone();
        assert_eq!(r.basis(&d), &expected);
    }

    #[test]
    fn test_filter_equal_ignores_non_literals() {
        let d = dz();
        let mut r = full(1);
        r.filter_equal(0, &Expr::var(karrlog_horn::Var::int("y")), &d);
        assert!(r.ineqs(&d).is_empty());
        r.filter_equal(0, &Expr::int(7), &d);
        assert!(r.ineqs(&d).contains(&Row::pin(1, 0, 7)));
    }

    #[test]
    fn test_filter_identical() {
        let d = dz();
        let mut r = full(3);
        r.filter_identical(&[0, 1, 2], &d);
        let m = r.ineqs(&d);
        assert_eq!(m.len(), 2);
        assert!(m.rows().iter().all(|row| row.is_eq));
    }

    #[test]
    fn test_full_relation_formula_is_true() {
        let d = dz();
        let mut r = full(2);
        assert!(r.to_formula(&d).is_true());
    }

    #[test]
    fn test_empty_relation_formula_is_false() {
        let d = dz();
        let mut r = empty(2);
        assert!(r.to_formula(&d).is_false());
    }

    proptest! {
        #[test]
        fn prop_rename_then_inverse_is_identity(coeffs in proptest::collection::vec(-5i64..=5, 4)) {
            let mut r = full(4);
            let mut row = Row::zero(4, false);
            for (i, &c) in coeffs.iter().enumerate() {
                row.a[i] = rat(c);
            }
            row.b = rat(1);
            r.ineqs_mut_for_tests().push(row.clone());
            let cycle = [0usize, 2, 3];
            let inverse = [3usize, 2, 0];
            let there = KarrRelation::rename(&r, &cycle);
            let back = KarrRelation::rename(&there, &inverse);
            prop_assert_eq!(back.ineqs_for_tests(), r.ineqs_for_tests());
        }
    }
}
