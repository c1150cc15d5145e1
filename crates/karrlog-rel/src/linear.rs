//! Linear constraint recognition and formula emission
//!
//! The parser side classifies interpreted atoms as linear (in)equalities
//! over integer columns and turns them into matrix rows; atoms it cannot
//! classify are skipped, which only weakens the relation. The emitter side
//! renders a constraint matrix back into a symbolic conjunction.
//!
//! Variables are mapped to columns through an explicit name-to-column map;
//! column `i` of a relation corresponds to argument position `i` of its
//! predicate.

use crate::matrix::{Matrix, Row};
use karrlog_horn::{Expr, Op, Sort, Var};
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};
use rustc_hash::FxHashMap;

/// Canonical argument variables `v0, v1, ...` used for emitted formulas.
pub fn canonical_vars(n: usize) -> Vec<Var> {
    (0..n).map(|i| Var::int(format!("v{i}"))).collect()
}

/// Map variable names to their first column of occurrence.
pub fn column_map(vars: &[Var]) -> FxHashMap<String, usize> {
    let mut map = FxHashMap::default();
    for (i, v) in vars.iter().enumerate() {
        map.entry(v.name.clone()).or_insert(i);
    }
    map
}

/// Parse a conjunction into matrix rows over `width` columns.
/// Unrecognised conjuncts are silently dropped.
pub fn constraint_rows(cond: &Expr, cols: &FxHashMap<String, usize>, width: usize) -> Vec<Row> {
    let mut out = Vec::new();
    for atom in cond.conjuncts() {
        if let Some(rows) = atom_rows(&atom, cols, width) {
            out.extend(rows);
        }
    }
    out
}

fn atom_rows(e: &Expr, cols: &FxHashMap<String, usize>, width: usize) -> Option<Vec<Row>> {
    let (op, lhs, rhs) = match e {
        Expr::Op(op, args) if args.len() == 2 => (*op, &*args[0], &*args[1]),
        Expr::Op(Op::Not, args) if args.len() == 1 => {
            // Negated comparisons flip; strictness is handled below.
            let flipped = match &*args[0] {
                Expr::Op(Op::Lt, a) if a.len() == 2 => Expr::ge((*a[0]).clone(), (*a[1]).clone()),
                Expr::Op(Op::Gt, a) if a.len() == 2 => Expr::le((*a[0]).clone(), (*a[1]).clone()),
                Expr::Op(Op::Le, a) if a.len() == 2 => Expr::gt((*a[0]).clone(), (*a[1]).clone()),
                Expr::Op(Op::Ge, a) if a.len() == 2 => Expr::lt((*a[0]).clone(), (*a[1]).clone()),
                _ => return None,
            };
            return atom_rows(&flipped, cols, width);
        }
        _ => return None,
    };

    if op == Op::Or {
        return or_rows(lhs, rhs, cols, width);
    }
    if lhs.sort() != Sort::Int || rhs.sort() != Sort::Int {
        return None;
    }

    let mut row = Row::zero(width, false);
    match op {
        Op::Eq => {
            row.is_eq = true;
            if !linear(lhs, cols, &mut row, &BigRational::one())
                || !linear(rhs, cols, &mut row, &-BigRational::one())
            {
                return None;
            }
        }
        Op::Le | Op::Lt | Op::Ge | Op::Gt => {
            // normalise to small <= big: the row is big - small >= 0
            let (small, big) = match op {
                Op::Le | Op::Lt => (lhs, rhs),
                _ => (rhs, lhs),
            };
            if !linear(small, cols, &mut row, &-BigRational::one())
                || !linear(big, cols, &mut row, &BigRational::one())
            {
                return None;
            }
            if matches!(op, Op::Lt | Op::Gt) {
                // strict over the integers tightens by one
                row.b -= BigRational::one();
            }
        }
        _ => return None,
    }
    Some(vec![row])
}

/// `(v = n1) or (v = n2)` over one variable becomes the convex hull
/// `v >= min and v <= max`.
fn or_rows(lhs: &Expr, rhs: &Expr, cols: &FxHashMap<String, usize>, width: usize) -> Option<Vec<Row>> {
    let (v1, n1) = var_eq_num(lhs)?;
    let (v2, n2) = var_eq_num(rhs)?;
    if v1 != v2 {
        return None;
    }
    let col = *cols.get(&v1.name)?;
    let (lo, hi) = if n1 <= n2 { (n1, n2) } else { (n2, n1) };
    let mut lower = Row::zero(width, false);
    lower.a[col] = BigRational::one();
    lower.b = -BigRational::from_integer(lo.into());
    let mut upper = Row::zero(width, false);
    upper.a[col] = -BigRational::one();
    upper.b = BigRational::from_integer(hi.into());
    Some(vec![lower, upper])
}

fn var_eq_num(e: &Expr) -> Option<(&Var, i64)> {
    let Expr::Op(Op::Eq, args) = e else {
        return None;
    };
    if args.len() != 2 {
        return None;
    }
    match (&*args[0], &*args[1]) {
        (Expr::Var(v), Expr::Int(n)) | (Expr::Int(n), Expr::Var(v)) => Some((v, *n)),
        _ => None,
    }
}

/// Accumulate `mul * e` into the row, returning false when `e` is not
/// linear over the mapped integer variables.
fn linear(e: &Expr, cols: &FxHashMap<String, usize>, row: &mut Row, mul: &BigRational) -> bool {
    match e {
        Expr::Int(n) => {
            row.b += mul * BigRational::from_integer((*n).into());
            true
        }
        Expr::Var(v) => {
            if v.sort != Sort::Int {
                return false;
            }
            match cols.get(&v.name) {
                Some(&idx) => {
                    row.a[idx] += mul;
                    true
                }
                None => false,
            }
        }
        Expr::Op(Op::Add, args) => args.iter().all(|a| linear(a, cols, row, mul)),
        Expr::Op(Op::Sub, args) if args.len() == 2 => {
            linear(&args[0], cols, row, mul) && linear(&args[1], cols, row, &-mul)
        }
        Expr::Op(Op::Neg, args) if args.len() == 1 => linear(&args[0], cols, row, &-mul),
        Expr::Op(Op::Mul, args) if args.len() == 2 => match (&*args[0], &*args[1]) {
            (Expr::Int(n), other) | (other, Expr::Int(n)) => {
                let scaled = mul * BigRational::from_integer((*n).into());
                linear(other, cols, row, &scaled)
            }
            _ => false,
        },
        _ => false,
    }
}

/// Emit the matrix as a conjunction over the canonical variables.
pub fn matrix_formula(m: &Matrix) -> Expr {
    let args: Vec<Expr> = canonical_vars(m.width())
        .into_iter()
        .map(Expr::var)
        .collect();
    matrix_formula_over(m, &args)
}

/// Emit the matrix as a conjunction with column `i` rendered as `args[i]`.
pub fn matrix_formula_over(m: &Matrix, args: &[Expr]) -> Expr {
    let mut conj = Vec::new();
    for row in m.rows() {
        match row_formula(row, args) {
            RowFormula::Trivial => {}
            RowFormula::Contradiction => return Expr::Bool(false),
            RowFormula::Atom(e) => conj.push(e),
        }
    }
    Expr::and_many(conj)
}

enum RowFormula {
    Trivial,
    Contradiction,
    Atom(Expr),
}

fn row_formula(row: &Row, args: &[Expr]) -> RowFormula {
    if row.is_trivial_coeffs() {
        let sat = if row.is_eq {
            row.b.is_zero()
        } else {
            !row.b.is_negative()
        };
        return if sat {
            RowFormula::Trivial
        } else {
            RowFormula::Contradiction
        };
    }

    // scale to integer coefficients; a positive factor preserves the row
    let mut lcm = row.b.denom().clone();
    for c in &row.a {
        lcm = num_integer::lcm(lcm, c.denom().clone());
    }
    let scale = BigRational::from_integer(lcm);

    let mut terms = Vec::new();
    for (c, arg) in row.a.iter().zip(args) {
        if c.is_zero() {
            continue;
        }
        let c = (c * &scale).to_integer();
        let Some(k) = c.to_i64() else {
            return RowFormula::Trivial;
        };
        if k == 1 {
            terms.push(arg.clone());
        } else if k == -1 {
            terms.push(Expr::neg(arg.clone()));
        } else {
            terms.push(Expr::mul(Expr::int(k), arg.clone()));
        }
    }
    let b = (&row.b * &scale).to_integer();
    if !b.is_zero() {
        let Some(k) = b.to_i64() else {
            return RowFormula::Trivial;
        };
        terms.push(Expr::int(k));
    }
    let lhs = Expr::add_many(terms);
    let atom = if row.is_eq {
        Expr::eq(lhs, Expr::int(0))
    } else {
        Expr::ge(lhs, Expr::int(0))
    };
    RowFormula::Atom(atom)
}
